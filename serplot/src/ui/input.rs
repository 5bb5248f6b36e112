use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// What a terminal event asks the view to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    TogglePause,
    ScrollUp,
    ScrollDown,
    PageUp,
    PageDown,
    ScrollTop,
    Follow,
    /// Zero based position in the channel list.
    ToggleChannel(usize),
    SelectNext,
    SelectPrev,
    ToggleSelected,
    ZoomIn,
    ZoomOut,
    ShowAll,
    /// Opens the line editor for sending to the device.
    StartInput,
    InputChar(char),
    InputBackspace,
    /// Sends the edited line and starts a fresh one.
    SubmitInput,
    CancelInput,
    HistoryPrev,
    HistoryNext,
    Resize,
    None,
}

/// Maps a terminal event to an action. While `editing`, printable keys go
/// to the line editor. Key releases and unbound keys map to `Action::None`.
pub fn map_event(event: &Event, editing: bool) -> Action {
    match event {
        Event::Key(key) if editing => map_edit_key(key),
        Event::Key(key) => map_key(key),
        Event::Resize(_, _) => Action::Resize,
        _ => Action::None,
    }
}

fn is_ctrl_c(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c')
}

fn map_edit_key(key: &KeyEvent) -> Action {
    if key.kind == KeyEventKind::Release {
        return Action::None;
    }
    if is_ctrl_c(key) {
        return Action::Quit;
    }
    match key.code {
        KeyCode::Enter => Action::SubmitInput,
        KeyCode::Esc => Action::CancelInput,
        KeyCode::Backspace => Action::InputBackspace,
        KeyCode::Up => Action::HistoryPrev,
        KeyCode::Down => Action::HistoryNext,
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => Action::InputChar(c),
        _ => Action::None,
    }
}

fn map_key(key: &KeyEvent) -> Action {
    if key.kind == KeyEventKind::Release {
        return Action::None;
    }
    if is_ctrl_c(key) {
        return Action::Quit;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::None;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        KeyCode::Char(' ') | KeyCode::Char('p') => Action::TogglePause,
        KeyCode::Up | KeyCode::Char('k') => Action::ScrollUp,
        KeyCode::Down | KeyCode::Char('j') => Action::ScrollDown,
        KeyCode::PageUp => Action::PageUp,
        KeyCode::PageDown => Action::PageDown,
        KeyCode::Home | KeyCode::Char('g') => Action::ScrollTop,
        KeyCode::End | KeyCode::Char('G') => Action::Follow,
        KeyCode::Char(c @ '1'..='9') => Action::ToggleChannel(c as usize - '1' as usize),
        KeyCode::Tab => Action::SelectNext,
        KeyCode::BackTab => Action::SelectPrev,
        KeyCode::Char('v') => Action::ToggleSelected,
        KeyCode::Char('+') | KeyCode::Char('=') => Action::ZoomIn,
        KeyCode::Char('-') => Action::ZoomOut,
        KeyCode::Char('0') => Action::ShowAll,
        KeyCode::Char('i') | KeyCode::Enter => Action::StartInput,
        _ => Action::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn map_event_live(event: &Event) -> Action {
        map_event(event, false)
    }

    #[test]
    fn quit_keys() {
        assert_eq!(map_event_live(&key(KeyCode::Char('q'))), Action::Quit);
        assert_eq!(map_event_live(&key(KeyCode::Esc)), Action::Quit);
        let ctrl_c = Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert_eq!(map_event_live(&ctrl_c), Action::Quit);
        assert_eq!(map_event_live(&key(KeyCode::Char('c'))), Action::None);
    }

    #[test]
    fn navigation_and_channels() {
        assert_eq!(map_event_live(&key(KeyCode::Char(' '))), Action::TogglePause);
        assert_eq!(map_event_live(&key(KeyCode::Char('k'))), Action::ScrollUp);
        assert_eq!(map_event_live(&key(KeyCode::Down)), Action::ScrollDown);
        assert_eq!(map_event_live(&key(KeyCode::Char('G'))), Action::Follow);
        assert_eq!(map_event_live(&key(KeyCode::Char('1'))), Action::ToggleChannel(0));
        assert_eq!(map_event_live(&key(KeyCode::Char('9'))), Action::ToggleChannel(8));
        assert_eq!(map_event_live(&key(KeyCode::BackTab)), Action::SelectPrev);
        assert_eq!(map_event_live(&key(KeyCode::Char('0'))), Action::ShowAll);
        assert_eq!(map_event_live(&Event::Resize(80, 24)), Action::Resize);
        assert_eq!(map_event_live(&Event::FocusGained), Action::None);
    }

    #[test]
    fn editing_sends_keys_to_the_line() {
        let edit = |code| map_event(&key(code), true);
        assert_eq!(map_event_live(&key(KeyCode::Char('i'))), Action::StartInput);
        assert_eq!(map_event_live(&key(KeyCode::Enter)), Action::StartInput);
        assert_eq!(edit(KeyCode::Char('q')), Action::InputChar('q'));
        assert_eq!(edit(KeyCode::Char('1')), Action::InputChar('1'));
        assert_eq!(edit(KeyCode::Enter), Action::SubmitInput);
        assert_eq!(edit(KeyCode::Esc), Action::CancelInput);
        assert_eq!(edit(KeyCode::Backspace), Action::InputBackspace);
        assert_eq!(edit(KeyCode::Up), Action::HistoryPrev);
        assert_eq!(edit(KeyCode::Down), Action::HistoryNext);
        assert_eq!(edit(KeyCode::PageUp), Action::None);
        let ctrl_c = Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert_eq!(map_event(&ctrl_c, true), Action::Quit);
        assert_eq!(map_event(&Event::Resize(10, 10), true), Action::Resize);
    }

    #[test]
    fn releases_are_ignored() {
        let mut release = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(map_event_live(&Event::Key(release)), Action::None);
    }
}
