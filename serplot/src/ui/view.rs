//! View state
//!
//! Everything the user can change about what is displayed, without
//! touching the captured data: log scroll position, pause point, channel
//! visibility, graph time window, the selected channel and the line being
//! typed for the device.

use super::editor::LineEditor;
use super::input::Action;
use crate::config::MonitorConfig;
use crate::data::{Channel, ChannelId, LogView, SampleStore, Timestamp};
use crate::session::Session;
use std::collections::BTreeMap;

pub const MIN_TIME_WINDOW: f64 = 0.5;
pub const MAX_TIME_WINDOW: f64 = 3600.0;
static DEFAULT_TIME_WINDOW: f64 = 30.0;
static DEFAULT_LOG_PAGE: usize = 20;

/// Where the view froze. Data arriving later stays in the store but is
/// not shown until the view resumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PausePoint {
    pub time: Timestamp,
    /// Newest log entry at the time of the pause, if any.
    pub last_seq: Option<u64>,
}

/// Result of applying an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Continue,
    Redraw,
    /// Write this line to the device.
    Send(String),
    Quit,
}

/// Read-only facts an action is applied against.
#[derive(Debug, Clone)]
pub struct ViewContext {
    pub now: Timestamp,
    pub last_seq: Option<u64>,
    /// Log entries visible under the current pause point.
    pub log_len: usize,
    pub channels: Vec<Channel>,
}

impl ViewContext {
    pub fn capture(session: &Session, view: &ViewState) -> ViewContext {
        ViewContext {
            now: session.now(),
            last_seq: session.store.last_seq(),
            log_len: view.log_len(&session.store),
            channels: session.registry.channels(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    /// Sequence number of the entry at the bottom of the log pane while
    /// scrolled back. `None` follows the tail.
    pub anchor: Option<u64>,
    pub pause: Option<PausePoint>,
    /// Trailing graph window in seconds. `None` shows every retained point.
    pub time_window: Option<f64>,
    pub selected: Option<ChannelId>,
    /// Height of the log pane in the last drawn frame.
    pub log_page: usize,
    pub editor: LineEditor,
    overrides: BTreeMap<ChannelId, bool>,
    last_window: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            anchor: None,
            pause: None,
            time_window: Some(DEFAULT_TIME_WINDOW),
            selected: None,
            log_page: DEFAULT_LOG_PAGE,
            editor: LineEditor::default(),
            overrides: BTreeMap::new(),
            last_window: DEFAULT_TIME_WINDOW,
        }
    }
}

impl ViewState {
    pub fn new(config: &MonitorConfig) -> ViewState {
        ViewState {
            time_window: config.time_window_s,
            last_window: config.time_window_s.unwrap_or(DEFAULT_TIME_WINDOW),
            ..ViewState::default()
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_some()
    }

    pub fn is_editing(&self) -> bool {
        self.editor.is_active()
    }

    pub fn is_visible(&self, channel: &Channel) -> bool {
        self.overrides
            .get(&channel.id)
            .copied()
            .unwrap_or(channel.visible)
    }

    pub fn set_visible(&mut self, channel: &Channel, visible: bool) {
        if visible == channel.visible {
            self.overrides.remove(&channel.id);
        } else {
            self.overrides.insert(channel.id, visible);
        }
    }

    /// Right edge of the graphs: the pause time, or `now` when live.
    pub fn end_time(&self, now: Timestamp) -> Timestamp {
        match self.pause {
            Some(p) => p.time,
            None => now,
        }
    }

    pub fn log_len(&self, store: &SampleStore) -> usize {
        match self.pause {
            Some(PausePoint { last_seq: None, .. }) => 0,
            Some(PausePoint { last_seq, .. }) => store.log_len(last_seq),
            None => store.log_len(None),
        }
    }

    /// The page of log entries currently in view.
    pub fn log_view(&self, store: &SampleStore) -> LogView {
        match self.pause {
            Some(PausePoint { last_seq: None, .. }) => LogView::default(),
            Some(PausePoint { last_seq, .. }) => {
                store.log_view(last_seq, self.anchor, self.log_page)
            }
            None => store.log_view(None, self.anchor, self.log_page),
        }
    }

    /// Newest entry the view can show, given the newest entry stored.
    fn newest_seq(&self, live: Option<u64>) -> Option<u64> {
        match self.pause {
            Some(p) => p.last_seq,
            None => live,
        }
    }

    /// Entries between the anchor and `newest`.
    pub fn scroll_offset(&self, newest: Option<u64>) -> usize {
        match (self.anchor, newest) {
            (Some(anchor), Some(newest)) => newest.saturating_sub(anchor) as usize,
            _ => 0,
        }
    }

    fn max_offset(&self, ctx: &ViewContext) -> usize {
        ctx.log_len.saturating_sub(self.log_page.max(1))
    }

    fn current_offset(&self, ctx: &ViewContext) -> usize {
        self.scroll_offset(self.newest_seq(ctx.last_seq))
            .min(self.max_offset(ctx))
    }

    fn scroll_to(&mut self, offset: usize, ctx: &ViewContext) -> Control {
        let offset = offset.min(self.max_offset(ctx));
        let anchor = match self.newest_seq(ctx.last_seq) {
            Some(newest) if offset > 0 => Some(newest.saturating_sub(offset as u64)),
            _ => None,
        };
        if anchor == self.anchor {
            Control::Continue
        } else {
            self.anchor = anchor;
            Control::Redraw
        }
    }

    fn redraw_if(changed: bool) -> Control {
        if changed {
            Control::Redraw
        } else {
            Control::Continue
        }
    }

    fn zoom(&mut self, factor: f64) -> Control {
        let current = self.time_window.unwrap_or(self.last_window);
        let window = (current * factor).clamp(MIN_TIME_WINDOW, MAX_TIME_WINDOW);
        self.time_window = Some(window);
        self.last_window = window;
        Control::Redraw
    }

    fn select_step(&mut self, forward: bool, ctx: &ViewContext) -> Control {
        let n = ctx.channels.len();
        if n == 0 {
            return Control::Continue;
        }
        let pos = self
            .selected
            .and_then(|id| ctx.channels.iter().position(|c| c.id == id));
        let next = match (pos, forward) {
            (None, true) => 0,
            (None, false) => n - 1,
            (Some(i), true) => (i + 1) % n,
            (Some(i), false) => (i + n - 1) % n,
        };
        self.selected = Some(ctx.channels[next].id);
        Control::Redraw
    }

    fn toggle(&mut self, channel: &Channel) -> Control {
        let visible = self.is_visible(channel);
        self.set_visible(channel, !visible);
        Control::Redraw
    }

    pub fn apply(&mut self, action: Action, ctx: &ViewContext) -> Control {
        let page = self.log_page.max(1);
        let offset = self.current_offset(ctx);
        match action {
            Action::Quit => Control::Quit,
            Action::None => Control::Continue,
            Action::Resize => Control::Redraw,
            Action::TogglePause => {
                self.pause = match self.pause {
                    Some(_) => None,
                    None => Some(PausePoint {
                        time: ctx.now,
                        last_seq: ctx.last_seq,
                    }),
                };
                Control::Redraw
            }
            Action::ScrollUp => self.scroll_to(offset.saturating_add(1), ctx),
            Action::ScrollDown => self.scroll_to(offset.saturating_sub(1), ctx),
            Action::PageUp => self.scroll_to(offset.saturating_add(page), ctx),
            Action::PageDown => self.scroll_to(offset.saturating_sub(page), ctx),
            Action::ScrollTop => self.scroll_to(usize::MAX, ctx),
            Action::Follow => self.scroll_to(0, ctx),
            Action::ToggleChannel(index) => match ctx.channels.get(index) {
                Some(channel) => self.toggle(channel),
                None => Control::Continue,
            },
            Action::SelectNext => self.select_step(true, ctx),
            Action::SelectPrev => self.select_step(false, ctx),
            Action::ToggleSelected => {
                let selected = self
                    .selected
                    .and_then(|id| ctx.channels.iter().find(|c| c.id == id));
                match selected {
                    Some(channel) => self.toggle(channel),
                    None => Control::Continue,
                }
            }
            Action::ZoomIn => self.zoom(0.5),
            Action::ZoomOut => self.zoom(2.0),
            Action::ShowAll => {
                if let Some(w) = self.time_window.take() {
                    self.last_window = w;
                }
                Control::Redraw
            }
            Action::StartInput => {
                self.editor.open();
                Control::Redraw
            }
            Action::InputChar(c) => {
                self.editor.push(c);
                Control::Redraw
            }
            Action::InputBackspace => {
                self.editor.backspace();
                Control::Redraw
            }
            Action::CancelInput => {
                self.editor.close();
                Control::Redraw
            }
            Action::SubmitInput => Control::Send(self.editor.submit()),
            Action::HistoryPrev => Self::redraw_if(self.editor.recall_prev()),
            Action::HistoryNext => Self::redraw_if(self.editor.recall_next()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ChannelRegistry, StatusLevel};

    fn context(log_len: usize, names: &[&str]) -> ViewContext {
        let registry = ChannelRegistry::new(&[]);
        for n in names {
            registry.resolve(n);
        }
        ViewContext {
            now: 12.5,
            last_seq: log_len.checked_sub(1).map(|s| s as u64),
            log_len,
            channels: registry.channels(),
        }
    }

    fn store_context(store: &SampleStore, view: &ViewState) -> ViewContext {
        ViewContext {
            now: 1.0,
            last_seq: store.last_seq(),
            log_len: view.log_len(store),
            channels: vec![],
        }
    }

    #[test]
    fn scrolling_is_bounded_by_log_length() {
        let mut view = ViewState::default();
        view.log_page = 10;
        let ctx = context(25, &[]);
        let offset = |view: &ViewState| view.scroll_offset(ctx.last_seq);
        assert_eq!(view.apply(Action::ScrollUp, &ctx), Control::Redraw);
        assert_eq!(offset(&view), 1);
        assert_eq!(view.anchor, Some(23));
        view.apply(Action::PageUp, &ctx);
        assert_eq!(offset(&view), 11);
        view.apply(Action::PageUp, &ctx);
        assert_eq!(offset(&view), 15);
        assert_eq!(view.apply(Action::ScrollUp, &ctx), Control::Continue);
        view.apply(Action::Follow, &ctx);
        assert_eq!(view.anchor, None);
        assert_eq!(offset(&view), 0);
        assert_eq!(view.apply(Action::ScrollDown, &ctx), Control::Continue);
        view.apply(Action::ScrollTop, &ctx);
        assert_eq!(offset(&view), 15);
        assert_eq!(view.anchor, Some(9));

        let short = context(3, &[]);
        view.apply(Action::Follow, &short);
        assert_eq!(view.apply(Action::ScrollUp, &short), Control::Continue);
    }

    #[test]
    fn scrolled_log_stays_put_as_lines_arrive() {
        let store = SampleStore::new(10, 100);
        for i in 0..30 {
            store.append_text(&format!("line {i}"));
        }
        let mut view = ViewState::default();
        view.log_page = 4;
        let ctx = store_context(&store, &view);
        view.apply(Action::PageUp, &ctx);
        view.apply(Action::ScrollUp, &ctx);
        let before: Vec<String> = view.log_view(&store).entries.into_iter().map(|e| e.text).collect();
        assert_eq!(before, vec!["line 21", "line 22", "line 23", "line 24"]);

        for i in 30..33 {
            store.append_text(&format!("line {i}"));
        }
        let after: Vec<String> = view.log_view(&store).entries.into_iter().map(|e| e.text).collect();
        assert_eq!(after, before);
        assert_eq!(view.scroll_offset(store.last_seq()), 8);

        // Scrolling continues from the anchored position.
        let ctx = store_context(&store, &view);
        view.apply(Action::ScrollDown, &ctx);
        assert_eq!(view.anchor, Some(25));
        view.apply(Action::Follow, &ctx);
        let tail: Vec<String> = view.log_view(&store).entries.into_iter().map(|e| e.text).collect();
        assert_eq!(tail.last().map(String::as_str), Some("line 32"));
    }

    #[test]
    fn typed_lines_become_sends() {
        let mut view = ViewState::default();
        let ctx = context(0, &[]);
        assert!(!view.is_editing());
        assert_eq!(view.apply(Action::StartInput, &ctx), Control::Redraw);
        assert!(view.is_editing());
        for c in "rate 5".chars() {
            view.apply(Action::InputChar(c), &ctx);
        }
        view.apply(Action::InputBackspace, &ctx);
        view.apply(Action::InputChar('9'), &ctx);
        assert_eq!(
            view.apply(Action::SubmitInput, &ctx),
            Control::Send("rate 9".into())
        );
        assert!(view.is_editing());
        assert_eq!(view.editor.text(), "");

        assert_eq!(view.apply(Action::HistoryPrev, &ctx), Control::Redraw);
        assert_eq!(view.editor.text(), "rate 9");
        assert_eq!(view.apply(Action::HistoryPrev, &ctx), Control::Continue);
        assert_eq!(
            view.apply(Action::SubmitInput, &ctx),
            Control::Send("rate 9".into())
        );
        view.apply(Action::CancelInput, &ctx);
        assert!(!view.is_editing());
        assert_eq!(view.editor.history(), ["rate 9"]);
    }

    #[test]
    fn pause_records_freeze_point() {
        let mut view = ViewState::default();
        let ctx = context(4, &[]);
        view.apply(Action::TogglePause, &ctx);
        assert_eq!(
            view.pause,
            Some(PausePoint {
                time: 12.5,
                last_seq: Some(3)
            })
        );
        assert_eq!(view.end_time(99.0), 12.5);
        view.apply(Action::TogglePause, &ctx);
        assert!(!view.is_paused());
        assert_eq!(view.end_time(99.0), 99.0);
    }

    #[test]
    fn paused_log_hides_new_entries() {
        let store = SampleStore::new(10, 100);
        store.append_text("a");
        store.append_text("b");
        let mut view = ViewState::default();
        let ctx = ViewContext {
            now: 1.0,
            last_seq: store.last_seq(),
            log_len: view.log_len(&store),
            channels: vec![],
        };
        view.apply(Action::TogglePause, &ctx);
        store.append_status(StatusLevel::Info, "c");
        assert_eq!(view.log_len(&store), 2);
        let texts: Vec<String> = view.log_view(&store).entries.into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["a", "b"]);
        assert_eq!(store.log_len(None), 3);

        let empty = SampleStore::new(10, 100);
        let mut view = ViewState::default();
        view.pause = Some(PausePoint {
            time: 0.0,
            last_seq: None,
        });
        empty.append_text("late");
        assert_eq!(view.log_len(&empty), 0);
        assert!(view.log_view(&empty).entries.is_empty());
    }

    #[test]
    fn channel_toggles_and_selection() {
        let mut view = ViewState::default();
        let ctx = context(0, &["a", "b", "c"]);
        let b = ctx.channels[1].clone();
        assert!(view.is_visible(&b));
        view.apply(Action::ToggleChannel(1), &ctx);
        assert!(!view.is_visible(&b));
        view.apply(Action::ToggleChannel(1), &ctx);
        assert!(view.is_visible(&b));
        assert_eq!(view.apply(Action::ToggleChannel(7), &ctx), Control::Continue);

        assert_eq!(view.apply(Action::ToggleSelected, &ctx), Control::Continue);
        view.apply(Action::SelectPrev, &ctx);
        assert_eq!(view.selected, Some(ChannelId(2)));
        view.apply(Action::SelectNext, &ctx);
        assert_eq!(view.selected, Some(ChannelId(0)));
        view.apply(Action::ToggleSelected, &ctx);
        assert!(!view.is_visible(&ctx.channels[0]));
    }

    #[test]
    fn zoom_is_clamped_and_restorable() {
        let mut view = ViewState::default();
        let ctx = context(0, &[]);
        for _ in 0..10 {
            view.apply(Action::ZoomIn, &ctx);
        }
        assert_eq!(view.time_window, Some(MIN_TIME_WINDOW));
        for _ in 0..20 {
            view.apply(Action::ZoomOut, &ctx);
        }
        assert_eq!(view.time_window, Some(MAX_TIME_WINDOW));
        view.apply(Action::ShowAll, &ctx);
        assert_eq!(view.time_window, None);
        view.apply(Action::ZoomIn, &ctx);
        assert_eq!(view.time_window, Some(MAX_TIME_WINDOW / 2.0));
    }

    #[test]
    fn quit_and_resize() {
        let mut view = ViewState::default();
        let ctx = context(0, &[]);
        assert_eq!(view.apply(Action::Quit, &ctx), Control::Quit);
        assert_eq!(view.apply(Action::Resize, &ctx), Control::Redraw);
        assert_eq!(view.apply(Action::None, &ctx), Control::Continue);
    }
}
