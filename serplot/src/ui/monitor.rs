//! Monitor loop
//!
//! Draws a frame every render tick and applies terminal events in between.
//! Terminal events come from an `EventSource`, so the loop runs the same
//! against a real terminal and a scripted one.

use super::input::map_event;
use super::render::{self, FrameData};
use super::view::{Control, ViewContext, ViewState};
use crate::data::StatusLevel;
use crate::session::Session;
use crossbeam::channel;
use crossterm::event::{self, Event};
use ratatui::backend::Backend;
use ratatui::Terminal;
use std::io;
use std::time::{Duration, Instant};

pub trait EventSource {
    /// Waits up to `timeout` for the next terminal event.
    fn poll(&mut self, timeout: Duration) -> io::Result<Option<Event>>;
}

/// Terminal events read by a dedicated thread and handed over through a
/// channel.
pub struct ChannelEvents {
    rx: channel::Receiver<Event>,
}

impl ChannelEvents {
    /// Starts the reader thread. It exits after the receiving side is
    /// dropped and one more event arrives.
    pub fn spawn() -> ChannelEvents {
        let (tx, rx) = channel::unbounded();
        std::thread::spawn(move || loop {
            match event::read() {
                Ok(ev) => {
                    if tx.send(ev).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("terminal event read failed: {}", e);
                    break;
                }
            }
        });
        ChannelEvents { rx }
    }
}

impl EventSource for ChannelEvents {
    fn poll(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => Ok(Some(ev)),
            Err(channel::RecvTimeoutError::Timeout) => Ok(None),
            Err(channel::RecvTimeoutError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "terminal event reader stopped",
            )),
        }
    }
}

fn draw_frame<B: Backend>(
    session: &Session,
    view: &mut ViewState,
    terminal: &mut Terminal<B>,
) -> io::Result<()> {
    let data = FrameData::capture(session, view);
    let mut log_rows = view.log_page;
    let shown: &ViewState = view;
    terminal.draw(|frame| {
        let area = frame.area();
        render::draw(&data, shown, area, frame.buffer_mut());
        log_rows = render::layout(area, &data).log_rows();
    })?;
    view.log_page = log_rows.max(1);
    Ok(())
}

/// Runs until the user quits or the session shuts down. Quitting triggers
/// the session shutdown.
pub fn run<B: Backend, E: EventSource + ?Sized>(
    session: &Session,
    view: &mut ViewState,
    terminal: &mut Terminal<B>,
    events: &mut E,
) -> io::Result<()> {
    let tick = session.config.render_tick();
    let mut next_frame = Instant::now();
    while !session.shutdown.is_triggered() {
        if Instant::now() >= next_frame {
            draw_frame(session, view, terminal)?;
            next_frame = Instant::now() + tick;
        }
        let timeout = next_frame.saturating_duration_since(Instant::now());
        let ev = match events.poll(timeout) {
            Ok(Some(ev)) => ev,
            Ok(None) => continue,
            Err(e) => {
                session.request_shutdown();
                return Err(e);
            }
        };
        let action = map_event(&ev, view.is_editing());
        let ctx = ViewContext::capture(session, view);
        match view.apply(action, &ctx) {
            Control::Continue => {}
            Control::Redraw => next_frame = Instant::now(),
            Control::Send(line) => {
                if let Err(e) = session.send_line(&line) {
                    tracing::warn!("not sent: {:?}: {}", line, e);
                    session
                        .store
                        .append_status(StatusLevel::Warn, format!("not sent: {} ({})", line, e));
                }
                next_frame = Instant::now();
            }
            Control::Quit => {
                tracing::info!("quit requested");
                session.request_shutdown();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::data::{LogKind, SampleValue};
    use crate::session::LinkState;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::backend::TestBackend;
    use std::collections::VecDeque;

    struct Scripted {
        events: VecDeque<Event>,
        polls: usize,
    }

    impl EventSource for Scripted {
        fn poll(&mut self, _timeout: Duration) -> io::Result<Option<Event>> {
            self.polls += 1;
            Ok(self.events.pop_front())
        }
    }

    fn key(c: char) -> Event {
        Event::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
    }

    #[test]
    fn quits_and_shuts_down_session() {
        let session = Session::new(MonitorConfig::default(), "test").unwrap();
        let temp = session.registry.resolve("temp");
        session.store.append(temp, 0.0, SampleValue::Number(1.0));
        session.store.append_text("temp:1");

        let mut view = ViewState::new(&session.config);
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let mut events = Scripted {
            events: vec![key(' '), Event::Resize(80, 24), key('2'), key('q')].into(),
            polls: 0,
        };
        run(&session, &mut view, &mut terminal, &mut events).unwrap();

        assert!(session.shutdown.is_triggered());
        assert!(view.is_paused());
        assert_eq!(events.polls, 4);
        // 80x24: status, legend, one graph pane and the log below it.
        assert!(view.log_page < 24);
        let buf = terminal.backend().buffer().clone();
        let mut text = String::new();
        for y in 0..buf.area.height {
            for x in 0..buf.area.width {
                text.push_str(buf[(x, y)].symbol());
            }
        }
        assert!(text.contains("PAUSED"));
        assert!(text.contains("1:temp=1"));
    }

    fn special(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn typing(line: &str) -> Vec<Event> {
        let mut events = vec![key('i')];
        events.extend(line.chars().map(key));
        events.push(special(KeyCode::Enter));
        events.push(special(KeyCode::Esc));
        events.push(key('q'));
        events
    }

    #[test]
    fn typed_line_is_queued_for_the_device() {
        let session = Session::new(MonitorConfig::default(), "test").unwrap();
        session.set_link_state(LinkState::Connected);
        let mut view = ViewState::default();
        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        let mut events = Scripted {
            events: typing("quit now").into(),
            polls: 0,
        };
        run(&session, &mut view, &mut terminal, &mut events).unwrap();

        // 'q' inside the line is text, the one after Esc quits.
        assert_eq!(events.polls, 12);
        assert_eq!(session.next_outgoing().as_deref(), Some("quit now"));
        assert_eq!(session.next_outgoing(), None);
        assert!(!view.is_editing());
        assert_eq!(view.editor.history(), ["quit now"]);
    }

    #[test]
    fn line_typed_while_disconnected_is_reported() {
        let session = Session::new(MonitorConfig::default(), "test").unwrap();
        let mut view = ViewState::default();
        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        let mut events = Scripted {
            events: typing("reset").into(),
            polls: 0,
        };
        run(&session, &mut view, &mut terminal, &mut events).unwrap();

        assert_eq!(session.next_outgoing(), None);
        let log = session.store.log_view(None, None, 10);
        let last = log.entries.last().unwrap();
        assert!(matches!(last.kind, LogKind::Status(StatusLevel::Warn)));
        assert_eq!(last.text, "not sent: reset (device is not connected)");
    }

    #[test]
    fn stops_when_session_shuts_down() {
        let session = Session::new(MonitorConfig::default(), "test").unwrap();
        session.request_shutdown();
        let mut view = ViewState::default();
        let mut terminal = Terminal::new(TestBackend::new(40, 10)).unwrap();
        let mut events = Scripted {
            events: VecDeque::new(),
            polls: 0,
        };
        run(&session, &mut view, &mut terminal, &mut events).unwrap();
        assert_eq!(events.polls, 0);
    }
}
