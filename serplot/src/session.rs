//! Session context
//!
//! Everything shared between the ingestion thread and the render loop
//! lives in one `Session`, created once from a validated configuration
//! and passed around as `Arc<Session>`.

use crate::config::{ConfigError, MonitorConfig};
use crate::data::{ChannelRegistry, SampleStore, StoreDiagnostics, Timestamp};
use crate::device::Event;
use crossbeam::channel;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Depth of the status event queue. Events beyond it are dropped.
static EVENT_QUEUE_DEPTH: usize = 256;

/// Lines typed by the user and not yet written by the ingestion thread.
static OUTBOX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("device is not connected")]
    LinkDown,
    #[error("too many lines waiting to be sent")]
    QueueFull,
}

/// One-shot stop signal. Waiters wake up as soon as it is triggered.
#[derive(Debug, Default)]
pub struct Shutdown {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Shutdown {
    pub fn new() -> Shutdown {
        Shutdown::default()
    }

    pub fn trigger(&self) {
        let mut flag = self.flag.lock().unwrap_or_else(|e| e.into_inner());
        *flag = true;
        self.cond.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.flag.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleeps for `timeout` or until triggered. Returns whether the
    /// signal was triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = self.flag.lock().unwrap_or_else(|e| e.into_inner());
        while !*flag {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            flag = match self.cond.wait_timeout(flag, left) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
        *flag
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Connected = 0,
    Reading = 1,
    Disconnected = 2,
    Reconnecting = 3,
}

impl LinkState {
    fn from_u8(v: u8) -> LinkState {
        match v {
            0 => LinkState::Connected,
            1 => LinkState::Reading,
            2 => LinkState::Disconnected,
            _ => LinkState::Reconnecting,
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, LinkState::Connected | LinkState::Reading)
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LinkState::Connected | LinkState::Reading => "connected",
            LinkState::Disconnected => "disconnected",
            LinkState::Reconnecting => "reconnecting",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub store: StoreDiagnostics,
    pub lines: u64,
    pub forced_lines: u64,
    pub malformed_fields: u64,
    pub reconnects: u64,
}

/// Counters updated by the ingestion loop.
#[derive(Debug, Default)]
pub struct Counters {
    pub lines: AtomicU64,
    pub forced_lines: AtomicU64,
    pub malformed_fields: AtomicU64,
    pub reconnects: AtomicU64,
}

pub struct Session {
    pub config: MonitorConfig,
    pub registry: ChannelRegistry,
    pub store: SampleStore,
    pub shutdown: Shutdown,
    pub counters: Counters,
    source: String,
    started: Instant,
    link: AtomicU8,
    events_tx: channel::Sender<Event>,
    events_rx: channel::Receiver<Event>,
    outbox_tx: channel::Sender<String>,
    outbox_rx: channel::Receiver<String>,
}

impl Session {
    /// Validates `config` and builds the shared state for one monitoring
    /// session of `source`.
    pub fn new(config: MonitorConfig, source: &str) -> Result<Arc<Session>, ConfigError> {
        config.validate()?;
        let (events_tx, events_rx) = channel::bounded(EVENT_QUEUE_DEPTH);
        let (outbox_tx, outbox_rx) = channel::bounded(OUTBOX_DEPTH);
        Ok(Arc::new(Session {
            registry: ChannelRegistry::new(&config.channels),
            store: SampleStore::new(config.max_points_per_channel, config.max_log_lines),
            config,
            shutdown: Shutdown::new(),
            counters: Counters::default(),
            source: source.to_string(),
            started: Instant::now(),
            link: AtomicU8::new(LinkState::Reconnecting as u8),
            events_tx,
            events_rx,
            outbox_tx,
            outbox_rx,
        }))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Seconds since the session started.
    pub fn now(&self) -> Timestamp {
        self.started.elapsed().as_secs_f64()
    }

    pub fn link_state(&self) -> LinkState {
        LinkState::from_u8(self.link.load(Ordering::Acquire))
    }

    pub fn set_link_state(&self, state: LinkState) {
        self.link.store(state as u8, Ordering::Release);
    }

    /// Receiving end of the status events. All receivers share one queue.
    pub fn events(&self) -> channel::Receiver<Event> {
        self.events_rx.clone()
    }

    pub fn emit(&self, event: Event) {
        if let Err(channel::TrySendError::Full(event)) = self.events_tx.try_send(event) {
            tracing::trace!("status queue full, dropped {:?}", event);
        }
    }

    /// Queues `line` for the ingestion thread to write to the device,
    /// followed by the line delimiter.
    pub fn send_line(&self, line: &str) -> Result<(), SendError> {
        if !self.link_state().is_up() {
            return Err(SendError::LinkDown);
        }
        self.outbox_tx
            .try_send(line.to_string())
            .map_err(|_| SendError::QueueFull)
    }

    /// Next queued line, if any.
    pub fn next_outgoing(&self) -> Option<String> {
        self.outbox_rx.try_recv().ok()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            store: self.store.diagnostics(),
            lines: self.counters.lines.load(Ordering::Relaxed),
            forced_lines: self.counters.forced_lines.load(Ordering::Relaxed),
            malformed_fields: self.counters.malformed_fields.load(Ordering::Relaxed),
            reconnects: self.counters.reconnects.load(Ordering::Relaxed),
        }
    }
}
