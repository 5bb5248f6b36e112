//! Ingestion loop
//!
//! Owns the byte stream and runs on its own thread. Bytes go through the
//! frame decoder, and the resulting records land in the session's registry
//! and store. When the stream fails, the loop keeps reopening it through
//! its `Connector` with exponential backoff until the session shuts down.

use super::Event;
use crate::data::{FrameDecoder, Record, StatusLevel};
use crate::port::{ByteStream, Connector, RecvError};
use crate::session::{LinkState, Session};
use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Longest wait on the stream before checking for shutdown.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Longest wait for the device to accept one outgoing line.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(500);

static READ_CHUNK_SIZE: usize = 4096;

/// Exponential backoff delays, doubling from `initial` up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Backoff {
        Backoff {
            initial,
            max,
            next: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = std::cmp::min(self.next.saturating_mul(2), self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

pub struct Ingestor {
    session: Arc<Session>,
    connector: Box<dyn Connector>,
    stream: Option<Box<dyn ByteStream>>,
    decoder: FrameDecoder,
    backoff: Backoff,
    buf: Vec<u8>,
    attempts: u32,
    ever_connected: bool,
}

impl Ingestor {
    /// `stream` is the already opened stream, if any. Without one, the
    /// loop starts by trying to connect.
    pub fn new(
        session: Arc<Session>,
        connector: Box<dyn Connector>,
        stream: Option<Box<dyn ByteStream>>,
    ) -> Ingestor {
        let decoder = FrameDecoder::from_config(&session.config);
        let rc = session.config.reconnect;
        Ingestor {
            session,
            connector,
            stream,
            decoder,
            backoff: Backoff::new(rc.initial(), rc.max()),
            buf: vec![0u8; READ_CHUNK_SIZE],
            attempts: 0,
            ever_connected: false,
        }
    }

    /// Runs until the session shuts down.
    pub fn run(mut self) {
        if self.stream.is_some() {
            self.on_connected();
        } else {
            self.session.set_link_state(LinkState::Reconnecting);
        }
        while !self.session.shutdown.is_triggered() {
            self.step();
        }
        tracing::info!("ingestion loop exiting");
        self.session.emit(Event::Exiting);
    }

    fn step(&mut self) {
        match self.stream.take() {
            Some(mut stream) => {
                if let Err(e) = self.flush_outgoing(stream.as_mut()) {
                    self.on_disconnected(RecvError::IO(e));
                    return;
                }
                match stream.recv(&mut self.buf, POLL_TIMEOUT) {
                    Ok(size) => {
                        self.session.set_link_state(LinkState::Reading);
                        self.ingest(size);
                        self.session.set_link_state(LinkState::Connected);
                        self.stream = Some(stream);
                    }
                    Err(RecvError::NotReady) => {
                        self.stream = Some(stream);
                    }
                    Err(e) => self.on_disconnected(e),
                }
            }
            None => self.reconnect(),
        }
    }

    /// Writes the lines queued by the user, each followed by the delimiter.
    fn flush_outgoing(&self, stream: &mut dyn ByteStream) -> io::Result<()> {
        let store = &self.session.store;
        while let Some(line) = self.session.next_outgoing() {
            let mut bytes = Vec::with_capacity(line.len() + 1);
            bytes.extend_from_slice(line.as_bytes());
            bytes.push(self.session.config.line_delimiter.0);
            match stream.send(&bytes, SEND_TIMEOUT) {
                Ok(()) => {
                    tracing::debug!("sent {:?}", line);
                    store.append_sent(line);
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    tracing::warn!("device did not accept {:?} in time", line);
                    store.append_status(StatusLevel::Warn, format!("send timed out: {}", line));
                }
                Err(e) => {
                    store.append_status(StatusLevel::Warn, format!("not sent: {}", line));
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn ingest(&mut self, size: usize) {
        let session = &self.session;
        let now = session.now();
        for record in self.decoder.feed(&self.buf[..size], now) {
            store_record(session, record);
        }
    }

    fn on_connected(&mut self) {
        let source = self.session.source().to_string();
        self.session.set_link_state(LinkState::Connected);
        self.backoff.reset();
        self.attempts = 0;
        let store = &self.session.store;
        if self.ever_connected {
            tracing::info!("reconnected to {}", source);
            self.session.counters.reconnects.fetch_add(1, Ordering::Relaxed);
            store.append_status(StatusLevel::Info, format!("reconnected to {}", source));
            self.session.emit(Event::Reconnected);
        } else {
            tracing::info!("connected to {}", source);
            store.append_status(StatusLevel::Info, format!("connected to {}", source));
            self.session.emit(Event::Connected);
        }
        self.ever_connected = true;
    }

    fn on_disconnected(&mut self, err: RecvError) {
        tracing::warn!("stream from {} failed: {}", self.session.source(), err);
        self.session.set_link_state(LinkState::Disconnected);
        self.session
            .store
            .append_status(StatusLevel::Warn, format!("device disconnected: {}", err));
        self.session.emit(Event::Disconnected(err.to_string()));
        while let Some(line) = self.session.next_outgoing() {
            self.session
                .store
                .append_status(StatusLevel::Warn, format!("not sent: {}", line));
        }
        self.backoff.reset();
    }

    fn reconnect(&mut self) {
        self.session.set_link_state(LinkState::Reconnecting);
        let delay = self.backoff.next_delay();
        if self.session.shutdown.wait_timeout(delay) {
            return;
        }
        match self.connector.open() {
            Ok(stream) => {
                let discarded = self.decoder.reset();
                if discarded > 0 {
                    self.session.store.append_status(
                        StatusLevel::Warn,
                        format!("discarded {} bytes of an incomplete line", discarded),
                    );
                    self.session.emit(Event::PartialLineDiscarded(discarded));
                }
                self.stream = Some(stream);
                self.on_connected();
            }
            Err(e) => {
                self.attempts += 1;
                tracing::debug!(
                    "reconnect attempt {} to {} failed: {}",
                    self.attempts,
                    self.connector.describe(),
                    e
                );
                self.session.set_link_state(LinkState::Disconnected);
                self.session.emit(Event::ReconnectFailed {
                    attempt: self.attempts,
                    error: e.to_string(),
                });
            }
        }
    }
}

fn store_record(session: &Session, record: Record) {
    let counters = &session.counters;
    counters.lines.fetch_add(1, Ordering::Relaxed);
    match record {
        Record::Text(line) => {
            if line.forced {
                counters.forced_lines.fetch_add(1, Ordering::Relaxed);
            }
            session.store.append_text(line.text);
        }
        Record::Numeric(rec) => {
            for field in rec.fields {
                let id = session.registry.resolve(&field.name);
                session.store.append(id, rec.timestamp, field.value.into());
            }
            if rec.malformed > 0 {
                counters
                    .malformed_fields
                    .fetch_add(rec.malformed as u64, Ordering::Relaxed);
                session.emit(Event::MalformedFields(rec.malformed));
            }
            if session.config.log_numeric_lines {
                session.store.append_text(rec.line);
            }
        }
    }
}
