//! Sample store
//!
//! Bounded history shared between the ingestion thread and the renderer:
//! one ring of samples per channel and one ring of log entries. Every ring
//! evicts its oldest element once full. Each channel has its own lock, so
//! appending to one channel never waits on a snapshot of another.

use super::sample::{ChannelId, Sample, SampleValue, Timestamp};
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Time bounds for a snapshot, both inclusive. A missing bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeRange {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
}

impl TimeRange {
    pub fn all() -> TimeRange {
        TimeRange::default()
    }

    pub fn until(end: Timestamp) -> TimeRange {
        TimeRange {
            start: None,
            end: Some(end),
        }
    }

    pub fn window(start: Timestamp, end: Timestamp) -> TimeRange {
        TimeRange {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.start.map_or(true, |s| t >= s) && self.end.map_or(true, |e| t <= e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StatusLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// A line received from the device.
    Data,
    /// A message from the monitor itself (link changes, discarded data).
    Status(StatusLevel),
    /// A line written to the device.
    Sent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub seq: u64,
    pub stamp: DateTime<Local>,
    pub kind: LogKind,
    pub text: String,
}

/// A page of the log, as returned by `SampleStore::log_view`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogView {
    /// Oldest first.
    pub entries: Vec<LogEntry>,
    /// Retained entries at or before the requested sequence number.
    pub total: usize,
    /// Entries between the newest returned one and the newest at or before
    /// the requested sequence number.
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreDiagnostics {
    pub samples: u64,
    pub evicted_samples: u64,
    pub clamped_timestamps: u64,
    pub log_entries: u64,
    pub evicted_log_entries: u64,
}

#[derive(Debug, Default)]
struct ChannelRing {
    samples: VecDeque<Sample>,
}

#[derive(Debug, Default)]
struct LogRing {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
}

#[derive(Debug)]
pub struct SampleStore {
    capacity: usize,
    log_capacity: usize,
    channels: RwLock<Vec<Arc<Mutex<ChannelRing>>>>,
    log: Mutex<LogRing>,
    samples: AtomicU64,
    evicted_samples: AtomicU64,
    clamped: AtomicU64,
    log_entries: AtomicU64,
    evicted_log: AtomicU64,
}

impl SampleStore {
    pub fn new(capacity: usize, log_capacity: usize) -> SampleStore {
        SampleStore {
            capacity: capacity.max(1),
            log_capacity: log_capacity.max(1),
            channels: RwLock::new(vec![]),
            log: Mutex::new(LogRing::default()),
            samples: AtomicU64::new(0),
            evicted_samples: AtomicU64::new(0),
            clamped: AtomicU64::new(0),
            log_entries: AtomicU64::new(0),
            evicted_log: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn log_capacity(&self) -> usize {
        self.log_capacity
    }

    fn ring(&self, channel: ChannelId) -> Option<Arc<Mutex<ChannelRing>>> {
        let rings = self.channels.read().unwrap_or_else(|e| e.into_inner());
        rings.get(channel.index()).cloned()
    }

    fn ring_or_insert(&self, channel: ChannelId) -> Arc<Mutex<ChannelRing>> {
        if let Some(ring) = self.ring(channel) {
            return ring;
        }
        let mut rings = self.channels.write().unwrap_or_else(|e| e.into_inner());
        while rings.len() <= channel.index() {
            rings.push(Arc::new(Mutex::new(ChannelRing::default())));
        }
        rings[channel.index()].clone()
    }

    /// Appends one sample, evicting the oldest one if the channel is full.
    /// A timestamp older than the channel's newest sample is raised to it.
    pub fn append(&self, channel: ChannelId, timestamp: Timestamp, value: SampleValue) {
        let ring = self.ring_or_insert(channel);
        let mut ring = ring.lock().unwrap_or_else(|e| e.into_inner());
        let timestamp = match ring.samples.back() {
            Some(last) if timestamp < last.timestamp || timestamp.is_nan() => {
                self.clamped.fetch_add(1, Ordering::Relaxed);
                last.timestamp
            }
            _ => timestamp,
        };
        ring.samples.push_back(Sample {
            channel,
            timestamp,
            value,
        });
        self.samples.fetch_add(1, Ordering::Relaxed);
        while ring.samples.len() > self.capacity {
            ring.samples.pop_front();
            self.evicted_samples.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn push_log(&self, kind: LogKind, text: String) -> u64 {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        let seq = log.next_seq;
        log.next_seq += 1;
        log.entries.push_back(LogEntry {
            seq,
            stamp: Local::now(),
            kind,
            text,
        });
        self.log_entries.fetch_add(1, Ordering::Relaxed);
        while log.entries.len() > self.log_capacity {
            log.entries.pop_front();
            self.evicted_log.fetch_add(1, Ordering::Relaxed);
        }
        seq
    }

    /// Appends a received line to the log, returning its sequence number.
    pub fn append_text(&self, text: impl Into<String>) -> u64 {
        self.push_log(LogKind::Data, text.into())
    }

    pub fn append_status(&self, level: StatusLevel, text: impl Into<String>) -> u64 {
        self.push_log(LogKind::Status(level), text.into())
    }

    /// Records a line written to the device.
    pub fn append_sent(&self, text: impl Into<String>) -> u64 {
        self.push_log(LogKind::Sent, text.into())
    }

    /// Ordered copy of the retained samples of `channel` inside `range`.
    pub fn snapshot(&self, channel: ChannelId, range: TimeRange) -> Vec<Sample> {
        let ring = match self.ring(channel) {
            Some(ring) => ring,
            None => return vec![],
        };
        let ring = ring.lock().unwrap_or_else(|e| e.into_inner());
        let samples = &ring.samples;
        let lo = match range.start {
            Some(s) => samples.partition_point(|x| x.timestamp < s),
            None => 0,
        };
        let hi = match range.end {
            Some(e) => samples.partition_point(|x| x.timestamp <= e),
            None => samples.len(),
        };
        if lo >= hi {
            return vec![];
        }
        samples.range(lo..hi).cloned().collect()
    }

    pub fn channel_len(&self, channel: ChannelId) -> usize {
        match self.ring(channel) {
            Some(ring) => ring.lock().unwrap_or_else(|e| e.into_inner()).samples.len(),
            None => 0,
        }
    }

    pub fn latest(&self, channel: ChannelId) -> Option<Sample> {
        let ring = self.ring(channel)?;
        let ring = ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.samples.back().cloned()
    }

    /// Latest sample of `channel` with a timestamp at or before `end`.
    pub fn latest_until(&self, channel: ChannelId, end: Timestamp) -> Option<Sample> {
        let ring = self.ring(channel)?;
        let ring = ring.lock().unwrap_or_else(|e| e.into_inner());
        let hi = ring.samples.partition_point(|x| x.timestamp <= end);
        if hi == 0 {
            None
        } else {
            ring.samples.get(hi - 1).cloned()
        }
    }

    /// Sequence number of the newest log entry.
    pub fn last_seq(&self) -> Option<u64> {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.next_seq.checked_sub(1)
    }

    /// Number of retained log entries at or before `until_seq`.
    pub fn log_len(&self, until_seq: Option<u64>) -> usize {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        match until_seq {
            Some(seq) => log.entries.partition_point(|e| e.seq <= seq),
            None => log.entries.len(),
        }
    }

    /// Returns up to `count` entries at or before `until_seq`, the newest
    /// of them being `anchor` (the newest entry when `None`). Sequence
    /// numbers are consecutive, so an anchor stays on the same entry while
    /// new ones arrive. Near the oldest entry the page is filled from
    /// newer entries instead.
    pub fn log_view(&self, until_seq: Option<u64>, anchor: Option<u64>, count: usize) -> LogView {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        let total = match until_seq {
            Some(seq) => log.entries.partition_point(|e| e.seq <= seq),
            None => log.entries.len(),
        };
        let newest = match total {
            0 => return LogView::default(),
            n => log.entries[n - 1].seq,
        };
        let offset = match anchor {
            Some(a) => newest.saturating_sub(a).min(total as u64) as usize,
            None => 0,
        };
        let offset = offset.min(total.saturating_sub(count));
        let end = total - offset;
        let start = end.saturating_sub(count);
        LogView {
            entries: log.entries.range(start..end).cloned().collect(),
            total,
            offset,
        }
    }

    pub fn diagnostics(&self) -> StoreDiagnostics {
        StoreDiagnostics {
            samples: self.samples.load(Ordering::Relaxed),
            evicted_samples: self.evicted_samples.load(Ordering::Relaxed),
            clamped_timestamps: self.clamped.load(Ordering::Relaxed),
            log_entries: self.log_entries.load(Ordering::Relaxed),
            evicted_log_entries: self.evicted_log.load(Ordering::Relaxed),
        }
    }
}
