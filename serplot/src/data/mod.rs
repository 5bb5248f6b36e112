mod buffer;
mod parser;
mod pending;
mod registry;
mod sample;

pub use buffer::{
    LogEntry, LogKind, LogView, SampleStore, StatusLevel, StoreDiagnostics, TimeRange,
};
pub use parser::{DecodeError, DecodeStats, FrameDecoder, Records};
pub use registry::{Channel, ChannelKind, ChannelRegistry, PALETTE};
pub use sample::{
    ChannelId, Field, FieldValue, NumericRecord, RawLine, Record, Sample, SampleValue, TextLine,
    Timestamp,
};
