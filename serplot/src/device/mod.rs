mod event;
mod ingest;

pub use event::Event;
pub use ingest::{Backoff, Ingestor, POLL_TIMEOUT};
