/// Status event sent by the ingestion loop to the session's event queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected,
    /// The stream failed; the reason is the error text.
    Disconnected(String),
    ReconnectFailed { attempt: u32, error: String },
    Reconnected,
    /// Bytes of an incomplete line dropped when the stream was reopened.
    PartialLineDiscarded(usize),
    /// Fields dropped from one line because their values did not parse.
    MalformedFields(usize),
    Exiting,
}
