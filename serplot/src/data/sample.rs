use std::fmt::{self, Write};

/// Seconds since the start of the monitoring session.
pub type Timestamp = f64;

/// Stable identifier of a channel for the lifetime of a session.
/// Ids are assigned densely in creation order, starting from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl ChannelId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0 + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Number(f64),
    Text(String),
}

impl SampleValue {
    pub fn try_as_f64(&self) -> Option<f64> {
        match *self {
            SampleValue::Number(x) => Some(x),
            SampleValue::Text(_) => None,
        }
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Number(x) => write!(f, "{}", x),
            SampleValue::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub channel: ChannelId,
    pub timestamp: Timestamp,
    pub value: SampleValue,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SAMPLE({}) {:.6} {}", self.channel, self.timestamp, self.value)
    }
}

/// One complete line as cut out of the byte stream, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    pub bytes: Vec<u8>,
    pub arrived: Timestamp,
    /// Set when the line was cut because it reached the pending limit
    /// without a delimiter.
    pub forced: bool,
}

impl RawLine {
    /// The line as text. Bytes that are not valid UTF-8 are shown as `0xNN`.
    pub fn text(&self) -> String {
        let mut out = String::with_capacity(self.bytes.len());
        let mut rest = &self.bytes[..];
        while !rest.is_empty() {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    let bad = e.error_len().unwrap_or(after.len());
                    for byte in &after[..bad] {
                        let _ = write!(out, "0x{:02X}", byte);
                    }
                    rest = &after[bad..];
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl From<FieldValue> for SampleValue {
    fn from(v: FieldValue) -> SampleValue {
        match v {
            FieldValue::Number(x) => SampleValue::Number(x),
            FieldValue::Text(s) => SampleValue::Text(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub timestamp: Timestamp,
    pub forced: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumericRecord {
    pub fields: Vec<Field>,
    /// The line the fields were extracted from, verbatim.
    pub line: String,
    pub timestamp: Timestamp,
    /// Fields of this line that were dropped as malformed.
    pub malformed: usize,
}

impl NumericRecord {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}

/// One decoded unit of the byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Text(TextLine),
    Numeric(NumericRecord),
}

impl Record {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Record::Text(t) => t.timestamp,
            Record::Numeric(n) => n.timestamp,
        }
    }

    pub fn line(&self) -> &str {
        match self {
            Record::Text(t) => &t.text,
            Record::Numeric(n) => &n.line,
        }
    }
}
