//! Frame decoder
//!
//! Cuts the incoming byte stream into lines and classifies each line as
//! either a set of named fields (`Record::Numeric`) or free text
//! (`Record::Text`). The only state kept across calls is the partial line
//! at the end of the buffer, so feeding a stream in arbitrary chunks yields
//! the same records as feeding it at once.

use super::pending::PendingBuf;
use super::sample::{Field, FieldValue, NumericRecord, RawLine, Record, TextLine, Timestamp};
use crate::config::{MonitorConfig, NumericStrategy};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("field {field:?}: malformed number {token:?}")]
    MalformedNumber { field: String, token: String },
    #[error("field {0:?}: missing value")]
    MissingValue(String),
    #[error("line cut after {0} bytes without a delimiter")]
    LineTooLong(usize),
}

/// Running counters, for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub lines: u64,
    pub numeric: u64,
    pub text: u64,
    pub forced: u64,
    pub malformed_fields: u64,
}

enum Extractor {
    KeyValue {
        separator: char,
    },
    Columnar {
        separator: Option<char>,
        names: Vec<String>,
    },
}

fn is_pair_boundary(c: char) -> bool {
    c == ',' || c == ';' || c.is_whitespace()
}

/// Names start a pair; a bare number before the separator (`12:30`) does not.
fn is_key(key: &str) -> bool {
    !key.is_empty() && key.parse::<f64>().map_or(true, |x| !x.is_finite())
}

fn parse_number(field: &str, token: &str) -> Result<f64, DecodeError> {
    match token.trim().parse::<f64>() {
        Ok(x) if x.is_finite() => Ok(x),
        _ => Err(DecodeError::MalformedNumber {
            field: field.to_string(),
            token: token.to_string(),
        }),
    }
}

struct Extracted {
    fields: Vec<Field>,
    errors: Vec<DecodeError>,
    matched: bool,
}

impl Extractor {
    fn value(
        &self,
        name: &str,
        token: &str,
        text_fields: &HashSet<String>,
    ) -> Result<FieldValue, DecodeError> {
        if token.trim().is_empty() {
            Err(DecodeError::MissingValue(name.to_string()))
        } else if text_fields.contains(name) {
            Ok(FieldValue::Text(token.trim().to_string()))
        } else {
            parse_number(name, token).map(FieldValue::Number)
        }
    }

    fn extract(&self, line: &str, text_fields: &HashSet<String>) -> Extracted {
        let mut out = Extracted {
            fields: vec![],
            errors: vec![],
            matched: false,
        };
        match self {
            Extractor::KeyValue { separator } => {
                let mut tokens = line
                    .split(is_pair_boundary)
                    .filter(|t| !t.is_empty())
                    .peekable();
                while let Some(token) = tokens.next() {
                    let (key, value) = match token.split_once(*separator) {
                        Some((k, v)) if is_key(k) => (k, v),
                        _ => continue,
                    };
                    // `name: value` with a space after the separator. A
                    // following token that is a pair of its own is not a value.
                    let value = if value.is_empty() {
                        match tokens.peek() {
                            Some(&next) if !next.contains(*separator) => {
                                tokens.next();
                                next
                            }
                            _ => value,
                        }
                    } else {
                        value
                    };
                    match self.value(key, value, text_fields) {
                        Ok(v) => out.fields.push(Field {
                            name: key.to_string(),
                            value: v,
                        }),
                        Err(e) => out.errors.push(e),
                    }
                }
                out.matched = !out.fields.is_empty();
            }
            Extractor::Columnar { separator, names } => {
                let tokens: Vec<&str> = match separator {
                    Some(sep) => line.split(*sep).map(|t| t.trim()).collect(),
                    None => line
                        .split(|c: char| c == ',' || c.is_whitespace())
                        .filter(|t| !t.is_empty())
                        .collect(),
                };
                for (i, token) in tokens.into_iter().enumerate() {
                    if token.is_empty() {
                        continue;
                    }
                    let name = match names.get(i) {
                        Some(n) => n.clone(),
                        None => format!("col{}", i + 1),
                    };
                    match self.value(&name, token, text_fields) {
                        Ok(v) => {
                            if let FieldValue::Number(_) = v {
                                out.matched = true;
                            }
                            out.fields.push(Field { name, value: v });
                        }
                        Err(e) => out.errors.push(e),
                    }
                }
            }
        }
        out
    }
}

pub struct FrameDecoder {
    delimiter: u8,
    max_pending: usize,
    strip_cr: bool,
    extractor: Extractor,
    text_fields: HashSet<String>,
    pending: PendingBuf,
    stats: DecodeStats,
}

impl FrameDecoder {
    pub fn new(
        delimiter: u8,
        max_pending: usize,
        strategy: NumericStrategy,
        column_names: Option<Vec<String>>,
        text_fields: HashSet<String>,
    ) -> FrameDecoder {
        let extractor = match strategy {
            NumericStrategy::KeyValue { separator } => Extractor::KeyValue { separator },
            NumericStrategy::Columnar { separator } => Extractor::Columnar {
                separator,
                names: column_names.unwrap_or_default(),
            },
        };
        FrameDecoder {
            delimiter,
            max_pending: max_pending.max(1),
            strip_cr: delimiter == b'\n',
            extractor,
            text_fields,
            pending: PendingBuf::new(),
            stats: DecodeStats::default(),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> FrameDecoder {
        FrameDecoder::new(
            config.line_delimiter.0,
            config.max_pending_line_bytes,
            config.numeric_strategy,
            config.column_names.clone(),
            config.text_channels(),
        )
    }

    /// Appends `data` to the pending bytes and returns an iterator over the
    /// records completed so far. Records not pulled from the iterator stay
    /// in the buffer and are returned by the next call.
    pub fn feed(&mut self, data: &[u8], timestamp: Timestamp) -> Records<'_> {
        self.pending.add_data(data);
        Records {
            decoder: self,
            timestamp,
        }
    }

    /// Drops the partial line, returning how many bytes were discarded.
    pub fn reset(&mut self) -> usize {
        self.pending.flush()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.size()
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    fn next_line(&mut self, arrived: Timestamp) -> Option<RawLine> {
        let data = self.pending.data();
        // A line of exactly `max_pending` bytes still has room for its delimiter.
        let window = data.len().min(self.max_pending + 1);
        if let Some(pos) = data[..window].iter().position(|&b| b == self.delimiter) {
            let mut bytes = self.pending.take(pos);
            self.pending.consume(1);
            if self.strip_cr && bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
            return Some(RawLine {
                bytes,
                arrived,
                forced: false,
            });
        }
        if data.len() > self.max_pending {
            let bytes = self.pending.take(self.max_pending);
            tracing::debug!("{}", DecodeError::LineTooLong(bytes.len()));
            return Some(RawLine {
                bytes,
                arrived,
                forced: true,
            });
        }
        None
    }

    fn classify(&mut self, raw: RawLine) -> Option<Record> {
        let text = raw.text();
        if !raw.forced && text.trim().is_empty() {
            return None;
        }
        self.stats.lines += 1;
        if raw.forced {
            // Partial lines are never trusted for samples.
            self.stats.forced += 1;
            self.stats.text += 1;
            return Some(Record::Text(TextLine {
                text,
                timestamp: raw.arrived,
                forced: true,
            }));
        }

        let extracted = self.extractor.extract(&text, &self.text_fields);
        if !extracted.matched {
            self.stats.text += 1;
            return Some(Record::Text(TextLine {
                text,
                timestamp: raw.arrived,
                forced: false,
            }));
        }

        for err in &extracted.errors {
            tracing::debug!(line = %text, "dropped field: {}", err);
        }
        self.stats.numeric += 1;
        self.stats.malformed_fields += extracted.errors.len() as u64;
        Some(Record::Numeric(NumericRecord {
            fields: extracted.fields,
            line: text,
            timestamp: raw.arrived,
            malformed: extracted.errors.len(),
        }))
    }
}

/// Lazy sequence of records completed by the bytes fed so far.
pub struct Records<'a> {
    decoder: &'a mut FrameDecoder,
    timestamp: Timestamp,
}

impl<'a> Iterator for Records<'a> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            let raw = self.decoder.next_line(self.timestamp)?;
            if let Some(record) = self.decoder.classify(raw) {
                return Some(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kv_decoder() -> FrameDecoder {
        FrameDecoder::from_config(&MonitorConfig::default())
    }

    fn columnar_decoder(names: &[&str]) -> FrameDecoder {
        FrameDecoder::new(
            b'\n',
            64,
            NumericStrategy::Columnar { separator: None },
            Some(names.iter().map(|s| s.to_string()).collect()),
            HashSet::new(),
        )
    }

    fn number(record: &Record, name: &str) -> Option<f64> {
        match record {
            Record::Numeric(n) => match n.get(name) {
                Some(FieldValue::Number(x)) => Some(*x),
                _ => None,
            },
            Record::Text(_) => None,
        }
    }

    #[test]
    fn key_value_example_stream() {
        let mut dec = kv_decoder();
        let records: Vec<Record> = dec
            .feed(b"temp:21.5\nhum:60\nbadline\ntemp:22.0\n", 1.0)
            .collect();
        assert_eq!(records.len(), 4);
        assert_eq!(number(&records[0], "temp"), Some(21.5));
        assert_eq!(number(&records[1], "hum"), Some(60.0));
        assert_eq!(
            records[2],
            Record::Text(TextLine {
                text: "badline".into(),
                timestamp: 1.0,
                forced: false
            })
        );
        assert_eq!(number(&records[3], "temp"), Some(22.0));
        let stats = dec.stats();
        assert_eq!(stats.numeric, 3);
        assert_eq!(stats.text, 1);
        assert_eq!(stats.malformed_fields, 0);
    }

    #[test]
    fn partial_line_waits_for_delimiter() {
        let mut dec = kv_decoder();
        assert_eq!(dec.feed(b"temp:2", 0.0).count(), 0);
        assert_eq!(dec.pending_len(), 6);
        let records: Vec<Record> = dec.feed(b"1.5\r\n", 0.5).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(number(&records[0], "temp"), Some(21.5));
        assert_eq!(records[0].timestamp(), 0.5);
        assert_eq!(records[0].line(), "temp:21.5");
        assert_eq!(dec.pending_len(), 0);
    }

    #[test]
    fn malformed_field_is_dropped_alone() {
        let mut dec = kv_decoder();
        let records: Vec<Record> = dec.feed(b"a:1,b:oops,c:3\n", 0.0).collect();
        assert_eq!(records.len(), 1);
        match &records[0] {
            Record::Numeric(n) => {
                assert_eq!(n.fields.len(), 2);
                assert_eq!(n.malformed, 1);
            }
            other => panic!("expected numeric record, got {:?}", other),
        }
        assert_eq!(number(&records[0], "a"), Some(1.0));
        assert_eq!(number(&records[0], "c"), Some(3.0));
        assert_eq!(dec.stats().malformed_fields, 1);
    }

    #[test]
    fn empty_value_does_not_swallow_next_pair() {
        let mut dec = kv_decoder();
        let records: Vec<Record> = dec.feed(b"a:,b:2\nx: y:3 z:4\n", 0.0).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(number(&records[0], "b"), Some(2.0));
        assert_eq!(number(&records[0], "a"), None);
        assert_eq!(number(&records[1], "y"), Some(3.0));
        assert_eq!(number(&records[1], "z"), Some(4.0));
        for record in &records {
            match record {
                Record::Numeric(n) => assert_eq!(n.malformed, 1),
                other => panic!("expected numeric record, got {:?}", other),
            }
        }
        assert_eq!(dec.stats().malformed_fields, 2);
    }

    #[test]
    fn non_finite_values_are_malformed() {
        let mut dec = kv_decoder();
        let records: Vec<Record> = dec.feed(b"a:inf b:NaN c:2\n", 0.0).collect();
        assert_eq!(number(&records[0], "c"), Some(2.0));
        assert_eq!(dec.stats().malformed_fields, 2);
    }

    #[test]
    fn text_with_separators_stays_text() {
        let mut dec = kv_decoder();
        let records: Vec<Record> = dec
            .feed(b"Error: sensor failed\nTime: 12:30\n\n\n", 0.0)
            .collect();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], Record::Text(_)));
        assert!(matches!(records[1], Record::Text(_)));
        assert_eq!(dec.stats().malformed_fields, 0);
    }

    #[test]
    fn separated_values_and_mixed_boundaries() {
        let mut dec = kv_decoder();
        let records: Vec<Record> = dec.feed(b"x: 1.5; y:-2\tz:3e2\n", 0.0).collect();
        assert_eq!(number(&records[0], "x"), Some(1.5));
        assert_eq!(number(&records[0], "y"), Some(-2.0));
        assert_eq!(number(&records[0], "z"), Some(300.0));
    }

    #[test]
    fn declared_text_channels_keep_raw_token() {
        let mut text = HashSet::new();
        text.insert("mode".to_string());
        let mut dec = FrameDecoder::new(b'\n', 64, NumericStrategy::default(), None, text);
        let records: Vec<Record> = dec.feed(b"mode:IDLE,rpm:1200\n", 0.0).collect();
        match &records[0] {
            Record::Numeric(n) => {
                assert_eq!(n.get("mode"), Some(&FieldValue::Text("IDLE".into())));
                assert_eq!(n.get("rpm"), Some(&FieldValue::Number(1200.0)));
            }
            other => panic!("expected numeric record, got {:?}", other),
        }
    }

    #[test]
    fn columnar_binds_names_and_numbers_extras() {
        let mut dec = columnar_decoder(&["ax", "ay"]);
        let records: Vec<Record> = dec.feed(b"0.5 -1, 9.81\nhello world\n", 0.0).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(number(&records[0], "ax"), Some(0.5));
        assert_eq!(number(&records[0], "ay"), Some(-1.0));
        assert_eq!(number(&records[0], "col3"), Some(9.81));
        assert!(matches!(records[1], Record::Text(_)));
    }

    #[test]
    fn columnar_explicit_separator_keeps_positions() {
        let mut dec = FrameDecoder::new(
            b'\n',
            64,
            NumericStrategy::Columnar {
                separator: Some('|'),
            },
            Some(vec!["a".into(), "b".into(), "c".into()]),
            HashSet::new(),
        );
        let records: Vec<Record> = dec.feed(b"1||x|4\n", 0.0).collect();
        assert_eq!(number(&records[0], "a"), Some(1.0));
        assert_eq!(number(&records[0], "b"), None);
        assert_eq!(number(&records[0], "c"), None);
        assert_eq!(number(&records[0], "col4"), Some(4.0));
        assert_eq!(dec.stats().malformed_fields, 1);
    }

    #[test]
    fn overlong_line_is_force_flushed() {
        let mut dec = FrameDecoder::new(b'\n', 8, NumericStrategy::default(), None, HashSet::new());
        let records: Vec<Record> = dec.feed(b"a:1234567890\nb:2\n", 0.0).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0],
            Record::Text(TextLine {
                text: "a:123456".into(),
                timestamp: 0.0,
                forced: true
            })
        );
        // The tail of the cut line is a line of its own.
        assert_eq!(number(&records[1], "b"), None);
        assert_eq!(records[1].line(), "7890");
        assert_eq!(number(&records[2], "b"), Some(2.0));
        assert_eq!(dec.stats().forced, 1);
    }

    #[test]
    fn line_of_exactly_the_limit_is_whole() {
        let mut dec = FrameDecoder::new(b'\n', 8, NumericStrategy::default(), None, HashSet::new());
        let records: Vec<Record> = dec.feed(b"temp:1.5\n", 0.0).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(number(&records[0], "temp"), Some(1.5));

        // Same line with the delimiter arriving later.
        assert_eq!(dec.feed(b"temp:2.5", 1.0).count(), 0);
        assert_eq!(dec.pending_len(), 8);
        let records: Vec<Record> = dec.feed(b"\n", 2.0).collect();
        assert_eq!(number(&records[0], "temp"), Some(2.5));

        // One byte more is cut.
        let records: Vec<Record> = dec.feed(b"temp:12.5\n", 3.0).collect();
        assert!(matches!(&records[0], Record::Text(t) if t.forced && t.text == "temp:12."));
        assert_eq!(dec.stats().forced, 1);
    }

    #[test]
    fn reset_discards_partial_line() {
        let mut dec = kv_decoder();
        assert_eq!(dec.feed(b"temp:2", 0.0).count(), 0);
        assert_eq!(dec.reset(), 6);
        let records: Vec<Record> = dec.feed(b"hum:5\n", 0.0).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(number(&records[0], "hum"), Some(5.0));
    }

    #[test]
    fn custom_delimiter() {
        let mut dec = FrameDecoder::new(b';', 64, NumericStrategy::default(), None, HashSet::new());
        let records: Vec<Record> = dec.feed(b"a:1;a:2;a:", 0.0).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(number(&records[1], "a"), Some(2.0));
    }

    #[test]
    fn invalid_utf8_bytes_are_shown_in_hex() {
        let mut dec = kv_decoder();
        let records: Vec<Record> = dec
            .feed(b"ok \xff\xfe done\nt\xc3\xa9:1\ncut \xc3\n", 0.0)
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].line(), "ok 0xFF0xFE done");
        assert_eq!(number(&records[1], "t\u{e9}"), Some(1.0));
        assert_eq!(records[2].line(), "cut 0xC3");
    }

    fn decode_chunked(data: &[u8], cuts: &[usize], max_pending: usize) -> Vec<Record> {
        let mut dec =
            FrameDecoder::new(b'\n', max_pending, NumericStrategy::default(), None, HashSet::new());
        let mut out = vec![];
        let mut start = 0;
        for &cut in cuts {
            let cut = cut.min(data.len()).max(start);
            out.extend(dec.feed(&data[start..cut], 0.0));
            start = cut;
        }
        out.extend(dec.feed(&data[start..], 0.0));
        out
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_records(
            lines in proptest::collection::vec("[a-z]{1,4}:[0-9]{1,3}(\\.[0-9])?|[a-z ]{0,12}|\r", 0..20),
            mut cuts in proptest::collection::vec(0usize..200, 0..12),
            max_pending in 4usize..32,
        ) {
            let data = lines.join("\n").into_bytes();
            cuts.sort_unstable();
            let whole = decode_chunked(&data, &[], max_pending);
            let split = decode_chunked(&data, &cuts, max_pending);
            prop_assert_eq!(whole, split);
        }
    }
}
