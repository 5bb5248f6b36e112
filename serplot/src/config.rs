//! Monitor configuration
//!
//! `MonitorConfig` is the single value that parameterizes a session: how
//! lines are cut and decoded, how much history is kept, how often frames
//! are drawn, and how channels are pre-declared. It can be read from YAML,
//! and must pass `validate()` before a session is built from it.

use crate::data::ChannelKind;
use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
    #[error("render tick of {0}ms is outside 1..=1000ms")]
    InvalidTick(u64),
    #[error("invalid line delimiter {0:?}: expected a single byte")]
    InvalidDelimiter(String),
    #[error("separator {0:?} clashes with the line delimiter or pair boundaries")]
    SeparatorClash(char),
    #[error("channel {0:?} is declared more than once")]
    DuplicateChannel(String),
    #[error("channel {channel:?} has invalid color {color:?}")]
    InvalidColor { channel: String, color: String },
    #[error("empty column name at position {0}")]
    EmptyColumnName(usize),
    #[error("reconnect backoff {initial_ms}ms..{max_ms}ms is not a valid range")]
    InvalidBackoff { initial_ms: u64, max_ms: u64 },
    #[error("time window of {0}s is not a positive finite duration")]
    InvalidTimeWindow(f64),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Line delimiter byte. In YAML it may be given as a number (`10`) or as a
/// one character string (`"\n"`, `";"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub struct Delimiter(pub u8);

impl From<Delimiter> for u8 {
    fn from(d: Delimiter) -> u8 {
        d.0
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Delimiter(b'\n')
    }
}

impl<'de> Deserialize<'de> for Delimiter {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Byte(u8),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Byte(b) => Ok(Delimiter(b)),
            Repr::Text(s) => Delimiter::from_str(&s).map_err(serde::de::Error::custom),
        }
    }
}

impl FromStr for Delimiter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "\\n" => return Ok(Delimiter(b'\n')),
            "\\r" => return Ok(Delimiter(b'\r')),
            "\\t" => return Ok(Delimiter(b'\t')),
            "\\0" => return Ok(Delimiter(0)),
            _ => {}
        }
        match s.as_bytes() {
            [b] => Ok(Delimiter(*b)),
            _ => Err(ConfigError::InvalidDelimiter(s.to_string())),
        }
    }
}

/// How numeric fields are pulled out of a line. Selected once per session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NumericStrategy {
    /// `name<sep>value` tokens, e.g. `temp:21.5,hum:60`.
    KeyValue {
        #[serde(default = "default_kv_separator")]
        separator: char,
    },
    /// Positional values, e.g. `21.5 60`, bound to `column_names`.
    /// Without a separator, tokens are split on whitespace and commas.
    Columnar {
        #[serde(default)]
        separator: Option<char>,
    },
}

fn default_kv_separator() -> char {
    ':'
}

impl Default for NumericStrategy {
    fn default() -> Self {
        NumericStrategy::KeyValue {
            separator: default_kv_separator(),
        }
    }
}

/// A channel known before any data arrives, with explicit styling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDecl {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    /// Anything `ratatui::style::Color` parses: `red`, `lightcyan`, `#ff8800`, `12`.
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub kind: ChannelKind,
}

impl ChannelDecl {
    pub fn new(name: &str) -> ChannelDecl {
        ChannelDecl {
            name: name.to_string(),
            display_name: None,
            unit: None,
            color: None,
            visible: true,
            kind: ChannelKind::Numeric,
        }
    }

    pub fn parsed_color(&self) -> Option<Color> {
        self.color.as_deref().and_then(|c| Color::from_str(c).ok())
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            initial_ms: 200,
            max_ms: 5000,
        }
    }
}

impl ReconnectConfig {
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub line_delimiter: Delimiter,
    pub max_pending_line_bytes: usize,
    pub numeric_strategy: NumericStrategy,
    pub column_names: Option<Vec<String>>,
    pub max_points_per_channel: usize,
    pub max_log_lines: usize,
    pub render_tick_ms: u64,
    /// Trailing window shown by the graphs. `None` shows every retained point.
    pub time_window_s: Option<f64>,
    /// Also copy lines that produced samples into the text log.
    pub log_numeric_lines: bool,
    pub channels: Vec<ChannelDecl>,
    pub reconnect: ReconnectConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            line_delimiter: Delimiter::default(),
            max_pending_line_bytes: 4096,
            numeric_strategy: NumericStrategy::default(),
            column_names: None,
            max_points_per_channel: 2000,
            max_log_lines: 10000,
            render_tick_ms: 50,
            time_window_s: Some(30.0),
            log_numeric_lines: true,
            channels: vec![],
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Parses a YAML document. Missing keys take their default values.
    /// The result is validated.
    pub fn from_yaml_str(text: &str) -> Result<MonitorConfig, ConfigError> {
        let config: MonitorConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<MonitorConfig, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        MonitorConfig::from_yaml_str(&text)
    }

    pub fn render_tick(&self) -> Duration {
        Duration::from_millis(self.render_tick_ms)
    }

    /// Names of channels whose values are kept as text.
    pub fn text_channels(&self) -> HashSet<String> {
        self.channels
            .iter()
            .filter(|c| c.kind == ChannelKind::Text)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pending_line_bytes == 0 {
            return Err(ConfigError::ZeroCapacity("max_pending_line_bytes"));
        }
        if self.max_points_per_channel == 0 {
            return Err(ConfigError::ZeroCapacity("max_points_per_channel"));
        }
        if self.max_log_lines == 0 {
            return Err(ConfigError::ZeroCapacity("max_log_lines"));
        }
        if self.render_tick_ms == 0 || self.render_tick_ms > 1000 {
            return Err(ConfigError::InvalidTick(self.render_tick_ms));
        }
        if let Some(w) = self.time_window_s {
            if !w.is_finite() || w <= 0.0 {
                return Err(ConfigError::InvalidTimeWindow(w));
            }
        }
        let delim = char::from(self.line_delimiter.0);
        match self.numeric_strategy {
            NumericStrategy::KeyValue { separator } => {
                // Pairs are split on these before the separator is looked at.
                if separator == delim
                    || separator == ','
                    || separator == ';'
                    || separator.is_whitespace()
                {
                    return Err(ConfigError::SeparatorClash(separator));
                }
            }
            NumericStrategy::Columnar { separator } => {
                if separator == Some(delim) {
                    return Err(ConfigError::SeparatorClash(delim));
                }
            }
        }
        if let Some(names) = &self.column_names {
            if let Some(pos) = names.iter().position(|n| n.trim().is_empty()) {
                return Err(ConfigError::EmptyColumnName(pos));
            }
        }
        let mut seen = HashSet::new();
        for decl in &self.channels {
            if !seen.insert(decl.name.as_str()) {
                return Err(ConfigError::DuplicateChannel(decl.name.clone()));
            }
            if let Some(color) = &decl.color {
                if Color::from_str(color).is_err() {
                    return Err(ConfigError::InvalidColor {
                        channel: decl.name.clone(),
                        color: color.clone(),
                    });
                }
            }
        }
        let rc = &self.reconnect;
        if rc.initial_ms == 0 || rc.max_ms < rc.initial_ms {
            return Err(ConfigError::InvalidBackoff {
                initial_ms: rc.initial_ms,
                max_ms: rc.max_ms,
            });
        }
        Ok(())
    }
}
