use clap::{Parser, ValueEnum};
use crossterm::{cursor, terminal, ExecutableCommand};
use serplot::config::{ConfigError, Delimiter, MonitorConfig, NumericStrategy};
use serplot::device::Event;
use serplot::Session;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter, e.g. `serplot=debug`.
pub static LOG_ENV: &str = "SERPLOT_LOG";

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `name:value` pairs, e.g. `temp:21.5,hum:60`
    KeyValue,
    /// Positional values, e.g. `21.5 60`
    Columnar,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "serplot-monitor",
    version,
    about = "Plot line-oriented telemetry from a serial port in the terminal"
)]
pub struct MonitorOpts {
    /// Device URL (e.g., /dev/ttyUSB0, COM3, serial:///dev/ttyACM0:9600, tcp://host:port)
    pub device: String,

    /// YAML configuration file. Command line options override its values.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Line delimiter: a single character or one of \n \r \t \0
    #[arg(short = 'd', long = "delimiter")]
    pub delimiter: Option<String>,

    /// How numbers are extracted from each line
    #[arg(short = 'f', long = "format", value_enum)]
    pub format: Option<Format>,

    /// Separator between name and value (key-value) or between columns (columnar)
    #[arg(long = "separator")]
    pub separator: Option<char>,

    /// Column names for the columnar format, comma separated
    #[arg(long = "columns", value_delimiter = ',')]
    pub columns: Option<Vec<String>>,

    /// Points kept per channel
    #[arg(long = "points")]
    pub points: Option<usize>,

    /// Lines kept in the text log
    #[arg(long = "log-lines")]
    pub log_lines: Option<usize>,

    /// Redraw period in milliseconds
    #[arg(long = "tick-ms")]
    pub tick_ms: Option<u64>,

    /// Graph time window in seconds
    #[arg(short = 'w', long = "window", conflicts_with = "all_points")]
    pub window: Option<f64>,

    /// Show every retained point instead of a trailing window
    #[arg(long = "all-points")]
    pub all_points: bool,

    /// Keep lines that produced samples out of the text log
    #[arg(long = "quiet-numeric")]
    pub quiet_numeric: bool,

    /// Start even if the device cannot be opened, and keep retrying
    #[arg(long = "wait")]
    pub wait: bool,

    /// Write diagnostics to this file (filter with SERPLOT_LOG)
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

impl MonitorOpts {
    /// Builds the session configuration: the file (or defaults) first,
    /// then every option given on the command line.
    pub fn build_config(&self) -> Result<MonitorConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::load(path)?,
            None => MonitorConfig::default(),
        };
        if let Some(d) = &self.delimiter {
            config.line_delimiter = Delimiter::from_str(d)?;
        }
        let strategy = match (self.format, config.numeric_strategy) {
            (Some(Format::KeyValue), _) => NumericStrategy::default(),
            (Some(Format::Columnar), _) => NumericStrategy::Columnar { separator: None },
            (None, current) => current,
        };
        config.numeric_strategy = match (strategy, self.separator) {
            (NumericStrategy::KeyValue { .. }, Some(sep)) => NumericStrategy::KeyValue { separator: sep },
            (NumericStrategy::Columnar { .. }, Some(sep)) => NumericStrategy::Columnar {
                separator: Some(sep),
            },
            (s, None) => s,
        };
        if let Some(columns) = &self.columns {
            config.column_names = Some(columns.clone());
        }
        if let Some(points) = self.points {
            config.max_points_per_channel = points;
        }
        if let Some(lines) = self.log_lines {
            config.max_log_lines = lines;
        }
        if let Some(tick) = self.tick_ms {
            config.render_tick_ms = tick;
        }
        if let Some(window) = self.window {
            config.time_window_s = Some(window);
        }
        if self.all_points {
            config.time_window_s = None;
        }
        if self.quiet_numeric {
            config.log_numeric_lines = false;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Sends `tracing` output to `path`. Nothing is installed without a path,
/// since the terminal belongs to the user interface. The returned guard
/// flushes the file when dropped.
pub fn init_logging(path: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let path = match path {
        Some(path) => path,
        None => return Ok(None),
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| anyhow::anyhow!("cannot open log file {}: {}", path.display(), e))?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_thread_names(true)
                .with_writer(writer),
        )
        .try_init()?;
    Ok(Some(guard))
}

static EVENT_POLL: Duration = Duration::from_millis(200);

fn log_event(event: &Event) {
    match event {
        Event::Connected => tracing::info!("device connected"),
        Event::Reconnected => tracing::info!("device reconnected"),
        Event::Disconnected(e) => tracing::warn!("device disconnected: {}", e),
        Event::ReconnectFailed { attempt, error } => {
            tracing::warn!("reconnect attempt {} failed: {}", attempt, error)
        }
        Event::PartialLineDiscarded(n) => {
            tracing::debug!("discarded {} bytes of an incomplete line", n)
        }
        Event::MalformedFields(n) => tracing::debug!("{} malformed fields in one line", n),
        Event::Exiting => tracing::info!("ingestion stopped"),
    }
}

/// Drains the session's status events into `tracing` until the ingestion
/// loop reports that it stopped, or the session shuts down with nothing
/// left to read. Returns the number of events seen.
pub fn forward_events(session: &Session) -> usize {
    let events = session.events();
    let mut seen = 0;
    loop {
        match events.recv_timeout(EVENT_POLL) {
            Ok(event) => {
                seen += 1;
                log_event(&event);
                if event == Event::Exiting {
                    break;
                }
            }
            Err(_) if session.shutdown.is_triggered() => break,
            Err(_) => {}
        }
    }
    seen
}

/// Raw mode and alternate screen for the lifetime of the monitor.
pub struct Tui {
    stdout: io::Stdout,
}

impl Tui {
    pub fn setup() -> io::Result<Self> {
        let mut stdout = io::stdout();
        terminal::enable_raw_mode()?;
        stdout.execute(terminal::EnterAlternateScreen)?;
        stdout.execute(cursor::Hide)?;
        Ok(Self { stdout })
    }

    pub fn teardown(&mut self) {
        let _ = self.stdout.execute(cursor::Show);
        let _ = self.stdout.execute(terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
        let _ = self.stdout.flush();
    }

    /// Restores the terminal from a panic hook, where no `Tui` is at hand.
    pub fn restore() {
        Tui {
            stdout: io::stdout(),
        }
        .teardown();
    }
}
