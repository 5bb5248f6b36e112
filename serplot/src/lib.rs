//! Live plotting monitor for line-oriented serial telemetry.
//!
//! Bytes from a serial port (or a TCP bridge) are cut into lines, decoded
//! into named channels, kept in bounded per-channel history, and shown in a
//! terminal as a scrolling log next to live graphs.

pub mod config;
pub mod data;
pub mod device;
pub mod port;
pub mod session;
pub mod ui;

pub use config::MonitorConfig;
pub use session::Session;
