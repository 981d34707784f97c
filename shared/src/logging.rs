//! Logger setup shared by the viewer and server binaries.

use clap::ValueEnum;
use env_logger::{Builder, Env};
use log::{LevelFilter, SetLoggerError};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    #[value(name = "DEBUG")]
    Debug,
    #[default]
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARNING")]
    Warning,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warning => LevelFilter::Warn,
        }
    }
}

/// Installs the global logger. `RUST_LOG` wins over `level` when set.
///
/// Lines look like `[2024-05-01 18:30:00] INFO: Connected!`.
pub fn init(level: LogLevel) -> Result<(), SetLoggerError> {
    Builder::new()
        .filter_level(level.into())
        .parse_env(Env::default())
        .format(|buf, record| {
            let stamp = buf.timestamp_seconds().to_string();
            writeln!(
                buf,
                "[{}] {}: {}",
                wall_clock(&stamp),
                record.level(),
                record.args()
            )
        })
        .try_init()
}

/// Turns an RFC 3339 UTC stamp into `YYYY-MM-DD HH:MM:SS`.
fn wall_clock(rfc3339: &str) -> String {
    rfc3339.trim_end_matches('Z').replacen('T', " ", 1)
}
