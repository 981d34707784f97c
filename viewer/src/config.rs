//! Command line arguments and the validated viewer configuration.

use crate::sequencer::StaleTriggers;
use clap::Parser;
use shared::logging::LogLevel;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "Watch a pool match as a viewer", long_about = None)]
pub struct Args {
    /// IPv4 address of the match server
    #[arg(short, long)]
    pub address: Ipv4Addr,

    /// Port of the match server
    #[arg(short, long)]
    pub port: u16,

    /// Name to log in with
    #[arg(short, long)]
    pub name: String,

    /// Secret from an earlier login, to reclaim the name
    #[arg(short, long)]
    pub secret: Option<Uuid>,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Milliseconds between session ticks
    #[arg(long, default_value = "10")]
    pub tick_ms: u64,

    /// Upper bound on a single connect attempt in milliseconds
    #[arg(long, default_value = "10")]
    pub connect_timeout_ms: u64,

    /// Drop scheduled effects of a broadcast once a newer one arrives
    #[arg(long)]
    pub cancel_stale_triggers: bool,

    /// Log the match instead of opening a window
    #[arg(long)]
    pub headless: bool,

    /// Window width (no short flag, -h is help)
    #[arg(long, default_value = "1000")]
    pub width: i32,

    #[arg(long, default_value = "600")]
    pub height: i32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("viewer name must not be empty")]
    EmptyName,

    #[error("tick interval must be at least one millisecond")]
    ZeroTickInterval,

    #[error("connect timeout must be at least one millisecond")]
    ZeroConnectTimeout,

    #[error("window size {width}x{height} is not positive")]
    WindowSize { width: i32, height: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub address: SocketAddr,
    pub name: String,
    pub secret: Option<Uuid>,
    pub tick_interval: Duration,
    pub connect_timeout: Duration,
    pub stale_triggers: StaleTriggers,
    pub headless: bool,
    pub width: i32,
    pub height: i32,
}

impl TryFrom<&Args> for ViewerConfig {
    type Error = ConfigError;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let name = args.name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if args.tick_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        if args.connect_timeout_ms == 0 {
            return Err(ConfigError::ZeroConnectTimeout);
        }
        if !args.headless && (args.width <= 0 || args.height <= 0) {
            return Err(ConfigError::WindowSize {
                width: args.width,
                height: args.height,
            });
        }

        let stale_triggers = if args.cancel_stale_triggers {
            StaleTriggers::Cancel
        } else {
            StaleTriggers::Keep
        };

        Ok(Self {
            address: SocketAddr::V4(SocketAddrV4::new(args.address, args.port)),
            name: name.to_string(),
            secret: args.secret,
            tick_interval: Duration::from_millis(args.tick_ms),
            connect_timeout: Duration::from_millis(args.connect_timeout_ms),
            stale_triggers,
            headless: args.headless,
            width: args.width,
            height: args.height,
        })
    }
}
