use clap::Parser;
use log::info;
use server::network::{ReplayOptions, ReplayServer};
use server::script::BroadcastScript;
use shared::logging::{self, LogLevel};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay a pool match to viewers", long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    address: IpAddr,

    /// Port to listen on, 0 picks a free one
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// JSON-lines file with one Broadcast per line; a demo match otherwise
    #[arg(long)]
    script: Option<PathBuf>,

    /// Milliseconds between shots
    #[arg(long, default_value = "3000", value_parser = clap::value_parser!(u64).range(1..))]
    interval_ms: u64,

    #[arg(long, default_value = "8")]
    max_viewers: usize,

    /// Start over when the script ends
    #[arg(long)]
    repeat: bool,

    /// Seed for the demo match
    #[arg(long, default_value = "0")]
    seed: u64,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init(args.log_level)?;

    let script = match &args.script {
        Some(path) => BroadcastScript::load(path)?,
        None => BroadcastScript::demo(args.seed),
    };
    info!("Loaded {} shots", script.len());

    let options = ReplayOptions {
        interval: Duration::from_millis(args.interval_ms),
        repeat: args.repeat,
        max_viewers: args.max_viewers,
    };
    let server = ReplayServer::bind(SocketAddr::new(args.address, args.port), script, options).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
