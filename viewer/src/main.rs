use clap::Parser;
use log::info;
use macroquad::Window;
use viewer::config::{Args, ViewerConfig};
use viewer::runner;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    shared::logging::init(args.log_level)?;

    let config = ViewerConfig::try_from(&args)?;
    info!("Starting viewer {} for {}", config.name, config.address);

    if config.headless {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let state = runtime.block_on(runner::run_headless(&config));
        info!("Viewer finished in state {:?}", state);
        return Ok(());
    }

    let session = runner::session_for(&config);
    let tick_interval = config.tick_interval;
    Window::from_config(
        runner::window_conf(&config),
        runner::run_windowed(session, tick_interval),
    );

    Ok(())
}
