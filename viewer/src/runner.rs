//! Drives a session at a fixed cadence, either headless on a tokio interval
//! or inside a macroquad window.

use crate::config::ViewerConfig;
use crate::network::{Connector, TcpConnector};
use crate::rendering::{ConsoleRenderer, RenderAdapter, TableRenderer};
use crate::sequencer::PresentationSequencer;
use crate::session::{Session, ViewerState};
use log::{info, warn};
use macroquad::prelude::{is_key_pressed, next_frame, get_frame_time, Conf, KeyCode};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// Longest stretch of wall time the windowed loop catches up on in one frame.
const MAX_FRAME_CATCH_UP: f64 = 0.25;

pub fn session_for(config: &ViewerConfig) -> Session<TcpConnector> {
    Session::new(
        TcpConnector::new(config.address, config.connect_timeout),
        config.name.clone(),
        config.secret,
        PresentationSequencer::new(config.stale_triggers),
    )
}

/// Ticks `session` until it finishes or `shutdown` resolves, and reports the
/// state it ended in. Triggers scheduled before the session closed are still
/// played out before returning. The socket is released as soon as the session
/// closes.
pub async fn run_until<C, R, F>(
    mut session: Session<C>,
    render: &mut R,
    tick_interval: Duration,
    shutdown: F,
) -> ViewerState
where
    C: Connector,
    R: RenderAdapter + ?Sized,
    F: Future<Output = ()>,
{
    let started = Instant::now();
    let mut ticker = interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down viewer");
                break;
            }
            _ = ticker.tick() => {
                let now = started.elapsed().as_secs_f64();
                if session.tick(now, render).is_done() && session.sequencer().is_empty() {
                    break;
                }
            }
        }
    }

    session.state()
}

/// Headless viewer: logs the match until the server goes away or Ctrl-C.
pub async fn run_headless(config: &ViewerConfig) -> ViewerState {
    let session = session_for(config);
    let mut console = ConsoleRenderer::new();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let state = run_until(session, &mut console, config.tick_interval, shutdown).await;
    info!(
        "Viewer stopped after {} snapshots, {} shots",
        console.snapshots(),
        console.shots_played()
    );
    state
}

pub fn window_conf(config: &ViewerConfig) -> Conf {
    Conf {
        window_title: format!("Pool viewer - {}", config.name),
        window_width: config.width,
        window_height: config.height,
        ..Default::default()
    }
}

/// Windowed viewer loop. Session ticks run on a fixed step fed by frame
/// time. After the session closes, triggers already scheduled keep firing
/// and the last frame stays on screen until Escape or the window is closed.
pub async fn run_windowed<C: Connector>(mut session: Session<C>, tick_interval: Duration) {
    let mut table = TableRenderer::new();
    let step = tick_interval.as_secs_f64();
    let mut clock = 0.0;
    let mut accumulator = 0.0;
    let mut finished = false;

    loop {
        if is_key_pressed(KeyCode::Escape) {
            info!("Escape pressed, closing viewer");
            break;
        }

        let dt = get_frame_time();
        accumulator = (accumulator + dt as f64).min(MAX_FRAME_CATCH_UP);
        while accumulator >= step {
            accumulator -= step;
            clock += step;
            if finished {
                session.drain_due(clock, &mut table);
            } else if session.tick(clock, &mut table).is_done() {
                info!("Session closed; showing the last frame");
                finished = true;
            }
        }

        table.update(dt);
        table.draw();
        next_frame().await;
    }
}
