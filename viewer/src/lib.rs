//! # Pool Match Viewer
//!
//! A thin client that logs in to a pool match server as a spectator and
//! follows the match. The server does all the physics; the viewer receives
//! one snapshot per shot and presents it, with the score, the game-over banner
//! and the shot animation revealed at the right moments.
//!
//! ## Architecture Overview
//!
//! Everything runs on one thread. A runner calls [`session::Session::tick`]
//! at a fixed cadence; each tick advances the connection by at most one step
//! and then fires whatever presentation effects have come due. No call ever
//! blocks on the network for longer than the connect timeout.
//!
//! ### Connection Lifecycle
//! The session starts out waiting for a connection and retries every tick
//! until the server accepts. It then sends a single viewer login and waits
//! for the verdict. Once accepted it is viewing: each broadcast replaces the
//! displayed snapshot. A disconnect or a rejected login closes the session
//! for good; there is no reconnect.
//!
//! ### Presentation Timing
//! A broadcast carries the state of the table after a shot, stamped with the
//! simulation clock `t`. Scores and the game-over banner are revealed `t`
//! seconds after the broadcast arrives, the shot animation starts 1.5 seconds
//! after that, and the banner comes down 2.5 seconds after it went up.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - Length-prefixed framing over a non-blocking byte stream
//! - Partial reads and writes carried across polls
//! - A single synthetic `ConnectionClosed` when the stream dies
//!
//! ### Session Module (`session`)
//! The connection state machine and snapshot ownership.
//!
//! ### Sequencer Module (`sequencer`)
//! Time-ordered queue of presentation triggers.
//!
//! ### Rendering Module (`rendering`)
//! The render adapter seam, a console adapter for headless use and a
//! macroquad table view.
//!
//! ### Runner Module (`runner`) and Config Module (`config`)
//! Tick loops and command line handling for the binary.
//!
//! ## Usage Example
//!
//! ```no_run
//! use viewer::network::TcpConnector;
//! use viewer::rendering::ConsoleRenderer;
//! use viewer::sequencer::PresentationSequencer;
//! use viewer::session::Session;
//! use std::time::{Duration, Instant};
//!
//! let connector = TcpConnector::new("127.0.0.1:4000".parse().unwrap(), Duration::from_millis(10));
//! let mut session = Session::new(connector, "alice", None, PresentationSequencer::default());
//! let mut console = ConsoleRenderer::new();
//!
//! let started = Instant::now();
//! while !session.tick(started.elapsed().as_secs_f64(), &mut console).is_done() {
//!     std::thread::sleep(Duration::from_millis(10));
//! }
//! ```

pub mod config;
pub mod network;
pub mod rendering;
pub mod runner;
pub mod sequencer;
pub mod session;
