//! # Pool Match Replay Server
//!
//! A stand-in for the pool match server that speaks the same wire protocol
//! to viewers. Instead of simulating billiards it replays a script of
//! Broadcast messages, either loaded from a file or generated from a seed.
//!
//! ## Core Responsibilities
//!
//! ### Login Handshake
//! Each connection must open with a Login. Viewers register a name and get a
//! secret back, or present a secret from an earlier session to reclaim their
//! name. Players, unknown secrets, taken names and logins past capacity are
//! answered with a LoginFailed carrying the reason, and the connection is
//! closed.
//!
//! ### Replay
//! Nothing is sent until the first viewer has logged in. From then on one
//! scripted shot is published per interval to every logged-in viewer. When
//! the script runs out the server hangs up on everyone, unless it was asked
//! to loop.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! Names, secrets and capacity.
//!
//! ### Script Module (`script`)
//! JSON-lines loading and the seeded demo match.
//!
//! ### Network Module (`network`)
//! - TCP accept loop with one task per connection
//! - Frame reading and writing on any async stream
//! - Fan-out of encoded frames over a broadcast channel
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{ReplayOptions, ReplayServer};
//! use server::script::BroadcastScript;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = ReplayServer::bind(
//!         "127.0.0.1:4000".parse()?,
//!         BroadcastScript::demo(1),
//!         ReplayOptions::default(),
//!     )
//!     .await?;
//!
//!     // Waits for a viewer, plays the match, then closes every connection
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod registry;
pub mod script;
