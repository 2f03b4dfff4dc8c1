//! # Arena Server Library
//!
//! Authoritative server for the LAN arena shooter. The server owns the only
//! real copy of the game: player positions, health, projectiles and hits all
//! live here, advance on a fixed tick, and are broadcast to clients as
//! snapshots. Clients send intent (movement, aim, fire) and render whatever
//! the latest snapshot says — projectiles and health are simulated on the
//! server for fairness, so a modified client cannot move faster, dodge
//! damage or shoot around corners.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! The roster of connected clients: join/leave/timeout lifecycle, player
//! slot assignment, capacity enforcement and per-session input buffering.
//!
//! ### Game Module (`game`)
//! The deterministic world simulation: fixed-tick stepping, movement with
//! world-bounds clamping, projectile flight with segment-based hit tests,
//! damage, deaths and respawn scheduling. Produces one snapshot per tick.
//!
//! ### Discovery Module (`discovery`)
//! Answers LAN broadcast probes with the server's identity so clients can
//! find games without typing addresses.
//!
//! ### Network Module (`network`)
//! UDP socket management, packet routing, and the main loop that drives the
//! tick: drain inputs, step the world, broadcast the snapshot, sweep
//! timeouts.
//!
//! ## Architecture
//!
//! One loop task drives everything that mutates state. A receiver task
//! decodes datagrams into a channel, a sender task drains the outbound
//! queue, and the discovery responder runs independently on its own socket;
//! none of them touch the world. Inputs received between ticks are buffered
//! per session and applied in one batch at the start of the next tick, so
//! the simulation is never mutated mid-step.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "0.0.0.0:50000",
//!         Some("0.0.0.0:50001"),
//!         ServerOptions::default(),
//!     )
//!     .await?;
//!
//!     // Runs until a Shutdown message arrives (see `shutdown_handle`).
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod discovery;
pub mod game;
pub mod network;
pub mod session;
