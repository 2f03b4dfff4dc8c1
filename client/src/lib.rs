//! # Arena Client Library
//!
//! Thin network facade for the LAN arena shooter. This crate owns none of
//! the game rules: it finds servers, joins one, ships the local player's
//! intent and hands back the authoritative snapshots for a rendering layer
//! to draw. Everything that decides outcomes — movement, projectiles,
//! damage — happens on the server.
//!
//! ### Discovery Module (`discovery`)
//! Broadcasts a probe on the LAN and collects the servers that answer.
//!
//! ### Network Module (`network`)
//! The join handshake and the per-frame plumbing: sequenced input commands
//! out, snapshots in.

pub mod discovery;
pub mod network;
