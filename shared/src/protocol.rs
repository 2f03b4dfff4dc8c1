//! Wire protocol: the packet variants exchanged over UDP and the bincode
//! codec that frames them.
//!
//! Every packet is self-describing through its enum tag, so the transport
//! layer can route by type without knowing message semantics. The codec
//! never panics on foreign bytes: anything that does not parse comes back
//! as [`DecodeError::Malformed`] and the caller drops it.

use crate::math::Vec3;
use crate::MAX_NAME_BYTES;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Messages exchanged between clients and the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    /// Broadcast by clients looking for LAN servers.
    DiscoveryProbe { protocol_version: u32 },
    /// Unicast reply carrying the server's identity. The host is taken from
    /// the datagram's source address; only the game port travels in-band.
    DiscoveryAnswer {
        protocol_version: u32,
        name: String,
        port: u16,
        players: u8,
        max_players: u8,
    },

    JoinRequest {
        protocol_version: u32,
        name: String,
    },
    JoinAccepted {
        slot: u8,
        tick_rate: u32,
    },
    JoinRejected {
        reason: RejectReason,
    },

    Input(InputCommand),
    Heartbeat {
        timestamp: u64,
    },
    Leave,

    Snapshot(Snapshot),
}

/// Why a join request was refused. The session table is unchanged in every
/// case.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ServerFull,
    NameTaken,
    VersionMismatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ServerFull => write!(f, "server full"),
            RejectReason::NameTaken => write!(f, "name already in use"),
            RejectReason::VersionMismatch => write!(f, "protocol version mismatch"),
        }
    }
}

/// One frame of player intent.
///
/// Sequence numbers increase monotonically per session; the server discards
/// anything at or below the last processed sequence, which makes redelivered
/// or reordered datagrams harmless.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InputCommand {
    pub sequence: u32,
    /// Client wall clock in milliseconds, for latency display only.
    pub timestamp: u64,
    /// Desired movement direction, world space. Clamped to unit length
    /// server-side.
    pub movement: Vec3,
    /// Yaw/pitch deltas in radians.
    pub look_delta: (f32, f32),
    pub fire: bool,
}

/// Authoritative per-player state as broadcast in snapshots.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerState {
    pub slot: u8,
    pub name: String,
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub health: u8,
    pub alive: bool,
    /// Highest input sequence the server has applied for this player.
    pub last_processed_input: u32,
}

/// What a client needs to render a projectile.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProjectileView {
    pub id: u32,
    pub owner: u8,
    pub position: Vec3,
}

/// Discrete things that happened during a tick.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Event {
    Spawn { slot: u8 },
    Hit { attacker: u8, victim: u8, damage: u8 },
    Death { victim: u8 },
    Despawn { slot: u8 },
}

/// The complete world state after one tick. Recomputed every tick and never
/// persisted; players are ordered by slot and projectiles by id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Snapshot {
    pub tick: u64,
    pub players: Vec<PlayerState>,
    pub projectiles: Vec<ProjectileView>,
    pub events: Vec<Event>,
}

/// A server found during a discovery scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub addr: std::net::SocketAddr,
    pub players: u8,
    pub max_players: u8,
}

/// Decode failure. Carries no detail on purpose: the only correct reaction
/// to foreign bytes on a LAN port is to drop them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    Malformed,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Malformed => write!(f, "malformed packet"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Serializes a packet for the wire.
pub fn encode(packet: &Packet) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(packet)
}

/// Parses a datagram into a packet. Truncated, corrupted or empty payloads
/// yield `Malformed`; this function never panics on untrusted input.
pub fn decode(data: &[u8]) -> Result<Packet, DecodeError> {
    bincode::deserialize(data).map_err(|_| DecodeError::Malformed)
}

/// Trims a display name and truncates it to [`MAX_NAME_BYTES`] on a char
/// boundary. Empty names become "Player".
pub fn sanitize_name(name: &str) -> String {
    let mut name = name.trim().to_string();
    if name.is_empty() {
        return "Player".to_string();
    }
    while name.len() > MAX_NAME_BYTES {
        name.pop();
    }
    name
}
