//! Types shared between the arena server and its clients: the wire protocol,
//! the vector math used by the hit tests, and the tuning constants that both
//! sides must agree on.

use std::time::Duration;

pub mod math;
pub mod protocol;

pub use math::{segment_hits_sphere, Vec3};
pub use protocol::{
    decode, encode, sanitize_name, DecodeError, Event, InputCommand, Packet, PlayerState,
    ProjectileView, RejectReason, ServerInfo, Snapshot,
};

/// Wire protocol version. Clients ignore discovery answers and servers reject
/// joins when this does not match.
pub const PROTOCOL_VERSION: u32 = 1;

pub const DEFAULT_GAME_PORT: u16 = 50000;
pub const DEFAULT_DISCOVERY_PORT: u16 = 50001;
pub const DEFAULT_TICK_RATE: u32 = 30;
pub const DEFAULT_MAX_PLAYERS: u8 = 8;

/// Server display names are truncated to this many bytes before they hit the
/// wire.
pub const MAX_NAME_BYTES: usize = 64;

/// A session that has been silent for longer than this is force-disconnected.
/// Long enough to ride out brief packet loss over UDP.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(5);

pub const PLAYER_RADIUS: f32 = 0.8;
pub const MOVE_SPEED: f32 = 7.0;
pub const PROJECTILE_SPEED: f32 = 18.0;
pub const PROJECTILE_DAMAGE: u8 = 25;
pub const PROJECTILE_TTL_TICKS: u64 = 90;
pub const RESPAWN_DELAY_TICKS: u64 = 90;

/// Distance from a player's center at which their projectiles spawn.
pub const MUZZLE_OFFSET: f32 = 0.5;

/// Spawn points sit on a ring of this radius around the world origin.
pub const SPAWN_RING_RADIUS: f32 = 12.0;
pub const SPAWN_HEIGHT: f32 = 3.0;

/// Playable volume: |x| and |z| up to the half extent, y in [0, ceiling].
pub const WORLD_HALF_EXTENT: f32 = 20.0;
pub const WORLD_CEILING: f32 = 10.0;

/// Pitch is clamped short of straight up/down to keep the aim vector sane.
pub const PITCH_LIMIT: f32 = 1.5;

/// Tuning values for the authoritative simulation.
///
/// The defaults match the constants above; tests construct custom configs to
/// exercise edge cases (short projectile lifetimes, instant respawns) without
/// touching the shipped values.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Simulation steps per second. The tick duration is fixed and logical:
    /// the engine never looks at the wall clock.
    pub tick_rate: u32,
    pub move_speed: f32,
    pub player_radius: f32,
    pub projectile_speed: f32,
    pub projectile_damage: u8,
    pub projectile_ttl_ticks: u64,
    pub respawn_delay_ticks: u64,
    pub world_half_extent: f32,
    pub world_ceiling: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            move_speed: MOVE_SPEED,
            player_radius: PLAYER_RADIUS,
            projectile_speed: PROJECTILE_SPEED,
            projectile_damage: PROJECTILE_DAMAGE,
            projectile_ttl_ticks: PROJECTILE_TTL_TICKS,
            respawn_delay_ticks: RESPAWN_DELAY_TICKS,
            world_half_extent: WORLD_HALF_EXTENT,
            world_ceiling: WORLD_CEILING,
        }
    }
}

impl SimConfig {
    /// Fixed logical duration of one tick in seconds.
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// Deterministic spawn point for a slot: evenly spaced on a ring around
    /// the origin so respawning players do not stack.
    pub fn spawn_point(&self, slot: u8) -> Vec3 {
        let angle = slot as f32 * (std::f32::consts::TAU / DEFAULT_MAX_PLAYERS as f32);
        Vec3::new(
            angle.sin() * SPAWN_RING_RADIUS,
            SPAWN_HEIGHT,
            angle.cos() * SPAWN_RING_RADIUS,
        )
    }

    /// Clamps a position to the playable volume.
    pub fn clamp_to_world(&self, position: Vec3) -> Vec3 {
        Vec3::new(
            position.x.clamp(-self.world_half_extent, self.world_half_extent),
            position.y.clamp(0.0, self.world_ceiling),
            position.z.clamp(-self.world_half_extent, self.world_half_extent),
        )
    }

    /// True once a position has left the playable volume entirely, with a
    /// one-radius margin so grazing shots at the boundary still resolve.
    pub fn outside_world(&self, position: Vec3) -> bool {
        let margin = self.player_radius;
        position.x.abs() > self.world_half_extent + margin
            || position.z.abs() > self.world_half_extent + margin
            || position.y < -margin
            || position.y > self.world_ceiling + margin
    }
}
