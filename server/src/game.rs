//! Authoritative world simulation.
//!
//! The world advances in fixed logical ticks. Each step consumes the inputs
//! drained from the session manager, moves players, flies projectiles,
//! resolves hits and produces the snapshot that goes out to every client.
//! Projectiles and health live here and only here; clients render what the
//! snapshot says, which is what keeps a modified client from lying about
//! either.
//!
//! Determinism: players and projectiles are stored in `BTreeMap`s and
//! iterated in slot/id order, the tick duration is a fixed constant and the
//! step never consults the clock or any randomness. Feeding two worlds the
//! same input stream produces byte-identical snapshots.

use log::{debug, info};
use shared::{
    segment_hits_sphere, Event, InputCommand, PlayerState, ProjectileView, SimConfig, Snapshot,
    Vec3, MUZZLE_OFFSET, PITCH_LIMIT,
};
use std::collections::BTreeMap;

/// Server-side player entity, one per occupied slot.
#[derive(Debug, Clone)]
pub struct PlayerEntity {
    pub slot: u8,
    pub name: String,
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub health: u8,
    pub alive: bool,
    /// Highest input sequence applied so far; anything at or below it is
    /// discarded as a duplicate or stale delivery.
    pub last_processed_input: u32,
    /// Tick at which this player comes back to life, set exactly once per
    /// death.
    respawn_at: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: u32,
    pub owner: u8,
    pub position: Vec3,
    pub velocity: Vec3,
    pub spawn_tick: u64,
}

/// The authoritative world state. Owned by the server loop; everything else
/// sees read-only snapshots.
#[derive(Debug, Clone)]
pub struct World {
    config: SimConfig,
    tick: u64,
    players: BTreeMap<u8, PlayerEntity>,
    projectiles: BTreeMap<u32, Projectile>,
    next_projectile_id: u32,
    /// Events accumulated since the last snapshot, in emission order.
    pending_events: Vec<Event>,
}

impl World {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            tick: 0,
            players: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            next_projectile_id: 1,
            pending_events: Vec::new(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Adds a freshly joined player at their slot's spawn point. The spawn
    /// event lands in the next snapshot.
    pub fn add_player(&mut self, slot: u8, name: String) {
        let position = self.config.spawn_point(slot);
        info!("Spawning '{}' in slot {} at {:?}", name, slot, position);
        self.players.insert(
            slot,
            PlayerEntity {
                slot,
                name,
                position,
                yaw: 0.0,
                pitch: 0.0,
                health: 100,
                alive: true,
                last_processed_input: 0,
                respawn_at: None,
            },
        );
        self.pending_events.push(Event::Spawn { slot });
    }

    /// Removes a departed player and their in-flight projectiles. The slot
    /// may be reassigned immediately, so leftover projectiles must not be
    /// able to credit or spare its next owner.
    pub fn remove_player(&mut self, slot: u8) {
        if self.players.remove(&slot).is_some() {
            info!("Despawning slot {}", slot);
            self.projectiles.retain(|_, p| p.owner != slot);
            self.pending_events.push(Event::Despawn { slot });
        }
    }

    /// Advances the world by one fixed tick and returns the snapshot.
    ///
    /// `inputs` must be grouped per session with sequences ascending within
    /// each group, the way [`SessionManager::drain_inputs`] produces them.
    ///
    /// [`SessionManager::drain_inputs`]: crate::session::SessionManager::drain_inputs
    pub fn step(&mut self, inputs: &[(u8, InputCommand)]) -> Snapshot {
        self.tick += 1;

        self.apply_respawns();
        self.apply_inputs(inputs);
        self.advance_projectiles();

        Snapshot {
            tick: self.tick,
            players: self
                .players
                .values()
                .map(|p| PlayerState {
                    slot: p.slot,
                    name: p.name.clone(),
                    position: p.position,
                    yaw: p.yaw,
                    pitch: p.pitch,
                    health: p.health,
                    alive: p.alive,
                    last_processed_input: p.last_processed_input,
                })
                .collect(),
            projectiles: self
                .projectiles
                .values()
                .map(|p| ProjectileView {
                    id: p.id,
                    owner: p.owner,
                    position: p.position,
                })
                .collect(),
            events: std::mem::take(&mut self.pending_events),
        }
    }

    /// Revives players whose respawn deadline has passed: full health, back
    /// at the slot's spawn point.
    fn apply_respawns(&mut self) {
        for player in self.players.values_mut() {
            if let Some(due) = player.respawn_at {
                if self.tick >= due {
                    player.respawn_at = None;
                    player.health = 100;
                    player.alive = true;
                    player.position = self.config.spawn_point(player.slot);
                    self.pending_events.push(Event::Spawn { slot: player.slot });
                }
            }
        }
    }

    fn apply_inputs(&mut self, inputs: &[(u8, InputCommand)]) {
        let dt = self.config.tick_dt();
        let mut fired: Vec<(u8, Vec3, Vec3)> = Vec::new();

        for (slot, command) in inputs {
            let Some(player) = self.players.get_mut(slot) else {
                continue;
            };

            // Stale or duplicate delivery: consumed with zero effect.
            if command.sequence <= player.last_processed_input {
                continue;
            }
            player.last_processed_input = command.sequence;

            // Dead players spend their sequence numbers but move and shoot
            // nothing until they respawn.
            if !player.alive {
                continue;
            }

            player.yaw = wrap_angle(player.yaw + command.look_delta.0);
            player.pitch = (player.pitch + command.look_delta.1).clamp(-PITCH_LIMIT, PITCH_LIMIT);

            let step = command
                .movement
                .clamp_magnitude(1.0)
                .scale(self.config.move_speed * dt);
            player.position = self.config.clamp_to_world(player.position.add(&step));

            if command.fire {
                let forward = Vec3::from_yaw_pitch(player.yaw, player.pitch);
                let origin = player.position.add(&forward.scale(MUZZLE_OFFSET));
                fired.push((*slot, origin, forward.scale(self.config.projectile_speed)));
            }
        }

        for (owner, origin, velocity) in fired {
            let id = self.next_projectile_id;
            self.next_projectile_id += 1;
            debug!("Slot {} fired projectile {}", owner, id);
            self.projectiles.insert(
                id,
                Projectile {
                    id,
                    owner,
                    position: origin,
                    velocity,
                    spawn_tick: self.tick,
                },
            );
        }
    }

    /// Flies every projectile one tick and resolves hits.
    ///
    /// Projectiles are processed in id order, so when two could kill the same
    /// target in the same tick the lowest id lands the blow and the other
    /// keeps flying. The hit test covers the whole travel segment; each
    /// projectile damages at most one target and is destroyed on impact.
    fn advance_projectiles(&mut self) {
        let ids: Vec<u32> = self.projectiles.keys().copied().collect();

        for id in ids {
            let (start, end, owner, spawn_tick) = {
                let p = &self.projectiles[&id];
                (
                    p.position,
                    p.position.add(&p.velocity.scale(self.config.tick_dt())),
                    p.owner,
                    p.spawn_tick,
                )
            };

            // Lifetime is counted in ticks; an expired projectile gets no
            // parting shot.
            if self.tick - spawn_tick > self.config.projectile_ttl_ticks {
                self.projectiles.remove(&id);
                continue;
            }

            // Earliest intersection along the segment wins; equal distances
            // go to the lower slot because iteration is slot-ascending.
            let mut hit: Option<(f32, u8)> = None;
            for (slot, player) in &self.players {
                if *slot == owner || !player.alive {
                    continue;
                }
                if let Some(t) =
                    segment_hits_sphere(start, end, player.position, self.config.player_radius)
                {
                    if hit.map_or(true, |(best, _)| t < best) {
                        hit = Some((t, *slot));
                    }
                }
            }

            if let Some((_, victim_slot)) = hit {
                self.projectiles.remove(&id);
                self.damage_player(owner, victim_slot);
                continue;
            }

            if self.config.outside_world(end) {
                // A miss leaving the world disappears without an event.
                self.projectiles.remove(&id);
                continue;
            }

            if let Some(projectile) = self.projectiles.get_mut(&id) {
                projectile.position = end;
            }
        }
    }

    fn damage_player(&mut self, attacker: u8, victim: u8) {
        let damage = self.config.projectile_damage;
        let Some(player) = self.players.get_mut(&victim) else {
            return;
        };

        player.health = player.health.saturating_sub(damage);
        self.pending_events.push(Event::Hit {
            attacker,
            victim,
            damage,
        });
        debug!(
            "Slot {} hit slot {} for {}, health now {}",
            attacker, victim, damage, player.health
        );

        if player.health == 0 && player.alive {
            player.alive = false;
            player.respawn_at = Some(self.tick + self.config.respawn_delay_ticks);
            self.pending_events.push(Event::Death { victim });
            info!("Slot {} was killed by slot {}", victim, attacker);
        }
    }
}

/// Wraps an angle into [0, 2π).
fn wrap_angle(angle: f32) -> f32 {
    angle.rem_euclid(std::f32::consts::TAU)
}
