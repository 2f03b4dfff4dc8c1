//! Session tracking and input queueing for the arena server.
//!
//! The session manager owns the roster of connected clients: who holds which
//! player slot, when each client was last heard from, and the inputs they
//! have sent but the simulation has not yet consumed. It enforces the
//! capacity limit and prunes clients that stop talking, which is the only
//! way a UDP peer ever "disconnects" without an explicit leave.

use log::info;
use shared::{InputCommand, RejectReason};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

pub type SessionId = u64;

/// Connection lifecycle of a client.
///
/// A session starts `Joining` when the join request is accepted and becomes
/// `Active` on the first input or heartbeat. Only Active sessions receive
/// snapshot broadcasts. `Disconnected` is set just before the session is
/// dropped from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Joining,
    Active,
    Disconnected,
}

/// A connected client and their buffered, not-yet-simulated inputs.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    /// Network address for response routing; also identifies the session on
    /// inbound traffic.
    pub addr: SocketAddr,
    /// Player slot owned by this session for its whole lifetime.
    pub slot: u8,
    pub state: SessionState,
    /// Last time any packet arrived from this client.
    pub last_seen: Instant,
    pending_inputs: Vec<InputCommand>,
}

impl Session {
    fn new(id: SessionId, name: String, addr: SocketAddr, slot: u8) -> Self {
        Self {
            id,
            name,
            addr,
            slot,
            state: SessionState::Joining,
            last_seen: Instant::now(),
            pending_inputs: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Buffers an input and refreshes the activity timestamp. Inputs are held
    /// sorted by sequence so the simulation sees them in send order even when
    /// datagrams arrive reordered.
    pub fn add_input(&mut self, input: InputCommand) {
        self.touch();
        self.pending_inputs.push(input);
        self.pending_inputs.sort_by_key(|i| i.sequence);
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Takes all buffered inputs, leaving the buffer empty.
    pub fn drain_inputs(&mut self) -> Vec<InputCommand> {
        std::mem::take(&mut self.pending_inputs)
    }
}

/// Outcome of a join request. Rejections leave the session table untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Accepted {
        slot: u8,
        /// True when the request came from an address that already holds a
        /// session; the reply is idempotent and no new slot is assigned.
        rejoined: bool,
    },
    Rejected(RejectReason),
}

/// Roster of connected clients, capacity enforcement and slot assignment.
pub struct SessionManager {
    sessions: HashMap<SessionId, Session>,
    next_session_id: SessionId,
    max_players: u8,
}

impl SessionManager {
    pub fn new(max_players: u8) -> Self {
        Self {
            sessions: HashMap::new(),
            next_session_id: 1,
            max_players,
        }
    }

    pub fn max_players(&self) -> u8 {
        self.max_players
    }

    /// Handles a join request from `addr`.
    ///
    /// A repeated join from a known address is a keepalive, not a new
    /// session: the existing slot is re-announced and nothing else changes.
    /// Otherwise the lowest free slot is assigned, unless the server is full
    /// or the name is already claimed by a live session.
    pub fn join(&mut self, name: &str, addr: SocketAddr) -> JoinOutcome {
        if let Some(session) = self.sessions.values_mut().find(|s| s.addr == addr) {
            session.touch();
            return JoinOutcome::Accepted {
                slot: session.slot,
                rejoined: true,
            };
        }

        if self.sessions.values().any(|s| s.name == name) {
            return JoinOutcome::Rejected(RejectReason::NameTaken);
        }

        if self.sessions.len() >= self.max_players as usize {
            return JoinOutcome::Rejected(RejectReason::ServerFull);
        }

        let Some(slot) = self.lowest_free_slot() else {
            return JoinOutcome::Rejected(RejectReason::ServerFull);
        };

        let id = self.next_session_id;
        self.next_session_id += 1;

        info!("Session {} ('{}') joined from {}, slot {}", id, name, addr, slot);
        self.sessions
            .insert(id, Session::new(id, name.to_string(), addr, slot));

        JoinOutcome::Accepted {
            slot,
            rejoined: false,
        }
    }

    fn lowest_free_slot(&self) -> Option<u8> {
        (0..self.max_players).find(|slot| !self.sessions.values().any(|s| s.slot == *slot))
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<SessionId> {
        self.sessions
            .values()
            .find(|s| s.addr == addr)
            .map(|s| s.id)
    }

    /// Refreshes the activity timestamp for whatever session owns `addr`.
    pub fn touch(&mut self, addr: SocketAddr) -> bool {
        if let Some(session) = self.sessions.values_mut().find(|s| s.addr == addr) {
            session.touch();
            true
        } else {
            false
        }
    }

    /// Touch plus the Joining -> Active transition. Called for the first
    /// input or heartbeat, which is the client's acknowledgement that it saw
    /// the join reply.
    pub fn mark_active(&mut self, addr: SocketAddr) -> bool {
        if let Some(session) = self.sessions.values_mut().find(|s| s.addr == addr) {
            session.touch();
            if session.state == SessionState::Joining {
                session.state = SessionState::Active;
                info!("Session {} ('{}') is now active", session.id, session.name);
            }
            true
        } else {
            false
        }
    }

    /// Buffers an input for the session at `addr`; also activates it.
    pub fn buffer_input(&mut self, addr: SocketAddr, input: InputCommand) -> bool {
        if !self.mark_active(addr) {
            return false;
        }
        if let Some(session) = self.sessions.values_mut().find(|s| s.addr == addr) {
            session.add_input(input);
            true
        } else {
            false
        }
    }

    /// Explicit leave. Returns the removed session so the caller can despawn
    /// its player.
    pub fn leave_by_addr(&mut self, addr: SocketAddr) -> Option<Session> {
        let id = self.find_by_addr(addr)?;
        self.remove(id)
    }

    fn remove(&mut self, id: SessionId) -> Option<Session> {
        let mut session = self.sessions.remove(&id)?;
        session.state = SessionState::Disconnected;
        info!(
            "Session {} ('{}', slot {}) disconnected",
            session.id, session.name, session.slot
        );
        Some(session)
    }

    /// Force-disconnects every session that has been silent for longer than
    /// `timeout`, identically to an explicit leave. Called once per tick.
    pub fn sweep_timeouts(&mut self, timeout: Duration) -> Vec<Session> {
        let timed_out: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.is_timed_out(timeout))
            .map(|s| s.id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|id| self.remove(id))
            .collect()
    }

    /// All buffered inputs, grouped per session in slot-ascending order and
    /// sequence-ascending within a session. Buffers are left empty; the
    /// simulation's sequence tracking makes redelivered inputs harmless.
    pub fn drain_inputs(&mut self) -> Vec<(u8, InputCommand)> {
        let mut sessions: Vec<&mut Session> = self.sessions.values_mut().collect();
        sessions.sort_by_key(|s| s.slot);

        let mut all_inputs = Vec::new();
        for session in sessions {
            let slot = session.slot;
            for input in session.drain_inputs() {
                all_inputs.push((slot, input));
            }
        }
        all_inputs
    }

    /// Addresses of sessions that should receive snapshot broadcasts.
    pub fn active_addrs(&self) -> Vec<SocketAddr> {
        self.sessions
            .values()
            .filter(|s| s.state == SessionState::Active)
            .map(|s| s.addr)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Current player count as reported in discovery answers.
    pub fn player_count(&self) -> u8 {
        self.sessions.len() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Vec3;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn input(sequence: u32) -> InputCommand {
        InputCommand {
            sequence,
            timestamp: sequence as u64 * 10,
            movement: Vec3::new(0.0, 0.0, 1.0),
            look_delta: (0.0, 0.0),
            fire: false,
        }
    }

    #[test]
    fn test_join_assigns_lowest_free_slot() {
        let mut manager = SessionManager::new(4);

        assert_eq!(
            manager.join("a", addr(1000)),
            JoinOutcome::Accepted {
                slot: 0,
                rejoined: false
            }
        );
        assert_eq!(
            manager.join("b", addr(1001)),
            JoinOutcome::Accepted {
                slot: 1,
                rejoined: false
            }
        );

        // Slot 0 frees up and is handed to the next joiner.
        manager.leave_by_addr(addr(1000)).unwrap();
        assert_eq!(
            manager.join("c", addr(1002)),
            JoinOutcome::Accepted {
                slot: 0,
                rejoined: false
            }
        );
    }

    #[test]
    fn test_join_rejected_at_capacity() {
        let mut manager = SessionManager::new(2);
        manager.join("a", addr(1000));
        manager.join("b", addr(1001));

        assert_eq!(
            manager.join("c", addr(1002)),
            JoinOutcome::Rejected(RejectReason::ServerFull)
        );
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_join_rejected_on_name_collision() {
        let mut manager = SessionManager::new(4);
        manager.join("a", addr(1000));

        assert_eq!(
            manager.join("a", addr(1001)),
            JoinOutcome::Rejected(RejectReason::NameTaken)
        );
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_duplicate_join_is_idempotent() {
        let mut manager = SessionManager::new(4);
        manager.join("a", addr(1000));

        // Same address again: same slot, no new session, even under a
        // different name.
        assert_eq!(
            manager.join("a2", addr(1000)),
            JoinOutcome::Accepted {
                slot: 0,
                rejoined: true
            }
        );
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_first_input_activates_session() {
        let mut manager = SessionManager::new(4);
        manager.join("a", addr(1000));
        assert!(manager.active_addrs().is_empty());

        assert!(manager.buffer_input(addr(1000), input(1)));
        assert_eq!(manager.active_addrs(), vec![addr(1000)]);
    }

    #[test]
    fn test_input_from_unknown_addr_is_dropped() {
        let mut manager = SessionManager::new(4);
        assert!(!manager.buffer_input(addr(1000), input(1)));
        assert!(!manager.touch(addr(1000)));
    }

    #[test]
    fn test_drain_orders_by_slot_then_sequence() {
        let mut manager = SessionManager::new(4);
        manager.join("a", addr(1000));
        manager.join("b", addr(1001));

        // Out-of-order arrival for slot 1, interleaved with slot 0.
        manager.buffer_input(addr(1001), input(2));
        manager.buffer_input(addr(1000), input(1));
        manager.buffer_input(addr(1001), input(1));

        let drained = manager.drain_inputs();
        let order: Vec<(u8, u32)> = drained.iter().map(|(s, i)| (*s, i.sequence)).collect();
        assert_eq!(order, vec![(0, 1), (1, 1), (1, 2)]);

        // Buffers are empty afterwards.
        assert!(manager.drain_inputs().is_empty());
    }

    #[test]
    fn test_sweep_removes_silent_sessions() {
        let mut manager = SessionManager::new(4);
        manager.join("a", addr(1000));
        manager.join("b", addr(1001));
        manager.mark_active(addr(1000));
        manager.mark_active(addr(1001));

        // Backdate one session past the timeout.
        let id = manager.find_by_addr(addr(1000)).unwrap();
        manager.sessions.get_mut(&id).unwrap().last_seen =
            Instant::now() - Duration::from_secs(10);

        let removed = manager.sweep_timeouts(Duration::from_secs(5));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].slot, 0);
        assert_eq!(removed[0].state, SessionState::Disconnected);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_sweep_keeps_recent_sessions() {
        let mut manager = SessionManager::new(4);
        manager.join("a", addr(1000));

        assert!(manager.sweep_timeouts(Duration::from_secs(5)).is_empty());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_player_count_tracks_joins_and_leaves() {
        let mut manager = SessionManager::new(8);
        assert_eq!(manager.player_count(), 0);
        manager.join("a", addr(1000));
        manager.join("b", addr(1001));
        assert_eq!(manager.player_count(), 2);
        manager.leave_by_addr(addr(1000));
        assert_eq!(manager.player_count(), 1);
    }
}
