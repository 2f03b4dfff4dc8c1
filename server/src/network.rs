//! Server network layer handling UDP communications and game loop coordination

use crate::discovery::DiscoveryResponder;
use crate::game::World;
use crate::session::{JoinOutcome, SessionManager};
use log::{debug, error, info, warn};
use shared::{
    decode, encode, sanitize_name, Packet, RejectReason, SimConfig, DEFAULT_MAX_PLAYERS,
    PROTOCOL_VERSION, SESSION_TIMEOUT,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    Shutdown,
}

/// Messages sent from the game loop to the sender task
#[derive(Debug)]
pub enum OutboundMessage {
    Send {
        packet: Packet,
        addr: SocketAddr,
    },
    /// One packet, encoded once, sent to every listed address.
    Broadcast {
        packet: Packet,
        addrs: Vec<SocketAddr>,
    },
}

/// Server tuning knobs beyond the socket addresses.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Name advertised in discovery answers.
    pub name: String,
    pub max_players: u8,
    /// Silence longer than this prunes a session.
    pub session_timeout: Duration,
    pub sim: SimConfig,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            name: "Rust Arena".to_string(),
            max_players: DEFAULT_MAX_PLAYERS,
            session_timeout: SESSION_TIMEOUT,
            sim: SimConfig::default(),
        }
    }
}

/// Main server coordinating networking and the authoritative simulation.
pub struct Server {
    socket: Arc<UdpSocket>,
    sessions: Arc<RwLock<SessionManager>>,
    world: World,
    options: ServerOptions,
    discovery: Option<DiscoveryResponder>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Server {
    /// Binds the game socket and, when `discovery_addr` is given, the
    /// discovery socket. Bind failure is fatal and surfaces here, before any
    /// task is spawned.
    pub async fn new(
        game_addr: &str,
        discovery_addr: Option<&str>,
        options: ServerOptions,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        // The advertised name crosses the wire in discovery answers, so it
        // gets the same trim-and-truncate as player names.
        let options = ServerOptions {
            name: sanitize_name(&options.name),
            ..options
        };

        let socket = Arc::new(UdpSocket::bind(game_addr).await?);
        let local_addr = socket.local_addr()?;
        info!("Server '{}' listening on {}", options.name, local_addr);

        let sessions = Arc::new(RwLock::new(SessionManager::new(options.max_players)));

        let discovery = match discovery_addr {
            Some(addr) => Some(
                DiscoveryResponder::bind(
                    addr,
                    options.name.clone(),
                    local_addr.port(),
                    Arc::clone(&sessions),
                )
                .await?,
            ),
            None => None,
        };

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            sessions,
            world: World::new(options.sim.clone()),
            options,
            discovery,
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx,
        })
    }

    pub fn game_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn discovery_addr(&self) -> Option<SocketAddr> {
        self.discovery.as_ref().and_then(|d| d.local_addr().ok())
    }

    /// Handle for requesting a clean shutdown from outside the loop.
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns the task that continuously listens for incoming datagrams.
    /// Malformed payloads are dropped here; only parsed packets reach the
    /// loop.
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode(&buffer[..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                // Loop is gone; nothing left to deliver to.
                                break;
                            }
                        }
                        Err(_) => {
                            warn!("Dropping malformed packet from {}", addr);
                        }
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that drains the outbound queue. Sends are best-effort:
    /// UDP gives no delivery guarantee, so failures are logged and forgotten.
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut outbound_rx =
            std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    OutboundMessage::Send { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutboundMessage::Broadcast { packet, addrs } => {
                        let data = match encode(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to encode broadcast packet: {}", e);
                                continue;
                            }
                        };
                        for addr in addrs {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = encode(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if self
            .outbound_tx
            .send(OutboundMessage::Send { packet, addr })
            .is_err()
        {
            error!("Failed to queue packet for sending");
        }
    }

    /// Routes one inbound packet. Every error here is isolated to the packet
    /// that caused it; the loop itself never stops over bad input.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::JoinRequest {
                protocol_version,
                name,
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    info!(
                        "Rejecting join from {}: protocol version {} (ours is {})",
                        addr, protocol_version, PROTOCOL_VERSION
                    );
                    self.send_packet(
                        Packet::JoinRejected {
                            reason: RejectReason::VersionMismatch,
                        },
                        addr,
                    );
                    return;
                }

                let name = sanitize_name(&name);
                let outcome = {
                    let mut sessions = self.sessions.write().await;
                    sessions.join(&name, addr)
                };

                match outcome {
                    JoinOutcome::Accepted { slot, rejoined } => {
                        if !rejoined {
                            self.world.add_player(slot, name);
                        }
                        self.send_packet(
                            Packet::JoinAccepted {
                                slot,
                                tick_rate: self.options.sim.tick_rate,
                            },
                            addr,
                        );
                    }
                    JoinOutcome::Rejected(reason) => {
                        info!("Rejecting join '{}' from {}: {}", name, addr, reason);
                        self.send_packet(Packet::JoinRejected { reason }, addr);
                    }
                }
            }

            Packet::Input(command) => {
                let mut sessions = self.sessions.write().await;
                if !sessions.buffer_input(addr, command) {
                    debug!("Input from unknown address {}", addr);
                }
            }

            Packet::Heartbeat { .. } => {
                let mut sessions = self.sessions.write().await;
                if !sessions.mark_active(addr) {
                    debug!("Heartbeat from unknown address {}", addr);
                }
            }

            Packet::Leave => {
                let left = {
                    let mut sessions = self.sessions.write().await;
                    sessions.leave_by_addr(addr)
                };
                if let Some(session) = left {
                    self.world.remove_player(session.slot);
                }
            }

            // Probes normally arrive on the discovery port, but answering
            // them here too costs nothing and helps clients that were handed
            // the game address directly.
            Packet::DiscoveryProbe { .. } => {
                let (players, max_players) = {
                    let sessions = self.sessions.read().await;
                    (sessions.player_count(), sessions.max_players())
                };
                let port = match self.game_addr() {
                    Ok(local) => local.port(),
                    Err(_) => return,
                };
                self.send_packet(
                    Packet::DiscoveryAnswer {
                        protocol_version: PROTOCOL_VERSION,
                        name: self.options.name.clone(),
                        port,
                        players,
                        max_players,
                    },
                    addr,
                );
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// One simulation tick: consume buffered inputs, step the world once,
    /// broadcast the snapshot, then sweep timeouts so despawns land in the
    /// next snapshot.
    async fn run_tick(&mut self) {
        let inputs = {
            let mut sessions = self.sessions.write().await;
            sessions.drain_inputs()
        };

        let snapshot = self.world.step(&inputs);

        let addrs = {
            let sessions = self.sessions.read().await;
            sessions.active_addrs()
        };
        if !addrs.is_empty()
            && self
                .outbound_tx
                .send(OutboundMessage::Broadcast {
                    packet: Packet::Snapshot(snapshot),
                    addrs,
                })
                .is_err()
        {
            error!("Failed to queue snapshot broadcast");
        }

        let timed_out = {
            let mut sessions = self.sessions.write().await;
            sessions.sweep_timeouts(self.options.session_timeout)
        };
        for session in timed_out {
            info!(
                "Session {} ('{}') timed out",
                session.id, session.name
            );
            self.world.remove_player(session.slot);
        }

        // Periodic health log, roughly every five seconds at the default
        // rate.
        if self.world.tick() % 150 == 0 {
            let player_count = {
                let sessions = self.sessions.read().await;
                sessions.len()
            };
            if player_count > 0 {
                debug!("Tick {}: {} players", self.world.tick(), player_count);
            }
        }
    }

    /// Main server loop coordinating all operations.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();

        let discovery_task = self.discovery.take().map(|responder| {
            tokio::spawn(async move {
                responder.run().await;
            })
        });

        let tick_duration = Duration::from_secs_f64(1.0 / self.options.sim.tick_rate as f64);
        let mut tick_interval = interval(tick_duration);
        // An overrunning tick is followed immediately instead of drifting;
        // degraded pacing, never a crash.
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

        info!(
            "Server started: {} ticks/s, up to {} players",
            self.options.sim.tick_rate, self.options.max_players
        );

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.run_tick().await;
                },
            }
        }

        if let Some(task) = discovery_task {
            task.abort();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_server_message_carries_packet_and_addr() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 50000);
        let msg = ServerMessage::PacketReceived {
            packet: Packet::Leave,
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet, addr: a } => {
                assert_eq!(a, addr);
                assert_eq!(packet, Packet::Leave);
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_broadcast_message_addresses() {
        let addrs: Vec<SocketAddr> = vec![
            "127.0.0.1:50010".parse().unwrap(),
            "127.0.0.1:50011".parse().unwrap(),
        ];
        let msg = OutboundMessage::Broadcast {
            packet: Packet::Heartbeat { timestamp: 1 },
            addrs: addrs.clone(),
        };

        match msg {
            OutboundMessage::Broadcast { addrs: a, .. } => assert_eq!(a, addrs),
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_default_options() {
        let options = ServerOptions::default();
        assert_eq!(options.max_players, DEFAULT_MAX_PLAYERS);
        assert_eq!(options.session_timeout, SESSION_TIMEOUT);
        assert_eq!(options.sim.tick_rate, shared::DEFAULT_TICK_RATE);
    }

    #[test]
    fn test_tick_duration_from_rate() {
        let rates = [30u32, 60, 120];
        for rate in rates {
            let duration = Duration::from_secs_f64(1.0 / rate as f64);
            assert!(duration.as_millis() > 0);
            assert!(duration.as_millis() < 1000);
        }
    }
}
