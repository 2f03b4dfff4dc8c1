//! LAN discovery responder.
//!
//! Clients that do not know the server's address broadcast a probe on a
//! well-known port; this responder answers each one unicast with the
//! server's identity. It runs on its own socket and its own task, so
//! answers go out immediately instead of waiting for the next simulation
//! tick. Replying to repeated probes is harmless — there is no state here
//! beyond the live player count read from the session table.

use crate::session::SessionManager;
use log::{debug, error, info, warn};
use shared::{decode, encode, Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

pub struct DiscoveryResponder {
    socket: UdpSocket,
    name: String,
    game_port: u16,
    sessions: Arc<RwLock<SessionManager>>,
}

impl DiscoveryResponder {
    /// Binds the discovery socket. `game_port` is the port clients should
    /// connect to, advertised in every answer.
    pub async fn bind(
        addr: &str,
        name: String,
        game_port: u16,
        sessions: Arc<RwLock<SessionManager>>,
    ) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Discovery responder listening on {}", socket.local_addr()?);

        Ok(Self {
            socket,
            name,
            game_port,
            sessions,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Answers probes until the task is aborted. Malformed or unrelated
    /// packets on this port are dropped; nothing a peer sends can take the
    /// responder down.
    pub async fn run(self) {
        let mut buffer = [0u8; 2048];

        loop {
            let (len, addr) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(e) => {
                    error!("Error receiving discovery probe: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            match decode(&buffer[..len]) {
                Ok(Packet::DiscoveryProbe { protocol_version }) => {
                    // Foreign versions are answered too; filtering happens on
                    // the client, which knows what it can talk to.
                    if protocol_version != PROTOCOL_VERSION {
                        debug!(
                            "Probe from {} carries protocol version {}",
                            addr, protocol_version
                        );
                    }
                    self.answer_probe(addr).await;
                }
                Ok(_) => {
                    debug!("Ignoring non-probe packet on discovery port from {}", addr);
                }
                Err(_) => {
                    debug!("Dropping malformed probe from {}", addr);
                }
            }
        }
    }

    async fn answer_probe(&self, addr: SocketAddr) {
        let (players, max_players) = {
            let sessions = self.sessions.read().await;
            (sessions.player_count(), sessions.max_players())
        };

        let answer = Packet::DiscoveryAnswer {
            protocol_version: PROTOCOL_VERSION,
            name: self.name.clone(),
            port: self.game_port,
            players,
            max_players,
        };

        match encode(&answer) {
            Ok(data) => {
                debug!("Answering discovery probe from {}", addr);
                if let Err(e) = self.socket.send_to(&data, addr).await {
                    warn!("Failed to answer probe from {}: {}", addr, e);
                }
            }
            Err(e) => error!("Failed to encode discovery answer: {}", e),
        }
    }
}
