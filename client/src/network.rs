//! Join handshake and per-frame network plumbing.

use log::{info, warn};
use shared::{
    decode, encode, InputCommand, Packet, Snapshot, Vec3, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::timeout;

const JOIN_ATTEMPTS: u32 = 3;
const JOIN_REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// A joined connection to one server.
///
/// The facade is deliberately dumb: it stamps sequence numbers on outgoing
/// inputs and hands back whatever snapshots have arrived. Interpreting them
/// is the rendering layer's problem.
#[derive(Debug)]
pub struct GameClient {
    socket: UdpSocket,
    server_addr: SocketAddr,
    slot: u8,
    tick_rate: u32,
    next_sequence: u32,
}

impl GameClient {
    /// Performs the join handshake. The request is retried a few times since
    /// UDP may eat it; a rejection from the server is final and comes back as
    /// an error.
    pub async fn connect(
        server_addr: SocketAddr,
        name: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(server_addr).await?;

        let request = encode(&Packet::JoinRequest {
            protocol_version: PROTOCOL_VERSION,
            name: name.to_string(),
        })?;

        let mut buffer = [0u8; 2048];
        for attempt in 1..=JOIN_ATTEMPTS {
            info!(
                "Joining {} as '{}' (attempt {})",
                server_addr, name, attempt
            );
            socket.send(&request).await?;

            match timeout(JOIN_REPLY_TIMEOUT, socket.recv(&mut buffer)).await {
                Err(_) => continue,
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(len)) => match decode(&buffer[..len]) {
                    Ok(Packet::JoinAccepted { slot, tick_rate }) => {
                        info!("Joined: slot {}, server ticks at {} Hz", slot, tick_rate);
                        return Ok(Self {
                            socket,
                            server_addr,
                            slot,
                            tick_rate,
                            next_sequence: 0,
                        });
                    }
                    Ok(Packet::JoinRejected { reason }) => {
                        return Err(format!("join rejected: {}", reason).into());
                    }
                    // Anything else on the socket this early is stray
                    // traffic; try again.
                    _ => continue,
                },
            }
        }

        Err(format!("server {} did not answer the join request", server_addr).into())
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Sends one input command and returns the sequence number it carried.
    pub async fn send_input(
        &mut self,
        movement: Vec3,
        look_delta: (f32, f32),
        fire: bool,
    ) -> Result<u32, Box<dyn std::error::Error>> {
        self.next_sequence += 1;
        let command = InputCommand {
            sequence: self.next_sequence,
            timestamp: now_millis(),
            movement,
            look_delta,
            fire,
        };

        let data = encode(&Packet::Input(command))?;
        self.socket.send(&data).await?;
        Ok(self.next_sequence)
    }

    /// Keepalive for frames without input. Also what flips the session to
    /// active right after joining, so snapshots start flowing.
    pub async fn heartbeat(&self) -> Result<(), Box<dyn std::error::Error>> {
        let data = encode(&Packet::Heartbeat {
            timestamp: now_millis(),
        })?;
        self.socket.send(&data).await?;
        Ok(())
    }

    /// Drains every snapshot currently sitting on the socket without
    /// blocking. Returns them oldest first; with UDP reordering the caller
    /// should trust tick numbers, not arrival order.
    pub fn poll_snapshots(&self) -> Vec<Snapshot> {
        let mut snapshots = Vec::new();
        let mut buffer = [0u8; 2048];

        loop {
            match self.socket.try_recv(&mut buffer) {
                Ok(len) => match decode(&buffer[..len]) {
                    Ok(Packet::Snapshot(snapshot)) => snapshots.push(snapshot),
                    Ok(_) => {}
                    Err(_) => warn!("Dropping malformed packet from server"),
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Error reading socket: {}", e);
                    break;
                }
            }
        }

        snapshots
    }

    /// Waits for the next snapshot, up to `wait`.
    pub async fn recv_snapshot(
        &self,
        wait: Duration,
    ) -> Result<Option<Snapshot>, Box<dyn std::error::Error>> {
        let mut buffer = [0u8; 2048];
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            match timeout(remaining, self.socket.recv(&mut buffer)).await {
                Err(_) => return Ok(None),
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(len)) => match decode(&buffer[..len]) {
                    Ok(Packet::Snapshot(snapshot)) => return Ok(Some(snapshot)),
                    Ok(_) => continue,
                    Err(_) => {
                        warn!("Dropping malformed packet from server");
                        continue;
                    }
                },
            }
        }
    }

    /// Tells the server we are leaving. Best-effort: if the datagram is
    /// lost, the timeout sweep cleans up after us anyway.
    pub async fn leave(self) -> Result<(), Box<dyn std::error::Error>> {
        let data = encode(&Packet::Leave)?;
        self.socket.send(&data).await?;
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_advances() {
        let a = now_millis();
        std::thread::sleep(Duration::from_millis(2));
        let b = now_millis();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_connect_fails_against_silent_peer() {
        // A bound socket that never answers: the handshake must give up on
        // its own rather than hang.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();

        let result = GameClient::connect(addr, "nobody").await;
        assert!(result.is_err());
    }
}
