//! LAN server discovery.
//!
//! One probe goes out as a UDP broadcast; every server on the segment
//! answers unicast with its identity. Answers carrying a different protocol
//! version are ignored, per the forward-compatibility policy: an old client
//! simply does not see servers it cannot talk to.

use log::{debug, info};
use shared::{decode, encode, Packet, ServerInfo, DEFAULT_DISCOVERY_PORT, PROTOCOL_VERSION};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;

/// Scans the LAN on the default discovery port.
pub async fn discover(timeout: Duration) -> Result<Vec<ServerInfo>, Box<dyn std::error::Error>> {
    discover_on(DEFAULT_DISCOVERY_PORT, timeout).await
}

/// Broadcasts a probe to `port` and collects answers until `timeout`
/// elapses.
pub async fn discover_on(
    port: u16,
    timeout: Duration,
) -> Result<Vec<ServerInfo>, Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;
    collect_answers(socket, (Ipv4Addr::BROADCAST, port).into(), timeout).await
}

/// Probes one known host directly instead of broadcasting. Same answer
/// handling as a scan, so a server found this way looks identical to a
/// discovered one.
pub async fn probe(
    addr: SocketAddr,
    timeout: Duration,
) -> Result<Vec<ServerInfo>, Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    collect_answers(socket, addr, timeout).await
}

/// Sends the probe and gathers answers until the deadline. Servers are
/// deduplicated by address; order is arrival order.
async fn collect_answers(
    socket: UdpSocket,
    target: SocketAddr,
    timeout: Duration,
) -> Result<Vec<ServerInfo>, Box<dyn std::error::Error>> {
    let probe_bytes = encode(&Packet::DiscoveryProbe {
        protocol_version: PROTOCOL_VERSION,
    })?;
    socket.send_to(&probe_bytes, target).await?;
    debug!("Discovery probe sent to {}", target);

    let deadline = Instant::now() + timeout;
    let mut found: Vec<ServerInfo> = Vec::new();
    let mut buffer = [0u8; 2048];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        let (len, addr) = match tokio::time::timeout(remaining, socket.recv_from(&mut buffer)).await
        {
            Err(_) => break,
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(received)) => received,
        };

        match decode(&buffer[..len]) {
            Ok(Packet::DiscoveryAnswer {
                protocol_version,
                name,
                port,
                players,
                max_players,
            }) => {
                if protocol_version != PROTOCOL_VERSION {
                    debug!(
                        "Ignoring answer from {} with protocol version {}",
                        addr, protocol_version
                    );
                    continue;
                }

                let server_addr = SocketAddr::new(addr.ip(), port);
                if found.iter().any(|s| s.addr == server_addr) {
                    continue;
                }

                info!(
                    "Found server '{}' at {} ({}/{} players)",
                    name, server_addr, players, max_players
                );
                found.push(ServerInfo {
                    name,
                    addr: server_addr,
                    players,
                    max_players,
                });
            }
            Ok(_) => debug!("Ignoring non-answer packet from {}", addr),
            Err(_) => debug!("Dropping malformed discovery answer from {}", addr),
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    /// A fake responder on localhost that answers every probe with a fixed
    /// payload. Returns its address.
    async fn spawn_responder(answers: Vec<Vec<u8>>) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];
            while let Ok((_, from)) = socket.recv_from(&mut buffer).await {
                for answer in &answers {
                    let _ = socket.send_to(answer, from).await;
                }
            }
        });

        addr
    }

    fn answer(version: u32, name: &str) -> Vec<u8> {
        encode(&Packet::DiscoveryAnswer {
            protocol_version: version,
            name: name.to_string(),
            port: 50000,
            players: 1,
            max_players: 8,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_matching_answer_is_collected() {
        let addr = spawn_responder(vec![answer(PROTOCOL_VERSION, "Basement")]).await;

        let found = probe(addr, Duration::from_millis(300)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Basement");
        assert_eq!(found[0].players, 1);
        assert_eq!(found[0].addr.port(), 50000);
    }

    #[tokio::test]
    async fn test_version_mismatch_answer_is_ignored() {
        let addr = spawn_responder(vec![answer(PROTOCOL_VERSION + 1, "Future")]).await;

        let found = probe(addr, Duration::from_millis(300)).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_answers_are_collapsed() {
        let addr = spawn_responder(vec![
            answer(PROTOCOL_VERSION, "Twice"),
            answer(PROTOCOL_VERSION, "Twice"),
        ])
        .await;

        let found = probe(addr, Duration::from_millis(300)).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_answer_is_dropped() {
        let addr = spawn_responder(vec![vec![0xFF; 32], answer(PROTOCOL_VERSION, "Noisy")]).await;

        let result = probe(addr, Duration::from_millis(300)).await;
        let found = assert_ok!(result);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Noisy");
    }

    #[tokio::test]
    async fn test_silence_yields_empty_list() {
        // Bound but mute peer: the scan times out empty instead of hanging.
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        let found = probe(addr, Duration::from_millis(200)).await.unwrap();
        assert!(found.is_empty());
    }
}
