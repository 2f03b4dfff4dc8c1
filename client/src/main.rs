use clap::Parser;
use client::discovery;
use client::network::GameClient;
use log::{error, info};
use rand::Rng;
use shared::{Event, Vec3, DEFAULT_DISCOVERY_PORT};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{interval, Instant};

/// Headless client for poking at a running server: joins, wanders around,
/// occasionally fires, and logs what the snapshots report.
#[derive(Parser, Debug)]
#[command(author, version, about = "Headless arena client", long_about = None)]
struct Args {
    /// Server address; scans the LAN when omitted
    #[arg(short, long)]
    server: Option<String>,

    /// Display name
    #[arg(short, long, default_value = "Wanderer")]
    name: String,

    /// Discovery port to probe when scanning
    #[arg(short, long, default_value_t = DEFAULT_DISCOVERY_PORT)]
    discovery_port: u16,

    /// Seconds to stay connected
    #[arg(short, long, default_value = "30")]
    lifetime: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let server_addr: SocketAddr = match &args.server {
        Some(addr) => addr.parse()?,
        None => {
            info!("Scanning the LAN for servers...");
            let servers = discovery::discover_on(args.discovery_port, Duration::from_secs(2)).await?;
            for server in &servers {
                info!(
                    "  {} at {} ({}/{} players)",
                    server.name, server.addr, server.players, server.max_players
                );
            }
            match servers.first() {
                Some(server) => server.addr,
                None => {
                    error!("No servers found on the LAN");
                    std::process::exit(1);
                }
            }
        }
    };

    let mut client = GameClient::connect(server_addr, &args.name).await?;
    let my_slot = client.slot();

    // First heartbeat activates the session so snapshots start arriving.
    client.heartbeat().await?;

    let send_rate = client.tick_rate().max(1);
    let mut send_interval = interval(Duration::from_secs_f64(1.0 / send_rate as f64));
    let deadline = Instant::now() + Duration::from_secs(args.lifetime);

    let mut rng = rand::thread_rng();
    let mut heading: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
    let mut last_health: u8 = 100;

    loop {
        tokio::select! {
            _ = send_interval.tick() => {
                if Instant::now() >= deadline {
                    break;
                }

                // Wander: drift the heading, walk forward, take a potshot now
                // and then.
                heading += rng.gen_range(-0.3..0.3);
                let movement = Vec3::new(heading.sin(), 0.0, heading.cos());
                let look_delta = (rng.gen_range(-0.1..0.1), 0.0);
                let fire = rng.gen_bool(0.05);

                client.send_input(movement, look_delta, fire).await?;

                for snapshot in client.poll_snapshots() {
                    for event in &snapshot.events {
                        match event {
                            Event::Hit { attacker, victim, damage } if *victim == my_slot => {
                                info!("Took {} damage from slot {}", damage, attacker);
                            }
                            Event::Death { victim } if *victim == my_slot => {
                                info!("Killed; waiting for respawn");
                            }
                            _ => {}
                        }
                    }
                    if let Some(me) = snapshot.players.iter().find(|p| p.slot == my_slot) {
                        if me.health != last_health {
                            info!("Health now {}", me.health);
                            last_health = me.health;
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, leaving");
                break;
            }
        }
    }

    client.leave().await?;
    info!("Left the server");
    Ok(())
}
