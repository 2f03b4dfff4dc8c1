use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerMessage, ServerOptions};
use shared::{
    SimConfig, DEFAULT_DISCOVERY_PORT, DEFAULT_GAME_PORT, DEFAULT_MAX_PLAYERS, DEFAULT_TICK_RATE,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Dedicated LAN arena server", long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port for game traffic
    #[arg(short, long, default_value_t = DEFAULT_GAME_PORT)]
    port: u16,

    /// Port answering LAN discovery probes
    #[arg(short, long, default_value_t = DEFAULT_DISCOVERY_PORT)]
    discovery_port: u16,

    /// Server name shown to players browsing the LAN
    #[arg(short, long, default_value = "Rust Arena")]
    name: String,

    /// Maximum concurrent players
    #[arg(short, long, default_value_t = DEFAULT_MAX_PLAYERS)]
    max_players: u8,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = DEFAULT_TICK_RATE, value_parser = clap::value_parser!(u32).range(1..=240))]
    tick_rate: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let options = ServerOptions {
        name: args.name,
        max_players: args.max_players,
        sim: SimConfig {
            tick_rate: args.tick_rate,
            ..SimConfig::default()
        },
        ..ServerOptions::default()
    };

    let game_addr = format!("{}:{}", args.host, args.port);
    let discovery_addr = format!("{}:{}", args.host, args.discovery_port);

    let mut server = match Server::new(&game_addr, Some(discovery_addr.as_str()), options).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server on {}: {}", game_addr, e);
            std::process::exit(1);
        }
    };

    // Ctrl+C requests a clean shutdown of the loop; in-flight sends are
    // best-effort.
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
            let _ = shutdown.send(ServerMessage::Shutdown);
        }
    });

    server.run().await
}
