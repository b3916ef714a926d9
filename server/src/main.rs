use clap::Parser;
use log::info;
use server::game::{MoverSpawner, ServerEcs};
use server::network::{Server, ServerSettings};
use shared::time::utc_seconds;
use shared::{demo_builder, SyncConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "20")]
    tick_rate: u32,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "16")]
    max_clients: usize,

    /// Significant digits kept for non-integer numbers on the wire
    #[arg(long, default_value = "5")]
    precision: u32,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let tick_rate = args.tick_rate.max(1);

    let config = SyncConfig {
        precision_digits: args.precision,
        initial_tick_interval: 1.0 / tick_rate as f64,
        ..SyncConfig::default()
    };
    let game = ServerEcs::new(demo_builder(config).build(), utc_seconds());

    let settings = ServerSettings {
        tick_duration: Duration::from_secs_f64(1.0 / tick_rate as f64),
        max_clients: args.max_clients,
        client_timeout: Duration::from_secs(args.timeout_secs),
    };

    info!(
        "Starting server at {} Hz for up to {} clients",
        tick_rate, args.max_clients
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, game, Box::new(MoverSpawner::new()), settings).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
