use clap::Parser;
use client::game::ClientEcs;
use client::input::KeyCapture;
use client::network::Transport;
use client::rendering::{HudInfo, Renderer};
use log::{error, info, warn};
use macroquad::prelude::{is_key_pressed, next_frame, Conf, KeyCode};
use shared::time::utc_seconds;
use shared::{demo_builder, Message, SyncConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: usize,

    /// How many snapshot intervals remote entities keep moving without news
    #[arg(short = 'e', long, default_value = "1.0")]
    extrapolation_limit: f64,

    /// Server tick rate, used as the interpolation interval until measured
    #[arg(long, default_value = "20")]
    tick_rate: u32,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "statesync client".to_string(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    info!("Controls: arrow keys or WASD to move, Escape to quit");

    let config = SyncConfig {
        initial_tick_interval: 1.0 / f64::from(args.tick_rate.max(1)),
        extrapolation_limit: args.extrapolation_limit,
        ..SyncConfig::default()
    };

    let mut transport = match Transport::connect(&args.server, args.fake_ping) {
        Ok(transport) => transport,
        Err(e) => {
            error!("Failed to connect to {}: {}", args.server, e);
            return;
        }
    };

    let capture = KeyCapture::new();
    let mut renderer = Renderer::new(args.width, args.height);
    let mut game: Option<ClientEcs> = None;

    loop {
        if is_key_pressed(KeyCode::Escape) {
            break;
        }

        let now = utc_seconds();

        while let Some(message) = transport.try_recv() {
            match message {
                Message::Connected { client_id } => {
                    info!("Connected as {}", client_id);
                    game = Some(ClientEcs::new(demo_builder(config.clone()), client_id, now));
                }
                Message::State(packet) => {
                    let Some(game) = game.as_mut() else {
                        continue;
                    };
                    match game.on_server_packet(&packet, now) {
                        Ok(replies) => {
                            for reply in replies {
                                transport.send(Message::Input(reply));
                            }
                        }
                        Err(e) => warn!("Dropped server packet {}: {}", packet.ix, e),
                    }
                }
                Message::Disconnected { reason } => {
                    warn!("Disconnected by server: {}", reason);
                    game = None;
                }
                other => warn!("Unexpected message from server: {:?}", other),
            }
        }

        if let Some(game) = game.as_mut() {
            capture.poll(game.input_mut());
            if let Err(e) = game.tick(now) {
                error!("Local tick failed: {}", e);
            }
        }

        let hud = HudInfo::from_game(game.as_ref(), args.fake_ping);
        renderer.render(game.as_ref(), &hud);

        next_frame().await;
    }

    info!("Shutting down");
    transport.shutdown();
}
