use clap::Parser;
use log::info;
use server::engine::{Engine, Settings};
use server::network::Server;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Authoritative Bomberbots game server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Turns a bomb ticks before exploding
    #[arg(short = 'b', long)]
    bomb_timer: u16,

    /// Players required to start a game (at most 255)
    #[arg(short = 'c', long)]
    players_count: u16,

    /// Turn duration in milliseconds
    #[arg(short = 'd', long)]
    turn_duration: u64,

    /// Explosion radius in cells
    #[arg(short = 'e', long)]
    explosion_radius: u16,

    /// Randomly placed blocks in the initial layout
    #[arg(short = 'k', long)]
    initial_blocks: u16,

    /// Simulated turns after the initial layout
    #[arg(short = 'l', long)]
    game_length: u16,

    /// Server name announced to clients
    #[arg(short = 'n', long)]
    server_name: String,

    /// TCP port to listen on
    #[arg(short = 'p', long)]
    port: u16,

    /// PRNG seed (defaults to current time)
    #[arg(short = 's', long)]
    seed: Option<u32>,

    /// Board width
    #[arg(short = 'x', long)]
    size_x: u16,

    /// Board height
    #[arg(short = 'y', long)]
    size_y: u16,
}

fn settings_from_args(args: Args) -> Result<Settings, String> {
    if args.players_count > u16::from(u8::MAX) {
        return Err("players-count value overflow".to_string());
    }
    if args.size_x == 0 || args.size_y == 0 {
        return Err("board dimensions must be at least 1".to_string());
    }
    if args.turn_duration == 0 {
        return Err("turn-duration must be at least 1 millisecond".to_string());
    }

    let seed = args.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_secs() as u32
    });

    Ok(Settings {
        bomb_timer: args.bomb_timer,
        players_count: args.players_count as u8,
        turn_duration: args.turn_duration,
        explosion_radius: args.explosion_radius,
        initial_blocks: args.initial_blocks,
        game_length: args.game_length,
        server_name: args.server_name,
        port: args.port,
        seed,
        size_x: args.size_x,
        size_y: args.size_y,
    })
}

async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new(Engine::new(settings)).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    // Configuration failures must exit with code 1, help and version with 0.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let settings = match settings_from_args(args) {
        Ok(settings) => settings,
        Err(message) => {
            eprintln!("error: {}", message);
            std::process::exit(1);
        }
    };

    info!("starting server '{}'", settings.server_name);
    if let Err(e) = run(settings).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
