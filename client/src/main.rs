use clap::Parser;
use client::network::{parse_host_port, Client, RelayConfig};
use log::info;

/// Bomberbots client: relays between a GUI process and the game server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// GUI address as host:port
    #[arg(short = 'd', long)]
    gui_address: String,

    /// Player name announced when joining
    #[arg(short = 'n', long)]
    player_name: String,

    /// Local UDP port for datagrams from the GUI
    #[arg(short = 'p', long)]
    port: u16,

    /// Server address as host:port
    #[arg(short = 's', long)]
    server_address: String,
}

fn config_from_args(args: Args) -> Result<RelayConfig, String> {
    let (gui_host, gui_port) = parse_host_port(&args.gui_address)?;
    let (server_host, server_port) = parse_host_port(&args.server_address)?;
    Ok(RelayConfig {
        gui_host,
        gui_port,
        server_host,
        server_port,
        player_name: args.player_name,
        port: args.port,
    })
}

async fn run(config: RelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = Client::new(config).await?;

    tokio::select! {
        result = client.run() => result,
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

    let config = match config_from_args(args) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("error: {}", message);
            std::process::exit(1);
        }
    };

    info!(
        "starting relay for '{}' (gui {}:{}, server {}:{})",
        config.player_name, config.gui_host, config.gui_port, config.server_host, config.server_port
    );
    if let Err(e) = run(config).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
