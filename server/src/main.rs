use clap::Parser;
use log::{error, info};
use server::engine::CombatEngine;
use server::network::Server;
use server::session::GameSession;

/// Authoritative server for the shared clicker boss battle.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Maximum number of concurrently connected clients
    #[clap(short, long, default_value = "64")]
    max_clients: usize,
    /// Boss name
    #[clap(long, default_value = shared::BOSS_NAME)]
    boss_name: String,
    /// Boss maximum hit points
    #[clap(long, default_value_t = shared::BOSS_MAX_HP)]
    boss_hp: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let engine = CombatEngine::new(
        &args.boss_name,
        args.boss_hp,
        shared::HERO_BASE_ATTACK,
        shared::HERO_POWER_MULTIPLIER,
    );
    let session = GameSession::new(engine);

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, args.max_clients, session).await?;

    // Run until the loop ends on its own or a termination signal comes
    // in; in-memory state is not worth preserving past either.
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
