#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use typing_arena_server::config;
use typing_arena_server::database::DatabaseConfig;
use typing_arena_server::logging;
use typing_arena_server::server::{ArenaServer, ServerConfig};
use typing_arena_server::websocket;

/// Typing Arena -- matchmaking and race sessions for typing tournaments
#[derive(Parser, Debug)]
#[command(name = "typing-arena-server")]
#[command(about = "A WebSocket matchmaking and race-session server for typing tournaments")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = Arc::new(config::load());

    if cli.print_config {
        let json = serde_json::to_string_pretty(&*cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!(
                    "  Storage: {}",
                    cfg.storage.seed_path.as_deref().unwrap_or("in-memory (empty)")
                );
                println!("  Countdown: {}s", cfg.matchmaking.countdown_secs);
                println!("  Finalize grace: {}s", cfg.matchmaking.finalize_grace_secs);
                println!("  Forfeit penalty: {}", cfg.matchmaking.forfeit_penalty);
                println!(
                    "  Max connections per IP: {}",
                    cfg.security.max_connections_per_ip
                );
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result?;

    let _log_guard = logging::init_with_config(&cfg.logging);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let database_config = DatabaseConfig::from_storage_config(&cfg.storage);
    let server = ArenaServer::new(ServerConfig::from(cfg.as_ref()), database_config).await?;

    websocket::run_server(addr, server, &cfg.security.cors_origins, shutdown_signal()).await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining matchmaking");
}
