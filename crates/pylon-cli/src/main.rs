//! Pylon server CLI
//!
//! Runs the four coordination services for browser swarms: the STUN
//! responder, the TURN allocator, the WebSocket signaling gateway and
//! the HTTP announce tracker.

mod config;

use clap::{Parser, Subcommand};
use pylon_nat::{StunServer, TurnServer};
use pylon_swarm::{SignalingGateway, SwarmRegistry, TrackerGateway};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use config::Config;

/// Pylon - NAT traversal and swarm coordination services
#[derive(Parser)]
#[command(name = "pylon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured services until interrupted
    Run {
        /// Run only the STUN responder
        #[arg(long)]
        stun_only: bool,

        /// Run only the TURN allocator
        #[arg(long)]
        turn_only: bool,

        /// Override the STUN bind address
        #[arg(long, value_name = "ADDR")]
        stun_bind: Option<SocketAddr>,

        /// Override the TURN bind address
        #[arg(long, value_name = "ADDR")]
        turn_bind: Option<SocketAddr>,

        /// Override the signaling gateway bind address
        #[arg(long, value_name = "ADDR")]
        signaling_bind: Option<SocketAddr>,

        /// Override the announce tracker bind address
        #[arg(long, value_name = "ADDR")]
        tracker_bind: Option<SocketAddr>,
    },

    /// Validate the configuration and exit
    CheckConfig,

    /// Write a default configuration file
    InitConfig {
        /// Destination path (defaults to the standard config location)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Per-flag bind address overrides for `run`.
#[derive(Default, Clone, Copy)]
struct BindOverrides {
    stun: Option<SocketAddr>,
    turn: Option<SocketAddr>,
    signaling: Option<SocketAddr>,
    tracker: Option<SocketAddr>,
}

/// Effective log filter: `--verbose` wins, otherwise the configured level.
fn log_filter(verbose: bool, configured: &str) -> String {
    if verbose {
        "debug".to_string()
    } else {
        configured.to_string()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(PathBuf::from(path))?,
        None => Config::load_or_default()?,
    };
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, &config.logging.level))
        .init();

    match cli.command {
        Commands::Run {
            stun_only,
            turn_only,
            stun_bind,
            turn_bind,
            signaling_bind,
            tracker_bind,
        } => {
            let binds = BindOverrides {
                stun: stun_bind,
                turn: turn_bind,
                signaling: signaling_bind,
                tracker: tracker_bind,
            };
            run_services(&config, stun_only, turn_only, binds).await?;
        }
        Commands::CheckConfig => {
            println!("Configuration OK");
            println!("  STUN: {} ({})", config.stun.listen_addr, on_off(config.stun.enabled));
            println!("  TURN: {} ({})", config.turn.listen_addr, on_off(config.turn.enabled));
            println!(
                "  Signaling: {} ({})",
                config.signaling.listen_addr,
                on_off(config.signaling.enabled)
            );
            println!(
                "  Tracker: {} ({})",
                config.tracker.listen_addr,
                on_off(config.tracker.enabled)
            );
        }
        Commands::InitConfig { output } => {
            let path = output.map_or_else(Config::default_path, PathBuf::from);
            Config::default().save(&path)?;
            println!("Default configuration written to {}", path.display());
        }
    }

    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}


/// Start every enabled service and wait for Ctrl+C.
async fn run_services(
    config: &Config,
    stun_only: bool,
    turn_only: bool,
    binds: BindOverrides,
) -> anyhow::Result<()> {
    let exclusive = stun_only || turn_only;
    let mut started = 0usize;

    if config.stun.enabled && (!exclusive || stun_only) {
        let addr = match binds.stun {
            Some(addr) => addr,
            None => config.stun_addr()?,
        };
        let server = StunServer::bind(addr).await?;
        tracing::info!("STUN responder on {}", server.local_addr()?);
        tokio::spawn(async move {
            if let Err(err) = server.run().await {
                tracing::error!(%err, "STUN responder stopped");
            }
        });
        started += 1;
    }

    if config.turn.enabled && (!exclusive || turn_only) {
        let addr = match binds.turn {
            Some(addr) => addr,
            None => config.turn_addr()?,
        };
        let server = TurnServer::bind(addr, config.turn_settings()?).await?;
        tracing::info!("TURN allocator on {}", server.local_addr()?);
        tokio::spawn(async move {
            if let Err(err) = server.run().await {
                tracing::error!(%err, "TURN allocator stopped");
            }
        });
        started += 1;
    }

    if config.signaling.enabled && !exclusive {
        let registry = Arc::new(SwarmRegistry::new(config.registry_settings()));
        let gateway = Arc::new(SignalingGateway::new(registry, config.signaling_settings()));
        gateway.spawn_maintenance();

        let addr = match binds.signaling {
            Some(addr) => addr,
            None => config.signaling_addr()?,
        };
        let router = SignalingGateway::router(gateway);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("signaling gateway on {}", listener.local_addr()?);
        tokio::spawn(async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(err) = axum::serve(listener, service).await {
                tracing::error!(%err, "signaling gateway stopped");
            }
        });
        started += 1;
    }

    if config.tracker.enabled && !exclusive {
        let tracker = Arc::new(TrackerGateway::new(config.tracker_settings()));
        let addr = match binds.tracker {
            Some(addr) => addr,
            None => config.tracker_addr()?,
        };
        let router = TrackerGateway::router(tracker);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("announce tracker on {}", listener.local_addr()?);
        tokio::spawn(async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(err) = axum::serve(listener, service).await {
                tracing::error!(%err, "announce tracker stopped");
            }
        });
        started += 1;
    }

    if started == 0 {
        anyhow::bail!("no services enabled");
    }

    println!("Pylon {} running {} service(s)", env!("CARGO_PKG_VERSION"), started);
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");

    Ok(())
}
