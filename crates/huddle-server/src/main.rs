//! Huddle server binary.
//!
//! # Usage
//!
//! ```bash
//! # In-memory accounts (lost on restart)
//! huddle-server --bind 0.0.0.0:8080
//!
//! # Durable accounts and groups
//! huddle-server --bind 0.0.0.0:8080 --database huddle.redb
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use huddle_server::{
    ConnectionConfig, HashConfig, LocalBus, MemoryStorage, RedbStorage, Server, ServerConfig,
    ServerError, Storage,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Huddle chat server
#[derive(Parser, Debug)]
#[command(name = "huddle-server")]
#[command(about = "Multi-user line-based chat server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Path to the redb database file. Without it, state lives in memory
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Outbound lines buffered per connection before deliveries are dropped
    #[arg(long, default_value = "256")]
    outbound_queue: usize,

    /// Longest accepted inbound line in bytes
    #[arg(long, default_value = "4096")]
    max_line_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Huddle server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerConfig {
        bind_address: args.bind,
        max_connections: args.max_connections,
        connection: ConnectionConfig {
            outbound_queue: args.outbound_queue,
            max_line_bytes: args.max_line_bytes,
            drain_timeout: Duration::from_secs(5),
        },
        hash: HashConfig::default(),
    };

    let bus = LocalBus::default();
    let _audit = bus.spawn_audit_log();

    match args.database {
        Some(path) => {
            tracing::info!("Opening database {}", path.display());
            serve(config, RedbStorage::open(&path)?, bus).await?;
        },
        None => {
            tracing::warn!("No database given - accounts and groups are kept in memory only");
            serve(config, MemoryStorage::new(), bus).await?;
        },
    }

    Ok(())
}

async fn serve<S: Storage>(
    config: ServerConfig,
    storage: S,
    bus: LocalBus,
) -> Result<(), ServerError> {
    let server = Server::bind(config, storage, bus).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    tokio::select! {
        result = server.run() => result,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                return Err(ServerError::Internal(format!("failed to listen for Ctrl-C: {e}")));
            }
            tracing::info!("Shutting down");
            Ok(())
        }
    }
}
