//! ebbchar server binary.
//!
//! # Usage
//!
//! ```bash
//! # Default: five concurrent handles on localhost
//! ebbchar-server
//!
//! # Two handles, public interface, verbose logging
//! ebbchar-server --bind 0.0.0.0:7777 --capacity 2 --log-level debug
//! ```

use clap::Parser;
use ebbchar_core::BrokerConfig;
use ebbchar_server::{
    DEFAULT_BIND_ADDRESS, DEFAULT_MAX_MESSAGE_LEN, Server, ServerRuntimeConfig,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// ebbchar device server
#[derive(Parser, Debug)]
#[command(name = "ebbchar-server")]
#[command(about = "Bounded-session character device server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = DEFAULT_BIND_ADDRESS)]
    bind: String,

    /// Maximum concurrently open handles
    #[arg(short, long, default_value_t = ebbchar_core::DEFAULT_CAPACITY)]
    capacity: usize,

    /// Largest message a single write may carry, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_LEN)]
    max_message_len: usize,

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

    tracing::info!("ebbchar server starting");
    tracing::info!("Binding to {} with {} slots", args.bind, args.capacity);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        broker: BrokerConfig::with_capacity(args.capacity),
        max_message_len: args.max_message_len,
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    let stats = server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("Goodbye after {} opens", stats.total_opens);

    Ok(())
}
