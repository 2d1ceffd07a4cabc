//! ebbchar test client.
//!
//! Opens the device, writes one message and reads it back.
//!
//! # Usage
//!
//! ```bash
//! ebbchar-client --message "hello"
//!
//! # Prompt for the message on stdin
//! ebbchar-client --addr 127.0.0.1:7777
//! ```

#![allow(clippy::print_stdout)]

use clap::Parser;
use ebbchar_server::{DEFAULT_BIND_ADDRESS, DeviceClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// ebbchar device client
#[derive(Parser, Debug)]
#[command(name = "ebbchar-client")]
#[command(about = "Write a message to an ebbchar device and read it back")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = DEFAULT_BIND_ADDRESS)]
    addr: String,

    /// Message to send (read from stdin if omitted)
    #[arg(short, long)]
    message: Option<String>,

    /// Read buffer length
    #[arg(long, default_value_t = 256)]
    read_len: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    println!("Starting...");
    let mut client = DeviceClient::connect(&args.addr).await?;
    tracing::debug!("Opened session {}", client.session_id());

    let message = match args.message {
        Some(message) => message,
        None => {
            println!("Type in a short string to send to the device:");
            let mut line = String::new();
            BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
            line.trim_end_matches(['\r', '\n']).to_string()
        },
    };

    println!("Writing message to the device [{message}].");
    client.write(message.as_bytes()).await?;

    println!("Reading from the device.");
    match client.read(args.read_len).await? {
        Some(bytes) => {
            println!("The received message is [{}]", String::from_utf8_lossy(&bytes));
        },
        None => println!("The device had no message pending."),
    }

    client.close().await?;
    Ok(())
}
