//! Places a voice call, holds it for a few seconds, then hangs up.
//!
//! Usage:
//!
//! ```text
//! cargo run --example dial -- <number> [socket-path]
//! ```
//!
//! With no socket argument, connects to the abstract socket name `rild`.

use std::time::Duration;

use radiowire::{CommandError, ConnectionState, RadioChannel, SocketName};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let number = match std::env::args().nth(1) {
        Some(number) => number,
        None => {
            eprintln!("usage: dial <number> [socket-path]");
            std::process::exit(2);
        }
    };
    let socket = match std::env::args().nth(2) {
        Some(path) => SocketName::Path(path.into()),
        None => SocketName::Abstract("rild".to_string()),
    };

    let channel = RadioChannel::builder(socket).start();

    // Give the supervisor a moment to establish the first connection.
    for _ in 0..50 {
        if channel.connection_status() == ConnectionState::Connected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if channel.connection_status() != ConnectionState::Connected {
        eprintln!("daemon did not come up, giving up");
        channel.shutdown().await;
        std::process::exit(1);
    }

    println!("dialing {}", number);
    let completion = channel.dial(&number, 0).await;
    match completion.await {
        Ok(_) => println!("dial accepted"),
        Err(CommandError::RadioNotAvailable) => {
            eprintln!("radio not available");
            channel.shutdown().await;
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("dial failed: {}", err);
            channel.shutdown().await;
            std::process::exit(1);
        }
    }

    tokio::time::sleep(Duration::from_secs(5)).await;

    // GSM call indices start at 1; the call we just placed is the only one.
    println!("hanging up");
    let completion = channel.hangup(1).await;
    if let Err(err) = completion.await {
        eprintln!("hangup failed: {}", err);
    }

    channel.shutdown().await;
    Ok(())
}
