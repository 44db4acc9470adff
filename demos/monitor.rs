//! Connects to a daemon socket and prints connection, call, and signal
//! events until interrupted.
//!
//! Usage:
//!
//! ```text
//! cargo run --example monitor [socket-path]
//! ```
//!
//! With no argument, connects to the abstract socket name `rild`.

use radiowire::requests::events;
use radiowire::{RadioChannel, SocketName};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let socket = match std::env::args().nth(1) {
        Some(path) => SocketName::Path(path.into()),
        None => SocketName::Abstract("rild".to_string()),
    };

    println!("monitoring {}", socket);
    let channel = RadioChannel::builder(socket).start();

    channel.subscribe(events::CONNECTION_CHANGED, |event| {
        match event.body.as_ints().and_then(|v| v.first().copied()) {
            Some(-1) => println!("daemon disconnected"),
            Some(version) => println!("daemon connected, version {}", version),
            None => {}
        }
    });
    channel.subscribe(events::CALL_STATE_CHANGED, |_| {
        println!("call state changed");
    });
    channel.subscribe(events::SIGNAL_STRENGTH, |event| {
        if let Some(ints) = event.body.as_ints() {
            println!("signal strength: {:?}", ints);
        }
    });
    channel.subscribe(events::CALL_RING, |_| println!("ring"));

    tokio::signal::ctrl_c().await?;
    println!("shutting down");
    channel.shutdown().await;
    Ok(())
}
