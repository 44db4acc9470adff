//! Async client engine for a modem control daemon speaking a binary
//! request/response protocol over a local Unix socket.
//!
//! The daemon accepts length-prefixed command frames and answers with two
//! kinds of traffic on the same stream: solicited replies correlated to
//! commands by serial number, and unsolicited events it emits on its own.
//! Replies may arrive out of submission order. This crate owns the whole
//! lifecycle: connecting (and endlessly reconnecting), framing, serial
//! correlation, per-opcode payload decoding, DTMF/call-supervision
//! sequencing, wake-guard accounting, and event fan-out.
//!
//! # Data flow
//!
//! ```text
//!  caller                       engine                        daemon
//!  ------                       ------                        ------
//!  submit ──> sequencer ──> encode ──> writer task ──────> socket
//!                │             │
//!                │             └──> pending registry
//!                │                     │        ▲
//!  Completion <──┴─────────────────────┘        │ resolve by serial
//!                                               │
//!  handlers <── event bus <── receive loop <─ frame buffer <─ socket
//! ```
//!
//! One writer task serializes all outgoing frames; one receive loop owns
//! the read half and resolves or publishes everything that arrives. A
//! supervisor task reconnects forever with a fixed pause, failing all
//! outstanding commands on every drop and reseeding serials so stale
//! replies cannot correlate across connections.
//!
//! # Example
//!
//! ```ignore
//! use radiowire::{RadioChannel, SocketName};
//! use radiowire::requests::events;
//!
//! #[tokio::main]
//! async fn main() {
//!     let channel = RadioChannel::builder(SocketName::Abstract("rild".into())).start();
//!
//!     channel.subscribe(events::CALL_STATE_CHANGED, |_| {
//!         println!("call list changed, poll it");
//!     });
//!
//!     let completion = channel.dial("+15551234", 0).await;
//!     match completion.await {
//!         Ok(_) => println!("dial accepted"),
//!         Err(e) => eprintln!("dial failed: {}", e),
//!     }
//! }
//! ```

pub mod body;
pub mod codec;
pub mod error;
pub mod events;
pub mod guard;
pub mod protocol;
pub mod requests;
pub mod transport;

mod channel;
mod connection;
mod pending;
mod sequencer;
mod serial;
mod writer;

pub use body::{Body, DecodeFn, DecoderTable};
pub use channel::{
    ChannelConfig, RadioChannel, RadioChannelBuilder, DEFAULT_RETRY_INTERVAL,
    DEFAULT_VERBOSE_RETRY_ATTEMPTS,
};
pub use connection::ConnectionState;
pub use error::{ChannelError, CommandError, Result};
pub use events::{Event, EventBus, SubscriptionId};
pub use guard::{NoopWake, ResourceGuard, WakeSource, DEFAULT_GUARD_TIMEOUT};
pub use pending::{CommandOutcome, Completion};
pub use transport::SocketName;
