//! Connection supervision and the receive loop.
//!
//! The supervisor runs for the channel's whole life: connect, serve one
//! connection epoch, tear down, reconnect. Teardown marks the link down
//! before failing outstanding commands, so a submit racing the teardown
//! either sees the dead link or lands in the registry in time to be
//! swept. Serials reseed on every teardown; a reply composed against a
//! previous epoch cannot correlate with a new command.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::unix::OwnedReadHalf;
use tokio::net::UnixStream;

use crate::channel::{LinkState, Shared};
use crate::error::CommandError;
use crate::events::Event;
use crate::protocol::wire_format::{self, VERSION_DISCONNECTED};
use crate::protocol::{DecodedFrame, FrameBuffer};
use crate::requests::{self, events};
use crate::writer::spawn_writer_task;

/// Where the engine currently stands with the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    Disconnected,
    /// Attempting to connect, including the pause between retries.
    Connecting,
    /// Live connection; commands flow.
    Connected,
}

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Supervisor task body. Never returns; the channel aborts it on
/// shutdown.
pub(crate) async fn run(shared: Arc<Shared>) {
    let mut attempts: u32 = 0;

    loop {
        shared.set_link(LinkState::Connecting);

        let stream = match shared.config.socket.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                attempts += 1;
                let verbose = shared.config.verbose_retry_attempts;
                if attempts <= verbose {
                    tracing::warn!(
                        "Could not connect to {} (attempt {}): {}",
                        shared.config.socket,
                        attempts,
                        e
                    );
                    if attempts == verbose {
                        tracing::warn!("Continuing to retry quietly");
                    }
                }
                tokio::time::sleep(shared.config.retry_interval).await;
                continue;
            }
        };

        tracing::info!("Connected to {}", shared.config.socket);
        attempts = 0;

        run_epoch(&shared, stream).await;

        tracing::warn!("Connection to {} lost", shared.config.socket);
        shared.set_link(LinkState::Disconnected);
        shared.fail_outstanding();
        shared.serials.reseed();
        shared.publish_connection_changed(VERSION_DISCONNECTED);
    }
}

/// Serves one connection until either direction dies.
async fn run_epoch(shared: &Arc<Shared>, stream: UnixStream) {
    let (read_half, write_half) = stream.into_split();
    let (writer, mut writer_task) =
        spawn_writer_task(write_half, shared.config.writer_queue_depth);
    shared.set_link(LinkState::Connected(writer));

    tokio::select! {
        _ = read_loop(shared, read_half) => {}
        _ = &mut writer_task => {
            tracing::warn!("Writer task ended before the read loop");
        }
    }
    writer_task.abort();
}

async fn read_loop(shared: &Arc<Shared>, mut reader: OwnedReadHalf) {
    let mut frames = FrameBuffer::with_max_body(shared.config.max_incoming_frame);
    let mut chunk = vec![0u8; READ_BUFFER_SIZE];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                tracing::info!("Daemon closed the connection");
                return;
            }
            Ok(n) => {
                for body in frames.push(&chunk[..n]) {
                    dispatch_body(shared, body).await;
                }
            }
            Err(e) => {
                tracing::warn!("Socket read failed: {}", e);
                return;
            }
        }
    }
}

async fn dispatch_body(shared: &Arc<Shared>, body: Bytes) {
    match wire_format::decode_body(body) {
        Ok(DecodedFrame::Solicited {
            serial,
            error,
            body,
        }) => {
            dispatch_solicited(shared, serial, error, body).await;
        }
        Ok(DecodedFrame::Unsolicited { event, body }) => {
            dispatch_unsolicited(shared, event, body);
        }
        Err(e) => {
            // One bad frame is not a reason to drop the link.
            tracing::warn!("Dropping undecodable frame: {}", e);
        }
    }
}

async fn dispatch_solicited(shared: &Arc<Shared>, serial: i32, error: i32, body: Bytes) {
    let Some(req) = shared.registry.resolve(serial) else {
        shared.registry.record_spurious();
        tracing::warn!("Unexpected solicited reply for serial {}; dropping", serial);
        return;
    };

    let request = req.request;
    let outcome = if error != 0 {
        Err(CommandError::from_code(error))
    } else {
        match shared.decoders.decode_reply(request, body) {
            Some(Ok(decoded)) => Ok(decoded),
            Some(Err(e)) => {
                tracing::warn!(
                    "Malformed {} reply: {}",
                    requests::request_name(request),
                    e
                );
                Err(CommandError::MalformedResponse)
            }
            None => {
                tracing::warn!("No reply decoder for {}", requests::request_name(request));
                Err(CommandError::MalformedResponse)
            }
        }
    };

    let ok = outcome.is_ok();
    let radio_lost = matches!(outcome, Err(CommandError::RadioNotAvailable));

    tracing::debug!(
        "[SOLD]< {} (serial {}, error {})",
        requests::request_name(request),
        serial,
        error
    );

    req.complete(outcome);
    shared.guard.release();

    if radio_lost {
        // The daemon declared the radio gone; every other outstanding
        // command is equally doomed.
        shared.fail_outstanding();
    }

    shared.advance_sequencer(request, ok).await;
}

fn dispatch_unsolicited(shared: &Arc<Shared>, event: i32, body: Bytes) {
    let decoded = match shared.decoders.decode_event(event, body) {
        Some(Ok(decoded)) => decoded,
        Some(Err(e)) => {
            tracing::warn!(
                "[UNSL]< malformed {} payload: {}",
                requests::event_name(event),
                e
            );
            return;
        }
        None => {
            tracing::debug!("[UNSL]< unknown event {}; dropping", event);
            return;
        }
    };

    tracing::debug!("[UNSL]< {}", requests::event_name(event));

    if event == events::RADIO_CONNECTED {
        let version = decoded
            .as_ints()
            .and_then(|ints| ints.first().copied())
            .unwrap_or(0);
        shared.publish_connection_changed(version);
    }

    shared.bus.publish(&Event {
        code: event,
        body: decoded,
    });
}
