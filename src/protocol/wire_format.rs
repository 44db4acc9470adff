//! Binary layout of daemon frames.
//!
//! Every frame in both directions starts with a 4-byte big-endian length
//! prefix counting the bytes that follow it.
//!
//! Outgoing command:
//!
//! ```text
//! +----------------+-------------+------------+-----------+
//! | length (u32 BE)| request i32 | serial i32 | payload   |
//! +----------------+-------------+------------+-----------+
//!   = 8 + payload     big-endian   big-endian   raw bytes
//! ```
//!
//! The daemon rejects command bodies above 64 KiB, so encoding enforces
//! that bound locally rather than letting the remote end kill the link.
//!
//! Incoming frame, after the length prefix:
//!
//! ```text
//! solicited:   | type=0 i32 | serial i32 | error i32 | payload |
//! unsolicited: | type=1 i32 | event i32  | payload             |
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ChannelError, Result};
use crate::protocol::DecodedFrame;

/// Size of the length prefix on every frame.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest body the daemon accepts on an outgoing command.
pub const MAX_OUTBOUND_BODY: usize = 0xFFFF;

/// Default cap on incoming frame bodies. The daemon never sends frames
/// anywhere near this size; anything larger is treated as a corrupt peer.
pub const DEFAULT_MAX_INCOMING_BODY: u32 = 8 * 1024;

/// Body discriminant for a reply correlated to a command.
pub const RESPONSE_SOLICITED: i32 = 0;

/// Body discriminant for a spontaneous event.
pub const RESPONSE_UNSOLICITED: i32 = 1;

/// Version value published when the link drops.
pub const VERSION_DISCONNECTED: i32 = -1;

/// Encodes one outgoing command frame, length prefix included.
///
/// # Errors
///
/// Returns [`ChannelError::FrameTooLarge`] when the body (request code,
/// serial, and payload) would exceed [`MAX_OUTBOUND_BODY`].
pub fn encode_command(request: i32, serial: i32, payload: &[u8]) -> Result<Bytes> {
    let body_len = 8 + payload.len();
    if body_len > MAX_OUTBOUND_BODY {
        return Err(ChannelError::FrameTooLarge(body_len));
    }

    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body_len);
    frame.put_u32(body_len as u32);
    frame.put_i32(request);
    frame.put_i32(serial);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Splits a received frame body into its solicited or unsolicited shape.
///
/// The length prefix has already been stripped by the frame buffer; `body`
/// starts at the type discriminant.
///
/// # Errors
///
/// Returns [`ChannelError::Truncated`] when the body is shorter than its
/// discriminant demands, or [`ChannelError::Protocol`] for an unknown
/// discriminant.
pub fn decode_body(mut body: Bytes) -> Result<DecodedFrame> {
    if body.len() < 4 {
        return Err(ChannelError::Truncated {
            needed: 4,
            remaining: body.len(),
        });
    }
    let kind = body.get_i32();

    match kind {
        RESPONSE_SOLICITED => {
            if body.len() < 8 {
                return Err(ChannelError::Truncated {
                    needed: 8,
                    remaining: body.len(),
                });
            }
            let serial = body.get_i32();
            let error = body.get_i32();
            Ok(DecodedFrame::Solicited {
                serial,
                error,
                body,
            })
        }
        RESPONSE_UNSOLICITED => {
            if body.len() < 4 {
                return Err(ChannelError::Truncated {
                    needed: 4,
                    remaining: body.len(),
                });
            }
            let event = body.get_i32();
            Ok(DecodedFrame::Unsolicited { event, body })
        }
        other => Err(ChannelError::Protocol(format!(
            "unknown response type {}",
            other
        ))),
    }
}

/// Encodes a solicited reply frame as the daemon would send it.
///
/// Incoming lengths are full 32-bit values, unlike the outgoing cap.
pub fn encode_solicited_reply(serial: i32, error: i32, payload: &[u8]) -> Bytes {
    let body_len = 12 + payload.len();
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body_len);
    frame.put_u32(body_len as u32);
    frame.put_i32(RESPONSE_SOLICITED);
    frame.put_i32(serial);
    frame.put_i32(error);
    frame.put_slice(payload);
    frame.freeze()
}

/// Encodes an unsolicited event frame as the daemon would send it.
pub fn encode_unsolicited(event: i32, payload: &[u8]) -> Bytes {
    let body_len = 8 + payload.len();
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body_len);
    frame.put_u32(body_len as u32);
    frame.put_i32(RESPONSE_UNSOLICITED);
    frame.put_i32(event);
    frame.put_slice(payload);
    frame.freeze()
}
