//! Decoded frame shapes.

use bytes::Bytes;

/// A received frame after the type discriminant has been split off.
///
/// The `body` in both variants is the raw payload, still undecoded; the
/// decoder table turns it into a typed [`Body`](crate::body::Body) later so
/// a malformed payload only fails its own consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    /// Reply to a command, matched to its sender by serial.
    Solicited {
        /// Serial echoed from the originating command.
        serial: i32,
        /// Daemon status code; 0 is success.
        error: i32,
        /// Undecoded reply payload.
        body: Bytes,
    },
    /// Spontaneous event from the daemon.
    Unsolicited {
        /// Event code, 1000-based on the wire.
        event: i32,
        /// Undecoded event payload.
        body: Bytes,
    },
}

impl DecodedFrame {
    /// True for replies correlated to a command.
    #[inline]
    pub fn is_solicited(&self) -> bool {
        matches!(self, DecodedFrame::Solicited { .. })
    }

    /// The raw payload, whichever variant this is.
    #[inline]
    pub fn body(&self) -> &Bytes {
        match self {
            DecodedFrame::Solicited { body, .. } => body,
            DecodedFrame::Unsolicited { body, .. } => body,
        }
    }
}
