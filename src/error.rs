//! Error types for radiowire.

use thiserror::Error;

/// Crate-internal error type for transport and framing faults.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame-level protocol violation (bad discriminant, short envelope, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Payload field extends past the end of the frame body.
    #[error("Truncated payload: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// Outbound frame body does not fit the 16-bit length field.
    #[error("Frame too large: {0} bytes (max 65535)")]
    FrameTooLarge(usize),

    /// The connection epoch ended; the writer is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A serial was registered twice. Caller bug.
    #[error("Duplicate serial: {0}")]
    DuplicateSerial(i32),
}

/// Result type alias using ChannelError.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Terminal error outcomes delivered to command completions.
///
/// Transport and per-frame protocol failures map onto the first three
/// variants; the rest mirror the daemon's own error codes from the second
/// field of a solicited reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No usable connection to the modem daemon.
    #[error("radio not available")]
    RadioNotAvailable,

    /// The reply addressed to this command could not be decoded.
    #[error("malformed response")]
    MalformedResponse,

    /// The encoded command body exceeds the outbound frame cap.
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Generic failure reported by the daemon.
    #[error("generic failure")]
    GenericFailure,

    /// Password incorrect.
    #[error("password incorrect")]
    PasswordIncorrect,

    /// Operation requires SIM PIN2.
    #[error("SIM PIN2 required")]
    SimPin2,

    /// Operation requires SIM PUK2.
    #[error("SIM PUK2 required")]
    SimPuk2,

    /// The daemon does not support this request.
    #[error("request not supported")]
    RequestNotSupported,

    /// Dropped before reaching the wire (duplicate DTMF start, queue
    /// truncation, superseded hold/conference command).
    #[error("cancelled")]
    Cancelled,

    /// Any other daemon error code.
    #[error("modem error code {0}")]
    Modem(i32),
}

impl CommandError {
    /// Map a daemon error code onto the enum. Code 0 means success and is
    /// handled before this is called.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => CommandError::RadioNotAvailable,
            2 => CommandError::GenericFailure,
            3 => CommandError::PasswordIncorrect,
            4 => CommandError::SimPin2,
            5 => CommandError::SimPuk2,
            6 => CommandError::RequestNotSupported,
            7 => CommandError::Cancelled,
            other => CommandError::Modem(other),
        }
    }
}
