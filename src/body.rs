//! Typed payload bodies and per-opcode decoding.
//!
//! The daemon reuses a handful of payload shapes across its whole command
//! set: nothing, a list of ints, a nullable string, a list of nullable
//! strings, or an opcode-specific structure (kept raw here). The
//! [`DecoderTable`] maps opcodes to shape decoders and is extensible at
//! construction time, so callers can add commands without touching the
//! engine.

use std::collections::HashMap;

use bytes::Bytes;

use crate::codec::PayloadReader;
use crate::error::Result;
use crate::requests::{self, events};

/// A decoded reply or event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// No payload, or a payload nobody reads.
    Empty,
    /// Counted list of integers.
    Ints(Vec<i32>),
    /// Single nullable string.
    Text(Option<String>),
    /// Counted list of nullable strings.
    Texts(Vec<Option<String>>),
    /// Opcode-specific payload, left undecoded.
    Raw(Bytes),
}

impl Body {
    /// The integer list, if this body is one.
    pub fn as_ints(&self) -> Option<&[i32]> {
        match self {
            Body::Ints(values) => Some(values),
            _ => None,
        }
    }

    /// The string, if this body is a non-null one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(Some(s)) => Some(s),
            _ => None,
        }
    }

    /// The raw bytes, if this body was left undecoded.
    pub fn as_raw(&self) -> Option<&Bytes> {
        match self {
            Body::Raw(raw) => Some(raw),
            _ => None,
        }
    }
}

/// Decodes one payload shape. Plain function pointers keep the table
/// `Copy`-cheap and printable.
pub type DecodeFn = fn(PayloadReader) -> Result<Body>;

/// Ignores the payload entirely.
pub fn decode_void(_reader: PayloadReader) -> Result<Body> {
    Ok(Body::Empty)
}

/// Decodes a counted `i32` list.
pub fn decode_ints(mut reader: PayloadReader) -> Result<Body> {
    Ok(Body::Ints(reader.read_i32_list()?))
}

/// Decodes one nullable string.
pub fn decode_text(mut reader: PayloadReader) -> Result<Body> {
    Ok(Body::Text(reader.read_string()?))
}

/// Decodes a counted list of nullable strings.
pub fn decode_texts(mut reader: PayloadReader) -> Result<Body> {
    Ok(Body::Texts(reader.read_string_list()?))
}

/// Passes the payload through untouched.
pub fn decode_raw(reader: PayloadReader) -> Result<Body> {
    Ok(Body::Raw(reader.into_inner()))
}

/// Opcode-to-decoder mapping for replies and events.
#[derive(Debug, Clone)]
pub struct DecoderTable {
    replies: HashMap<i32, DecodeFn>,
    events: HashMap<i32, DecodeFn>,
}

impl DecoderTable {
    /// Builds the table with decoders for the built-in command set.
    pub fn new() -> Self {
        let mut table = Self::empty();

        for code in [
            requests::DIAL,
            requests::HANGUP,
            requests::HANGUP_WAITING_OR_BACKGROUND,
            requests::HANGUP_FOREGROUND_RESUME_BACKGROUND,
            requests::SWITCH_WAITING_OR_HOLDING_AND_ACTIVE,
            requests::CONFERENCE,
            requests::UDUB,
            requests::SEPARATE_CONNECTION,
            requests::EXPLICIT_CALL_TRANSFER,
            requests::RADIO_POWER,
            requests::DTMF,
            requests::DTMF_START,
            requests::DTMF_STOP,
            requests::ANSWER,
        ] {
            table.register_reply(code, decode_void);
        }
        for code in [
            requests::GET_IMSI,
            requests::GET_IMEI,
            requests::BASEBAND_VERSION,
        ] {
            table.register_reply(code, decode_text);
        }
        for code in [requests::SIGNAL_STRENGTH, requests::LAST_CALL_FAIL_CAUSE] {
            table.register_reply(code, decode_ints);
        }
        for code in [requests::GET_SIM_STATUS, requests::GET_CURRENT_CALLS] {
            table.register_reply(code, decode_raw);
        }

        for code in [
            events::RADIO_STATE_CHANGED,
            events::CALL_STATE_CHANGED,
            events::NETWORK_STATE_CHANGED,
            events::SIM_STATUS_CHANGED,
        ] {
            table.register_event(code, decode_void);
        }
        for code in [events::NEW_SMS, events::NITZ_TIME_RECEIVED] {
            table.register_event(code, decode_text);
        }
        for code in [events::SIGNAL_STRENGTH, events::RADIO_CONNECTED] {
            table.register_event(code, decode_ints);
        }
        table.register_event(events::CALL_RING, decode_raw);

        table
    }

    /// Builds a table with no decoders at all.
    pub fn empty() -> Self {
        Self {
            replies: HashMap::new(),
            events: HashMap::new(),
        }
    }

    /// Installs (or replaces) the reply decoder for `request`.
    pub fn register_reply(&mut self, request: i32, decode: DecodeFn) -> &mut Self {
        self.replies.insert(request, decode);
        self
    }

    /// Installs (or replaces) the event decoder for `event`.
    pub fn register_event(&mut self, event: i32, decode: DecodeFn) -> &mut Self {
        self.events.insert(event, decode);
        self
    }

    /// Decodes a successful reply payload for `request`. `None` means no
    /// decoder is registered for that opcode.
    pub fn decode_reply(&self, request: i32, body: Bytes) -> Option<Result<Body>> {
        self.replies
            .get(&request)
            .map(|decode| decode(PayloadReader::new(body)))
    }

    /// Decodes an event payload for `event`.
    pub fn decode_event(&self, event: i32, body: Bytes) -> Option<Result<Body>> {
        self.events
            .get(&event)
            .map(|decode| decode(PayloadReader::new(body)))
    }
}

impl Default for DecoderTable {
    fn default() -> Self {
        Self::new()
    }
}
