//! Request and event code tables.
//!
//! A representative slice of the daemon's command set. The full set runs to
//! hundreds of codes; every one of them is the same envelope pattern, so new
//! codes only need a constant here and a decoder registration in
//! [`body::DecoderTable`](crate::body::DecoderTable).

/// Query SIM card status.
pub const GET_SIM_STATUS: i32 = 1;
/// List calls currently known to the modem.
pub const GET_CURRENT_CALLS: i32 = 9;
/// Originate a voice call.
pub const DIAL: i32 = 10;
/// Read the subscriber identity.
pub const GET_IMSI: i32 = 11;
/// Hang up a specific call by index.
pub const HANGUP: i32 = 12;
/// Hang up waiting or background calls.
pub const HANGUP_WAITING_OR_BACKGROUND: i32 = 13;
/// Hang up the foreground call and resume the background one.
pub const HANGUP_FOREGROUND_RESUME_BACKGROUND: i32 = 14;
/// Swap the waiting/holding call with the active call.
pub const SWITCH_WAITING_OR_HOLDING_AND_ACTIVE: i32 = 15;
/// Merge calls into a conference.
pub const CONFERENCE: i32 = 16;
/// Reject a waiting call (user determined user busy).
pub const UDUB: i32 = 17;
/// Reason the most recent call ended.
pub const LAST_CALL_FAIL_CAUSE: i32 = 18;
/// Poll current signal strength.
pub const SIGNAL_STRENGTH: i32 = 19;
/// Power the radio on or off.
pub const RADIO_POWER: i32 = 23;
/// Send a single DTMF tone.
pub const DTMF: i32 = 24;
/// Read the device identity.
pub const GET_IMEI: i32 = 38;
/// Answer an incoming call.
pub const ANSWER: i32 = 40;
/// Begin playing a DTMF tone in an active call.
pub const DTMF_START: i32 = 49;
/// Stop the currently playing DTMF tone.
pub const DTMF_STOP: i32 = 50;
/// Read the baseband firmware version.
pub const BASEBAND_VERSION: i32 = 51;
/// Split one connection out of a conference.
pub const SEPARATE_CONNECTION: i32 = 52;
/// Connect the held call to the other party and drop out.
pub const EXPLICIT_CALL_TRANSFER: i32 = 72;

/// Unsolicited event codes, plus the one synthetic code the engine itself
/// publishes.
pub mod events {
    /// Synthetic link transition event published by the engine. The body is
    /// a single integer: the daemon's negotiated version, or -1 after the
    /// connection drops. Never decoded from the wire.
    pub const CONNECTION_CHANGED: i32 = -1;

    /// Overall radio state changed.
    pub const RADIO_STATE_CHANGED: i32 = 1000;
    /// Call list changed; poll with GET_CURRENT_CALLS.
    pub const CALL_STATE_CHANGED: i32 = 1001;
    /// Voice network registration changed.
    pub const NETWORK_STATE_CHANGED: i32 = 1002;
    /// New SMS delivered, PDU in the body.
    pub const NEW_SMS: i32 = 1003;
    /// Network time received.
    pub const NITZ_TIME_RECEIVED: i32 = 1008;
    /// Periodic signal strength report.
    pub const SIGNAL_STRENGTH: i32 = 1009;
    /// Incoming call ring indication.
    pub const CALL_RING: i32 = 1018;
    /// SIM status changed; poll with GET_SIM_STATUS.
    pub const SIM_STATUS_CHANGED: i32 = 1019;
    /// The daemon announces itself and its protocol version.
    pub const RADIO_CONNECTED: i32 = 1034;
}

/// True for the call-supervision family that must be serialized against
/// in-call DTMF sequences.
pub fn is_chld_class(request: i32) -> bool {
    matches!(
        request,
        HANGUP_WAITING_OR_BACKGROUND
            | HANGUP_FOREGROUND_RESUME_BACKGROUND
            | SWITCH_WAITING_OR_HOLDING_AND_ACTIVE
            | CONFERENCE
            | UDUB
            | SEPARATE_CONNECTION
            | EXPLICIT_CALL_TRANSFER
    )
}

/// Human-readable request name for logging.
pub fn request_name(code: i32) -> &'static str {
    match code {
        GET_SIM_STATUS => "GET_SIM_STATUS",
        GET_CURRENT_CALLS => "GET_CURRENT_CALLS",
        DIAL => "DIAL",
        GET_IMSI => "GET_IMSI",
        HANGUP => "HANGUP",
        HANGUP_WAITING_OR_BACKGROUND => "HANGUP_WAITING_OR_BACKGROUND",
        HANGUP_FOREGROUND_RESUME_BACKGROUND => "HANGUP_FOREGROUND_RESUME_BACKGROUND",
        SWITCH_WAITING_OR_HOLDING_AND_ACTIVE => "SWITCH_WAITING_OR_HOLDING_AND_ACTIVE",
        CONFERENCE => "CONFERENCE",
        UDUB => "UDUB",
        LAST_CALL_FAIL_CAUSE => "LAST_CALL_FAIL_CAUSE",
        SIGNAL_STRENGTH => "SIGNAL_STRENGTH",
        RADIO_POWER => "RADIO_POWER",
        DTMF => "DTMF",
        GET_IMEI => "GET_IMEI",
        ANSWER => "ANSWER",
        DTMF_START => "DTMF_START",
        DTMF_STOP => "DTMF_STOP",
        BASEBAND_VERSION => "BASEBAND_VERSION",
        SEPARATE_CONNECTION => "SEPARATE_CONNECTION",
        EXPLICIT_CALL_TRANSFER => "EXPLICIT_CALL_TRANSFER",
        _ => "<unknown request>",
    }
}

/// Human-readable event name for logging.
pub fn event_name(code: i32) -> &'static str {
    match code {
        events::CONNECTION_CHANGED => "CONNECTION_CHANGED",
        events::RADIO_STATE_CHANGED => "RADIO_STATE_CHANGED",
        events::CALL_STATE_CHANGED => "CALL_STATE_CHANGED",
        events::NETWORK_STATE_CHANGED => "NETWORK_STATE_CHANGED",
        events::NEW_SMS => "NEW_SMS",
        events::NITZ_TIME_RECEIVED => "NITZ_TIME_RECEIVED",
        events::SIGNAL_STRENGTH => "SIGNAL_STRENGTH",
        events::CALL_RING => "CALL_RING",
        events::SIM_STATUS_CHANGED => "SIM_STATUS_CHANGED",
        events::RADIO_CONNECTED => "RADIO_CONNECTED",
        _ => "<unknown event>",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chld_class_membership() {
        assert!(is_chld_class(SWITCH_WAITING_OR_HOLDING_AND_ACTIVE));
        assert!(is_chld_class(CONFERENCE));
        assert!(is_chld_class(UDUB));
        assert!(is_chld_class(EXPLICIT_CALL_TRANSFER));

        assert!(!is_chld_class(DIAL));
        assert!(!is_chld_class(DTMF_START));
        assert!(!is_chld_class(DTMF_STOP));
    }

    #[test]
    fn test_name_tables() {
        assert_eq!(request_name(DIAL), "DIAL");
        assert_eq!(request_name(9999), "<unknown request>");
        assert_eq!(event_name(events::RADIO_CONNECTED), "RADIO_CONNECTED");
        assert_eq!(event_name(9999), "<unknown event>");
    }
}
