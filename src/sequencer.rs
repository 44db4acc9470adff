//! DTMF and call-supervision serialization.
//!
//! Two narrow policies sit above the generic dispatch path:
//!
//! 1. DTMF start/stop commands run strictly one at a time. A repeated
//!    start while a start is outstanding (or the tone already plays) is
//!    suppressed instead of queued; a repeated stop likewise.
//! 2. CHLD-class commands (hold, switch, conference, transfer) never
//!    interleave with an unresolved DTMF pair. A CHLD arriving mid-
//!    sequence truncates the DTMF queue to its head, appends a synthesized
//!    stop when the head is a start, and parks itself until the queue
//!    drains.
//!
//! The sequencer owns commands only while they wait; once it hands one
//! back for dispatch, the pending registry tracks it like any other.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::CommandError;
use crate::pending::CompletionSink;
use crate::requests;

/// Which half of a DTMF pair a queued command is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DtmfKind {
    Start,
    Stop,
}

/// A command the sequencer is holding back from the wire.
#[derive(Debug)]
pub(crate) struct HeldCommand {
    pub request: i32,
    pub payload: Bytes,
    pub sink: CompletionSink,
}

impl HeldCommand {
    pub fn new(request: i32, payload: Bytes, sink: CompletionSink) -> Self {
        Self {
            request,
            payload,
            sink,
        }
    }

    /// Stop command injected to close out a truncated DTMF sequence.
    /// Nobody awaits it; its reply is observed only by the sequencer.
    fn synthesized_stop() -> Self {
        Self {
            request: requests::DTMF_STOP,
            payload: Bytes::new(),
            sink: CompletionSink::discard(),
        }
    }

    fn complete_err(self, err: CommandError) {
        self.sink.complete(Err(err));
    }
}

/// Where the DTMF sequence currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SequencerState {
    /// No tone playing, nothing queued.
    Idle,
    /// A start is queued or awaiting its reply.
    StartPending,
    /// The last start succeeded; the tone is playing.
    StartActive,
    /// A stop is queued or awaiting its reply.
    StopPending,
}

/// Serializes DTMF pairs and CHLD-class commands.
#[derive(Debug, Default)]
pub(crate) struct DtmfSequencer {
    tone_active: bool,
    in_flight: Option<DtmfKind>,
    waiting: VecDeque<(DtmfKind, HeldCommand)>,
    pending_chld: Option<HeldCommand>,
    chld_in_flight: bool,
}

impl DtmfSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ahead-looking state: the newest queued item defines where the
    /// sequence is heading.
    pub fn state(&self) -> SequencerState {
        let newest = self.waiting.back().map(|(k, _)| *k).or(self.in_flight);
        match newest {
            Some(DtmfKind::Start) => SequencerState::StartPending,
            Some(DtmfKind::Stop) => SequencerState::StopPending,
            None if self.tone_active => SequencerState::StartActive,
            None => SequencerState::Idle,
        }
    }

    /// Accepts a DTMF start. Returns the command to put on the wire now,
    /// if the sequence allows one.
    pub fn start(&mut self, cmd: HeldCommand) -> Option<HeldCommand> {
        match self.state() {
            SequencerState::StartPending | SequencerState::StartActive => {
                tracing::debug!("Suppressing duplicate DTMF start");
                cmd.complete_err(CommandError::Cancelled);
                None
            }
            _ => {
                self.waiting.push_back((DtmfKind::Start, cmd));
                self.next_wire_command()
            }
        }
    }

    /// Accepts a DTMF stop, symmetric to [`start`](Self::start).
    pub fn stop(&mut self, cmd: HeldCommand) -> Option<HeldCommand> {
        match self.state() {
            SequencerState::StopPending => {
                tracing::debug!("Suppressing duplicate DTMF stop");
                cmd.complete_err(CommandError::Cancelled);
                None
            }
            _ => {
                self.waiting.push_back((DtmfKind::Stop, cmd));
                self.next_wire_command()
            }
        }
    }

    /// Accepts a CHLD-class command. If a DTMF sequence is outstanding the
    /// command is parked until the sequence drains: the DTMF queue is
    /// truncated to its head, and when that head is a start a synthesized
    /// stop is appended so the pair still resolves.
    pub fn submit_chld(&mut self, cmd: HeldCommand) -> Option<HeldCommand> {
        let head = self.in_flight.or_else(|| self.waiting.front().map(|(k, _)| *k));

        if let Some(head_kind) = head {
            tracing::debug!(
                "Deferring {} behind the outstanding DTMF sequence",
                requests::request_name(cmd.request)
            );
            // Keep the head if it is still waiting; an in-flight head has
            // already left the queue.
            let keep = usize::from(self.in_flight.is_none());
            self.truncate_waiting(keep);
            if head_kind == DtmfKind::Start {
                self.waiting
                    .push_back((DtmfKind::Stop, HeldCommand::synthesized_stop()));
            }
            self.park_chld(cmd);
            return self.next_wire_command();
        }

        if self.chld_in_flight {
            tracing::debug!(
                "Deferring {} behind the in-flight supervision command",
                requests::request_name(cmd.request)
            );
            self.park_chld(cmd);
            return None;
        }

        self.chld_in_flight = true;
        Some(cmd)
    }

    /// Notes that a dispatched DTMF command finished (reply arrived or the
    /// send failed). Returns the next command to put on the wire, if any.
    pub fn note_dtmf_complete(&mut self, kind: DtmfKind, ok: bool) -> Option<HeldCommand> {
        if self.in_flight != Some(kind) {
            return None;
        }
        self.in_flight = None;
        self.tone_active = match kind {
            DtmfKind::Start => ok,
            DtmfKind::Stop => false,
        };
        self.next_wire_command()
    }

    /// Notes that the in-flight CHLD-class command finished.
    pub fn note_chld_complete(&mut self) -> Option<HeldCommand> {
        if !self.chld_in_flight {
            return None;
        }
        self.chld_in_flight = false;
        self.next_wire_command()
    }

    /// Fails every held command, for connection-drop bulk failure.
    /// Commands already dispatched are the pending registry's problem.
    pub fn fail_all(&mut self) {
        for (_, cmd) in self.waiting.drain(..) {
            cmd.complete_err(CommandError::RadioNotAvailable);
        }
        if let Some(cmd) = self.pending_chld.take() {
            cmd.complete_err(CommandError::RadioNotAvailable);
        }
        self.tone_active = false;
        self.in_flight = None;
        self.chld_in_flight = false;
    }

    fn next_wire_command(&mut self) -> Option<HeldCommand> {
        if self.in_flight.is_some() || self.chld_in_flight {
            return None;
        }
        if let Some((kind, cmd)) = self.waiting.pop_front() {
            self.in_flight = Some(kind);
            return Some(cmd);
        }
        if let Some(cmd) = self.pending_chld.take() {
            self.chld_in_flight = true;
            return Some(cmd);
        }
        None
    }

    fn truncate_waiting(&mut self, keep: usize) {
        while self.waiting.len() > keep {
            if let Some((_, cmd)) = self.waiting.pop_back() {
                cmd.complete_err(CommandError::Cancelled);
            }
        }
    }

    fn park_chld(&mut self, cmd: HeldCommand) {
        // At most one deferred supervision command; the newest wins.
        if let Some(old) = self.pending_chld.replace(cmd) {
            old.complete_err(CommandError::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::Completion;
    use crate::requests::{CONFERENCE, DTMF_START, DTMF_STOP, SWITCH_WAITING_OR_HOLDING_AND_ACTIVE};

    fn start_cmd() -> (HeldCommand, Completion) {
        let (sink, completion) = CompletionSink::pair();
        (
            HeldCommand::new(DTMF_START, Bytes::from_static(b"\x00\x00\x00\x011"), sink),
            completion,
        )
    }

    fn stop_cmd() -> (HeldCommand, Completion) {
        let (sink, completion) = CompletionSink::pair();
        (HeldCommand::new(DTMF_STOP, Bytes::new(), sink), completion)
    }

    fn chld_cmd(request: i32) -> (HeldCommand, Completion) {
        let (sink, completion) = CompletionSink::pair();
        (HeldCommand::new(request, Bytes::new(), sink), completion)
    }

    #[tokio::test]
    async fn test_start_dispatches_when_idle() {
        let mut seq = DtmfSequencer::new();
        let (cmd, _completion) = start_cmd();

        let out = seq.start(cmd).unwrap();
        assert_eq!(out.request, DTMF_START);
        assert_eq!(seq.state(), SequencerState::StartPending);
    }

    #[tokio::test]
    async fn test_duplicate_start_suppressed() {
        let mut seq = DtmfSequencer::new();
        let (first, _first_completion) = start_cmd();
        assert!(seq.start(first).is_some());

        let (second, second_completion) = start_cmd();
        assert!(seq.start(second).is_none());
        assert_eq!(second_completion.await, Err(CommandError::Cancelled));
    }

    #[tokio::test]
    async fn test_start_suppressed_while_tone_active() {
        let mut seq = DtmfSequencer::new();
        let (first, _c) = start_cmd();
        let out = seq.start(first).unwrap();
        assert!(seq.note_dtmf_complete(DtmfKind::Start, true).is_none());
        drop(out);
        assert_eq!(seq.state(), SequencerState::StartActive);

        let (second, completion) = start_cmd();
        assert!(seq.start(second).is_none());
        assert_eq!(completion.await, Err(CommandError::Cancelled));
    }

    #[tokio::test]
    async fn test_stop_queues_behind_inflight_start() {
        let mut seq = DtmfSequencer::new();
        let (start, _sc) = start_cmd();
        assert!(seq.start(start).is_some());

        let (stop, _pc) = stop_cmd();
        assert!(seq.stop(stop).is_none());
        assert_eq!(seq.state(), SequencerState::StopPending);

        // Start resolves; the queued stop goes out next.
        let next = seq.note_dtmf_complete(DtmfKind::Start, true).unwrap();
        assert_eq!(next.request, DTMF_STOP);

        assert!(seq.note_dtmf_complete(DtmfKind::Stop, true).is_none());
        assert_eq!(seq.state(), SequencerState::Idle);
    }

    #[tokio::test]
    async fn test_duplicate_stop_suppressed() {
        let mut seq = DtmfSequencer::new();
        let (start, _sc) = start_cmd();
        assert!(seq.start(start).is_some());
        let (stop_a, _ac) = stop_cmd();
        assert!(seq.stop(stop_a).is_none());

        let (stop_b, completion) = stop_cmd();
        assert!(seq.stop(stop_b).is_none());
        assert_eq!(completion.await, Err(CommandError::Cancelled));
    }

    #[tokio::test]
    async fn test_stop_when_idle_passes_through() {
        let mut seq = DtmfSequencer::new();
        let (stop, _completion) = stop_cmd();
        let out = seq.stop(stop).unwrap();
        assert_eq!(out.request, DTMF_STOP);
    }

    #[tokio::test]
    async fn test_failed_start_still_advances_queue() {
        let mut seq = DtmfSequencer::new();
        let (start, _sc) = start_cmd();
        assert!(seq.start(start).is_some());
        let (stop, _pc) = stop_cmd();
        assert!(seq.stop(stop).is_none());

        let next = seq.note_dtmf_complete(DtmfKind::Start, false).unwrap();
        assert_eq!(next.request, DTMF_STOP);
        // The tone never began playing.
        assert_eq!(seq.state(), SequencerState::StopPending);
    }

    #[tokio::test]
    async fn test_chld_immediate_when_quiet() {
        let mut seq = DtmfSequencer::new();
        let (cmd, _completion) = chld_cmd(CONFERENCE);
        let out = seq.submit_chld(cmd).unwrap();
        assert_eq!(out.request, CONFERENCE);
    }

    #[tokio::test]
    async fn test_chld_parks_behind_start_and_synthesizes_stop() {
        let mut seq = DtmfSequencer::new();
        let (start, _sc) = start_cmd();
        assert!(seq.start(start).is_some());
        let (stop, stop_completion) = stop_cmd();
        assert!(seq.stop(stop).is_none());

        // CHLD arrives mid-sequence: queue truncates to the in-flight
        // start, the user's stop is cancelled, a synthesized stop takes
        // its place, the CHLD parks.
        let (chld, _cc) = chld_cmd(CONFERENCE);
        assert!(seq.submit_chld(chld).is_none());
        assert_eq!(stop_completion.await, Err(CommandError::Cancelled));

        let synth = seq.note_dtmf_complete(DtmfKind::Start, true).unwrap();
        assert_eq!(synth.request, DTMF_STOP);

        let chld_out = seq.note_dtmf_complete(DtmfKind::Stop, true).unwrap();
        assert_eq!(chld_out.request, CONFERENCE);

        assert!(seq.note_chld_complete().is_none());
        assert_eq!(seq.state(), SequencerState::Idle);
    }

    #[tokio::test]
    async fn test_chld_behind_stop_head_drops_rest() {
        let mut seq = DtmfSequencer::new();
        let (stop, _sc) = stop_cmd();
        assert!(seq.stop(stop).is_some());
        let (start, start_completion) = start_cmd();
        assert!(seq.start(start).is_none());

        let (chld, _cc) = chld_cmd(SWITCH_WAITING_OR_HOLDING_AND_ACTIVE);
        assert!(seq.submit_chld(chld).is_none());
        assert_eq!(start_completion.await, Err(CommandError::Cancelled));

        // No synthesized stop when the head already is one.
        let chld_out = seq.note_dtmf_complete(DtmfKind::Stop, true).unwrap();
        assert_eq!(chld_out.request, SWITCH_WAITING_OR_HOLDING_AND_ACTIVE);
    }

    #[tokio::test]
    async fn test_chld_serializes_with_chld() {
        let mut seq = DtmfSequencer::new();
        let (first, _fc) = chld_cmd(CONFERENCE);
        assert!(seq.submit_chld(first).is_some());

        let (second, _sc) = chld_cmd(SWITCH_WAITING_OR_HOLDING_AND_ACTIVE);
        assert!(seq.submit_chld(second).is_none());

        let out = seq.note_chld_complete().unwrap();
        assert_eq!(out.request, SWITCH_WAITING_OR_HOLDING_AND_ACTIVE);
    }

    #[tokio::test]
    async fn test_newest_parked_chld_wins() {
        let mut seq = DtmfSequencer::new();
        let (first, _fc) = chld_cmd(CONFERENCE);
        assert!(seq.submit_chld(first).is_some());

        let (second, second_completion) = chld_cmd(CONFERENCE);
        assert!(seq.submit_chld(second).is_none());
        let (third, _tc) = chld_cmd(SWITCH_WAITING_OR_HOLDING_AND_ACTIVE);
        assert!(seq.submit_chld(third).is_none());

        assert_eq!(second_completion.await, Err(CommandError::Cancelled));
        let out = seq.note_chld_complete().unwrap();
        assert_eq!(out.request, SWITCH_WAITING_OR_HOLDING_AND_ACTIVE);
    }

    #[tokio::test]
    async fn test_fail_all_flushes_held_commands() {
        let mut seq = DtmfSequencer::new();
        let (start, _sc) = start_cmd();
        assert!(seq.start(start).is_some());
        let (stop, stop_completion) = stop_cmd();
        assert!(seq.stop(stop).is_none());
        let (chld, chld_completion) = chld_cmd(CONFERENCE);
        assert!(seq.submit_chld(chld).is_none());

        seq.fail_all();
        assert_eq!(seq.state(), SequencerState::Idle);
        // The stop was already cancelled by the CHLD truncation; the
        // parked CHLD fails with the bulk-failure error.
        assert_eq!(stop_completion.await, Err(CommandError::Cancelled));
        assert_eq!(
            chld_completion.await,
            Err(CommandError::RadioNotAvailable)
        );

        // A fresh sequence works after the flush.
        let (start, _c) = start_cmd();
        assert!(seq.start(start).is_some());
    }
}
