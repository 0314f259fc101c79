// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as tagged little-endian records. [`decode`] reads them back as an
//! iterator of [`RecordedEvent`], and [`RecordedEvent::replay`] feeds a
//! decoded event into any other sink.

use metronome_core::state_machine::{Action, DeadlineMode, DrawResult};
use metronome_core::time::{Duration, HostTime};
use metronome_core::timing::{PulseKind, TickResult};
use metronome_core::trace::{
    ActionEvent, DeadlineFiredEvent, DeadlineScheduledEvent, DrawResultEvent, DropReason,
    LatencyRecoveryEvent, RecoveryKind, TickDroppedEvent, TickFinishedEvent, TickReceivedEvent,
    TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_TICK_RECEIVED: u8 = 1;
const TAG_TICK_DROPPED: u8 = 2;
const TAG_DEADLINE_SCHEDULED: u8 = 3;
const TAG_DEADLINE_FIRED: u8 = 4;
const TAG_ACTION_BEGIN: u8 = 5;
const TAG_ACTION_END: u8 = 6;
const TAG_DRAW_RESULT: u8 = 7;
const TAG_LATENCY_RECOVERY: u8 = 8;
const TAG_TICK_FINISHED: u8 = 9;

// ---------------------------------------------------------------------------
// Enum codes
// ---------------------------------------------------------------------------

const DEADLINE_MODES: [DeadlineMode; 5] = [
    DeadlineMode::None,
    DeadlineMode::Immediate,
    DeadlineMode::Regular,
    DeadlineMode::Late,
    DeadlineMode::Blocked,
];

const DRAW_RESULTS: [DrawResult; 5] = [
    DrawResult::Success,
    DrawResult::AbortedCheckerboardAnimations,
    DrawResult::AbortedMissingHighResContent,
    DrawResult::AbortedCantDraw,
    DrawResult::AbortedDrainingPipeline,
];

const DROP_REASONS: [DropReason; 4] = [
    DropReason::NotNeeded,
    DropReason::StaleMissed,
    DropReason::NoLongerObserving,
    DropReason::ImplLatencyRecovery,
];

/// Index of `value` in `table`, as a one-byte code.
fn code_of<T: PartialEq>(table: &[T], value: &T) -> u8 {
    table
        .iter()
        .position(|v| v == value)
        .and_then(|i| u8::try_from(i).ok())
        .unwrap_or(u8::MAX)
}

fn from_code<T: Copy>(table: &[T], code: u8) -> Option<T> {
    table.get(usize::from(code)).copied()
}

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Discards everything recorded so far.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_time(&mut self, t: HostTime) {
        self.write_u64(t.nanos());
    }

    fn write_option_time(&mut self, v: Option<HostTime>) {
        match v {
            Some(t) => {
                self.write_u8(1);
                self.write_time(t);
            }
            None => {
                self.write_u8(0);
                self.write_u64(0);
            }
        }
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_action(&mut self, action: Action) {
        self.write_u8(code_of(&Action::ALL, &action));
    }

    fn write_tick_id(&mut self, source_id: u64, sequence_number: u64) {
        self.write_u64(source_id);
        self.write_u64(sequence_number);
    }

    fn write_action_event(&mut self, tag: u8, e: &ActionEvent) {
        self.write_u8(tag);
        self.write_u64(e.frame_number);
        self.write_action(e.action);
        self.write_time(e.timestamp);
    }
}

impl TraceSink for RecorderSink {
    fn on_tick_received(&mut self, e: &TickReceivedEvent) {
        self.write_u8(TAG_TICK_RECEIVED);
        self.write_tick_id(e.source_id, e.sequence_number);
        self.write_time(e.frame_time);
        self.write_time(e.deadline);
        self.write_u64(e.interval.nanos());
        self.write_bool(e.kind == PulseKind::Missed);
        self.write_time(e.now);
    }

    fn on_tick_dropped(&mut self, e: &TickDroppedEvent) {
        self.write_u8(TAG_TICK_DROPPED);
        self.write_tick_id(e.source_id, e.sequence_number);
        self.write_u8(code_of(&DROP_REASONS, &e.reason));
        self.write_time(e.now);
    }

    fn on_deadline_scheduled(&mut self, e: &DeadlineScheduledEvent) {
        self.write_u8(TAG_DEADLINE_SCHEDULED);
        self.write_u64(e.frame_number);
        self.write_u8(code_of(&DEADLINE_MODES, &e.mode));
        self.write_option_time(e.fire_at);
        self.write_time(e.now);
    }

    fn on_deadline_fired(&mut self, e: &DeadlineFiredEvent) {
        self.write_u8(TAG_DEADLINE_FIRED);
        self.write_u64(e.frame_number);
        self.write_time(e.now);
    }

    fn on_action_begin(&mut self, e: &ActionEvent) {
        self.write_action_event(TAG_ACTION_BEGIN, e);
    }

    fn on_action_end(&mut self, e: &ActionEvent) {
        self.write_action_event(TAG_ACTION_END, e);
    }

    fn on_draw_result(&mut self, e: &DrawResultEvent) {
        self.write_u8(TAG_DRAW_RESULT);
        self.write_u64(e.frame_number);
        self.write_action(e.action);
        self.write_u8(code_of(&DRAW_RESULTS, &e.result));
        self.write_time(e.timestamp);
    }

    fn on_latency_recovery(&mut self, e: &LatencyRecoveryEvent) {
        self.write_u8(TAG_LATENCY_RECOVERY);
        self.write_tick_id(e.source_id, e.sequence_number);
        self.write_bool(e.kind == RecoveryKind::Impl);
        self.write_time(e.now);
    }

    fn on_tick_finished(&mut self, e: &TickFinishedEvent) {
        self.write_u8(TAG_TICK_FINISHED);
        self.write_tick_id(e.source_id, e.sequence_number);
        self.write_u64(e.frame_number);
        self.write_bool(e.result == TickResult::Skipped);
        self.write_bool(e.did_submit_frame);
        self.write_time(e.began_at);
        self.write_time(e.finished_at);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A [`TickReceivedEvent`].
    TickReceived(TickReceivedEvent),
    /// A [`TickDroppedEvent`].
    TickDropped(TickDroppedEvent),
    /// A [`DeadlineScheduledEvent`].
    DeadlineScheduled(DeadlineScheduledEvent),
    /// A [`DeadlineFiredEvent`].
    DeadlineFired(DeadlineFiredEvent),
    /// An action began.
    ActionBegin(ActionEvent),
    /// An action ended.
    ActionEnd(ActionEvent),
    /// A [`DrawResultEvent`].
    DrawResult(DrawResultEvent),
    /// A [`LatencyRecoveryEvent`].
    LatencyRecovery(LatencyRecoveryEvent),
    /// A [`TickFinishedEvent`].
    TickFinished(TickFinishedEvent),
}

impl RecordedEvent {
    /// Delivers this event to `sink` as if the scheduler had emitted it.
    pub fn replay(&self, sink: &mut dyn TraceSink) {
        match self {
            Self::TickReceived(e) => sink.on_tick_received(e),
            Self::TickDropped(e) => sink.on_tick_dropped(e),
            Self::DeadlineScheduled(e) => sink.on_deadline_scheduled(e),
            Self::DeadlineFired(e) => sink.on_deadline_fired(e),
            Self::ActionBegin(e) => sink.on_action_begin(e),
            Self::ActionEnd(e) => sink.on_action_end(e),
            Self::DrawResult(e) => sink.on_draw_result(e),
            Self::LatencyRecovery(e) => sink.on_latency_recovery(e),
            Self::TickFinished(e) => sink.on_tick_finished(e),
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
///
/// Iteration stops at the first truncated record or unknown tag.
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Option<u8> {
        let v = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(v)
    }

    fn read_u64(&mut self) -> Option<u64> {
        if self.remaining() < 8 {
            return None;
        }
        let v = u64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().ok()?);
        self.pos += 8;
        Some(v)
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_option_time(&mut self) -> Option<Option<HostTime>> {
        let present = self.read_u8()?;
        let t = self.read_time()?;
        Some((present != 0).then_some(t))
    }

    fn read_bool(&mut self) -> Option<bool> {
        self.read_u8().map(|v| v != 0)
    }

    fn read_action(&mut self) -> Option<Action> {
        from_code(&Action::ALL, self.read_u8()?)
    }

    fn decode_tick_received(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::TickReceived(TickReceivedEvent {
            source_id: self.read_u64()?,
            sequence_number: self.read_u64()?,
            frame_time: self.read_time()?,
            deadline: self.read_time()?,
            interval: Duration(self.read_u64()?),
            kind: if self.read_bool()? {
                PulseKind::Missed
            } else {
                PulseKind::Normal
            },
            now: self.read_time()?,
        }))
    }

    fn decode_tick_dropped(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::TickDropped(TickDroppedEvent {
            source_id: self.read_u64()?,
            sequence_number: self.read_u64()?,
            reason: from_code(&DROP_REASONS, self.read_u8()?)?,
            now: self.read_time()?,
        }))
    }

    fn decode_deadline_scheduled(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::DeadlineScheduled(DeadlineScheduledEvent {
            frame_number: self.read_u64()?,
            mode: from_code(&DEADLINE_MODES, self.read_u8()?)?,
            fire_at: self.read_option_time()?,
            now: self.read_time()?,
        }))
    }

    fn decode_deadline_fired(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::DeadlineFired(DeadlineFiredEvent {
            frame_number: self.read_u64()?,
            now: self.read_time()?,
        }))
    }

    fn decode_action(&mut self) -> Option<ActionEvent> {
        Some(ActionEvent {
            frame_number: self.read_u64()?,
            action: self.read_action()?,
            timestamp: self.read_time()?,
        })
    }

    fn decode_draw_result(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::DrawResult(DrawResultEvent {
            frame_number: self.read_u64()?,
            action: self.read_action()?,
            result: from_code(&DRAW_RESULTS, self.read_u8()?)?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_latency_recovery(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::LatencyRecovery(LatencyRecoveryEvent {
            source_id: self.read_u64()?,
            sequence_number: self.read_u64()?,
            kind: if self.read_bool()? {
                RecoveryKind::Impl
            } else {
                RecoveryKind::Producer
            },
            now: self.read_time()?,
        }))
    }

    fn decode_tick_finished(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::TickFinished(TickFinishedEvent {
            source_id: self.read_u64()?,
            sequence_number: self.read_u64()?,
            frame_number: self.read_u64()?,
            result: if self.read_bool()? {
                TickResult::Skipped
            } else {
                TickResult::Finished
            },
            did_submit_frame: self.read_bool()?,
            began_at: self.read_time()?,
            finished_at: self.read_time()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_TICK_RECEIVED => self.decode_tick_received(),
            TAG_TICK_DROPPED => self.decode_tick_dropped(),
            TAG_DEADLINE_SCHEDULED => self.decode_deadline_scheduled(),
            TAG_DEADLINE_FIRED => self.decode_deadline_fired(),
            TAG_ACTION_BEGIN => self.decode_action().map(RecordedEvent::ActionBegin),
            TAG_ACTION_END => self.decode_action().map(RecordedEvent::ActionEnd),
            TAG_DRAW_RESULT => self.decode_draw_result(),
            TAG_LATENCY_RECOVERY => self.decode_latency_recovery(),
            TAG_TICK_FINISHED => self.decode_tick_finished(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use metronome_core::timing::TickPulse;

    fn received() -> TickReceivedEvent {
        let pulse = TickPulse::normal(
            1,
            7,
            HostTime::from_millis(16),
            HostTime::from_millis(30),
            Duration::from_millis(16),
        )
        .as_missed();
        TickReceivedEvent::new(&pulse, HostTime::from_millis(17))
    }

    #[test]
    fn one_tick_decodes_in_order() {
        let mut rec = RecorderSink::new();
        let t = HostTime::from_millis(17);
        let tick = received();
        let scheduled = DeadlineScheduledEvent {
            frame_number: 3,
            mode: DeadlineMode::Regular,
            fire_at: Some(HostTime::from_millis(29)),
            now: t,
        };
        let begin = ActionEvent {
            frame_number: 3,
            action: Action::DrawIfPossible,
            timestamp: t,
        };
        let draw = DrawResultEvent {
            frame_number: 3,
            action: Action::DrawIfPossible,
            result: DrawResult::AbortedCheckerboardAnimations,
            timestamp: t,
        };
        let finished = TickFinishedEvent {
            source_id: 1,
            sequence_number: 7,
            frame_number: 3,
            result: TickResult::Finished,
            did_submit_frame: false,
            began_at: t,
            finished_at: HostTime::from_millis(29),
        };
        rec.on_tick_received(&tick);
        rec.on_deadline_scheduled(&scheduled);
        rec.on_action_begin(&begin);
        rec.on_draw_result(&draw);
        rec.on_action_end(&begin);
        rec.on_tick_finished(&finished);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(
            events,
            [
                RecordedEvent::TickReceived(tick),
                RecordedEvent::DeadlineScheduled(scheduled),
                RecordedEvent::ActionBegin(begin),
                RecordedEvent::DrawResult(draw),
                RecordedEvent::ActionEnd(begin),
                RecordedEvent::TickFinished(finished),
            ],
            "every field survives the recording"
        );
    }

    #[test]
    fn unarmed_deadline_and_drop_reasons() {
        let mut rec = RecorderSink::new();
        rec.on_deadline_scheduled(&DeadlineScheduledEvent {
            frame_number: 1,
            mode: DeadlineMode::Blocked,
            fire_at: None,
            now: HostTime::ZERO,
        });
        for reason in DROP_REASONS {
            rec.on_tick_dropped(&TickDroppedEvent {
                source_id: 1,
                sequence_number: 2,
                reason,
                now: HostTime::ZERO,
            });
        }

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 5, "one deadline plus four drops");
        match events[0] {
            RecordedEvent::DeadlineScheduled(e) => {
                assert_eq!(e.mode, DeadlineMode::Blocked, "mode kept");
                assert_eq!(e.fire_at, None, "unarmed stays unarmed");
            }
            other => panic!("expected DeadlineScheduled, got {other:?}"),
        }
        let reasons: Vec<_> = events[1..]
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::TickDropped(d) => Some(d.reason),
                _ => None,
            })
            .collect();
        assert_eq!(reasons, DROP_REASONS, "reasons decode in order");
    }

    #[test]
    fn truncated_record_stops_iteration() {
        let mut rec = RecorderSink::new();
        rec.on_deadline_fired(&DeadlineFiredEvent {
            frame_number: 1,
            now: HostTime(5),
        });
        rec.on_deadline_fired(&DeadlineFiredEvent {
            frame_number: 2,
            now: HostTime(6),
        });
        let bytes = rec.into_bytes();
        let cut = &bytes[..bytes.len() - 3];
        assert_eq!(decode(cut).count(), 1, "only the complete record decodes");
    }

    #[test]
    fn empty_buffer_decodes_to_nothing() {
        assert_eq!(decode(&[]).count(), 0, "no events");
    }

    #[test]
    fn replay_reaches_another_sink() {
        let mut rec = RecorderSink::new();
        rec.on_latency_recovery(&LatencyRecoveryEvent {
            source_id: 1,
            sequence_number: 4,
            kind: RecoveryKind::Impl,
            now: HostTime(9),
        });
        let mut copy = RecorderSink::new();
        for event in decode(rec.as_bytes()) {
            event.replay(&mut copy);
        }
        assert_eq!(copy.as_bytes(), rec.as_bytes(), "replay re-encodes identically");
    }
}
