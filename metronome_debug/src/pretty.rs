// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Times are
//! printed in milliseconds.

use std::io::{self, Write};

use metronome_core::time::HostTime;
use metronome_core::timing::PulseKind;
use metronome_core::trace::{
    ActionEvent, DeadlineFiredEvent, DeadlineScheduledEvent, DrawResultEvent,
    LatencyRecoveryEvent, RecoveryKind, TickDroppedEvent, TickFinishedEvent, TickReceivedEvent,
    TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
///
/// Action begin/end pairs are folded into a single line printed at the end.
/// Write errors are dropped; call [`flush`](Self::flush) to observe them.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(io::stderr()),
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Flushes the destination.
    ///
    /// # Errors
    ///
    /// Returns the destination's flush error.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Consumes the sink and returns the destination.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn ms(t: HostTime) -> f64 {
    t.nanos() as f64 / 1_000_000.0
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_tick_received(&mut self, e: &TickReceivedEvent) {
        let missed = if e.kind == PulseKind::Missed { " MISSED" } else { "" };
        let _ = writeln!(
            self.writer,
            "[tick] seq={}{missed} frame_time={:.3}ms deadline={:.3}ms now={:.3}ms",
            e.sequence_number,
            ms(e.frame_time),
            ms(e.deadline),
            ms(e.now),
        );
    }

    fn on_tick_dropped(&mut self, e: &TickDroppedEvent) {
        let _ = writeln!(
            self.writer,
            "[drop] seq={} reason={:?} at {:.3}ms",
            e.sequence_number,
            e.reason,
            ms(e.now),
        );
    }

    fn on_deadline_scheduled(&mut self, e: &DeadlineScheduledEvent) {
        match e.fire_at {
            Some(at) => {
                let _ = writeln!(
                    self.writer,
                    "[deadline] frame={} mode={} fire_at={:.3}ms",
                    e.frame_number,
                    e.mode.as_str(),
                    ms(at),
                );
            }
            None => {
                let _ = writeln!(
                    self.writer,
                    "[deadline] frame={} mode={} unarmed",
                    e.frame_number,
                    e.mode.as_str(),
                );
            }
        }
    }

    fn on_deadline_fired(&mut self, e: &DeadlineFiredEvent) {
        let _ = writeln!(
            self.writer,
            "[deadline:fired] frame={} at {:.3}ms",
            e.frame_number,
            ms(e.now),
        );
    }

    fn on_action_end(&mut self, e: &ActionEvent) {
        let _ = writeln!(
            self.writer,
            "[action] frame={} {} at {:.3}ms",
            e.frame_number,
            e.action,
            ms(e.timestamp),
        );
    }

    fn on_draw_result(&mut self, e: &DrawResultEvent) {
        let _ = writeln!(
            self.writer,
            "[draw] frame={} {} -> {:?}",
            e.frame_number, e.action, e.result,
        );
    }

    fn on_latency_recovery(&mut self, e: &LatencyRecoveryEvent) {
        let what = match e.kind {
            RecoveryKind::Producer => "skip producer work",
            RecoveryKind::Impl => "drop tick",
        };
        let _ = writeln!(
            self.writer,
            "[recovery] seq={} {what} at {:.3}ms",
            e.sequence_number,
            ms(e.now),
        );
    }

    fn on_tick_finished(&mut self, e: &TickFinishedEvent) {
        let submitted = if e.did_submit_frame { "frame" } else { "no frame" };
        let took = e.finished_at.saturating_duration_since(e.began_at);
        let _ = writeln!(
            self.writer,
            "[tick:done] seq={} frame={} {submitted} took={:.3}ms",
            e.sequence_number,
            e.frame_number,
            took.as_millis_f64(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metronome_core::state_machine::{Action, DeadlineMode, DrawResult};
    use metronome_core::timing::TickResult;

    fn output(sink: PrettyPrintSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_inner()).expect("utf-8 output")
    }

    #[test]
    fn deadline_lines_show_mode_and_target() {
        let mut sink = PrettyPrintSink::with_writer(Vec::new());
        sink.on_deadline_scheduled(&DeadlineScheduledEvent {
            frame_number: 2,
            mode: DeadlineMode::Regular,
            fire_at: Some(HostTime::from_millis(29)),
            now: HostTime::from_millis(16),
        });
        sink.on_deadline_scheduled(&DeadlineScheduledEvent {
            frame_number: 2,
            mode: DeadlineMode::Blocked,
            fire_at: None,
            now: HostTime::from_millis(17),
        });
        let out = output(sink);
        assert!(out.contains("mode=regular fire_at=29.000ms"), "got: {out}");
        assert!(out.contains("mode=blocked unarmed"), "got: {out}");
    }

    #[test]
    fn actions_print_once() {
        let mut sink = PrettyPrintSink::with_writer(Vec::new());
        let e = ActionEvent {
            frame_number: 4,
            action: Action::DrawIfPossible,
            timestamp: HostTime::from_millis(20),
        };
        sink.on_action_begin(&e);
        sink.on_draw_result(&DrawResultEvent {
            frame_number: 4,
            action: Action::DrawIfPossible,
            result: DrawResult::Success,
            timestamp: HostTime::from_millis(21),
        });
        sink.on_action_end(&e);
        sink.on_tick_finished(&TickFinishedEvent {
            source_id: 1,
            sequence_number: 4,
            frame_number: 4,
            result: TickResult::Finished,
            did_submit_frame: true,
            began_at: HostTime::from_millis(16),
            finished_at: HostTime::from_millis(22),
        });
        let out = output(sink);
        assert_eq!(out.matches("draw_if_possible").count(), 2, "draw line plus action line: {out}");
        assert!(out.contains("-> Success"), "got: {out}");
        assert!(out.contains("frame took=6.000ms"), "got: {out}");
    }
}
