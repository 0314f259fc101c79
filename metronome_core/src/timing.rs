// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tick pulses and their acknowledgements.
//!
//! This module defines the values that flow between a tick source, the
//! scheduler, and the client:
//!
//! - [`TickPulse`]: one frame opportunity, analogous to a vsync signal
//! - [`TickAck`]: the scheduler's answer for each pulse it was handed
//! - [`ProducerWorkArgs`]: what the client receives when producer work is
//!   dispatched
//! - [`CommitEarlyOutReason`]: why producer work ended without a commit
//!
//! # Lifecycle
//!
//! 1. The tick source builds a [`TickPulse`] and hands it to
//!    [`Scheduler::on_tick()`](crate::scheduler::Scheduler::on_tick).
//! 2. The scheduler either drops it (answering [`TickResult::Skipped`]) or
//!    runs the tick, possibly handing the pulse on to the client inside
//!    [`ProducerWorkArgs`].
//! 3. When the tick ends, the scheduler reports a [`TickAck`] back to the tick
//!    source. Pulses are never stored beyond the tick they describe.

use crate::time::{Duration, HostTime};

/// Whether a pulse is fresh or a redelivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PulseKind {
    /// Delivered on schedule.
    Normal,
    /// Redelivered because the observer was not listening when it occurred.
    ///
    /// If its deadline has already passed when processed, it is dropped.
    Missed,
}

/// One periodic invitation to produce a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TickPulse {
    /// Identifies the tick source that produced the pulse.
    pub source_id: u64,
    /// Monotonically increasing per source.
    pub sequence_number: u64,
    /// When the pulse nominally occurred.
    pub frame_time: HostTime,
    /// Latest moment work for this tick should finish.
    pub deadline: HostTime,
    /// Nominal spacing to the next pulse.
    pub interval: Duration,
    /// Fresh or redelivered.
    pub kind: PulseKind,
}

impl TickPulse {
    /// Creates a [`PulseKind::Normal`] pulse.
    #[must_use]
    pub const fn normal(
        source_id: u64,
        sequence_number: u64,
        frame_time: HostTime,
        deadline: HostTime,
        interval: Duration,
    ) -> Self {
        Self {
            source_id,
            sequence_number,
            frame_time,
            deadline,
            interval,
            kind: PulseKind::Normal,
        }
    }

    /// Returns a copy of this pulse marked as a [`PulseKind::Missed`]
    /// redelivery.
    #[must_use]
    pub const fn as_missed(mut self) -> Self {
        self.kind = PulseKind::Missed;
        self
    }

    /// Returns a copy of this pulse with a different deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: HostTime) -> Self {
        self.deadline = deadline;
        self
    }

    /// The next nominal pulse boundary, `frame_time + interval`.
    #[must_use]
    pub const fn next_frame_time(&self) -> HostTime {
        self.frame_time.saturating_add(self.interval)
    }
}

/// How a pulse was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TickResult {
    /// The tick ran to completion (begin, deadline, idle).
    Finished,
    /// The pulse was dropped without running a tick.
    Skipped,
}

/// The acknowledgement the scheduler sends back for every pulse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TickAck {
    /// Source of the acknowledged pulse.
    pub source_id: u64,
    /// Sequence number of the acknowledged pulse.
    pub sequence_number: u64,
    /// Whether the tick ran or was dropped.
    pub result: TickResult,
    /// Whether a frame was submitted downstream during the tick.
    ///
    /// Always `false` for [`TickResult::Skipped`].
    pub did_submit_frame: bool,
}

impl TickAck {
    /// Builds an acknowledgement for `pulse`.
    ///
    /// `did_submit_frame` is only honoured for finished ticks.
    #[must_use]
    pub const fn new(pulse: &TickPulse, result: TickResult, did_submit_frame: bool) -> Self {
        Self {
            source_id: pulse.source_id,
            sequence_number: pulse.sequence_number,
            result,
            did_submit_frame: matches!(result, TickResult::Finished) && did_submit_frame,
        }
    }
}

/// Arguments handed to the client when producer work is dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProducerWorkArgs {
    /// The pulse that triggered the work, with its deadline already adjusted
    /// for draw time and jitter.
    pub pulse: TickPulse,
    /// False when impl-side latency currently takes priority, which allows
    /// the producer to deprioritize this round.
    pub on_critical_path: bool,
}

/// Why producer work finished without producing a commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommitEarlyOutReason {
    /// The output sink was lost while producer work was running.
    SinkLost,
    /// The surface became invisible.
    NotVisible,
    /// Commits were deferred while producer work was running.
    DeferredCommit,
    /// The producer ran but had nothing new to commit.
    FinishedNoUpdates,
}

impl CommitEarlyOutReason {
    /// Whether producer work should be requested again.
    ///
    /// Every reason except [`FinishedNoUpdates`](Self::FinishedNoUpdates)
    /// left the producer's changes unconsumed.
    #[must_use]
    pub const fn needs_retry(self) -> bool {
        !matches!(self, Self::FinishedNoUpdates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse() -> TickPulse {
        TickPulse::normal(
            1,
            7,
            HostTime::from_millis(100),
            HostTime::from_millis(114),
            Duration::from_millis(16),
        )
    }

    #[test]
    fn next_frame_time_is_one_interval_later() {
        assert_eq!(pulse().next_frame_time(), HostTime::from_millis(116), "frame_time + interval");
    }

    #[test]
    fn as_missed_keeps_identity() {
        let missed = pulse().as_missed();
        assert_eq!(missed.kind, PulseKind::Missed, "kind changes");
        assert_eq!(missed.sequence_number, 7, "sequence number preserved");
    }

    #[test]
    fn skipped_ack_never_reports_submission() {
        let ack = TickAck::new(&pulse(), TickResult::Skipped, true);
        assert!(!ack.did_submit_frame, "skipped ticks cannot submit");
        let ack = TickAck::new(&pulse(), TickResult::Finished, true);
        assert!(ack.did_submit_frame, "finished ticks keep the flag");
        assert_eq!(ack.sequence_number, 7, "ack identifies the pulse");
    }

    #[test]
    fn only_no_updates_skips_retry() {
        assert!(!CommitEarlyOutReason::FinishedNoUpdates.needs_retry(), "nothing to redo");
        assert!(CommitEarlyOutReason::SinkLost.needs_retry(), "sink loss retries");
        assert!(CommitEarlyOutReason::NotVisible.needs_retry(), "visibility retries");
        assert!(CommitEarlyOutReason::DeferredCommit.needs_retry(), "deferral retries");
    }
}
