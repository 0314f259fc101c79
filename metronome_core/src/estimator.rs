// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pipeline stage duration estimates.
//!
//! The scheduler needs rough answers to "how long will this stage take" to
//! adjust pulse deadlines and to decide whether latency recovery can pay off.
//! A [`DurationEstimator`] supplies those answers and receives stage
//! start/end hooks it may learn from.
//!
//! Two implementations are provided:
//!
//! - [`FixedEstimates`]: constant answers, ignores every hook.
//! - [`RollingTimingHistory`]: learns from a bounded ring of recent samples
//!   and answers with a percentile.
//!
//! Estimators never fail. With no history they answer a default.

use alloc::vec::Vec;

use crate::time::{Duration, HostTime};

/// Read-only stage estimates plus optional recording hooks.
pub trait DurationEstimator {
    /// Dispatching producer work until the producer starts.
    fn producer_dispatch_duration(&self) -> Duration;

    /// Producer start until ready to commit. `critical` selects the estimate
    /// for rounds on the critical path.
    fn producer_queue_duration(&self, critical: bool) -> Duration;

    /// Commit until the pending tree is ready to activate.
    fn commit_to_ready_duration(&self) -> Duration;

    /// Activation.
    fn activate_duration(&self) -> Duration;

    /// Drawing and submitting a frame.
    fn draw_duration(&self) -> Duration;

    /// Producer work is about to be dispatched. `on_critical_path` is the
    /// value handed to the client in
    /// [`ProducerWorkArgs`](crate::timing::ProducerWorkArgs).
    fn will_dispatch_producer_work(&mut self, now: HostTime, on_critical_path: bool) {
        _ = (now, on_critical_path);
    }

    /// The producer picked up dispatched work.
    fn producer_work_started(&mut self, now: HostTime) {
        _ = now;
    }

    /// The producer gave up without committing.
    fn producer_work_aborted(&mut self) {}

    /// The producer's result was committed.
    fn did_commit(&mut self, now: HostTime) {
        _ = now;
    }

    /// The pending tree became ready to activate.
    fn ready_to_activate(&mut self, now: HostTime) {
        _ = now;
    }

    /// Activation is about to run.
    fn will_activate(&mut self, now: HostTime) {
        _ = now;
    }

    /// Activation finished.
    fn did_activate(&mut self, now: HostTime) {
        _ = now;
    }

    /// A draw is about to run.
    fn will_draw(&mut self, now: HostTime) {
        _ = now;
    }

    /// A draw finished. `submitted` is `true` when it produced a frame.
    fn did_draw(&mut self, now: HostTime, submitted: bool) {
        _ = (now, submitted);
    }

    /// Turns recording on or off (e.g. while hidden).
    fn set_recording_enabled(&mut self, enabled: bool) {
        _ = enabled;
    }
}

// ---------------------------------------------------------------------------
// FixedEstimates
// ---------------------------------------------------------------------------

/// Constant estimates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FixedEstimates {
    /// Answer for [`DurationEstimator::producer_dispatch_duration`].
    pub producer_dispatch: Duration,
    /// Answer for non-critical [`DurationEstimator::producer_queue_duration`].
    pub producer_queue: Duration,
    /// Answer for critical [`DurationEstimator::producer_queue_duration`].
    pub producer_queue_critical: Duration,
    /// Answer for [`DurationEstimator::commit_to_ready_duration`].
    pub commit_to_ready: Duration,
    /// Answer for [`DurationEstimator::activate_duration`].
    pub activate: Duration,
    /// Answer for [`DurationEstimator::draw_duration`].
    pub draw: Duration,
}

impl FixedEstimates {
    /// Every stage is free.
    pub const ZERO: Self = Self {
        producer_dispatch: Duration::ZERO,
        producer_queue: Duration::ZERO,
        producer_queue_critical: Duration::ZERO,
        commit_to_ready: Duration::ZERO,
        activate: Duration::ZERO,
        draw: Duration::ZERO,
    };

    /// Every stage takes `d`.
    #[must_use]
    pub const fn uniform(d: Duration) -> Self {
        Self {
            producer_dispatch: d,
            producer_queue: d,
            producer_queue_critical: d,
            commit_to_ready: d,
            activate: d,
            draw: d,
        }
    }

    /// Total producer-to-activation estimate.
    #[must_use]
    pub fn producer_to_activate(&self, critical: bool) -> Duration {
        self.producer_dispatch
            + self.producer_queue_duration(critical)
            + self.commit_to_ready
            + self.activate
    }
}

impl DurationEstimator for FixedEstimates {
    fn producer_dispatch_duration(&self) -> Duration {
        self.producer_dispatch
    }

    fn producer_queue_duration(&self, critical: bool) -> Duration {
        if critical {
            self.producer_queue_critical
        } else {
            self.producer_queue
        }
    }

    fn commit_to_ready_duration(&self) -> Duration {
        self.commit_to_ready
    }

    fn activate_duration(&self) -> Duration {
        self.activate
    }

    fn draw_duration(&self) -> Duration {
        self.draw
    }
}

// ---------------------------------------------------------------------------
// RollingTimingHistory
// ---------------------------------------------------------------------------

/// A fixed-capacity ring of duration samples.
#[derive(Clone, Debug)]
struct SampleRing {
    samples: Vec<Duration>,
    next: usize,
    capacity: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            next: 0,
            capacity: capacity.max(1),
        }
    }

    fn push(&mut self, d: Duration) {
        if self.samples.len() < self.capacity {
            self.samples.push(d);
        } else {
            self.samples[self.next] = d;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    /// Nearest-rank percentile; `None` when empty.
    fn percentile(&self, pct: u8) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let pct = usize::from(pct.min(100));
        let rank = (pct * sorted.len()).div_ceil(100).max(1);
        Some(sorted[rank - 1])
    }
}

/// Which measured interval a sample belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Dispatch,
    Queue,
    QueueCritical,
    CommitToReady,
    Activate,
    Draw,
}

const STAGES: usize = 6;

impl Stage {
    const fn index(self) -> usize {
        match self {
            Self::Dispatch => 0,
            Self::Queue => 1,
            Self::QueueCritical => 2,
            Self::CommitToReady => 3,
            Self::Activate => 4,
            Self::Draw => 5,
        }
    }
}

/// Learns stage durations from the scheduler's hooks.
///
/// Each stage keeps the most recent `capacity` samples. Queries answer the
/// configured percentile of those samples, or the matching field of the
/// fallback [`FixedEstimates`] while a stage has no history. Producer rounds
/// dispatched on the critical path are recorded separately from the rest.
#[derive(Clone, Debug)]
pub struct RollingTimingHistory {
    rings: [SampleRing; STAGES],
    percentile: u8,
    fallback: FixedEstimates,
    enabled: bool,
    dispatch_critical: bool,

    dispatch_at: Option<HostTime>,
    started_at: Option<HostTime>,
    commit_at: Option<HostTime>,
    activate_at: Option<HostTime>,
    draw_at: Option<HostTime>,
}

impl RollingTimingHistory {
    /// Default number of samples kept per stage.
    pub const DEFAULT_CAPACITY: usize = 64;
    /// Default percentile answered by queries.
    pub const DEFAULT_PERCENTILE: u8 = 90;

    /// Creates an enabled history.
    ///
    /// `percentile` is clamped to `0..=100`.
    #[must_use]
    pub fn new(capacity: usize, percentile: u8, fallback: FixedEstimates) -> Self {
        Self {
            rings: core::array::from_fn(|_| SampleRing::new(capacity)),
            percentile: percentile.min(100),
            fallback,
            enabled: true,
            dispatch_critical: false,
            dispatch_at: None,
            started_at: None,
            commit_at: None,
            activate_at: None,
            draw_at: None,
        }
    }

    /// Whether samples are being recorded.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of draw samples recorded so far (capped at capacity).
    #[must_use]
    pub fn draw_sample_count(&self) -> usize {
        self.rings[Stage::Draw.index()].len()
    }

    fn record(&mut self, stage: Stage, start: Option<HostTime>, end: HostTime) {
        if !self.enabled {
            return;
        }
        if let Some(start) = start {
            self.rings[stage.index()].push(end.saturating_duration_since(start));
        }
    }

    fn estimate(&self, stage: Stage, fallback: Duration) -> Duration {
        self.rings[stage.index()]
            .percentile(self.percentile)
            .unwrap_or(fallback)
    }
}

impl Default for RollingTimingHistory {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_CAPACITY,
            Self::DEFAULT_PERCENTILE,
            FixedEstimates::ZERO,
        )
    }
}

impl DurationEstimator for RollingTimingHistory {
    fn producer_dispatch_duration(&self) -> Duration {
        self.estimate(Stage::Dispatch, self.fallback.producer_dispatch)
    }

    fn producer_queue_duration(&self, critical: bool) -> Duration {
        if critical {
            self.estimate(Stage::QueueCritical, self.fallback.producer_queue_critical)
        } else {
            self.estimate(Stage::Queue, self.fallback.producer_queue)
        }
    }

    fn commit_to_ready_duration(&self) -> Duration {
        self.estimate(Stage::CommitToReady, self.fallback.commit_to_ready)
    }

    fn activate_duration(&self) -> Duration {
        self.estimate(Stage::Activate, self.fallback.activate)
    }

    fn draw_duration(&self) -> Duration {
        self.estimate(Stage::Draw, self.fallback.draw)
    }

    fn will_dispatch_producer_work(&mut self, now: HostTime, on_critical_path: bool) {
        self.dispatch_at = Some(now);
        self.dispatch_critical = on_critical_path;
        self.started_at = None;
    }

    fn producer_work_started(&mut self, now: HostTime) {
        self.record(Stage::Dispatch, self.dispatch_at, now);
        self.started_at = Some(now);
    }

    fn producer_work_aborted(&mut self) {
        self.dispatch_at = None;
        self.started_at = None;
    }

    fn did_commit(&mut self, now: HostTime) {
        let stage = if self.dispatch_critical {
            Stage::QueueCritical
        } else {
            Stage::Queue
        };
        self.record(stage, self.started_at, now);
        self.dispatch_at = None;
        self.started_at = None;
        self.commit_at = Some(now);
    }

    fn ready_to_activate(&mut self, now: HostTime) {
        let start = self.commit_at.take();
        self.record(Stage::CommitToReady, start, now);
    }

    fn will_activate(&mut self, now: HostTime) {
        self.activate_at = Some(now);
    }

    fn did_activate(&mut self, now: HostTime) {
        let start = self.activate_at.take();
        self.record(Stage::Activate, start, now);
    }

    fn will_draw(&mut self, now: HostTime) {
        self.draw_at = Some(now);
    }

    fn did_draw(&mut self, now: HostTime, submitted: bool) {
        let start = self.draw_at.take();
        // Aborted draws are cheap and would drag the estimate down.
        if submitted {
            self.record(Stage::Draw, start, now);
        }
    }

    fn set_recording_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.dispatch_at = None;
            self.started_at = None;
            self.commit_at = None;
            self.activate_at = None;
            self.draw_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> HostTime {
        HostTime::from_millis(v)
    }

    #[test]
    fn empty_history_answers_fallback() {
        let fallback = FixedEstimates::uniform(Duration::from_millis(2));
        let history = RollingTimingHistory::new(8, 90, fallback);
        assert_eq!(history.draw_duration(), Duration::from_millis(2), "fallback draw");
        assert_eq!(
            history.producer_queue_duration(true),
            Duration::from_millis(2),
            "fallback critical queue"
        );
    }

    #[test]
    fn huge_fixed_estimates_saturate() {
        let estimates = FixedEstimates::uniform(Duration(u64::MAX / 2));
        assert_eq!(
            estimates.producer_to_activate(true),
            Duration(u64::MAX),
            "sum clamps instead of overflowing"
        );
    }

    #[test]
    fn draw_samples_drive_the_estimate() {
        let mut history = RollingTimingHistory::new(8, 100, FixedEstimates::ZERO);
        for (start, end) in [(0, 3), (10, 14), (20, 22)] {
            history.will_draw(ms(start));
            history.did_draw(ms(end), true);
        }
        assert_eq!(history.draw_sample_count(), 3, "three samples");
        assert_eq!(history.draw_duration(), Duration::from_millis(4), "100th percentile is max");
    }

    #[test]
    fn aborted_draws_are_not_recorded() {
        let mut history = RollingTimingHistory::default();
        history.will_draw(ms(0));
        history.did_draw(ms(1), false);
        assert_eq!(history.draw_sample_count(), 0, "abort ignored");
    }

    #[test]
    fn ring_keeps_most_recent_samples() {
        let mut history = RollingTimingHistory::new(2, 100, FixedEstimates::ZERO);
        for (start, end) in [(0, 9), (10, 11), (20, 21)] {
            history.will_draw(ms(start));
            history.did_draw(ms(end), true);
        }
        assert_eq!(history.draw_duration(), Duration::from_millis(1), "oldest evicted");
    }

    #[test]
    fn producer_round_is_split_into_stages() {
        let mut history = RollingTimingHistory::new(4, 50, FixedEstimates::ZERO);
        history.will_dispatch_producer_work(ms(0), false);
        history.producer_work_started(ms(1));
        history.did_commit(ms(6));
        history.ready_to_activate(ms(8));
        history.will_activate(ms(9));
        history.did_activate(ms(10));
        assert_eq!(history.producer_dispatch_duration(), Duration::from_millis(1), "dispatch");
        assert_eq!(history.producer_queue_duration(false), Duration::from_millis(5), "queue");
        assert_eq!(history.producer_queue_duration(true), Duration::ZERO, "no critical samples");
        assert_eq!(history.commit_to_ready_duration(), Duration::from_millis(2), "ready");
        assert_eq!(history.activate_duration(), Duration::from_millis(1), "activate");
    }

    #[test]
    fn critical_rounds_fill_the_critical_queue_estimate() {
        let mut history = RollingTimingHistory::new(16, 90, FixedEstimates::ZERO);
        for round in 0..10 {
            let base = round * 20;
            history.will_dispatch_producer_work(ms(base), true);
            history.producer_work_started(ms(base + 1));
            history.did_commit(ms(base + 12));
        }
        assert_eq!(
            history.producer_queue_duration(true),
            Duration::from_millis(11),
            "learned from critical rounds"
        );
        assert_eq!(
            history.producer_queue_duration(false),
            Duration::ZERO,
            "non-critical history untouched"
        );
    }

    #[test]
    fn disabled_history_records_nothing() {
        let mut history = RollingTimingHistory::default();
        history.set_recording_enabled(false);
        assert!(!history.is_enabled(), "disabled");
        history.will_draw(ms(0));
        history.did_draw(ms(5), true);
        assert_eq!(history.draw_sample_count(), 0, "nothing recorded while disabled");
    }

    #[test]
    fn percentile_uses_nearest_rank() {
        let mut ring = SampleRing::new(10);
        for v in 1..=10 {
            ring.push(Duration::from_millis(v));
        }
        assert_eq!(ring.percentile(90), Some(Duration::from_millis(9)), "p90 of 1..=10");
        assert_eq!(ring.percentile(0), Some(Duration::from_millis(1)), "p0 is min");
        assert_eq!(SampleRing::new(3).percentile(50), None, "empty ring");
    }
}
