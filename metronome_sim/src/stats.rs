// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-tick outcomes and latency grading.

use alloc::string::String;

/// What happened to one pulse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// A frame was submitted during the tick.
    pub submitted: bool,
    /// The pulse was acknowledged without running a tick.
    pub skipped: bool,
    /// Producer work was still outstanding when the tick ended.
    pub producer_missed_deadline: bool,
}

/// Letter grade for frame delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LatencyGrade {
    /// At least 95% of ticks produced a frame.
    A,
    /// At least 80%.
    B,
    /// At least half.
    C,
    /// Fewer than half.
    D,
}

impl LatencyGrade {
    /// Returns a short label for summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }

    fn for_fraction(frames: f64) -> Self {
        if frames >= 0.95 {
            Self::A
        } else if frames >= 0.80 {
            Self::B
        } else if frames >= 0.50 {
            Self::C
        } else {
            Self::D
        }
    }
}

/// Rolling window of the last `N` tick outcomes plus lifetime totals.
#[derive(Debug)]
pub struct FrameStats<const N: usize> {
    ring: [TickOutcome; N],
    cursor: usize,
    len: usize,
    total_ticks: u64,
    total_frames: u64,
    total_skipped: u64,
}

impl<const N: usize> Default for FrameStats<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FrameStats<N> {
    /// Creates empty statistics.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: [TickOutcome {
                submitted: false,
                skipped: false,
                producer_missed_deadline: false,
            }; N],
            cursor: 0,
            len: 0,
            total_ticks: 0,
            total_frames: 0,
            total_skipped: 0,
        }
    }

    /// Records one acknowledged pulse.
    pub fn record(&mut self, outcome: TickOutcome) {
        self.total_ticks += 1;
        self.total_frames += u64::from(outcome.submitted);
        self.total_skipped += u64::from(outcome.skipped);
        if N == 0 {
            return;
        }
        self.ring[self.cursor] = outcome;
        self.cursor = (self.cursor + 1) % N;
        self.len = (self.len + 1).min(N);
    }

    /// Outcomes in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pulses acknowledged since creation.
    #[must_use]
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Frames submitted since creation.
    #[must_use]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Pulses skipped since creation.
    #[must_use]
    pub fn total_skipped(&self) -> u64 {
        self.total_skipped
    }

    /// Window outcomes, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TickOutcome> + '_ {
        let start = (self.cursor + N - self.len) % N.max(1);
        (0..self.len).map(move |i| &self.ring[(start + i) % N])
    }

    fn fraction(&self, pred: impl Fn(&TickOutcome) -> bool) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        self.iter().filter(|o| pred(o)).count() as f64 / self.len as f64
    }

    /// Fraction of windowed ticks that submitted a frame.
    #[must_use]
    pub fn frame_fraction(&self) -> f64 {
        self.fraction(|o| o.submitted)
    }

    /// Fraction of windowed ticks that ended with producer work outstanding.
    #[must_use]
    pub fn producer_miss_fraction(&self) -> f64 {
        self.fraction(|o| o.producer_missed_deadline)
    }

    /// Grades the window. An empty window grades `A`.
    #[must_use]
    pub fn grade(&self) -> LatencyGrade {
        if self.is_empty() {
            return LatencyGrade::A;
        }
        LatencyGrade::for_fraction(self.frame_fraction())
    }

    /// One character per windowed tick, oldest first: `#` frame, `.` ran
    /// without a frame, `x` skipped.
    #[must_use]
    pub fn timeline_ascii(&self) -> String {
        self.iter()
            .map(|o| {
                if o.submitted {
                    '#'
                } else if o.skipped {
                    'x'
                } else {
                    '.'
                }
            })
            .collect()
    }
}
