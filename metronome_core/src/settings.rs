// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scheduler configuration.

use crate::time::Duration;

/// Tuning knobs for the [`Scheduler`](crate::scheduler::Scheduler) and the
/// [`PipelineStateMachine`](crate::state_machine::PipelineStateMachine).
///
/// The defaults suit a vsync-paced display with a separate producer stage.
/// Call [`validate`](Self::validate) on settings loaded from outside the
/// program.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SchedulerSettings {
    /// Ticks are driven by an external embedder that also requests draws
    /// directly. No deadline timer is used; each pulse runs inline.
    pub using_synchronous_tick_source: bool,
    /// Enables the producer and impl latency recovery heuristics.
    pub enable_latency_recovery: bool,
    /// Subtracted from every pulse deadline to absorb message latency and
    /// scheduling jitter.
    pub deadline_fudge: Duration,
    /// Consecutive checkerboarded draws tolerated before a draw is forced.
    pub max_failed_draws_before_forced: u32,
    /// Block the deadline until every outstanding stage (producer work,
    /// commit, activation, ready-to-draw) has finished.
    pub wait_for_all_pipeline_stages_before_draw: bool,
    /// The host is known to be slow; stage estimates are scaled by
    /// [`slow_timeout_multiplier`](Self::slow_timeout_multiplier).
    pub using_slow_configuration: bool,
    /// Estimate multiplier used when `using_slow_configuration` is set.
    pub slow_timeout_multiplier: f64,
    /// Allow producer work to be sent while draws are throttled on an
    /// unacknowledged submission.
    pub producer_work_while_throttled: bool,
}

impl SchedulerSettings {
    /// Default deadline fudge of one millisecond.
    pub const DEFAULT_DEADLINE_FUDGE: Duration = Duration::from_micros(1000);

    /// Settings for an externally driven (synchronous) embedder.
    #[must_use]
    pub fn synchronous() -> Self {
        Self {
            using_synchronous_tick_source: true,
            ..Self::default()
        }
    }

    /// Checks that the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when the failed-draw limit is zero or the
    /// slow-configuration multiplier is not a finite value of at least one.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_failed_draws_before_forced == 0 {
            return Err(SettingsError::ZeroFailedDrawLimit);
        }
        if !self.slow_timeout_multiplier.is_finite() || self.slow_timeout_multiplier < 1.0 {
            return Err(SettingsError::InvalidTimeoutMultiplier(
                self.slow_timeout_multiplier,
            ));
        }
        Ok(())
    }

    /// Scales a stage estimate for slow configurations.
    #[must_use]
    pub fn scale_estimate(&self, estimate: Duration) -> Duration {
        if self.using_slow_configuration {
            estimate.mul_f64(self.slow_timeout_multiplier)
        } else {
            estimate
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            using_synchronous_tick_source: false,
            enable_latency_recovery: true,
            deadline_fudge: Self::DEFAULT_DEADLINE_FUDGE,
            max_failed_draws_before_forced: 3,
            wait_for_all_pipeline_stages_before_draw: false,
            using_slow_configuration: false,
            slow_timeout_multiplier: 2.0,
            producer_work_while_throttled: false,
        }
    }
}

/// Invalid [`SchedulerSettings`].
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum SettingsError {
    /// `max_failed_draws_before_forced` must be at least one.
    #[error("max_failed_draws_before_forced must be at least 1")]
    ZeroFailedDrawLimit,
    /// `slow_timeout_multiplier` must be finite and at least one.
    #[error("slow_timeout_multiplier must be finite and >= 1.0, got {0}")]
    InvalidTimeoutMultiplier(f64),
}
