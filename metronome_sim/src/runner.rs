// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Discrete-event driver for a scheduler under simulated time.

use alloc::boxed::Box;

use metronome_core::clock::{Clock, ManualClock};
use metronome_core::estimator::DurationEstimator;
use metronome_core::scheduler::Scheduler;
use metronome_core::settings::{SchedulerSettings, SettingsError};
use metronome_core::time::{Duration, HostTime};
use metronome_core::timing::{CommitEarlyOutReason, TickResult};

use crate::client::{Completion, SimClient, StageLatencies};
use crate::source::SimTickSource;
use crate::stats::{FrameStats, TickOutcome};

/// Ticks kept in the [`FrameStats`] window.
pub const STATS_WINDOW: usize = 120;

const SOURCE_ID: u64 = 1;

/// Simulation parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimConfig {
    /// Pulse interval.
    pub interval: Duration,
    /// Fraction of the interval between a pulse and its deadline.
    pub deadline_fraction: f64,
    /// Pipeline stage latencies.
    pub latencies: StageLatencies,
    /// Hold pulses back until the previous one is acknowledged.
    pub throttled_source: bool,
    /// Hand out the latest unobserved pulse on subscription.
    pub missed_on_subscribe: bool,
    /// Request producer work before every pulse.
    pub producer_work_every_tick: bool,
    /// Request a redraw before every pulse.
    pub redraw_every_tick: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            // 60 Hz.
            interval: Duration(16_666_667),
            deadline_fraction: 0.85,
            latencies: StageLatencies::default(),
            throttled_source: true,
            missed_on_subscribe: true,
            producer_work_every_tick: false,
            redraw_every_tick: false,
        }
    }
}

/// Owns a [`Scheduler`] driving a [`SimClient`] and steps simulated time
/// from one event to the next.
///
/// Events are pulses from the [`SimTickSource`], the scheduler's own
/// wakeups, and completions of work the client started. Completions are fed
/// back through the matching scheduler notification, and every
/// acknowledged pulse is recorded in [`stats`](Self::stats).
#[derive(Debug)]
pub struct SimRunner {
    scheduler: Scheduler<SimClient>,
    source: SimTickSource,
    clock: ManualClock,
    config: SimConfig,
    stats: FrameStats<STATS_WINDOW>,
    acks_seen: usize,
}

impl SimRunner {
    /// Creates a runner with a visible, drawable surface at time zero.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if `settings` are invalid.
    pub fn new(
        settings: SchedulerSettings,
        estimator: Box<dyn DurationEstimator>,
        config: SimConfig,
    ) -> Result<Self, SettingsError> {
        let clock = ManualClock::new(HostTime::ZERO);
        let client = SimClient::new(clock.clone(), config.latencies);
        let source = SimTickSource::new(SOURCE_ID, config.interval, config.deadline_fraction);
        source.set_throttled(config.throttled_source);
        source.set_report_missed(config.missed_on_subscribe);

        let mut scheduler = Scheduler::new(settings, client, estimator, Box::new(clock.clone()))?;
        scheduler.set_tick_source(Some(Box::new(source.clone())));
        scheduler.set_can_draw(true);
        scheduler.set_visible(true);

        Ok(Self {
            scheduler,
            source,
            clock,
            config,
            stats: FrameStats::new(),
            acks_seen: 0,
        })
    }

    /// The scheduler under test.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler<SimClient> {
        &self.scheduler
    }

    /// Mutable access for intents and notifications between steps.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler<SimClient> {
        &mut self.scheduler
    }

    /// The simulated client.
    #[must_use]
    pub fn client(&self) -> &SimClient {
        self.scheduler.client()
    }

    /// The simulated tick source.
    #[must_use]
    pub fn source(&self) -> &SimTickSource {
        &self.source
    }

    /// Outcomes of acknowledged pulses.
    #[must_use]
    pub fn stats(&self) -> &FrameStats<STATS_WINDOW> {
        &self.stats
    }

    /// Parameters in use.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current simulated time.
    #[must_use]
    pub fn now(&self) -> HostTime {
        self.clock.now()
    }

    /// When the next event is due.
    #[must_use]
    pub fn next_event_time(&self) -> HostTime {
        let mut next = self.source.next_pulse_time();
        if let Some(t) = self.scheduler.next_wakeup() {
            next = next.min(t);
        }
        if let Some(t) = self.scheduler.client().next_completion_time() {
            next = next.min(t);
        }
        next.max(self.clock.now())
    }

    /// Advances to the next event and handles everything due then.
    ///
    /// Completions are applied first, then timers, then the pulse. Returns
    /// the new time.
    pub fn step(&mut self) -> HostTime {
        let now = self.next_event_time();
        self.clock.set(now);

        while let Some(done) = self.scheduler.client_mut().take_due(now) {
            self.complete(done, now);
        }
        self.scheduler.poll();

        if self.source.next_pulse_time() <= now {
            if self.config.producer_work_every_tick {
                self.scheduler.set_needs_producer_work();
            }
            if self.config.redraw_every_tick {
                self.scheduler.set_needs_redraw();
            }
            if let Some(pulse) = self.source.emit(now) {
                self.scheduler.on_tick(pulse);
            }
        }

        self.collect_acks();
        now
    }

    /// Steps until `count` more pulses have been emitted.
    pub fn run_ticks(&mut self, count: u64) {
        let target = self.source.pulses_emitted() + count;
        while self.source.pulses_emitted() < target {
            self.step();
        }
    }

    /// Steps through every event up to and including `until`, then moves the
    /// clock to `until`.
    pub fn run_until(&mut self, until: HostTime) {
        while self.next_event_time() <= until {
            self.step();
        }
        self.clock.set(until);
    }

    fn complete(&mut self, done: Completion, now: HostTime) {
        tracing::trace!(?done, ?now, "completion");
        let s = &mut self.scheduler;
        match done {
            Completion::SinkCreated => s.did_create_sink(),
            Completion::ProducerStarted => s.notify_producer_work_started(now),
            Completion::ReadyToCommit => s.notify_ready_to_commit(),
            Completion::ProducerNoUpdates => {
                s.producer_work_aborted(CommitEarlyOutReason::FinishedNoUpdates);
            }
            Completion::CommitDone => s.did_commit(),
            Completion::ReadyToActivate => s.notify_ready_to_activate(),
            Completion::SubmitAck => {
                // A lost sink forgets its outstanding frames.
                if s.state().pending_submit_frames() > 0 {
                    s.did_receive_submit_ack();
                }
            }
        }
    }

    fn collect_acks(&mut self) {
        let acks = self.source.acks_since(self.acks_seen);
        if acks.is_empty() {
            return;
        }
        self.acks_seen += acks.len();
        let producer_missed = self.scheduler.state().producer_missed_last_deadline();
        for ack in acks {
            let skipped = ack.result == TickResult::Skipped;
            let outcome = TickOutcome {
                submitted: ack.did_submit_frame,
                skipped,
                producer_missed_deadline: producer_missed && !skipped,
            };
            tracing::trace!(
                sequence = ack.sequence_number,
                submitted = outcome.submitted,
                skipped,
                "pulse acknowledged"
            );
            self.stats.record(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::LatencyGrade;
    use metronome_core::estimator::RollingTimingHistory;
    use metronome_core::state_machine::Action;

    fn runner(config: SimConfig) -> SimRunner {
        SimRunner::new(
            SchedulerSettings::default(),
            Box::new(RollingTimingHistory::default()),
            config,
        )
        .expect("default settings are valid")
    }

    #[test]
    fn fast_pipeline_draws_every_tick() {
        let mut sim = runner(SimConfig {
            producer_work_every_tick: true,
            redraw_every_tick: true,
            ..SimConfig::default()
        });
        sim.run_ticks(60);
        assert_eq!(sim.stats().grade(), LatencyGrade::A, "every stage fits");
        assert_eq!(sim.stats().total_skipped(), 0, "nothing dropped");
        assert_eq!(sim.source().withheld(), 0, "acks arrive in time");
        assert!(sim.client().frames_submitted() >= 57, "about one frame per pulse");
    }

    #[test]
    fn slow_producer_loses_frames() {
        let mut sim = runner(SimConfig {
            producer_work_every_tick: true,
            latencies: StageLatencies {
                producer: Duration::from_millis(20),
                ..StageLatencies::default()
            },
            ..SimConfig::default()
        });
        sim.run_ticks(60);
        assert_ne!(sim.stats().grade(), LatencyGrade::A, "producer cannot keep up");
        assert!(sim.stats().total_frames() > 0, "commits still get drawn");
        assert!(
            sim.client().count(Action::Commit) < 60,
            "at most one round in flight"
        );
    }

    #[test]
    fn quiet_pipeline_unsubscribes() {
        let mut sim = runner(SimConfig::default());
        sim.run_until(HostTime::from_millis(200));
        assert!(!sim.scheduler().is_observing_ticks(), "nothing left to do");
        assert_eq!(sim.client().count(Action::BeginSinkCreation), 1, "one sink");
        assert!(sim.client().frames_submitted() >= 1, "first commit drawn");
    }

    #[test]
    fn missed_pulse_on_subscribe_is_drawn() {
        let mut sim = runner(SimConfig::default());
        sim.run_until(HostTime::from_millis(205));
        assert!(!sim.scheduler().is_observing_ticks(), "quiet before the request");
        let draws_before = sim.client().frames_submitted();

        sim.scheduler_mut().set_needs_redraw();
        assert_eq!(sim.source().missed_reported(), 1, "latest pulse handed out");
        sim.run_until(HostTime::from_millis(212));
        assert_eq!(
            sim.client().frames_submitted(),
            draws_before + 1,
            "redraw happens within the missed pulse"
        );
    }
}
