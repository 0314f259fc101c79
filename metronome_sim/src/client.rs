// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A scripted scheduler client.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use metronome_core::client::SchedulerClient;
use metronome_core::clock::{Clock, ManualClock};
use metronome_core::state_machine::{Action, DrawResult};
use metronome_core::time::{Duration, HostTime};
use metronome_core::timing::{ProducerWorkArgs, TickAck};

/// How long each simulated stage takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageLatencies {
    /// Dispatch to the producer picking the work up.
    pub producer_start: Duration,
    /// Pick-up to ready-to-commit.
    pub producer: Duration,
    /// Commit to the pending tree being ready to activate.
    pub commit_to_ready: Duration,
    /// Submission to downstream acknowledgement.
    pub submit_ack: Duration,
    /// Sink creation request to the sink being ready.
    pub sink_creation: Duration,
}

impl Default for StageLatencies {
    fn default() -> Self {
        Self {
            producer_start: Duration::from_millis(1),
            producer: Duration::from_millis(6),
            commit_to_ready: Duration::from_millis(2),
            submit_ack: Duration::from_millis(4),
            sink_creation: Duration::ZERO,
        }
    }
}

/// Work the simulated pipeline finishes later.
///
/// [`SimRunner`](crate::SimRunner) feeds each completion back into the
/// matching scheduler notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// The requested sink is ready.
    SinkCreated,
    /// The producer picked up dispatched work.
    ProducerStarted,
    /// The producer finished with something to commit.
    ReadyToCommit,
    /// The producer finished with nothing new.
    ProducerNoUpdates,
    /// The client finished committing.
    CommitDone,
    /// The pending tree is ready to activate.
    ReadyToActivate,
    /// Downstream acknowledged a submitted frame.
    SubmitAck,
}

#[derive(Clone, Copy, Debug)]
struct Pending {
    at: HostTime,
    completion: Completion,
}

/// A [`SchedulerClient`] that records every call and schedules the
/// resulting completions.
#[derive(Debug)]
pub struct SimClient {
    clock: ManualClock,
    latencies: StageLatencies,
    pending: Vec<Pending>,
    actions: Vec<Action>,
    draw_results: VecDeque<DrawResult>,
    producer_has_updates: bool,
    frames_submitted: u64,
    frames_not_produced: u64,
    not_expected_until: Option<HostTime>,
    no_ticks_expected_soon: u64,
}

impl SimClient {
    /// Creates a client that timestamps completions with `clock`.
    #[must_use]
    pub fn new(clock: ManualClock, latencies: StageLatencies) -> Self {
        Self {
            clock,
            latencies,
            pending: Vec::new(),
            actions: Vec::new(),
            draw_results: VecDeque::new(),
            producer_has_updates: true,
            frames_submitted: 0,
            frames_not_produced: 0,
            not_expected_until: None,
            no_ticks_expected_soon: 0,
        }
    }

    /// Stage latencies in use.
    #[must_use]
    pub fn latencies(&self) -> &StageLatencies {
        &self.latencies
    }

    /// Replaces the stage latencies for work scheduled from now on.
    pub fn set_latencies(&mut self, latencies: StageLatencies) {
        self.latencies = latencies;
    }

    /// Whether producer rounds finish with something to commit.
    pub fn set_producer_has_updates(&mut self, has_updates: bool) {
        self.producer_has_updates = has_updates;
    }

    /// Queues the result of an upcoming draw. Unqueued draws succeed.
    pub fn queue_draw_result(&mut self, result: DrawResult) {
        self.draw_results.push_back(result);
    }

    /// Every action performed, in order.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// How many times `action` was performed.
    #[must_use]
    pub fn count(&self, action: Action) -> usize {
        self.actions.iter().filter(|a| **a == action).count()
    }

    /// Frames successfully submitted.
    #[must_use]
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// Ticks and pulses that ended without a frame.
    #[must_use]
    pub fn frames_not_produced(&self) -> u64 {
        self.frames_not_produced
    }

    /// The latest "producer work not expected until" hint.
    #[must_use]
    pub fn not_expected_until(&self) -> Option<HostTime> {
        self.not_expected_until
    }

    /// Times the scheduler said no ticks are expected soon.
    #[must_use]
    pub fn no_ticks_expected_soon(&self) -> u64 {
        self.no_ticks_expected_soon
    }

    /// When the earliest pending completion is due.
    #[must_use]
    pub fn next_completion_time(&self) -> Option<HostTime> {
        self.pending.first().map(|p| p.at)
    }

    /// Removes and returns the earliest completion due at `now`.
    pub fn take_due(&mut self, now: HostTime) -> Option<Completion> {
        if self.pending.first()?.at > now {
            return None;
        }
        Some(self.pending.remove(0).completion)
    }

    fn schedule(&mut self, after: Duration, completion: Completion) {
        let at = self.clock.now().saturating_add(after);
        // Equal times keep submission order.
        let index = self.pending.partition_point(|p| p.at <= at);
        self.pending.insert(index, Pending { at, completion });
    }

    fn draw(&mut self, action: Action) -> DrawResult {
        self.actions.push(action);
        let result = self.draw_results.pop_front().unwrap_or(DrawResult::Success);
        if result.is_success() {
            self.frames_submitted += 1;
            self.schedule(self.latencies.submit_ack, Completion::SubmitAck);
        }
        result
    }
}

impl SchedulerClient for SimClient {
    fn dispatch_producer_work(&mut self, _args: &ProducerWorkArgs) {
        self.actions.push(Action::SendProducerWork);
        let start = self.latencies.producer_start;
        let finish = start.saturating_add(self.latencies.producer);
        self.schedule(start, Completion::ProducerStarted);
        let done = if self.producer_has_updates {
            Completion::ReadyToCommit
        } else {
            Completion::ProducerNoUpdates
        };
        self.schedule(finish, done);
    }

    fn producer_work_not_sent(&mut self) {
        self.actions.push(Action::NotifyProducerWorkNotSent);
    }

    fn producer_work_not_expected_until(&mut self, time: HostTime) {
        self.not_expected_until = Some(time);
    }

    fn commit(&mut self) {
        self.actions.push(Action::Commit);
        self.schedule(Duration::ZERO, Completion::CommitDone);
        self.schedule(self.latencies.commit_to_ready, Completion::ReadyToActivate);
    }

    fn activate_sync_tree(&mut self) {
        self.actions.push(Action::ActivateSyncTree);
    }

    fn perform_impl_side_invalidation(&mut self) {
        self.actions.push(Action::PerformImplSideInvalidation);
        self.schedule(self.latencies.commit_to_ready, Completion::ReadyToActivate);
    }

    fn draw_if_possible(&mut self) -> DrawResult {
        self.draw(Action::DrawIfPossible)
    }

    fn draw_forced(&mut self) -> DrawResult {
        self.draw(Action::DrawForced)
    }

    fn begin_sink_creation(&mut self) {
        self.actions.push(Action::BeginSinkCreation);
        self.schedule(self.latencies.sink_creation, Completion::SinkCreated);
    }

    fn prepare_tiles(&mut self) {
        self.actions.push(Action::PrepareTiles);
    }

    fn invalidate_sink(&mut self) {
        self.actions.push(Action::InvalidateSink);
    }

    fn did_not_produce_frame(&mut self, _ack: &TickAck) {
        self.frames_not_produced += 1;
    }

    fn send_no_ticks_expected_soon(&mut self) {
        self.no_ticks_expected_soon += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_come_back_in_time_order() {
        let clock = ManualClock::new(HostTime::ZERO);
        let mut client = SimClient::new(clock.clone(), StageLatencies::default());
        client.dispatch_producer_work(&ProducerWorkArgs {
            pulse: metronome_core::timing::TickPulse::normal(
                1,
                1,
                HostTime::ZERO,
                HostTime::from_millis(14),
                Duration::from_millis(16),
            ),
            on_critical_path: true,
        });
        assert_eq!(client.next_completion_time(), Some(HostTime::from_millis(1)), "start first");
        assert_eq!(client.take_due(HostTime::ZERO), None, "nothing due yet");

        clock.set(HostTime::from_millis(7));
        assert_eq!(client.take_due(clock.now()), Some(Completion::ProducerStarted), "start");
        assert_eq!(client.take_due(clock.now()), Some(Completion::ReadyToCommit), "finish");
        assert_eq!(client.take_due(clock.now()), None, "drained");
    }

    #[test]
    fn failed_draws_do_not_wait_for_acks() {
        let clock = ManualClock::new(HostTime::ZERO);
        let mut client = SimClient::new(clock, StageLatencies::default());
        client.queue_draw_result(DrawResult::AbortedCheckerboardAnimations);
        assert_eq!(
            client.draw_if_possible(),
            DrawResult::AbortedCheckerboardAnimations,
            "queued result"
        );
        assert_eq!(client.next_completion_time(), None, "no ack pending");
        assert_eq!(client.draw_forced(), DrawResult::Success, "default result");
        assert_eq!(client.frames_submitted(), 1, "one frame");
        assert_eq!(client.count(Action::DrawForced), 1, "recorded");
    }

    #[test]
    fn commit_schedules_activation_readiness() {
        let clock = ManualClock::new(HostTime::ZERO);
        let mut client = SimClient::new(clock.clone(), StageLatencies::default());
        client.commit();
        assert_eq!(client.take_due(clock.now()), Some(Completion::CommitDone), "commit done now");
        clock.advance(Duration::from_millis(2));
        assert_eq!(client.take_due(clock.now()), Some(Completion::ReadyToActivate), "ready later");
    }
}
