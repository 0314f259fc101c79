// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The frame scheduler.
//!
//! [`Scheduler`] drives a [`PipelineStateMachine`] through real time. It
//! subscribes to a [`TickSource`] while ticks are needed, runs the action
//! loop to exhaustion on every trigger, arms the per-tick deadline, and
//! applies the latency recovery heuristics that need wall-clock estimates.
//!
//! # Action loop
//!
//! Every public setter and notification ends in one pass of the action loop:
//! ask the state machine for the next action, bracket the matching client
//! call with `will_*`/`did_*`, repeat until [`Action::None`]. Afterwards the
//! deadline is re-armed if its mode changed, and the tick subscription is
//! re-evaluated.
//!
//! # Time
//!
//! The scheduler owns no task runner. The deadline and the redelivery of a
//! missed pulse are explicit handles; the embedder asks [`next_wakeup`] when
//! to call back and then calls [`poll`].
//!
//! [`next_wakeup`]: Scheduler::next_wakeup
//! [`poll`]: Scheduler::poll

use alloc::boxed::Box;

use crate::client::{SchedulerClient, TickSource};
use crate::clock::Clock;
use crate::estimator::DurationEstimator;
use crate::settings::{SchedulerSettings, SettingsError};
use crate::state_machine::{
    Action, DeadlineMode, DrawResult, PipelineStateMachine, ScrollHandlerState, StateSnapshot,
    TickPhase, TreePriority,
};
use crate::time::{Duration, HostTime};
use crate::timer::{CancelableTask, CancelableTimer};
use crate::timing::{
    CommitEarlyOutReason, ProducerWorkArgs, PulseKind, TickAck, TickPulse, TickResult,
};
use crate::trace::{
    ActionEvent, DeadlineFiredEvent, DeadlineScheduledEvent, DrawResultEvent, DropReason,
    LatencyRecoveryEvent, RecoveryKind, TickDroppedEvent, TickFinishedEvent, TickReceivedEvent,
    TraceSink, Tracer,
};

/// Drives a [`PipelineStateMachine`] from tick pulses, timers, and client
/// notifications.
///
/// The scheduler owns its client. Completions of work the client started
/// asynchronously are reported back through the notification methods
/// ([`notify_ready_to_commit`], [`did_receive_submit_ack`], ...), which
/// the embedder calls from the same thread.
///
/// [`notify_ready_to_commit`]: Self::notify_ready_to_commit
/// [`did_receive_submit_ack`]: Self::did_receive_submit_ack
pub struct Scheduler<C: SchedulerClient> {
    settings: SchedulerSettings,
    state: PipelineStateMachine,
    client: C,
    estimator: Box<dyn DurationEstimator>,
    clock: Box<dyn Clock>,
    tick_source: Option<Box<dyn TickSource>>,
    trace_sink: Option<Box<dyn TraceSink>>,

    deadline_timer: CancelableTimer,
    scheduled_mode: Option<DeadlineMode>,
    missed_pulse: CancelableTask<TickPulse>,

    /// Pulse of the current (or most recent) tick, deadline already adjusted.
    last_pulse: Option<TickPulse>,
    tick_began_at: HostTime,
    observing: bool,
    inside_process: bool,
    stopped: bool,
}

impl<C: SchedulerClient> core::fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("settings", &self.settings)
            .field("state", &self.state.snapshot())
            .field("scheduled_mode", &self.scheduled_mode)
            .field("observing", &self.observing)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl<C: SchedulerClient> Scheduler<C> {
    /// Creates a scheduler and runs one action cycle.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if `settings` fail
    /// [`validate`](SchedulerSettings::validate).
    pub fn new(
        settings: SchedulerSettings,
        client: C,
        estimator: Box<dyn DurationEstimator>,
        clock: Box<dyn Clock>,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;
        let mut scheduler = Self {
            settings,
            state: PipelineStateMachine::new(settings),
            client,
            estimator,
            clock,
            tick_source: None,
            trace_sink: None,
            deadline_timer: CancelableTimer::new(),
            scheduled_mode: None,
            missed_pulse: CancelableTask::new(),
            last_pulse: None,
            tick_began_at: HostTime::ZERO,
            observing: false,
            inside_process: false,
            stopped: false,
        };
        scheduler.process_scheduled_actions();
        Ok(scheduler)
    }

    // -- Accessors ----------------------------------------------------------

    /// The settings in use.
    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// The client.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// The client, mutably.
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// The state machine, for inspection.
    #[must_use]
    pub fn state(&self) -> &PipelineStateMachine {
        &self.state
    }

    /// Plain copy of the state machine's state.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    /// Whether the scheduler is subscribed to its tick source.
    #[must_use]
    pub fn is_observing_ticks(&self) -> bool {
        self.observing
    }

    /// Frame time of the most recent tick that ran.
    #[must_use]
    pub fn last_tick_time(&self) -> Option<HostTime> {
        self.last_pulse.map(|p| p.frame_time)
    }

    /// Deadline mode chosen for the current tick, if one has been chosen.
    #[must_use]
    pub fn deadline_mode(&self) -> Option<DeadlineMode> {
        self.scheduled_mode
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// When [`poll`](Self::poll) next has work to do.
    #[must_use]
    pub fn next_wakeup(&self) -> Option<HostTime> {
        if self.stopped {
            return None;
        }
        if self.missed_pulse.is_pending() {
            return Some(self.clock.now());
        }
        self.deadline_timer.fire_at()
    }

    /// Installs (or removes) the sink that receives trace events.
    ///
    /// Returns the previous sink.
    pub fn set_trace_sink(
        &mut self,
        sink: Option<Box<dyn TraceSink>>,
    ) -> Option<Box<dyn TraceSink>> {
        core::mem::replace(&mut self.trace_sink, sink)
    }

    fn tracer(&mut self) -> Tracer<'_> {
        match &mut self.trace_sink {
            Some(sink) => Tracer::new(Some(&mut **sink)),
            None => Tracer::none(),
        }
    }

    fn now(&self) -> HostTime {
        self.clock.now()
    }

    // -- Intents ------------------------------------------------------------

    /// Requests a redraw.
    pub fn set_needs_redraw(&mut self) {
        self.state.set_needs_redraw();
        self.process_scheduled_actions();
    }

    /// Requests a round of producer work.
    pub fn set_needs_producer_work(&mut self) {
        self.state.set_needs_producer_work();
        self.process_scheduled_actions();
    }

    /// Requests one more tick.
    pub fn set_needs_one_more_tick(&mut self) {
        self.state.set_needs_one_more_tick();
        self.process_scheduled_actions();
    }

    /// Requests tile preparation.
    pub fn set_needs_prepare_tiles(&mut self) {
        self.state.set_needs_prepare_tiles();
        self.process_scheduled_actions();
    }

    /// Requests an impl-side invalidation.
    pub fn set_needs_impl_side_invalidation(&mut self, request_first_draw_on_activation: bool) {
        self.state
            .set_needs_impl_side_invalidation(request_first_draw_on_activation);
        self.process_scheduled_actions();
    }

    /// Defers (or resumes) producer work and commits.
    pub fn set_defer_commits(&mut self, defer: bool) {
        self.state.set_defer_commits(defer);
        self.process_scheduled_actions();
    }

    /// Sets visibility. Timing history is only recorded while visible.
    pub fn set_visible(&mut self, visible: bool) {
        self.state.set_visible(visible);
        self.estimator.set_recording_enabled(visible);
        self.process_scheduled_actions();
    }

    /// Sets whether an output target exists.
    pub fn set_can_draw(&mut self, can_draw: bool) {
        self.state.set_can_draw(can_draw);
        self.process_scheduled_actions();
    }

    /// Marks the tick source as paused or resumed.
    pub fn set_tick_source_paused(&mut self, paused: bool) {
        self.state.set_tick_source_paused(paused);
        self.process_scheduled_actions();
    }

    /// Keeps ticks coming for video playback.
    pub fn set_video_needs_ticks(&mut self, needs: bool) {
        self.state.set_video_needs_ticks(needs);
        self.process_scheduled_actions();
    }

    /// Sets tree priority and scroll ownership.
    pub fn set_tree_priorities_and_scroll_state(
        &mut self,
        tree_priority: TreePriority,
        scroll_handler_state: ScrollHandlerState,
    ) {
        self.state
            .set_tree_priorities_and_scroll_state(tree_priority, scroll_handler_state);
        self.process_scheduled_actions();
    }

    /// Opts the producer in or out of "no work expected" notifications.
    pub fn set_wants_producer_not_expected_messages(&mut self, wants: bool) {
        self.state.set_wants_producer_not_expected_messages(wants);
        self.process_scheduled_actions();
    }

    /// Replaces the tick source, moving the subscription if there is one.
    ///
    /// Returns the previous source.
    pub fn set_tick_source(
        &mut self,
        source: Option<Box<dyn TickSource>>,
    ) -> Option<Box<dyn TickSource>> {
        if let Some(stale) = self.missed_pulse.cancel() {
            self.drop_pulse(&stale, DropReason::StaleMissed);
        }
        let was_observing = self.observing;
        if was_observing {
            if let Some(old) = &mut self.tick_source {
                old.remove_observer();
            }
            self.observing = false;
        }
        let previous = core::mem::replace(&mut self.tick_source, source);
        // The subscription moves now, even in the middle of a tick.
        if was_observing && !self.stopped {
            if let Some(source) = &mut self.tick_source {
                self.observing = true;
                let missed = source.add_observer();
                tracing::debug!("tick subscription moved to a new source");
                if let Some(pulse) = missed {
                    self.missed_pulse.post(pulse.as_missed());
                }
            }
        }
        self.process_scheduled_actions();
        previous
    }

    // -- Notifications ------------------------------------------------------

    /// The producer picked up dispatched work at `start_time`.
    pub fn notify_producer_work_started(&mut self, start_time: HostTime) {
        self.estimator.producer_work_started(start_time);
        self.state.notify_producer_work_started();
        self.process_scheduled_actions();
    }

    /// The producer's result can be committed.
    pub fn notify_ready_to_commit(&mut self) {
        self.state.notify_ready_to_commit();
        self.process_scheduled_actions();
    }

    /// The client finished committing.
    pub fn did_commit(&mut self) {
        let now = self.now();
        self.estimator.did_commit(now);
        self.process_scheduled_actions();
    }

    /// Producer work ended without a commit.
    pub fn producer_work_aborted(&mut self, reason: CommitEarlyOutReason) {
        tracing::debug!(?reason, "producer work aborted");
        self.estimator.producer_work_aborted();
        self.state.producer_work_aborted(reason);
        self.process_scheduled_actions();
    }

    /// The pending tree is ready to activate.
    pub fn notify_ready_to_activate(&mut self) {
        if self.state.notify_ready_to_activate() {
            let now = self.now();
            self.estimator.ready_to_activate(now);
        }
        self.process_scheduled_actions();
    }

    /// The active tree is ready to draw.
    pub fn notify_ready_to_draw(&mut self) {
        self.state.notify_ready_to_draw();
        self.process_scheduled_actions();
    }

    /// A frame was submitted outside of a scheduled draw.
    pub fn did_submit_frame(&mut self) {
        self.state.did_submit_frame();
        self.process_scheduled_actions();
    }

    /// Downstream acknowledged a submitted frame.
    pub fn did_receive_submit_ack(&mut self) {
        self.state.did_receive_submit_ack();
        self.process_scheduled_actions();
    }

    /// Requested tile preparation completed.
    pub fn did_prepare_tiles(&mut self) {
        self.state.did_prepare_tiles();
        self.process_scheduled_actions();
    }

    /// The output sink was lost.
    pub fn did_lose_sink(&mut self) {
        tracing::debug!("sink lost");
        self.state.did_lose_sink();
        self.process_scheduled_actions();
    }

    /// The output sink requested by the client is ready.
    pub fn did_create_sink(&mut self) {
        tracing::debug!("sink created");
        self.state.did_create_sink();
        self.process_scheduled_actions();
    }

    /// Stops all further action processing. Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.deadline_timer.cancel();
        if let Some(stale) = self.missed_pulse.cancel() {
            self.drop_pulse(&stale, DropReason::NoLongerObserving);
        }
        if self.observing {
            if let Some(source) = &mut self.tick_source {
                source.remove_observer();
            }
            self.observing = false;
        }
        tracing::debug!("scheduler stopped");
    }

    // -- Ticks --------------------------------------------------------------

    /// Handles a pulse from the tick source.
    ///
    /// Returns `false` when the pulse was acknowledged as skipped without
    /// running a tick.
    pub fn on_tick(&mut self, pulse: TickPulse) -> bool {
        let now = self.now();
        self.tracer()
            .tick_received(&TickReceivedEvent::new(&pulse, now));

        if self.stopped {
            self.drop_pulse(&pulse, DropReason::NoLongerObserving);
            return false;
        }
        if !self.state.tick_needed() {
            self.drop_pulse(&pulse, DropReason::NotNeeded);
            return false;
        }
        if pulse.kind == PulseKind::Missed && now > pulse.deadline {
            self.drop_pulse(&pulse, DropReason::StaleMissed);
            return false;
        }

        if self.settings.using_synchronous_tick_source {
            self.run_synchronous_tick(pulse);
            return true;
        }
        if self.inside_process {
            // Delivered from inside the loop; run it at the next poll.
            self.missed_pulse.post(pulse);
            return true;
        }
        self.begin_tick_with_deadline(pulse)
    }

    /// Runs whatever timer or posted task is due.
    pub fn poll(&mut self) {
        if self.stopped {
            return;
        }
        let now = self.now();
        if self.deadline_timer.take_if_due(now) {
            self.on_deadline();
        }
        if let Some(pulse) = self.missed_pulse.take() {
            self.on_tick(pulse);
        }
    }

    /// Runs the deadline work for a draw requested by a synchronous embedder.
    pub fn on_draw_for_sink(&mut self, resourceless_software_draw: bool) {
        debug_assert!(
            self.settings.using_synchronous_tick_source,
            "on_draw_for_sink requires a synchronous tick source"
        );
        if self.stopped
            || !self.settings.using_synchronous_tick_source
            || self.state.tick_phase() != TickPhase::Idle
        {
            return;
        }
        self.state
            .set_resourceless_software_draw(resourceless_software_draw);
        self.state.on_tick_deadline();
        self.process_scheduled_actions();
        self.state.on_tick_idle();
        self.state.set_resourceless_software_draw(false);
        self.process_scheduled_actions();
    }

    fn run_synchronous_tick(&mut self, pulse: TickPulse) {
        let now = self.now();
        self.state.set_critical_producer_to_activate_is_fast(false);
        self.begin_tick(pulse, now);
        self.finish_tick();
    }

    fn begin_tick_with_deadline(&mut self, pulse: TickPulse) -> bool {
        if let Some(superseded) = self.missed_pulse.cancel() {
            self.drop_pulse(&superseded, DropReason::StaleMissed);
        }

        if self.state.tick_phase() != TickPhase::Idle {
            // Catch up on the previous tick before starting this one.
            self.on_deadline();
            if !self.observing || self.state.tick_phase() != TickPhase::Idle {
                self.drop_pulse(&pulse, DropReason::NoLongerObserving);
                return false;
            }
        }

        let now = self.now();
        let adjustment = self
            .estimator
            .draw_duration()
            .saturating_add(self.settings.deadline_fudge);
        let pulse = pulse.with_deadline(pulse.deadline.saturating_sub(adjustment));

        let critical_estimate = self.producer_to_activate_estimate(true);
        self.state
            .set_critical_producer_to_activate_is_fast(critical_estimate < pulse.interval);
        let on_critical_path = !self.state.impl_latency_takes_priority();
        let estimate = self.producer_to_activate_estimate(on_critical_path);
        let can_activate_before_deadline = now.saturating_add(estimate) < pulse.deadline;

        if self.should_recover_producer_latency(can_activate_before_deadline) {
            tracing::debug!(
                sequence = pulse.sequence_number,
                "skipping producer work to recover latency"
            );
            self.state.set_skip_next_producer_work();
            self.trace_recovery(&pulse, RecoveryKind::Producer, now);
        } else if self.should_recover_impl_latency(&pulse, can_activate_before_deadline) {
            tracing::debug!(
                sequence = pulse.sequence_number,
                "dropping tick to recover impl latency"
            );
            self.trace_recovery(&pulse, RecoveryKind::Impl, now);
            self.drop_pulse(&pulse, DropReason::ImplLatencyRecovery);
            return false;
        }

        self.begin_tick(pulse, now);
        true
    }

    fn producer_to_activate_estimate(&self, critical: bool) -> Duration {
        let e = &self.estimator;
        let total = e
            .producer_dispatch_duration()
            .saturating_add(e.producer_queue_duration(critical))
            .saturating_add(e.commit_to_ready_duration())
            .saturating_add(e.activate_duration());
        self.settings.scale_estimate(total)
    }

    fn should_recover_producer_latency(&self, can_activate_before_deadline: bool) -> bool {
        if !self.settings.enable_latency_recovery {
            return false;
        }
        // A producer that kept up has nothing to recover.
        if !self.state.producer_missed_last_deadline() {
            return false;
        }
        // Impl priority deliberately keeps the producer behind.
        if self.state.impl_latency_takes_priority() {
            return false;
        }
        can_activate_before_deadline
    }

    fn should_recover_impl_latency(
        &self,
        pulse: &TickPulse,
        can_activate_before_deadline: bool,
    ) -> bool {
        if !self.settings.enable_latency_recovery {
            return false;
        }
        // Free-running sources always tick before the ack; the signal is noise.
        if self
            .tick_source
            .as_ref()
            .is_some_and(|source| !source.is_throttled())
        {
            return false;
        }
        if !self.state.is_draw_throttled() {
            return false;
        }
        let can_draw_before_deadline = pulse.frame_time < pulse.deadline;
        if self.state.impl_latency_takes_priority() || self.state.only_impl_side_updates_expected()
        {
            return can_draw_before_deadline;
        }
        can_activate_before_deadline
    }

    fn begin_tick(&mut self, pulse: TickPulse, now: HostTime) {
        tracing::trace!(
            source = pulse.source_id,
            sequence = pulse.sequence_number,
            "tick begins"
        );
        self.last_pulse = Some(pulse);
        self.scheduled_mode = None;
        self.tick_began_at = now;
        self.state
            .on_tick_begin(pulse.source_id, pulse.sequence_number);
        self.client.will_begin_tick(&pulse);
        self.process_scheduled_actions();
    }

    fn on_deadline(&mut self) {
        self.deadline_timer.cancel();
        if self.state.tick_phase() != TickPhase::InsidePulse {
            return;
        }
        let now = self.now();
        let frame_number = self.state.frame_number();
        tracing::trace!(frame_number, "deadline");
        self.tracer()
            .deadline_fired(&DeadlineFiredEvent { frame_number, now });
        self.state.on_tick_deadline();
        self.process_scheduled_actions();
        self.finish_tick();
    }

    fn finish_tick(&mut self) {
        self.deadline_timer.cancel();
        self.state.on_tick_idle();
        self.process_scheduled_actions();
        self.client.did_finish_tick();

        let Some(pulse) = self.last_pulse else {
            return;
        };
        let did_submit = self.state.did_submit_this_tick();
        let ack = TickAck::new(&pulse, TickResult::Finished, did_submit);
        if let Some(source) = &mut self.tick_source {
            source.did_finish_tick(&ack);
        }
        if !did_submit {
            self.client.did_not_produce_frame(&ack);
        }
        let event = TickFinishedEvent {
            source_id: pulse.source_id,
            sequence_number: pulse.sequence_number,
            frame_number: self.state.frame_number(),
            result: TickResult::Finished,
            did_submit_frame: did_submit,
            began_at: self.tick_began_at,
            finished_at: self.now(),
        };
        self.tracer().tick_finished(&event);
    }

    fn drop_pulse(&mut self, pulse: &TickPulse, reason: DropReason) {
        tracing::debug!(
            source = pulse.source_id,
            sequence = pulse.sequence_number,
            ?reason,
            "pulse dropped"
        );
        let ack = TickAck::new(pulse, TickResult::Skipped, false);
        if let Some(source) = &mut self.tick_source {
            source.did_finish_tick(&ack);
        }
        self.client.did_not_produce_frame(&ack);
        let event = TickDroppedEvent {
            source_id: pulse.source_id,
            sequence_number: pulse.sequence_number,
            reason,
            now: self.now(),
        };
        self.tracer().tick_dropped(&event);
    }

    fn trace_recovery(&mut self, pulse: &TickPulse, kind: RecoveryKind, now: HostTime) {
        let event = LatencyRecoveryEvent {
            source_id: pulse.source_id,
            sequence_number: pulse.sequence_number,
            kind,
            now,
        };
        self.tracer().latency_recovery(&event);
    }

    // -- Action loop --------------------------------------------------------

    fn process_scheduled_actions(&mut self) {
        if self.stopped || self.inside_process {
            return;
        }
        self.inside_process = true;
        loop {
            let action = self.state.next_action();
            if action == Action::None {
                break;
            }
            self.execute(action);
        }
        self.inside_process = false;

        self.schedule_deadline_if_needed();
        self.setup_next_tick_if_needed();
    }

    fn execute(&mut self, action: Action) {
        let frame_number = self.state.frame_number();
        let now = self.now();
        tracing::trace!(%action, frame_number, "action");
        self.tracer().action_begin(&ActionEvent {
            frame_number,
            action,
            timestamp: now,
        });

        match action {
            Action::None => {}
            Action::SendProducerWork => {
                self.state.will_send_producer_work();
                let on_critical_path = !self.state.impl_latency_takes_priority();
                self.estimator
                    .will_dispatch_producer_work(now, on_critical_path);
                let pulse = self
                    .last_pulse
                    .unwrap_or_else(|| TickPulse::normal(0, 0, now, now, Duration::ZERO));
                let args = ProducerWorkArgs {
                    pulse,
                    on_critical_path,
                };
                self.client.dispatch_producer_work(&args);
                self.state.did_perform(action);
            }
            Action::NotifyProducerWorkNotSent => {
                self.state.will_notify_producer_work_not_sent();
                self.client.producer_work_not_sent();
                if self.observing {
                    if let Some(pulse) = self.last_pulse {
                        self.client
                            .producer_work_not_expected_until(pulse.next_frame_time());
                    }
                } else {
                    self.client.send_no_ticks_expected_soon();
                }
                self.state.did_perform(action);
            }
            Action::Commit => {
                self.state.will_commit();
                self.client.commit();
                self.state.did_perform(action);
            }
            Action::ActivateSyncTree => {
                self.state.will_activate();
                self.estimator.will_activate(now);
                self.client.activate_sync_tree();
                let done = self.now();
                self.estimator.did_activate(done);
                self.state.did_perform(action);
            }
            Action::PerformImplSideInvalidation => {
                self.state.will_perform_impl_side_invalidation();
                self.client.perform_impl_side_invalidation();
                self.state.did_perform(action);
            }
            Action::DrawIfPossible | Action::DrawForced => {
                self.state.will_draw(action);
                self.estimator.will_draw(now);
                let result = if action == Action::DrawForced {
                    self.client.draw_forced()
                } else {
                    self.client.draw_if_possible()
                };
                self.state.did_draw(result);
                let done = self.now();
                self.estimator.did_draw(done, result.is_success());
                self.trace_draw(frame_number, action, result, done);
            }
            Action::DrawAbort => {
                self.state.will_draw(action);
                self.state.did_draw(DrawResult::AbortedDrainingPipeline);
                self.trace_draw(
                    frame_number,
                    action,
                    DrawResult::AbortedDrainingPipeline,
                    now,
                );
            }
            Action::BeginSinkCreation => {
                self.state.will_begin_sink_creation();
                self.client.begin_sink_creation();
                self.state.did_perform(action);
            }
            Action::PrepareTiles => {
                self.state.will_prepare_tiles();
                self.client.prepare_tiles();
                self.state.did_perform(action);
            }
            Action::InvalidateSink => {
                self.state.will_invalidate_sink();
                self.client.invalidate_sink();
                self.state.did_perform(action);
            }
        }

        let timestamp = self.now();
        self.tracer().action_end(&ActionEvent {
            frame_number,
            action,
            timestamp,
        });
    }

    fn trace_draw(
        &mut self,
        frame_number: u64,
        action: Action,
        result: DrawResult,
        timestamp: HostTime,
    ) {
        if !result.is_success() {
            tracing::debug!(%action, ?result, frame_number, "draw did not submit");
        }
        self.tracer().draw_result(&DrawResultEvent {
            frame_number,
            action,
            result,
            timestamp,
        });
    }

    fn schedule_deadline_if_needed(&mut self) {
        if self.state.tick_phase() != TickPhase::InsidePulse {
            return;
        }
        let mode = self.state.current_deadline_mode();
        if self.scheduled_mode == Some(mode)
            && (self.deadline_timer.is_pending()
                || matches!(mode, DeadlineMode::None | DeadlineMode::Blocked))
        {
            return;
        }
        let Some(pulse) = self.last_pulse else {
            return;
        };
        let now = self.now();
        self.deadline_timer.cancel();
        let fire_at = match mode {
            DeadlineMode::None | DeadlineMode::Blocked => None,
            DeadlineMode::Immediate => Some(now),
            DeadlineMode::Regular => Some(pulse.deadline),
            DeadlineMode::Late => Some(pulse.next_frame_time()),
        };
        if let Some(at) = fire_at {
            self.deadline_timer.arm(at);
        }
        self.scheduled_mode = Some(mode);
        tracing::trace!(mode = mode.as_str(), ?fire_at, "deadline scheduled");
        let frame_number = self.state.frame_number();
        self.tracer().deadline_scheduled(&DeadlineScheduledEvent {
            frame_number,
            mode,
            fire_at,
            now,
        });
    }

    fn setup_next_tick_if_needed(&mut self) {
        if self.state.tick_phase() != TickPhase::Idle {
            return;
        }
        let needed = self.state.tick_needed();
        if needed && !self.observing {
            let Some(source) = &mut self.tick_source else {
                return;
            };
            self.observing = true;
            let missed = source.add_observer();
            tracing::debug!("observing ticks");
            if let Some(pulse) = missed {
                self.missed_pulse.post(pulse.as_missed());
            }
        } else if !needed && self.observing {
            if let Some(source) = &mut self.tick_source {
                source.remove_observer();
            }
            self.observing = false;
            if let Some(stale) = self.missed_pulse.cancel() {
                self.drop_pulse(&stale, DropReason::NotNeeded);
            }
            tracing::debug!("stopped observing ticks");
            self.client.send_no_ticks_expected_soon();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
