// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structured trace events for the scheduler.
//!
//! This module provides a [`TraceSink`] trait with one method per scheduler
//! event. All method bodies default to no-ops, so a sink only overrides the
//! events it cares about.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.
//!
//! Trace events complement the `tracing` log lines the scheduler emits: logs
//! are for humans, trace events are for recorders and timeline exporters.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).

use alloc::rc::Rc;
use core::cell::RefCell;

use crate::state_machine::{Action, DeadlineMode, DrawResult};
use crate::time::{Duration, HostTime};
use crate::timing::{PulseKind, TickPulse, TickResult};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Why a pulse was acknowledged as skipped without running a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Nothing needed a tick.
    NotNeeded,
    /// A redelivered pulse whose deadline had already passed.
    StaleMissed,
    /// The scheduler stopped observing while catching up on the previous tick.
    NoLongerObserving,
    /// Dropped so the impl side could catch up.
    ImplLatencyRecovery,
}

/// Which latency recovery heuristic fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecoveryKind {
    /// Producer work was skipped for one tick.
    Producer,
    /// The whole tick was dropped.
    Impl,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when the scheduler receives a pulse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickReceivedEvent {
    /// Source of the pulse.
    pub source_id: u64,
    /// Sequence number of the pulse.
    pub sequence_number: u64,
    /// Nominal pulse time.
    pub frame_time: HostTime,
    /// Deadline as delivered by the source.
    pub deadline: HostTime,
    /// Nominal pulse spacing.
    pub interval: Duration,
    /// Fresh or redelivered.
    pub kind: PulseKind,
    /// Host time at receipt.
    pub now: HostTime,
}

impl TickReceivedEvent {
    /// Describes `pulse` received at `now`.
    #[must_use]
    pub fn new(pulse: &TickPulse, now: HostTime) -> Self {
        Self {
            source_id: pulse.source_id,
            sequence_number: pulse.sequence_number,
            frame_time: pulse.frame_time,
            deadline: pulse.deadline,
            interval: pulse.interval,
            kind: pulse.kind,
            now,
        }
    }
}

/// Emitted when a pulse is acknowledged without running a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickDroppedEvent {
    /// Source of the pulse.
    pub source_id: u64,
    /// Sequence number of the pulse.
    pub sequence_number: u64,
    /// Why it was dropped.
    pub reason: DropReason,
    /// Host time of the drop.
    pub now: HostTime,
}

/// Emitted whenever the deadline timer is (re)armed or deliberately left
/// unarmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeadlineScheduledEvent {
    /// Tick counter.
    pub frame_number: u64,
    /// Chosen mode.
    pub mode: DeadlineMode,
    /// When the timer will fire, if armed.
    pub fire_at: Option<HostTime>,
    /// Host time of the decision.
    pub now: HostTime,
}

/// Emitted when the deadline fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeadlineFiredEvent {
    /// Tick counter.
    pub frame_number: u64,
    /// Host time at which the deadline was processed.
    pub now: HostTime,
}

/// Marks the start or end of one executed action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionEvent {
    /// Tick counter.
    pub frame_number: u64,
    /// The action.
    pub action: Action,
    /// Host time of the boundary.
    pub timestamp: HostTime,
}

/// Emitted after the client reports a draw result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawResultEvent {
    /// Tick counter.
    pub frame_number: u64,
    /// Which draw action ran.
    pub action: Action,
    /// Its outcome.
    pub result: DrawResult,
    /// Host time of the report.
    pub timestamp: HostTime,
}

/// Emitted when a latency recovery heuristic fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyRecoveryEvent {
    /// Source of the affected pulse.
    pub source_id: u64,
    /// Sequence number of the affected pulse.
    pub sequence_number: u64,
    /// Which heuristic.
    pub kind: RecoveryKind,
    /// Host time of the decision.
    pub now: HostTime,
}

/// Emitted when a tick that ran is acknowledged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickFinishedEvent {
    /// Source of the pulse.
    pub source_id: u64,
    /// Sequence number of the pulse.
    pub sequence_number: u64,
    /// Tick counter.
    pub frame_number: u64,
    /// Acknowledged result.
    pub result: TickResult,
    /// Whether a frame was submitted during the tick.
    pub did_submit_frame: bool,
    /// Host time when the tick began.
    pub began_at: HostTime,
    /// Host time when the tick finished.
    pub finished_at: HostTime,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the scheduler.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a pulse is received.
    fn on_tick_received(&mut self, e: &TickReceivedEvent) {
        _ = e;
    }

    /// Called when a pulse is dropped.
    fn on_tick_dropped(&mut self, e: &TickDroppedEvent) {
        _ = e;
    }

    /// Called when the deadline mode is decided.
    fn on_deadline_scheduled(&mut self, e: &DeadlineScheduledEvent) {
        _ = e;
    }

    /// Called when the deadline fires.
    fn on_deadline_fired(&mut self, e: &DeadlineFiredEvent) {
        _ = e;
    }

    /// Called before an action is executed.
    fn on_action_begin(&mut self, e: &ActionEvent) {
        _ = e;
    }

    /// Called after an action is executed.
    fn on_action_end(&mut self, e: &ActionEvent) {
        _ = e;
    }

    /// Called with each draw outcome.
    fn on_draw_result(&mut self, e: &DrawResultEvent) {
        _ = e;
    }

    /// Called when a latency recovery heuristic fires.
    fn on_latency_recovery(&mut self, e: &LatencyRecoveryEvent) {
        _ = e;
    }

    /// Called when a tick that ran is acknowledged.
    fn on_tick_finished(&mut self, e: &TickFinishedEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

/// Shared sinks let the embedder read a sink back after handing it to the
/// scheduler.
impl<T: TraceSink + ?Sized> TraceSink for Rc<RefCell<T>> {
    fn on_tick_received(&mut self, e: &TickReceivedEvent) {
        self.borrow_mut().on_tick_received(e);
    }

    fn on_tick_dropped(&mut self, e: &TickDroppedEvent) {
        self.borrow_mut().on_tick_dropped(e);
    }

    fn on_deadline_scheduled(&mut self, e: &DeadlineScheduledEvent) {
        self.borrow_mut().on_deadline_scheduled(e);
    }

    fn on_deadline_fired(&mut self, e: &DeadlineFiredEvent) {
        self.borrow_mut().on_deadline_fired(e);
    }

    fn on_action_begin(&mut self, e: &ActionEvent) {
        self.borrow_mut().on_action_begin(e);
    }

    fn on_action_end(&mut self, e: &ActionEvent) {
        self.borrow_mut().on_action_end(e);
    }

    fn on_draw_result(&mut self, e: &DrawResultEvent) {
        self.borrow_mut().on_draw_result(e);
    }

    fn on_latency_recovery(&mut self, e: &LatencyRecoveryEvent) {
        self.borrow_mut().on_latency_recovery(e);
    }

    fn on_tick_finished(&mut self, e: &TickFinishedEvent) {
        self.borrow_mut().on_tick_finished(e);
    }
}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! dispatch {
    ($self:ident, $method:ident, $e:ident) => {{
        #[cfg(feature = "trace")]
        if let Some(s) = &mut $self.sink {
            s.$method($e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = $e;
        }
    }};
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to `sink`, or discards events when it
    /// is `None`.
    #[inline]
    #[must_use]
    pub fn new(sink: Option<&'a mut dyn TraceSink>) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::new(None)
    }

    /// Emits a [`TickReceivedEvent`].
    #[inline]
    pub fn tick_received(&mut self, e: &TickReceivedEvent) {
        dispatch!(self, on_tick_received, e);
    }

    /// Emits a [`TickDroppedEvent`].
    #[inline]
    pub fn tick_dropped(&mut self, e: &TickDroppedEvent) {
        dispatch!(self, on_tick_dropped, e);
    }

    /// Emits a [`DeadlineScheduledEvent`].
    #[inline]
    pub fn deadline_scheduled(&mut self, e: &DeadlineScheduledEvent) {
        dispatch!(self, on_deadline_scheduled, e);
    }

    /// Emits a [`DeadlineFiredEvent`].
    #[inline]
    pub fn deadline_fired(&mut self, e: &DeadlineFiredEvent) {
        dispatch!(self, on_deadline_fired, e);
    }

    /// Emits an action-begin [`ActionEvent`].
    #[inline]
    pub fn action_begin(&mut self, e: &ActionEvent) {
        dispatch!(self, on_action_begin, e);
    }

    /// Emits an action-end [`ActionEvent`].
    #[inline]
    pub fn action_end(&mut self, e: &ActionEvent) {
        dispatch!(self, on_action_end, e);
    }

    /// Emits a [`DrawResultEvent`].
    #[inline]
    pub fn draw_result(&mut self, e: &DrawResultEvent) {
        dispatch!(self, on_draw_result, e);
    }

    /// Emits a [`LatencyRecoveryEvent`].
    #[inline]
    pub fn latency_recovery(&mut self, e: &LatencyRecoveryEvent) {
        dispatch!(self, on_latency_recovery, e);
    }

    /// Emits a [`TickFinishedEvent`].
    #[inline]
    pub fn tick_finished(&mut self, e: &TickFinishedEvent) {
        dispatch!(self, on_tick_finished, e);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        received: u32,
        dropped: u32,
        actions: u32,
    }

    impl TraceSink for Counter {
        fn on_tick_received(&mut self, _e: &TickReceivedEvent) {
            self.received += 1;
        }

        fn on_tick_dropped(&mut self, _e: &TickDroppedEvent) {
            self.dropped += 1;
        }

        fn on_action_begin(&mut self, _e: &ActionEvent) {
            self.actions += 1;
        }
    }

    fn pulse() -> TickPulse {
        TickPulse::normal(
            3,
            9,
            HostTime::from_millis(10),
            HostTime::from_millis(24),
            Duration::from_millis(16),
        )
    }

    #[test]
    fn received_event_copies_pulse() {
        let e = TickReceivedEvent::new(&pulse(), HostTime::from_millis(11));
        assert_eq!(e.sequence_number, 9, "sequence copied");
        assert_eq!(e.deadline, HostTime::from_millis(24), "deadline copied");
        assert_eq!(e.kind, PulseKind::Normal, "kind copied");
    }

    #[test]
    fn none_tracer_accepts_events() {
        let mut tracer = Tracer::none();
        tracer.tick_received(&TickReceivedEvent::new(&pulse(), HostTime::ZERO));
        tracer.deadline_fired(&DeadlineFiredEvent {
            frame_number: 1,
            now: HostTime::ZERO,
        });
    }

    #[test]
    fn noop_sink_ignores_everything() {
        let mut sink = NoopSink;
        sink.on_tick_dropped(&TickDroppedEvent {
            source_id: 0,
            sequence_number: 0,
            reason: DropReason::NotNeeded,
            now: HostTime::ZERO,
        });
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        let mut counter = Counter::default();
        {
            let mut tracer = Tracer::new(Some(&mut counter));
            tracer.tick_received(&TickReceivedEvent::new(&pulse(), HostTime::ZERO));
            tracer.tick_dropped(&TickDroppedEvent {
                source_id: 3,
                sequence_number: 9,
                reason: DropReason::StaleMissed,
                now: HostTime::ZERO,
            });
            tracer.action_begin(&ActionEvent {
                frame_number: 1,
                action: Action::Commit,
                timestamp: HostTime::ZERO,
            });
        }
        assert_eq!(counter.received, 1, "one receipt");
        assert_eq!(counter.dropped, 1, "one drop");
        assert_eq!(counter.actions, 1, "one action");
    }

    #[test]
    fn shared_sink_forwards_to_inner() {
        let shared = Rc::new(RefCell::new(Counter::default()));
        let mut handle = Rc::clone(&shared);
        handle.on_tick_received(&TickReceivedEvent::new(&pulse(), HostTime::ZERO));
        assert_eq!(shared.borrow().received, 1, "inner sink saw the event");
    }

    #[cfg(not(feature = "trace"))]
    #[test]
    fn tracer_is_inert_without_feature() {
        let mut counter = Counter::default();
        {
            let mut tracer = Tracer::new(Some(&mut counter));
            tracer.tick_received(&TickReceivedEvent::new(&pulse(), HostTime::ZERO));
        }
        assert_eq!(counter.received, 0, "feature off: nothing dispatched");
        assert_eq!(counter.dropped + counter.actions, 0, "feature off");
    }
}
