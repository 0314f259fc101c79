// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Collaborator traits: the client that performs actions and the tick source
//! that delivers pulses.
//!
//! Both are called synchronously from the scheduler's action loop and must
//! not block. Completions of asynchronous work come back later as fresh calls
//! on the [`Scheduler`](crate::scheduler::Scheduler), never from inside one
//! of these methods.

use crate::state_machine::DrawResult;
use crate::time::HostTime;
use crate::timing::{ProducerWorkArgs, TickAck, TickPulse};

/// Executes the actions the scheduler decides on.
pub trait SchedulerClient {
    /// Start a round of producer work for `args.pulse`.
    fn dispatch_producer_work(&mut self, args: &ProducerWorkArgs);

    /// No producer work will be dispatched for the current tick.
    fn producer_work_not_sent(&mut self);

    /// No producer work is expected before `time`.
    fn producer_work_not_expected_until(&mut self, time: HostTime) {
        _ = time;
    }

    /// Commit the producer's finished work into a pending tree.
    fn commit(&mut self);

    /// Make the pending tree active.
    fn activate_sync_tree(&mut self);

    /// Build a pending tree from impl-side changes.
    fn perform_impl_side_invalidation(&mut self);

    /// Draw if the content is good enough.
    fn draw_if_possible(&mut self) -> DrawResult;

    /// Draw whatever is available.
    fn draw_forced(&mut self) -> DrawResult;

    /// Start creating an output sink; report completion with
    /// [`Scheduler::did_create_sink`](crate::scheduler::Scheduler::did_create_sink).
    fn begin_sink_creation(&mut self);

    /// Prepare tiles for upcoming frames.
    fn prepare_tiles(&mut self);

    /// Ask the embedder to request a draw (synchronous mode).
    fn invalidate_sink(&mut self);

    /// A tick is starting.
    fn will_begin_tick(&mut self, pulse: &TickPulse) {
        _ = pulse;
    }

    /// The current tick has ended.
    fn did_finish_tick(&mut self) {}

    /// The tick in `ack` ended without a frame.
    fn did_not_produce_frame(&mut self, ack: &TickAck) {
        _ = ack;
    }

    /// The scheduler stopped observing ticks and expects none soon.
    fn send_no_ticks_expected_soon(&mut self) {}
}

/// A periodic source of [`TickPulse`]s.
///
/// The source calls [`Scheduler::on_tick`](crate::scheduler::Scheduler::on_tick)
/// for every pulse while the scheduler is an observer, and waits for the
/// matching [`did_finish_tick`](Self::did_finish_tick) before delivering the
/// next one.
pub trait TickSource {
    /// Starts delivering pulses.
    ///
    /// May return a [`PulseKind::Missed`](crate::timing::PulseKind::Missed)
    /// pulse for a tick that occurred just before subscription.
    fn add_observer(&mut self) -> Option<TickPulse>;

    /// Stops delivering pulses.
    fn remove_observer(&mut self);

    /// Whether pulses are paced by a display rather than free-running.
    fn is_throttled(&self) -> bool {
        true
    }

    /// Acknowledgement for a delivered pulse.
    fn did_finish_tick(&mut self, ack: &TickAck);
}
