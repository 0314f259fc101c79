// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A scripted tick source.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use metronome_core::client::TickSource;
use metronome_core::time::{Duration, HostTime};
use metronome_core::timing::{TickAck, TickPulse};

#[derive(Debug)]
struct SourceState {
    source_id: u64,
    interval: Duration,
    deadline_fraction: f64,
    next_frame_time: HostTime,
    sequence: u64,
    observing: bool,
    throttled: bool,
    awaiting_ack: bool,
    report_missed: bool,
    last_unobserved: Option<TickPulse>,
    acks: Vec<TickAck>,
    withheld: u64,
    missed_reported: u64,
}

/// A fixed-rate tick source.
///
/// Clones share state: the [`SimRunner`](crate::SimRunner) keeps one handle
/// to emit pulses while the scheduler owns another as its
/// [`TickSource`].
///
/// When throttled, a pulse is withheld while the previous one is still
/// unacknowledged. When `report_missed` is set, subscribing returns the most
/// recent pulse that was emitted while nobody was observing.
#[derive(Clone, Debug)]
pub struct SimTickSource {
    inner: Rc<RefCell<SourceState>>,
}

impl SimTickSource {
    /// Creates a source whose first pulse is one `interval` after the origin.
    ///
    /// Each pulse's deadline is `frame_time + interval * deadline_fraction`.
    #[must_use]
    pub fn new(source_id: u64, interval: Duration, deadline_fraction: f64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SourceState {
                source_id,
                interval,
                deadline_fraction,
                next_frame_time: HostTime::ZERO + interval,
                sequence: 0,
                observing: false,
                throttled: true,
                awaiting_ack: false,
                report_missed: true,
                last_unobserved: None,
                acks: Vec::new(),
                withheld: 0,
                missed_reported: 0,
            })),
        }
    }

    /// Enables or disables ack-based throttling.
    pub fn set_throttled(&self, throttled: bool) {
        self.inner.borrow_mut().throttled = throttled;
    }

    /// Enables or disables reporting a missed pulse on subscription.
    pub fn set_report_missed(&self, report: bool) {
        self.inner.borrow_mut().report_missed = report;
    }

    /// When the next pulse is due.
    #[must_use]
    pub fn next_pulse_time(&self) -> HostTime {
        self.inner.borrow().next_frame_time
    }

    /// Pulses emitted so far, observed or not.
    #[must_use]
    pub fn pulses_emitted(&self) -> u64 {
        self.inner.borrow().sequence
    }

    /// Whether an observer is subscribed.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.inner.borrow().observing
    }

    /// Pulses held back by throttling.
    #[must_use]
    pub fn withheld(&self) -> u64 {
        self.inner.borrow().withheld
    }

    /// Missed pulses handed out on subscription.
    #[must_use]
    pub fn missed_reported(&self) -> u64 {
        self.inner.borrow().missed_reported
    }

    /// Number of acknowledgements received.
    #[must_use]
    pub fn ack_count(&self) -> usize {
        self.inner.borrow().acks.len()
    }

    /// Acknowledgements from index `from` onwards.
    #[must_use]
    pub fn acks_since(&self, from: usize) -> Vec<TickAck> {
        self.inner.borrow().acks.get(from..).unwrap_or_default().to_vec()
    }

    /// Emits the pulse due at or before `now`.
    ///
    /// Returns the pulse if it should be delivered to the observer. Pulses
    /// nobody observes, and pulses withheld by throttling, return `None`.
    pub fn emit(&self, now: HostTime) -> Option<TickPulse> {
        let mut s = self.inner.borrow_mut();
        if s.next_frame_time > now {
            return None;
        }
        s.sequence += 1;
        let frame_time = s.next_frame_time;
        s.next_frame_time = frame_time + s.interval;
        let deadline = frame_time + s.interval.mul_f64(s.deadline_fraction);
        let pulse = TickPulse::normal(s.source_id, s.sequence, frame_time, deadline, s.interval);

        if !s.observing {
            s.last_unobserved = Some(pulse);
            return None;
        }
        if s.throttled && s.awaiting_ack {
            s.withheld += 1;
            return None;
        }
        s.awaiting_ack = true;
        Some(pulse)
    }
}

impl TickSource for SimTickSource {
    fn add_observer(&mut self) -> Option<TickPulse> {
        let mut s = self.inner.borrow_mut();
        s.observing = true;
        let report = s.report_missed;
        let missed = s.last_unobserved.take().filter(|_| report);
        if missed.is_some() {
            s.missed_reported += 1;
            s.awaiting_ack = true;
        }
        missed
    }

    fn remove_observer(&mut self) {
        let mut s = self.inner.borrow_mut();
        s.observing = false;
        s.awaiting_ack = false;
    }

    fn is_throttled(&self) -> bool {
        self.inner.borrow().throttled
    }

    fn did_finish_tick(&mut self, ack: &TickAck) {
        let mut s = self.inner.borrow_mut();
        s.awaiting_ack = false;
        s.acks.push(*ack);
    }
}
