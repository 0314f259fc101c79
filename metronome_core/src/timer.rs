// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cancelable one-shot timer and task handles.
//!
//! The scheduler does not own a task runner. Deferred work is represented as
//! explicit handles that the scheduler arms and cancels, and that the embedder
//! drives through [`Scheduler::next_wakeup()`] and [`Scheduler::poll()`].
//!
//! [`Scheduler::next_wakeup()`]: crate::scheduler::Scheduler::next_wakeup
//! [`Scheduler::poll()`]: crate::scheduler::Scheduler::poll

use crate::time::HostTime;

/// A one-shot timer that fires at an absolute [`HostTime`].
///
/// Re-arming replaces the previous target; there is never more than one
/// pending expiry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CancelableTimer {
    fire_at: Option<HostTime>,
}

impl CancelableTimer {
    /// Creates an idle timer.
    #[must_use]
    pub const fn new() -> Self {
        Self { fire_at: None }
    }

    /// Arms the timer to fire at `at`, replacing any earlier target.
    pub fn arm(&mut self, at: HostTime) {
        self.fire_at = Some(at);
    }

    /// Cancels the pending expiry, if any.
    pub fn cancel(&mut self) {
        self.fire_at = None;
    }

    /// Whether an expiry is pending.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.fire_at.is_some()
    }

    /// The pending expiry time.
    #[must_use]
    pub const fn fire_at(&self) -> Option<HostTime> {
        self.fire_at
    }

    /// Disarms and returns `true` if the timer is due at `now`.
    pub fn take_if_due(&mut self, now: HostTime) -> bool {
        match self.fire_at {
            Some(at) if at <= now => {
                self.fire_at = None;
                true
            }
            _ => false,
        }
    }
}

/// A posted task carrying a payload, runnable once unless canceled first.
///
/// Tasks run at the next opportunity rather than at a fixed time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancelableTask<T> {
    payload: Option<T>,
}

impl<T> Default for CancelableTask<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CancelableTask<T> {
    /// Creates an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self { payload: None }
    }

    /// Posts `payload`, replacing any task that has not run yet.
    pub fn post(&mut self, payload: T) {
        self.payload = Some(payload);
    }

    /// Cancels the pending task and returns its payload.
    pub fn cancel(&mut self) -> Option<T> {
        self.payload.take()
    }

    /// Whether a task is waiting to run.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.payload.is_some()
    }

    /// Takes the payload so the task can run.
    pub fn take(&mut self) -> Option<T> {
        self.payload.take()
    }
}
