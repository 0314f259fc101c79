// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Time sources for the scheduler.
//!
//! The scheduler never reads ambient time. It asks a [`Clock`] whenever it
//! needs "now": when adjusting a pulse deadline, arming the deadline timer, or
//! deciding whether a redelivered pulse is already stale.
//!
//! [`ManualClock`] is a shared, explicitly advanced clock used by tests and by
//! simulations. With the `std` feature, [`SystemClock`] reads the platform's
//! monotonic clock.

use alloc::rc::Rc;
use core::cell::Cell;

use crate::time::{Duration, HostTime};

/// A monotonic source of [`HostTime`].
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> HostTime;
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can keep one handle while
/// the scheduler owns another.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    /// Creates a clock reading `start`.
    #[must_use]
    pub fn new(start: HostTime) -> Self {
        Self {
            now: Rc::new(Cell::new(start.0)),
        }
    }

    /// Moves the clock to `t`.
    ///
    /// Moving backwards is ignored; the clock is monotonic.
    pub fn set(&self, t: HostTime) {
        if t.0 >= self.now.get() {
            self.now.set(t.0);
        }
    }

    /// Advances the clock by `d`.
    pub fn advance(&self, d: Duration) {
        self.now.set(self.now.get().saturating_add(d.0));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> HostTime {
        HostTime(self.now.get())
    }
}

/// Monotonic wall clock, measured from the moment it was created.
#[cfg(feature = "std")]
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl SystemClock {
    /// Creates a clock whose origin is the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for SystemClock {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "u64 nanoseconds cover centuries of uptime"
    )]
    fn now(&self) -> HostTime {
        HostTime(self.origin.elapsed().as_nanos() as u64)
    }
}
