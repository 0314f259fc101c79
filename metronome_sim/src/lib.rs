// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deterministic simulation of a metronome scheduler.
//!
//! A [`SimRunner`] drives a real [`Scheduler`](metronome_core::scheduler::Scheduler)
//! under a [`ManualClock`](metronome_core::clock::ManualClock). Pulses come
//! from a fixed-rate [`SimTickSource`]; the [`SimClient`] records every
//! action and reports its work as finished after configurable
//! [`StageLatencies`]. Each acknowledged pulse lands in [`FrameStats`],
//! which grades how reliably frames were delivered.
//!
//! ```
//! use metronome_core::estimator::RollingTimingHistory;
//! use metronome_core::settings::SchedulerSettings;
//! use metronome_sim::{LatencyGrade, SimConfig, SimRunner};
//!
//! let config = SimConfig {
//!     producer_work_every_tick: true,
//!     ..SimConfig::default()
//! };
//! let mut sim = SimRunner::new(
//!     SchedulerSettings::default(),
//!     Box::new(RollingTimingHistory::default()),
//!     config,
//! )
//! .unwrap();
//! sim.run_ticks(30);
//! assert_eq!(sim.stats().grade(), LatencyGrade::A);
//! ```

#![no_std]

extern crate alloc;

pub mod client;
pub mod runner;
pub mod source;
pub mod stats;

pub use client::{Completion, SimClient, StageLatencies};
pub use runner::{STATS_WINDOW, SimConfig, SimRunner};
pub use source::SimTickSource;
pub use stats::{FrameStats, LatencyGrade, TickOutcome};
