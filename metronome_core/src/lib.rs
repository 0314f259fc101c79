// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deadline-driven frame scheduling for a compositor pipeline.
//!
//! `metronome_core` decides, tick by tick, when a compositor should ask its
//! producer for new content, commit it, activate it, and draw it. It is
//! `no_std` compatible (with `alloc`) and performs no I/O: time comes from a
//! [`Clock`](clock::Clock), pulses from a [`TickSource`](client::TickSource),
//! and every side effect goes through a
//! [`SchedulerClient`](client::SchedulerClient).
//!
//! # Architecture
//!
//! ```text
//!   TickSource ──TickPulse──► Scheduler::on_tick()
//!                                  │
//!                                  ▼
//!                      PipelineStateMachine::next_action()
//!                                  │
//!                 ┌────────────────┘
//!                 ▼
//!   SchedulerClient (dispatch / commit / activate / draw ...)
//!                 │
//!                 │  completions (ready_to_commit, submit ack, ...)
//!                 ▼
//!   Scheduler notifications ──► next action cycle
//!
//!   Scheduler::poll() ──► deadline ──► forced draws, cleanup ──► TickAck
//! ```
//!
//! **[`state_machine`]**: The pure decision table. Holds sticky intents and
//! pipeline phases, answers "what next", and never touches a clock.
//!
//! **[`scheduler`]**: Drives the state machine through time: subscribes to
//! ticks while needed, arms the deadline, and applies latency recovery.
//!
//! **[`client`]**: The collaborator traits the scheduler calls into.
//!
//! **[`estimator`]**: Stage duration estimates, fixed or learned from a
//! rolling history.
//!
//! **[`timing`]**: Pulses, acknowledgements, and producer work arguments.
//!
//! **[`settings`]**: Tuning knobs and their validation.
//!
//! **[`time`]** and **[`clock`]**: Nanosecond host time and its sources.
//!
//! **[`timer`]**: Cancelable timer and task handles the embedder polls.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! scheduler instrumentation, with zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies and
//!   provides [`SystemClock`](clock::SystemClock).
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `serde` (disabled by default): Derives `Serialize`/`Deserialize` for
//!   settings and time values.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod client;
pub mod clock;
pub mod estimator;
pub mod scheduler;
pub mod settings;
pub mod state_machine;
pub mod time;
pub mod timer;
pub mod timing;
pub mod trace;
