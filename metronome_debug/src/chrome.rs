// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Each tick that ran becomes a complete (`"X"`) slice on the tick track,
//! actions become begin/end pairs on the action track, and everything else is
//! an instant event.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use metronome_core::time::HostTime;
use metronome_core::timing::PulseKind;
use metronome_core::trace::RecoveryKind;

use crate::recorder::{RecordedEvent, decode};

const TID_TICK: u32 = 0;
const TID_ACTION: u32 = 1;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// # Errors
///
/// Returns any error from serializing to `writer`.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let events: Vec<Value> = decode(bytes).map(to_chrome_event).collect();
    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn to_chrome_event(recorded: RecordedEvent) -> Value {
    match recorded {
        RecordedEvent::TickReceived(e) => instant(
            "TickReceived",
            "Tick",
            e.now,
            json!({
                "source_id": e.source_id,
                "sequence_number": e.sequence_number,
                "missed": e.kind == PulseKind::Missed,
                "frame_time_us": us(e.frame_time),
                "deadline_us": us(e.deadline),
                "interval_us": e.interval.as_micros(),
            }),
        ),
        RecordedEvent::TickDropped(e) => instant(
            "TickDropped",
            "Tick",
            e.now,
            json!({
                "sequence_number": e.sequence_number,
                "reason": format!("{:?}", e.reason),
            }),
        ),
        RecordedEvent::DeadlineScheduled(e) => instant(
            "DeadlineScheduled",
            "Deadline",
            e.now,
            json!({
                "frame_number": e.frame_number,
                "mode": e.mode.as_str(),
                "fire_at_us": e.fire_at.map(us),
            }),
        ),
        RecordedEvent::DeadlineFired(e) => instant(
            "DeadlineFired",
            "Deadline",
            e.now,
            json!({ "frame_number": e.frame_number }),
        ),
        RecordedEvent::ActionBegin(e) => json!({
            "ph": "B",
            "name": e.action.as_str(),
            "cat": "Action",
            "ts": us(e.timestamp),
            "pid": 0,
            "tid": TID_ACTION,
            "args": { "frame_number": e.frame_number },
        }),
        RecordedEvent::ActionEnd(e) => json!({
            "ph": "E",
            "name": e.action.as_str(),
            "cat": "Action",
            "ts": us(e.timestamp),
            "pid": 0,
            "tid": TID_ACTION,
        }),
        RecordedEvent::DrawResult(e) => instant(
            "DrawResult",
            "Draw",
            e.timestamp,
            json!({
                "frame_number": e.frame_number,
                "action": e.action.as_str(),
                "result": format!("{:?}", e.result),
                "submitted": e.result.is_success(),
            }),
        ),
        RecordedEvent::LatencyRecovery(e) => {
            let kind = match e.kind {
                RecoveryKind::Producer => "producer",
                RecoveryKind::Impl => "impl",
            };
            instant(
                "LatencyRecovery",
                "Recovery",
                e.now,
                json!({ "sequence_number": e.sequence_number, "kind": kind }),
            )
        }
        RecordedEvent::TickFinished(e) => json!({
            "ph": "X",
            "name": format!("Tick #{}", e.frame_number),
            "cat": "Tick",
            "ts": us(e.began_at),
            "dur": us_between(e.began_at, e.finished_at),
            "pid": 0,
            "tid": TID_TICK,
            "args": {
                "sequence_number": e.sequence_number,
                "did_submit_frame": e.did_submit_frame,
            },
        }),
    }
}

fn instant(name: &str, cat: &str, at: HostTime, args: Value) -> Value {
    json!({
        "ph": "i",
        "name": name,
        "cat": cat,
        "ts": us(at),
        "pid": 0,
        "tid": TID_TICK,
        "s": "t",
        "args": args,
    })
}

fn us(t: HostTime) -> f64 {
    t.nanos() as f64 / 1000.0
}

fn us_between(start: HostTime, end: HostTime) -> f64 {
    end.saturating_duration_since(start).nanos() as f64 / 1000.0
}
