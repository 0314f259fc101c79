// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated compositor pipeline that exercises the scheduler and the
//! diagnostics crate.
//!
//! Runs 60 ticks with a producer that keeps up, then 60 with one that takes
//! longer than a frame, recording scheduler events into a
//! [`RecorderSink`](metronome_debug::recorder::RecorderSink). The recording
//! is exported as Chrome trace JSON and a latency summary is printed.
//!
//! ```text
//! trace_demo [--pretty] [SETTINGS.json]
//! ```
//!
//! `SETTINGS.json` holds a partial `SchedulerSettings` object; missing
//! fields keep their defaults. `--pretty` replays the recording to stderr.
//! Set `RUST_LOG=metronome_core=debug` to see scheduler decisions.

use std::cell::RefCell;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use metronome_core::estimator::RollingTimingHistory;
use metronome_core::settings::SchedulerSettings;
use metronome_core::time::Duration;
use metronome_debug::pretty::PrettyPrintSink;
use metronome_debug::recorder::{RecorderSink, decode};
use metronome_sim::{SimConfig, SimRunner, StageLatencies};

const TICKS_PER_PHASE: u64 = 60;
const TRACE_PATH: &str = "trace.json";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut pretty = false;
    let mut settings_path = None;
    for arg in std::env::args().skip(1) {
        if arg == "--pretty" {
            pretty = true;
        } else {
            settings_path = Some(arg);
        }
    }
    let settings = match settings_path {
        Some(path) => load_settings(Path::new(&path))?,
        None => SchedulerSettings::default(),
    };
    tracing::info!(?settings, "starting simulation");

    let config = SimConfig {
        producer_work_every_tick: true,
        ..SimConfig::default()
    };
    let mut sim = SimRunner::new(
        settings,
        Box::new(RollingTimingHistory::default()),
        config,
    )
    .context("scheduler rejected the settings")?;

    let recorder = Rc::new(RefCell::new(RecorderSink::new()));
    sim.scheduler_mut()
        .set_trace_sink(Some(Box::new(Rc::clone(&recorder))));

    // -- fast producer -----------------------------------------------------
    sim.run_ticks(TICKS_PER_PHASE);
    report("fast producer", &sim);

    // -- slow producer -----------------------------------------------------
    sim.scheduler_mut()
        .client_mut()
        .set_latencies(StageLatencies {
            producer: Duration::from_millis(22),
            ..config.latencies
        });
    sim.run_ticks(TICKS_PER_PHASE);
    report("slow producer", &sim);

    sim.scheduler_mut().set_trace_sink(None);
    let bytes = recorder.borrow().as_bytes().to_vec();

    if pretty {
        let mut sink = PrettyPrintSink::stderr();
        for event in decode(&bytes) {
            event.replay(&mut sink);
        }
        sink.flush().context("failed to flush pretty output")?;
    }

    let file = File::create(TRACE_PATH).with_context(|| format!("failed to create {TRACE_PATH}"))?;
    let mut writer = BufWriter::new(file);
    metronome_debug::chrome::export(&bytes, &mut writer).context("failed to write Chrome trace")?;

    println!(
        "Wrote {TRACE_PATH} ({} events, {} bytes recorded)",
        decode(&bytes).count(),
        bytes.len()
    );
    Ok(())
}

fn load_settings(path: &Path) -> Result<SchedulerSettings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let settings: SchedulerSettings = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    settings
        .validate()
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    Ok(settings)
}

fn report(label: &str, sim: &SimRunner) {
    let stats = sim.stats();
    let client = sim.client();
    println!("{label}:");
    println!(
        "  grade {}  frames {}/{}  skipped {}  producer missed {:.0}%",
        stats.grade().as_str(),
        stats.total_frames(),
        stats.total_ticks(),
        stats.total_skipped(),
        stats.producer_miss_fraction() * 100.0,
    );
    println!(
        "  withheld pulses {}  frames not produced {}",
        sim.source().withheld(),
        client.frames_not_produced(),
    );
    println!("  {}", stats.timeline_ascii());
}
