//! # slotsink
//!
//! Plays a sine tone or a raw PCM file through a fixed-slot buffer queue,
//! either the simulated device or (with the `cpal` feature) the system
//! output device.

mod sources;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use crossbeam_channel::RecvTimeoutError;
use slotsink_audio::hardware::sim::SimulatedBackend;
use slotsink_audio::{AudioSource, Backend, PipelineEvent, SlotSink, ToneSource};
use slotsink_core::{SampleFormat, SinkConfig};
use sources::RawPcmSource;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often the main loop reports the device latency.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Clock-driven simulated buffer queue
    Sim,
    /// System output device
    Cpal,
}

/// slotsink - feed a fixed-slot hardware buffer queue
#[derive(Parser)]
#[command(name = "slotsink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Raw PCM file in the output format (plays a tone when omitted)
    #[arg(value_name = "PATH")]
    input: Option<PathBuf>,

    /// Module arguments, e.g. "format=s16le rate=48000 buffer=19200"
    #[arg(long)]
    modargs: Option<String>,

    /// Sample format (u8 or s16le)
    #[arg(long)]
    format: Option<SampleFormat>,

    /// Sample rate in Hz
    #[arg(long)]
    rate: Option<u32>,

    /// Channel count (1 or 2)
    #[arg(long)]
    channels: Option<u8>,

    /// Total buffer in bytes, a whole number of slots
    #[arg(long)]
    buffer: Option<usize>,

    /// Slot duration in microseconds
    #[arg(long)]
    slot_usec: Option<u64>,

    /// Latency requested at start, in milliseconds
    #[arg(short, long)]
    latency_ms: Option<u64>,

    /// Tone frequency in Hz
    #[arg(long, default_value = "440")]
    tone_hz: f32,

    /// Output backend
    #[arg(short, long, value_enum, default_value_t = BackendKind::Sim)]
    backend: BackendKind,

    /// Write everything the simulated device plays to this file
    #[arg(long, value_name = "FILE")]
    capture: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Suspend the engine after this many seconds, resume one second later
    #[arg(long)]
    suspend_after: Option<f64>,

    /// Show debug output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn sink_config(&self) -> Result<SinkConfig> {
        let mut config = match &self.modargs {
            Some(modargs) => SinkConfig::from_modargs(modargs)?,
            None => SinkConfig::default(),
        };

        if let Some(format) = self.format {
            config.spec.format = format;
        }
        if let Some(rate) = self.rate {
            config.spec.rate = rate;
        }
        if let Some(channels) = self.channels {
            config.spec.channels = channels;
        }
        if let Some(buffer) = self.buffer {
            config.buffer_bytes = Some(buffer);
        }
        if let Some(usec) = self.slot_usec {
            config.slot_duration = Duration::from_micros(usec);
        }
        Ok(config)
    }

    fn backend(&self) -> Result<Box<dyn Backend>> {
        match self.backend {
            BackendKind::Sim => match &self.capture {
                Some(path) => {
                    let file = File::create(path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    let mut writer = BufWriter::new(file);
                    Ok(Box::new(SimulatedBackend::with_tap(move |slot: &[u8]| {
                        if let Err(e) = writer.write_all(slot) {
                            warn!("Capture write failed: {e}");
                        }
                    })))
                }
                None => Ok(Box::new(SimulatedBackend::new())),
            },
            #[cfg(feature = "cpal")]
            BackendKind::Cpal => Ok(Box::new(slotsink_audio::hardware::cpal::CpalBackend::new())),
            #[cfg(not(feature = "cpal"))]
            BackendKind::Cpal => bail!("built without the cpal feature"),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "slotsink_app=debug,slotsink_audio=debug,slotsink_core=debug"
    } else {
        "slotsink_app=info,slotsink_audio=info,slotsink_core=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    info!("Starting slotsink v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.sink_config()?;
    let geometry = config.geometry().context("invalid sink configuration")?;
    let requested_latency = cli.latency_ms.map(Duration::from_millis);

    let mut input_finished = None;
    let source: Box<dyn AudioSource> = match &cli.input {
        Some(path) => {
            let source = RawPcmSource::open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            input_finished = Some(source.finished());
            Box::new(source)
        }
        None => Box::new(
            ToneSource::new(*geometry.spec(), cli.tone_hz).with_latency(requested_latency),
        ),
    };

    let mut sink = SlotSink::start(geometry, cli.backend()?, source)?;
    if cli.input.is_some() && requested_latency.is_some() {
        sink.request_latency(requested_latency)?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let started = Instant::now();
    let limit = cli.duration.map(Duration::from_secs_f64);
    let suspend_at = cli.suspend_after.map(Duration::from_secs_f64);
    let mut suspended = false;
    let mut resumed = false;
    let mut last_report = Instant::now();
    let mut drain_deadline: Option<Instant> = None;
    let mut failure = None;

    while running.load(Ordering::SeqCst) {
        let elapsed = started.elapsed();
        if limit.is_some_and(|limit| elapsed >= limit) {
            info!("Duration reached");
            break;
        }
        if drain_deadline.is_none()
            && input_finished
                .as_ref()
                .is_some_and(|finished| finished.load(Ordering::Relaxed))
        {
            // Let what is already queued play out
            let queued = sink.latency()?;
            info!("Input finished, draining {:?}", queued);
            drain_deadline = Some(Instant::now() + queued);
        }
        if drain_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        if let Some(at) = suspend_at {
            if !suspended && elapsed >= at {
                sink.suspend()?;
                suspended = true;
            } else if suspended && !resumed && elapsed >= at + Duration::from_secs(1) {
                sink.resume()?;
                resumed = true;
            }
        }

        match sink.events().recv_timeout(Duration::from_millis(100)) {
            Ok(PipelineEvent::TeardownRequested { operation, code }) => {
                error!("Pipeline failed: {operation} returned hardware error {code}");
                failure = Some((operation, code));
                break;
            }
            Ok(PipelineEvent::StateChanged(state)) => info!("Pipeline {:?}", state),
            Ok(event) => debug!("Pipeline event: {:?}", event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_report.elapsed() >= REPORT_INTERVAL {
            info!("Latency {:?}", sink.latency()?);
            last_report = Instant::now();
        }
    }

    let stats = sink.shutdown()?;
    info!(
        "Played {} slots ({} silent), {} queue-full retries, {} failed queries",
        stats.submitted, stats.silence_slots, stats.queue_full, stats.query_failures
    );

    if let Some((operation, code)) = failure {
        bail!("{operation} failed with hardware error {code}");
    }
    Ok(())
}
