//! EndoGuide - endoscopic frame analysis runner
//!
//! Drives the pipeline with a synthetic endoscope stream and prints the
//! final health snapshot as JSON.

mod synthetic;

use anyhow::{bail, Context, Result};
use clap::Parser;
use endoguide_core::PipelineConfig;
use endoguide_edge::{DeviceClass, EdgeDeviceProfile, ProbeSource};
use endoguide_pipeline::StreamProcessor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use synthetic::{simulated_model, SyntheticSource};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Run the EndoGuide pipeline on a synthetic endoscope stream
#[derive(Parser, Debug)]
#[command(name = "endoguide", version, long_about = None)]
struct Args {
    /// JSON pipeline config; absent keys take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of frames to submit
    #[arg(short = 'n', long, default_value_t = 300)]
    frames: u64,

    /// Source frame rate (defaults to the config's target_fps)
    #[arg(long)]
    fps: Option<u32>,

    /// Worker thread count override
    #[arg(short, long)]
    workers: Option<usize>,

    /// Pin the device class instead of probing (e.g. gpu, jetson, accelerator_b)
    #[arg(long)]
    device: Option<String>,

    /// Simulated model latency in milliseconds
    #[arg(long, default_value_t = 5)]
    inference_ms: u64,

    /// Frame size as WxH
    #[arg(long, default_value = "640x480")]
    size: String,

    /// Print the effective config as JSON and exit
    #[arg(long, default_value_t = false)]
    print_config: bool,
}

fn parse_size(size: &str) -> Result<(u32, u32)> {
    let (w, h) = size
        .split_once('x')
        .with_context(|| format!("size '{size}' is not WxH"))?;
    let width: u32 = w.trim().parse().context("invalid frame width")?;
    let height: u32 = h.trim().parse().context("invalid frame height")?;
    if width == 0 || height == 0 {
        bail!("frame size must be non-zero");
    }
    Ok((width, height))
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(&args)?;
    if args.print_config {
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }
    let (width, height) = parse_size(&args.size)?;
    let fps = args.fps.unwrap_or(config.target_fps).max(1);

    info!(
        frames = args.frames,
        fps,
        workers = config.worker_count,
        "EndoGuide starting"
    );

    let model = simulated_model(Duration::from_millis(args.inference_ms));
    let processor = match &args.device {
        Some(name) => {
            let class = DeviceClass::from_name(name).unwrap_or_else(|| {
                warn!(device = %name, "Unknown device class, using generic_cpu");
                DeviceClass::GenericCpu
            });
            let profile = EdgeDeviceProfile::for_class(class, ProbeSource::Configured);
            StreamProcessor::with_profile(config, model, profile)?
        }
        None => StreamProcessor::new(config, model)?,
    };
    processor.start()?;

    let producer_done = AtomicBool::new(false);
    let started = Instant::now();
    let (received, degraded) = thread::scope(|s| {
        let consumer = s.spawn(|| {
            let (mut received, mut degraded) = (0u64, 0u64);
            loop {
                for result in processor.drain_results() {
                    received += 1;
                    if result.is_degraded() {
                        degraded += 1;
                    }
                    debug!(
                        frame = %result.frame_id,
                        latency_ms = result.processing_time_ms,
                        regions = result.segmentation.as_ref().map_or(0, |seg| seg.boundaries.len()),
                        "Result"
                    );
                }
                if producer_done.load(Ordering::Acquire) && processor.health().outstanding == 0 {
                    break;
                }
                thread::sleep(processor.config().poll_interval());
            }
            (received, degraded)
        });

        let mut source = SyntheticSource::new(width, height);
        let period = Duration::from_secs_f64(1.0 / fps as f64);
        let mut next = Instant::now();
        for _ in 0..args.frames {
            processor.submit(source.next_frame());
            next += period;
            if let Some(wait) = next.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
        }
        producer_done.store(true, Ordering::Release);

        consumer.join().unwrap_or_default()
    });

    processor.stop();
    let health = processor.health();
    info!(
        received,
        degraded,
        dropped = processor.dropped_frames(),
        elapsed_s = started.elapsed().as_secs_f64(),
        p95_ms = health.performance.p95_ms,
        "EndoGuide finished"
    );
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}
