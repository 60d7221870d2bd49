//! Demo session driver: feeds synthetic camera frames to the runner.
//!
//! Frames carry a flat noise floor with an occasional Gaussian spot; the
//! built-in `intensity_peaks` pipeline picks the spots up and the runner
//! drives its trigger sequence against a no-op instrument.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::{info, LevelFilter};

use etscan::core::Frame;
use etscan::runner::{PipelineRunner, RunMode, RunnerConfig, SubmitOutcome};
use etscan::scan::NullInstrument;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Experiment,
    Visualize,
    Validate,
}

impl From<Mode> for RunMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Experiment => RunMode::Experiment,
            Mode::Visualize => RunMode::TestVisualize,
            Mode::Validate => RunMode::TestValidate,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "etscan", about = "Run a synthetic event-triggered session")]
struct Args {
    /// Run mode for the session.
    #[arg(long, value_enum, default_value = "experiment")]
    mode: Mode,

    /// Number of synthetic frames to feed.
    #[arg(long, default_value_t = 100)]
    frames: usize,

    /// Frame side length in pixels.
    #[arg(long, default_value_t = 128)]
    size: usize,

    /// Detection threshold passed to the pipeline.
    #[arg(long, default_value_t = 25.0)]
    threshold: f64,

    /// Re-arm automatically after each event.
    #[arg(long)]
    endless: bool,

    /// Directory for event log records.
    #[arg(long, default_value = "recordings/event_logs")]
    log_dir: PathBuf,

    /// Seed for the synthetic frame source.
    #[arg(long, default_value_t = 0x9e3779b9)]
    seed: u64,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

/// xorshift64*; good enough for demo noise.
struct Rng(u64);

impl Rng {
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545f4914f6cdd1d)
    }

    fn uniform(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Noise floor plus, sometimes, one Gaussian spot at a random position.
fn synthetic_frame(rng: &mut Rng, size: usize, spot_probability: f64) -> Frame {
    let noise_mean = 10.0;
    let peak_max = 60.0;
    let mut data = vec![0.0f32; size * size];
    for v in data.iter_mut() {
        *v = (noise_mean + 4.0 * (rng.uniform() - 0.5)) as f32;
    }
    if rng.uniform() < spot_probability {
        let cx = rng.uniform() * size as f64;
        let cy = rng.uniform() * size as f64;
        let amplitude = peak_max * (0.5 + 0.5 * rng.uniform());
        let sigma2 = 2.0 * 50.0;
        for y in 0..size {
            for x in 0..size {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                let g = amplitude * (-(dx * dx + dy * dy) / sigma2).exp();
                data[y * size + x] += g as f32;
            }
        }
    }
    Frame::from_data(size, size, data).unwrap_or_else(|| Frame::constant(size, size, 0.0))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    etscan::core::init_with_level(level)?;

    let config = RunnerConfig {
        endless: args.endless,
        log_dir: args.log_dir.clone(),
        ..RunnerConfig::default()
    };
    let mut runner = PipelineRunner::new(NullInstrument, config);
    runner.load_pipeline("intensity_peaks", &[args.threshold, 5.0])?;
    runner.arm(args.mode.into())?;

    let mut rng = Rng(args.seed | 1);
    let mut triggered = 0usize;
    let mut validated = 0usize;
    for i in 0..args.frames {
        if !runner.is_running() {
            info!("runner went idle after frame {i}");
            break;
        }
        let frame = synthetic_frame(&mut rng, args.size, 0.2);
        if args.verbose {
            let (lo, hi) = frame.min_max();
            log::debug!("frame {i}: sample range [{lo:.1}, {hi:.1}]");
        }
        match runner.submit_frame(&frame)? {
            SubmitOutcome::ScanTriggered => triggered += 1,
            SubmitOutcome::ValidationComplete => validated += 1,
            outcome => log::debug!("frame {i}: {outcome:?}"),
        }
    }

    info!("session done: {triggered} scans triggered, {validated} validations");
    Ok(())
}
