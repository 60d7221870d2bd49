//! Event-triggered imaging controller.
//!
//! `etscan` watches a stream of fast, low-resolution frames, runs a
//! pluggable analysis pipeline on each one, and on a detection converts the
//! detected coordinate into the scanning modality's reference frame and
//! triggers a targeted high-resolution scan there before resuming fast
//! imaging.
//!
//! ## Quickstart
//!
//! ```
//! use etscan::runner::{PipelineRunner, RunMode, RunnerConfig};
//! use etscan::scan::NullInstrument;
//! use etscan::core::Frame;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut runner = PipelineRunner::new(NullInstrument, RunnerConfig::default());
//! runner.load_pipeline("intensity_peaks", &[25.0, 5.0])?;
//! runner.arm(RunMode::TestVisualize)?;
//!
//! let frame = Frame::constant(64, 64, 10.0);
//! let outcome = runner.submit_frame(&frame)?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - [`runner`]: the event/acquisition state machine.
//! - [`pipeline`]: pipeline/transform contracts and registries.
//! - [`pipelines`]: built-in reference pipeline.
//! - [`scan`]: scan parameters and the hardware boundary trait.
//! - [`event_log`]: per-event telemetry records.
//! - [`core`](etscan_core): frames, masks, history buffers.
//! - [`calib`](etscan_calib): coordinate calibration and fast-axis shift.

pub use etscan_calib as calib;
pub use etscan_core as core;

pub mod event_log;
pub mod pipeline;
pub mod pipelines;
pub mod runner;
pub mod scan;

pub use pipeline::{PipelineInput, PipelineOutput, PipelineRegistry, TransformRegistry};
pub use runner::{PipelineRunner, RunMode, RunnerConfig, RunnerError, SubmitOutcome};
pub use scan::{Instrument, NullInstrument, ScanError, ScanParameters};
