//! The event/acquisition state machine.
//!
//! One `PipelineRunner` owns a whole acquisition session: it consumes fast
//! frames one at a time behind a cooperative busy-lock, invokes the loaded
//! analysis pipeline, and on a detection drives the
//! pause -> transform -> trigger -> resume sequence against the
//! [`Instrument`] boundary. Frames arriving while the lock is held are
//! dropped, never queued, so the pipeline never works through a stale
//! backlog.

use std::path::PathBuf;
use std::time::Instant;

use log::{debug, info, warn};
use nalgebra::Point2;

use etscan_calib::{FastAxisShift, TransformCoeffs};
use etscan_core::{
    BinaryMask, BinaryMaskBuilder, Frame, FrameHistoryBuffer, MaskError, MaskParams, MaskProgress,
};

use crate::event_log::{wall_clock_stamp, EventLogError, EventLogger};
use crate::pipeline::{
    poly_cubic, ExtraInfo, LoadError, LoadedPipeline, PipelineInput, PipelineOutput,
    PipelineRegistry, TransformFn, TransformRegistry,
};
use crate::scan::{Instrument, ScanError, ScanParameters};

/// Run mode for one acquisition session. Immutable while armed; changing
/// it requires disarm + arm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Real triggered scans.
    Experiment,
    /// Display detections and previews only; never pause or scan.
    TestVisualize,
    /// Exercise the full trigger/log/resume bookkeeping without hardware.
    TestValidate,
}

impl RunMode {
    /// Test modes ask pipelines for a preview image.
    pub fn is_test(self) -> bool {
        !matches!(self, RunMode::Experiment)
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Post-arm invocations that never act on detections, letting the
    /// pipeline's temporal state stabilize.
    pub init_frames: usize,
    /// Frames a validation run is held for after a detection.
    pub validation_frames: usize,
    /// Re-arm automatically after each event instead of going idle.
    pub endless: bool,
    /// Directory for flushed event log records.
    pub log_dir: PathBuf,
    /// Template scan parameters; the center is overwritten per event.
    pub scan: ScanParameters,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            init_frames: 5,
            validation_frames: 6,
            endless: false,
            log_dir: PathBuf::from("recordings/event_logs"),
            scan: ScanParameters::default(),
        }
    }
}

/// What `submit_frame` did with a frame, for callers and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Runner not armed; the frame was ignored.
    Ignored,
    /// Busy-lock held; the frame was dropped, not queued.
    DroppedBusy,
    /// Frame fed the binary-mask capture stack.
    MaskSample,
    /// Frame completed the binary-mask capture.
    MaskComplete,
    /// Warm-up frame; detections not acted upon.
    WarmUp,
    /// Pipeline ran, nothing detected; frame settled as background.
    NoDetection,
    /// Test mode: detections displayed only.
    Visualized,
    /// TestValidate: a detection started a validation run.
    ValidationStarted,
    /// TestValidate: one more held frame counted.
    ValidationTick,
    /// TestValidate: validation record flushed, buffers cleared.
    ValidationComplete,
    /// Experiment: full pause/transform/trigger/resume cycle ran.
    ScanTriggered,
}

#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    #[error("runner is already armed")]
    AlreadyArmed,

    #[error("no analysis pipeline loaded")]
    NoPipeline,

    #[error(transparent)]
    Mask(#[from] MaskError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    EventLog(#[from] EventLogError),
}

/// The orchestrator: event state machine plus session state.
pub struct PipelineRunner<I: Instrument> {
    instrument: I,
    config: RunnerConfig,
    registry: PipelineRegistry,
    transforms: TransformRegistry,
    pipeline: Option<LoadedPipeline>,
    transform: TransformFn,
    coeffs: TransformCoeffs,
    shift: FastAxisShift,
    log: EventLogger,
    history: FrameHistoryBuffer,
    mask: Option<BinaryMask>,
    mask_builder: Option<BinaryMaskBuilder>,
    background: Option<Frame>,
    exinfo: Option<ExtraInfo>,
    mode: RunMode,
    running: bool,
    busy: bool,
    validating: bool,
    validation_count: usize,
    frame_count: usize,
    last_call: Option<Instant>,
}

impl<I: Instrument> PipelineRunner<I> {
    pub fn new(instrument: I, config: RunnerConfig) -> Self {
        let log = EventLogger::new(config.log_dir.clone());
        Self {
            instrument,
            config,
            registry: PipelineRegistry::default(),
            transforms: TransformRegistry::default(),
            pipeline: None,
            transform: poly_cubic,
            coeffs: TransformCoeffs::unit(),
            shift: FastAxisShift::default(),
            log,
            history: FrameHistoryBuffer::default(),
            mask: None,
            mask_builder: None,
            background: None,
            exinfo: None,
            mode: RunMode::Experiment,
            running: false,
            busy: false,
            validating: false,
            validation_count: 0,
            frame_count: 0,
            last_call: None,
        }
    }

    pub fn registry_mut(&mut self) -> &mut PipelineRegistry {
        &mut self.registry
    }

    pub fn transforms_mut(&mut self) -> &mut TransformRegistry {
        &mut self.transforms
    }

    pub fn instrument(&self) -> &I {
        &self.instrument
    }

    pub fn instrument_mut(&mut self) -> &mut I {
        &mut self.instrument
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_validating(&self) -> bool {
        self.validating
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn mask(&self) -> Option<&BinaryMask> {
        self.mask.as_ref()
    }

    pub fn pipeline_name(&self) -> Option<&'static str> {
        self.pipeline.as_ref().map(|p| p.spec.name)
    }

    pub fn coeffs(&self) -> &TransformCoeffs {
        &self.coeffs
    }

    pub fn set_transform_coeffs(&mut self, coeffs: TransformCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn set_fast_axis_shift(&mut self, shift: FastAxisShift) {
        self.shift = shift;
    }

    /// Bind a registered pipeline to parameter values.
    ///
    /// A failed load leaves the previously loaded pipeline intact. A
    /// successful load resets the carried pipeline state.
    pub fn load_pipeline(&mut self, name: &str, param_values: &[f64]) -> Result<(), LoadError> {
        let loaded = self.registry.load(name, param_values)?;
        info!("pipeline {:?} loaded", loaded.spec.name);
        self.exinfo = None;
        self.pipeline = Some(loaded);
        Ok(())
    }

    /// Select a registered coordinate transform. A failed load keeps the
    /// current transform.
    pub fn load_transform(&mut self, name: &str) -> Result<(), LoadError> {
        self.transform = self.transforms.load(name)?;
        Ok(())
    }

    /// Arm the runner for a session in the given mode.
    pub fn arm(&mut self, mode: RunMode) -> Result<(), RunnerError> {
        if self.running {
            return Err(RunnerError::AlreadyArmed);
        }
        if self.pipeline.is_none() {
            return Err(RunnerError::NoPipeline);
        }
        self.mode = mode;
        self.exinfo = None;
        self.validating = false;
        self.validation_count = 0;
        self.frame_count = 0;
        self.busy = false;
        self.last_call = None;
        self.instrument.set_fast_excitation(true);
        self.running = true;
        info!("runner armed in {mode:?} mode");
        Ok(())
    }

    /// Stop picking up frames and turn the fast excitation off.
    ///
    /// A pipeline invocation already in progress is not interrupted.
    pub fn disarm(&mut self) {
        if self.running {
            self.instrument.set_fast_excitation(false);
        }
        self.running = false;
        self.validating = false;
        self.validation_count = 0;
        self.frame_count = 0;
        info!("runner disarmed");
    }

    /// Operator escape hatch for a wedged busy-lock. There is no automatic
    /// timeout; pipelines have no declared maximum runtime.
    pub fn unlock_busy(&mut self) {
        if self.busy {
            warn!("busy lock manually released");
        }
        self.busy = false;
    }

    /// Start a binary-mask capture; subsequent frames feed the mask stack
    /// instead of the pipeline until the stack is complete.
    pub fn begin_mask_capture(&mut self, params: MaskParams) {
        self.mask_builder = Some(BinaryMaskBuilder::new(params));
        self.instrument.set_fast_excitation(true);
        info!("binary mask capture started ({} frames)", params.frames);
    }

    pub fn mask_capture_active(&self) -> bool {
        self.mask_builder.is_some()
    }

    /// Offer a newly available frame to the runner.
    ///
    /// No-op while the busy-lock is held: at most one pipeline invocation
    /// runs at a time, and on a detection the lock is released only after
    /// the whole trigger sequence has returned control.
    pub fn submit_frame(&mut self, frame: &Frame) -> Result<SubmitOutcome, RunnerError> {
        if let Some(builder) = self.mask_builder.as_mut() {
            return match builder.push(frame)? {
                MaskProgress::Accumulating { have, need } => {
                    debug!("mask capture {have}/{need}");
                    Ok(SubmitOutcome::MaskSample)
                }
                MaskProgress::Complete(mask) => {
                    info!("binary mask ready, {} px inside", mask.count());
                    self.mask = Some(mask);
                    self.mask_builder = None;
                    self.instrument.set_fast_excitation(false);
                    Ok(SubmitOutcome::MaskComplete)
                }
            };
        }
        if !self.running {
            return Ok(SubmitOutcome::Ignored);
        }
        if self.busy {
            debug!("frame dropped: pipeline busy");
            return Ok(SubmitOutcome::DroppedBusy);
        }
        self.busy = true;
        let result = self.process_frame(frame);
        self.busy = false;
        result
    }

    fn process_frame(&mut self, frame: &Frame) -> Result<SubmitOutcome, RunnerError> {
        let now = Instant::now();
        if let Some(last) = self.last_call {
            self.log
                .set_field("pipeline_rep_period", (now - last).as_millis());
        }
        self.last_call = Some(now);
        self.log.set_field("pipeline_start", wall_clock_stamp());

        let (func, params) = match &self.pipeline {
            Some(p) => (p.func, p.param_values.clone()),
            None => return Err(RunnerError::NoPipeline),
        };
        let PipelineOutput {
            coords,
            exinfo,
            preview,
        } = func(PipelineInput {
            frame,
            background: self.background.as_ref(),
            mask: self.mask.as_ref(),
            test_mode: self.mode.is_test(),
            exinfo: self.exinfo.take(),
            params: &params,
        });
        self.exinfo = exinfo;
        self.log.set_field("pipeline_end", wall_clock_stamp());

        let warmed_up = self.frame_count >= self.config.init_frames;
        let mut outcome = if warmed_up {
            SubmitOutcome::NoDetection
        } else {
            SubmitOutcome::WarmUp
        };

        if warmed_up {
            match self.mode {
                RunMode::TestVisualize => {
                    self.instrument.show_detections(&coords, preview.as_ref());
                    outcome = SubmitOutcome::Visualized;
                }
                RunMode::TestValidate => {
                    self.instrument.show_detections(&coords, preview.as_ref());
                    if self.validating {
                        self.validation_count += 1;
                        if self.validation_count >= self.config.validation_frames {
                            return self.finish_validation();
                        }
                        outcome = SubmitOutcome::ValidationTick;
                    } else if !coords.is_empty() {
                        self.log_detection_centers(&coords);
                        self.validating = true;
                        self.validation_count = 0;
                        outcome = SubmitOutcome::ValidationStarted;
                    }
                }
                RunMode::Experiment => {
                    if !coords.is_empty() {
                        return self.trigger_event(frame, &coords);
                    }
                }
            }
        }

        // Non-event cycle: the frame settles as the new background.
        self.background = Some(frame.clone());
        self.history.push_raw(frame.clone());
        if self.mode == RunMode::TestValidate {
            if let Some(p) = preview {
                self.history.push_analyzed(p);
            }
        }
        self.frame_count += 1;
        Ok(outcome)
    }

    /// Log the representative center plus every detection individually.
    fn log_detection_centers(&mut self, coords: &[Point2<f64>]) {
        if let Some(center) = coords.first() {
            self.log.set_field("fastscan_x_center", center.x);
            self.log.set_field("fastscan_y_center", center.y);
        }
        if coords.len() > 1 {
            for (i, c) in coords.iter().enumerate() {
                self.log.set_field_indexed("det_coord_x_", i, c.x);
                self.log.set_field_indexed("det_coord_y_", i, c.y);
            }
        }
    }

    /// The real trigger: pause, transform, correct, scan, resume.
    fn trigger_event(
        &mut self,
        frame: &Frame,
        coords: &[Point2<f64>],
    ) -> Result<SubmitOutcome, RunnerError> {
        // Representative coordinate: first reported detection, no ranking.
        let center = coords[0];
        self.log.set_field("prepause", wall_clock_stamp());
        self.pause_fast();

        self.log.set_field("coord_transf_start", wall_clock_stamp());
        let scan_center = (self.transform)(center, &self.coeffs);
        self.log_detection_centers(coords);
        self.log.set_field("slowscan_x_center", scan_center.x);
        self.log.set_field("slowscan_y_center", scan_center.y);
        self.log.set_field("scan_initiate", wall_clock_stamp());

        let mut scan = self.config.scan.clone();
        scan.set_center(scan_center, &self.shift);
        info!(
            "event at ({:.3}, {:.3}) -> scan center ({:.3}, {:.3})",
            center.x, center.y, scan_center.x, scan_center.y
        );
        // Blocks until the scan completes; resume is gated on that, not a
        // timer.
        self.instrument.trigger_scan(&scan)?;
        self.scan_ended()?;

        self.instrument.show_detections(coords, None);
        self.history.push_raw(frame.clone());
        let raw = self.history.take_raw();
        self.instrument.archive_frames(&raw, &[]);
        Ok(SubmitOutcome::ScanTriggered)
    }

    fn scan_ended(&mut self) -> Result<(), RunnerError> {
        self.log.set_field("scan_end", wall_clock_stamp());
        self.end_recording()?;
        self.continue_fast();
        self.frame_count = 0;
        Ok(())
    }

    fn finish_validation(&mut self) -> Result<SubmitOutcome, RunnerError> {
        let raw = self.history.take_raw();
        let analyzed = self.history.take_analyzed();
        self.instrument.archive_frames(&raw, &analyzed);
        // Virtual pause/end/resume cycle; no hardware scan involved.
        self.pause_fast();
        self.end_recording()?;
        self.continue_fast();
        self.frame_count = 0;
        self.validating = false;
        self.validation_count = 0;
        Ok(SubmitOutcome::ValidationComplete)
    }

    /// Flush the event record, stamped with the pipeline name and its
    /// parameter values.
    fn end_recording(&mut self) -> Result<(), RunnerError> {
        let name = self.pipeline.as_ref().map(|p| p.spec.name);
        let params: Vec<(&'static str, f64)> = self
            .pipeline
            .as_ref()
            .map(|p| {
                p.spec
                    .params
                    .iter()
                    .map(|s| s.name)
                    .zip(p.param_values.iter().copied())
                    .collect()
            })
            .unwrap_or_default();
        if let Some(name) = name {
            self.log.set_field("pipeline", name);
        }
        for (key, value) in params {
            self.log.set_field(key, value);
        }
        self.log.flush()?;
        Ok(())
    }

    fn pause_fast(&mut self) {
        if self.running {
            self.instrument.set_fast_excitation(false);
            self.running = false;
            debug!("fast modality paused");
        }
    }

    fn continue_fast(&mut self) {
        if self.config.endless && !self.running {
            self.instrument.set_fast_excitation(true);
            self.running = true;
            info!("fast modality resumed (endless mode)");
        } else if !self.config.endless {
            self.running = false;
            info!("event cycle complete, runner idle");
        }
    }

    #[cfg(test)]
    fn lock_busy(&mut self) {
        self.busy = true;
    }
}
