//! End-to-end state machine scenarios against a recording instrument.

use nalgebra::Point2;

use etscan::calib::FastAxisShift;
use etscan::core::Frame;
use etscan::pipeline::{ParamSpec, PipelineInput, PipelineOutput, PipelineSpec};
use etscan::runner::{PipelineRunner, RunMode, RunnerConfig, SubmitOutcome};
use etscan::scan::{Instrument, ScanError, ScanParameters};

/// Instrument that records every command it receives.
#[derive(Debug, Default)]
struct RecordingInstrument {
    excitation: Vec<bool>,
    scans: Vec<ScanParameters>,
    archived: Vec<(usize, usize)>,
}

impl Instrument for RecordingInstrument {
    fn set_fast_excitation(&mut self, enabled: bool) {
        self.excitation.push(enabled);
    }

    fn trigger_scan(&mut self, params: &ScanParameters) -> Result<(), ScanError> {
        self.scans.push(params.clone());
        Ok(())
    }

    fn archive_frames(&mut self, raw: &[Frame], analyzed: &[Frame]) {
        self.archived.push((raw.len(), analyzed.len()));
    }
}

fn always_detect(input: PipelineInput<'_>) -> PipelineOutput {
    PipelineOutput {
        coords: vec![Point2::new(5.0, 7.0), Point2::new(20.0, 30.0)],
        exinfo: input.exinfo,
        preview: input.test_mode.then(|| input.frame.clone()),
    }
}

/// Detects exactly once, on its sixth invocation, by counting calls in the
/// carried pipeline state.
fn detect_on_sixth(input: PipelineInput<'_>) -> PipelineOutput {
    let count = input
        .exinfo
        .and_then(|b| b.downcast::<u32>().ok())
        .map_or(0, |b| *b)
        + 1;
    let coords = if count == 6 {
        vec![Point2::new(3.0, 4.0)]
    } else {
        Vec::new()
    };
    PipelineOutput {
        coords,
        exinfo: Some(Box::new(count)),
        preview: input.test_mode.then(|| input.frame.clone()),
    }
}

fn spec(name: &'static str) -> PipelineSpec {
    PipelineSpec {
        name,
        params: vec![ParamSpec {
            name: "threshold",
            default: 1.0,
        }],
    }
}

fn runner_with(
    func: fn(PipelineInput<'_>) -> PipelineOutput,
    name: &'static str,
    config: RunnerConfig,
) -> PipelineRunner<RecordingInstrument> {
    let mut runner = PipelineRunner::new(RecordingInstrument::default(), config);
    runner.registry_mut().register(spec(name), func).unwrap();
    runner.load_pipeline(name, &[1.0]).unwrap();
    runner
}

fn config_in(dir: &std::path::Path) -> RunnerConfig {
    RunnerConfig {
        log_dir: dir.to_path_buf(),
        ..RunnerConfig::default()
    }
}

fn log_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default();
    files.sort();
    files
}

#[test]
fn warm_up_frames_never_trigger() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = runner_with(always_detect, "always_detect", config_in(dir.path()));
    runner.arm(RunMode::Experiment).unwrap();

    let frame = Frame::constant(8, 8, 1.0);
    for _ in 0..5 {
        assert_eq!(runner.submit_frame(&frame).unwrap(), SubmitOutcome::WarmUp);
    }
    assert!(runner.instrument().scans.is_empty());

    assert_eq!(
        runner.submit_frame(&frame).unwrap(),
        SubmitOutcome::ScanTriggered
    );
    assert_eq!(runner.instrument().scans.len(), 1);
}

#[test]
fn experiment_cycle_pauses_scans_and_goes_idle() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = runner_with(always_detect, "always_detect", config_in(dir.path()));
    runner.arm(RunMode::Experiment).unwrap();
    // Arm turned the fast excitation on.
    assert_eq!(runner.instrument().excitation, vec![true]);

    let frame = Frame::constant(8, 8, 1.0);
    for _ in 0..5 {
        runner.submit_frame(&frame).unwrap();
    }
    assert_eq!(
        runner.submit_frame(&frame).unwrap(),
        SubmitOutcome::ScanTriggered
    );

    // Pause turned the excitation off; endless is off, so no resume.
    assert_eq!(runner.instrument().excitation, vec![true, false]);
    assert!(!runner.is_running());
    assert!(!runner.is_busy());
    // Pre-event raw history was archived and cleared.
    assert_eq!(runner.instrument().archived.len(), 1);
    assert_eq!(runner.instrument().archived[0], (6, 0));
}

#[test]
fn scan_center_gets_transform_and_fast_axis_shift() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = runner_with(always_detect, "always_detect", config_in(dir.path()));
    runner.set_fast_axis_shift(FastAxisShift::new([0.0, 0.0, 0.0, 0.0, 0.0, 0.25]));
    runner.arm(RunMode::Experiment).unwrap();

    let frame = Frame::constant(8, 8, 1.0);
    for _ in 0..6 {
        runner.submit_frame(&frame).unwrap();
    }
    let scans = &runner.instrument().scans;
    assert_eq!(scans.len(), 1);
    // Unit transform maps (5, 7) to itself; the fast axis is then shifted.
    assert_eq!(scans[0].axis_center, vec![5.0 - 0.25, 7.0]);
}

#[test]
fn event_record_carries_coordinates_and_pipeline_fields() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = runner_with(always_detect, "always_detect", config_in(dir.path()));
    runner.arm(RunMode::Experiment).unwrap();

    let frame = Frame::constant(8, 8, 1.0);
    for _ in 0..6 {
        runner.submit_frame(&frame).unwrap();
    }

    let files = log_files(dir.path());
    assert_eq!(files.len(), 1);
    let body = std::fs::read_to_string(&files[0]).unwrap();
    assert!(body.contains("fastscan_x_center: 5"));
    assert!(body.contains("fastscan_y_center: 7"));
    assert!(body.contains("slowscan_x_center: 5"));
    assert!(body.contains("det_coord_x_1: 20"));
    assert!(body.contains("pipeline: always_detect"));
    assert!(body.contains("threshold: 1"));
    assert!(body.contains("scan_initiate: "));
    assert!(body.contains("scan_end: "));
}

#[test]
fn endless_mode_rearms_after_each_event() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunnerConfig {
        endless: true,
        ..config_in(dir.path())
    };
    let mut runner = runner_with(always_detect, "always_detect", config);
    runner.arm(RunMode::Experiment).unwrap();

    let frame = Frame::constant(8, 8, 1.0);
    for _ in 0..5 {
        runner.submit_frame(&frame).unwrap();
    }
    assert_eq!(
        runner.submit_frame(&frame).unwrap(),
        SubmitOutcome::ScanTriggered
    );
    assert!(runner.is_running());

    // The frame counter reset: another warm-up precedes the next trigger.
    for _ in 0..5 {
        assert_eq!(runner.submit_frame(&frame).unwrap(), SubmitOutcome::WarmUp);
    }
    assert_eq!(
        runner.submit_frame(&frame).unwrap(),
        SubmitOutcome::ScanTriggered
    );
    assert_eq!(runner.instrument().scans.len(), 2);
}

#[test]
fn visualize_mode_never_scans() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = runner_with(always_detect, "always_detect", config_in(dir.path()));
    runner.arm(RunMode::TestVisualize).unwrap();

    let frame = Frame::constant(8, 8, 1.0);
    for _ in 0..5 {
        runner.submit_frame(&frame).unwrap();
    }
    for _ in 0..10 {
        assert_eq!(
            runner.submit_frame(&frame).unwrap(),
            SubmitOutcome::Visualized
        );
    }
    assert!(runner.instrument().scans.is_empty());
    assert!(runner.is_running());
    assert!(log_files(dir.path()).is_empty());
}

#[test]
fn validate_mode_flushes_one_record_without_scanning() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = runner_with(detect_on_sixth, "detect_on_sixth", config_in(dir.path()));
    runner.arm(RunMode::TestValidate).unwrap();

    let frame = Frame::constant(8, 8, 1.0);
    // Warm-up: calls 1-5.
    for _ in 0..5 {
        assert_eq!(runner.submit_frame(&frame).unwrap(), SubmitOutcome::WarmUp);
    }
    // Call 6: the pipeline detects, validation starts.
    assert_eq!(
        runner.submit_frame(&frame).unwrap(),
        SubmitOutcome::ValidationStarted
    );
    assert!(runner.is_validating());
    // Five held frames, then the sixth finalizes the record.
    for _ in 0..5 {
        assert_eq!(
            runner.submit_frame(&frame).unwrap(),
            SubmitOutcome::ValidationTick
        );
    }
    assert_eq!(
        runner.submit_frame(&frame).unwrap(),
        SubmitOutcome::ValidationComplete
    );

    assert!(!runner.is_validating());
    assert!(runner.instrument().scans.is_empty());
    assert_eq!(runner.instrument().archived.len(), 1);
    let files = log_files(dir.path());
    assert_eq!(files.len(), 1);
    let body = std::fs::read_to_string(&files[0]).unwrap();
    assert!(body.contains("fastscan_x_center: 3"));
    assert!(body.contains("fastscan_y_center: 4"));
}

#[test]
fn validation_archives_raw_and_analyzed_history() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = runner_with(detect_on_sixth, "detect_on_sixth", config_in(dir.path()));
    runner.arm(RunMode::TestValidate).unwrap();

    let frame = Frame::constant(8, 8, 1.0);
    for _ in 0..12 {
        runner.submit_frame(&frame).unwrap();
    }
    let archived = &runner.instrument().archived;
    assert_eq!(archived.len(), 1);
    // 11 settled frames in a capacity-10 buffer: 10 raw plus their previews.
    assert_eq!(archived[0], (10, 10));
}

#[test]
fn disarm_stops_frame_pickup() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = runner_with(always_detect, "always_detect", config_in(dir.path()));
    runner.arm(RunMode::TestVisualize).unwrap();
    let frame = Frame::constant(8, 8, 1.0);
    runner.submit_frame(&frame).unwrap();

    runner.disarm();
    assert!(!runner.is_running());
    assert_eq!(runner.submit_frame(&frame).unwrap(), SubmitOutcome::Ignored);
    // Disarm turned the excitation back off.
    assert_eq!(runner.instrument().excitation, vec![true, false]);
}

#[test]
fn logger_install_propagates_with_question_mark() -> Result<(), Box<dyn std::error::Error>> {
    // Session entry points install the logger with `?`, so the install
    // error must convert into a boxed error.
    etscan::core::init_with_level(log::LevelFilter::Warn)?;
    Ok(())
}
