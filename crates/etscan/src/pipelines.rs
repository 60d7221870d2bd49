//! Built-in reference pipeline.
//!
//! `intensity_peaks` detects sudden local intensity increases over the
//! settled background: it subtracts the background, gates by the binary
//! mask, keeps strict 3x3 local maxima above `threshold` and enforces a
//! minimum separation between reported peaks (strongest first).

use etscan_core::Frame;
use nalgebra::Point2;

use crate::pipeline::{ParamSpec, PipelineFn, PipelineInput, PipelineOutput, PipelineSpec};

/// Spec and entry point of the built-in pipeline, for registration.
pub(crate) fn intensity_peaks_entry() -> (PipelineSpec, PipelineFn) {
    (
        PipelineSpec {
            name: "intensity_peaks",
            params: vec![
                ParamSpec {
                    name: "threshold",
                    default: 25.0,
                },
                ParamSpec {
                    name: "min_distance",
                    default: 5.0,
                },
            ],
        },
        intensity_peaks,
    )
}

fn difference_image(input: &PipelineInput<'_>) -> Frame {
    let frame = input.frame;
    let mut diff = frame.clone();
    if let Some(bkg) = input.background.filter(|b| b.same_shape(frame)) {
        for (d, &b) in diff.data.iter_mut().zip(&bkg.data) {
            *d -= b;
        }
    }
    if let Some(mask) = input.mask {
        if mask.width == frame.width && mask.height == frame.height {
            for (d, &inside) in diff.data.iter_mut().zip(&mask.data) {
                if !inside {
                    *d = 0.0;
                }
            }
        }
    }
    diff
}

fn is_local_max(img: &Frame, x: usize, y: usize) -> bool {
    let v = img.get(x, y);
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= img.width as i64 || ny >= img.height as i64 {
                continue;
            }
            if img.get(nx as usize, ny as usize) >= v {
                return false;
            }
        }
    }
    true
}

/// Built-in detection pipeline. Parameters: `threshold`, `min_distance`.
pub fn intensity_peaks(input: PipelineInput<'_>) -> PipelineOutput {
    let threshold = input.params.first().copied().unwrap_or(25.0) as f32;
    let min_distance = input.params.get(1).copied().unwrap_or(5.0);

    let diff = difference_image(&input);

    // Candidate peaks, strongest first.
    let mut candidates: Vec<(f32, Point2<f64>)> = Vec::new();
    for y in 0..diff.height {
        for x in 0..diff.width {
            let v = diff.get(x, y);
            if v > threshold && is_local_max(&diff, x, y) {
                candidates.push((v, Point2::new(x as f64, y as f64)));
            }
        }
    }
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

    let min_sq = min_distance * min_distance;
    let mut coords: Vec<Point2<f64>> = Vec::new();
    for (_, p) in candidates {
        if coords.iter().all(|q| (p - q).norm_squared() >= min_sq) {
            coords.push(p);
        }
    }

    let preview = input.test_mode.then_some(diff);
    PipelineOutput {
        coords,
        exinfo: input.exinfo,
        preview,
    }
}
