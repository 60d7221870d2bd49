//! Scan-trigger boundary: parameter descriptor and the hardware trait.

use etscan_calib::FastAxisShift;
use etscan_core::Frame;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Descriptor of the targeted slow scan: axis devices, sizes, center
/// positions, pixel sizes and dwell time. Axis 0 is the fast scan axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanParameters {
    pub target_devices: Vec<String>,
    pub axis_sizes: Vec<f64>,
    pub axis_center: Vec<f64>,
    pub axis_pixel_sizes: Vec<f64>,
    pub dwell_time: f64,
}

impl Default for ScanParameters {
    fn default() -> Self {
        Self {
            target_devices: vec!["X-galvo".to_owned(), "Y-galvo".to_owned()],
            axis_sizes: vec![5.0, 5.0],
            axis_center: vec![0.0, 0.0],
            axis_pixel_sizes: vec![0.03, 0.03],
            dwell_time: 0.03,
        }
    }
}

impl ScanParameters {
    /// Center the scan on a detected event position.
    ///
    /// The fast-axis (index 0) center gets the static timing-shift
    /// correction; remaining axes are centered as-is.
    pub fn set_center(&mut self, position: Point2<f64>, shift: &FastAxisShift) {
        let px_size = self.axis_pixel_sizes.first().copied().unwrap_or(0.0);
        let coords = [position.x, position.y];
        self.axis_center.clear();
        for (index, _) in self.target_devices.iter().enumerate() {
            let center = coords.get(index).copied().unwrap_or(0.0);
            let center = if index == 0 {
                shift.correct(center, self.dwell_time, px_size)
            } else {
                center
            };
            self.axis_center.push(center);
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("scan rejected: {0}")]
    Rejected(String),

    #[error("scan hardware fault: {0}")]
    Hardware(String),
}

/// Hardware surface the runner drives.
///
/// Everything behind this trait is an external collaborator: excitation
/// sources, the scan engine, frame archiving and detection display.
pub trait Instrument {
    /// Enable or disable the fast-modality excitation source.
    fn set_fast_excitation(&mut self, enabled: bool);

    /// Run the targeted scan; returns once the scan has completed.
    fn trigger_scan(&mut self, params: &ScanParameters) -> Result<(), ScanError>;

    /// Persist pre-event frame history.
    fn archive_frames(&mut self, raw: &[Frame], analyzed: &[Frame]);

    /// Display detections and the analysis preview (test modes).
    fn show_detections(&mut self, _coords: &[Point2<f64>], _preview: Option<&Frame>) {}
}

/// Instrument that accepts every command and does nothing.
#[derive(Debug, Default)]
pub struct NullInstrument;

impl Instrument for NullInstrument {
    fn set_fast_excitation(&mut self, _enabled: bool) {}

    fn trigger_scan(&mut self, _params: &ScanParameters) -> Result<(), ScanError> {
        Ok(())
    }

    fn archive_frames(&mut self, _raw: &[Frame], _analyzed: &[Frame]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn set_center_applies_the_fast_axis_shift() {
        let mut params = ScanParameters::default();
        let shift = FastAxisShift::new([0.0, 0.0, 0.0, 0.0, 0.0, 0.25]);
        params.set_center(Point2::new(1.0, 2.0), &shift);
        assert_eq!(params.axis_center.len(), 2);
        assert_relative_eq!(params.axis_center[0], 0.75);
        assert_relative_eq!(params.axis_center[1], 2.0);
    }

    #[test]
    fn zero_shift_centers_exactly_on_the_event() {
        let mut params = ScanParameters::default();
        params.set_center(Point2::new(-0.5, 0.25), &FastAxisShift::default());
        assert_eq!(params.axis_center, vec![-0.5, 0.25]);
    }

    #[test]
    fn serde_round_trip() {
        let params = ScanParameters::default();
        let json = serde_json::to_string(&params).unwrap();
        let back: ScanParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
