//! Static second-order correction for the fast-scan-axis shift.

use serde::{Deserialize, Serialize};

/// Plane-fit constants modelling the scan-parameter-dependent spatial
/// offset between the two modalities' reference frames.
///
/// The shift is `C . [p^2, t^2, p t, p, t, 1]` for dwell time `t` and fast
/// axis pixel size `p`, and is subtracted from the fast-axis scan center.
/// The default constants are all zero pending empirical calibration, which
/// makes the correction a no-op.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FastAxisShift {
    pub c: [f64; 6],
}

impl FastAxisShift {
    pub fn new(c: [f64; 6]) -> Self {
        Self { c }
    }

    /// Shift magnitude for the given scan timing parameters.
    pub fn shift(&self, dwell_time: f64, px_size: f64) -> f64 {
        let terms = [
            px_size * px_size,
            dwell_time * dwell_time,
            px_size * dwell_time,
            px_size,
            dwell_time,
            1.0,
        ];
        self.c.iter().zip(terms.iter()).map(|(c, t)| c * t).sum()
    }

    /// Corrected fast-axis center coordinate.
    pub fn correct(&self, center: f64, dwell_time: f64, px_size: f64) -> f64 {
        center - self.shift(dwell_time, px_size)
    }
}
