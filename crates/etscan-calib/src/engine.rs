//! Calibration-point bookkeeping and the 20-parameter cubic fit.

use nalgebra::{DMatrix, DVector, Point2};

use crate::lm::{self, LeastSquaresProblem, LmError, LmOptions};
use crate::poly::{cubic_basis, TransformCoeffs, COEFF_COUNT};

/// Minimum point pairs for a determined fit: 10 free coefficients per axis.
pub const MIN_CALIBRATION_PAIRS: usize = 10;

/// Corresponding physical-space coordinates in the two modalities.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationPointPair {
    /// Point in the fast, low-resolution coordinate space.
    pub lo: Point2<f64>,
    /// Point in the slow, high-resolution coordinate space.
    pub hi: Point2<f64>,
}

impl CalibrationPointPair {
    /// Build a pair from annotated pixel coordinates in the two calibration
    /// images.
    pub fn from_pixels(
        lo_px: Point2<f64>,
        lo_px_size: f64,
        hi_px: Point2<f64>,
        hi_px_size: f64,
        hi_extent: f64,
    ) -> Self {
        Self {
            lo: lo_res_to_physical(lo_px, lo_px_size),
            hi: hi_res_to_physical(hi_px, hi_px_size, hi_extent),
        }
    }
}

/// Low-resolution pixel coordinate to physical units.
pub fn lo_res_to_physical(px: Point2<f64>, px_size: f64) -> Point2<f64> {
    Point2::new(px.x * px_size, px.y * px_size)
}

/// High-resolution pixel coordinate to physical units, centered on the
/// image's physical extent and y-inverted.
pub fn hi_res_to_physical(px: Point2<f64>, px_size: f64, extent: f64) -> Point2<f64> {
    Point2::new(
        px.x * px_size - extent / 2.0,
        -(px.y * px_size - extent / 2.0),
    )
}

/// Inverse of [`hi_res_to_physical`]: physical point back to high-resolution
/// pixel coordinates, for plotting fitted points over the calibration image.
pub fn project_to_hi_res_px(p: Point2<f64>, px_size: f64, extent: f64) -> Point2<f64> {
    Point2::new(
        (p.x + extent / 2.0) / px_size,
        (-p.y + extent / 2.0) / px_size,
    )
}

#[derive(thiserror::Error, Debug)]
pub enum CalibError {
    #[error("need at least {MIN_CALIBRATION_PAIRS} calibration point pairs, got {0}")]
    TooFewPairs(usize),

    #[error(transparent)]
    Solve(#[from] LmError),
}

/// Accumulates calibration point pairs and fits [`TransformCoeffs`].
#[derive(Debug, Default)]
pub struct CalibrationEngine {
    pairs: Vec<CalibrationPointPair>,
    coeffs: TransformCoeffs,
}

impl CalibrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pair(&mut self, pair: CalibrationPointPair) {
        self.pairs.push(pair);
    }

    pub fn pairs(&self) -> &[CalibrationPointPair] {
        &self.pairs
    }

    /// Last fitted (or externally loaded) coefficients.
    pub fn coeffs(&self) -> &TransformCoeffs {
        &self.coeffs
    }

    pub fn set_coeffs(&mut self, coeffs: TransformCoeffs) {
        self.coeffs = coeffs;
    }

    /// Clear accumulated point pairs. The last-fitted coefficients are kept.
    pub fn reset(&mut self) {
        self.pairs.clear();
    }

    /// Levenberg–Marquardt fit over all 20 coefficients.
    ///
    /// The initial guess is the zero vector, not the unit transform: the fit
    /// recovers the mapping from scratch. Fails explicitly when the system
    /// is under-determined.
    pub fn fit(&mut self) -> Result<TransformCoeffs, CalibError> {
        if self.pairs.len() < MIN_CALIBRATION_PAIRS {
            return Err(CalibError::TooFewPairs(self.pairs.len()));
        }
        let problem = CubicFit {
            pairs: self.pairs.clone(),
        };
        let solution = lm::solve(
            &problem,
            DVector::zeros(COEFF_COUNT),
            &LmOptions::default(),
        )?;
        let mut a = [0.0; COEFF_COUNT];
        a.copy_from_slice(solution.as_slice());
        let coeffs = TransformCoeffs { a };
        log::info!(
            "calibration fit complete over {} point pairs",
            self.pairs.len()
        );
        self.coeffs = coeffs;
        Ok(coeffs)
    }
}

/// Residuals: 2 entries per pair, one per output axis.
struct CubicFit {
    pairs: Vec<CalibrationPointPair>,
}

impl LeastSquaresProblem for CubicFit {
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        let mut a = [0.0; COEFF_COUNT];
        a.copy_from_slice(params.as_slice());
        let coeffs = TransformCoeffs { a };
        let mut res = DVector::zeros(2 * self.pairs.len());
        for (i, pair) in self.pairs.iter().enumerate() {
            let mapped = coeffs.apply(pair.lo);
            res[2 * i] = mapped.x - pair.hi.x;
            res[2 * i + 1] = mapped.y - pair.hi.y;
        }
        res
    }

    fn jacobian(&self, _params: &DVector<f64>) -> DMatrix<f64> {
        // The model is linear in the coefficients: the Jacobian is the
        // cubic basis, independent of the current parameters.
        let mut j = DMatrix::zeros(2 * self.pairs.len(), COEFF_COUNT);
        for (i, pair) in self.pairs.iter().enumerate() {
            let basis = cubic_basis(pair.lo.x, pair.lo.y);
            for (k, b) in basis.iter().enumerate() {
                j[(2 * i, k)] = *b;
                j[(2 * i + 1, 10 + k)] = *b;
            }
        }
        j
    }
}
