//! Coordinate calibration between the fast widefield modality and the
//! targeted scanning modality.
//!
//! The mapping is a bivariate cubic polynomial with 20 free coefficients
//! (10 per output axis), fitted with Levenberg–Marquardt from annotated
//! point pairs. A static second-order fast-axis correction compensates the
//! scan-timing-induced spatial shift of the scanning modality.

mod engine;
mod image;
mod lm;
mod poly;
mod shift;

pub use engine::{
    hi_res_to_physical, lo_res_to_physical, project_to_hi_res_px, CalibError, CalibrationEngine,
    CalibrationPointPair, MIN_CALIBRATION_PAIRS,
};
pub use image::{CalibImageError, CalibrationImage};
pub use lm::{LeastSquaresProblem, LmError, LmOptions};
pub use poly::{CoeffsIoError, TransformCoeffs, COEFF_COUNT};
pub use shift::FastAxisShift;
