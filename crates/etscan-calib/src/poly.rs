//! Bivariate cubic transform coefficients and their flat-text persistence.

use std::path::Path;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Number of free coefficients: 10 cubic terms per output axis.
pub const COEFF_COUNT: usize = 20;

/// Coefficients of the bivariate cubic mapping from fast-imaging
/// coordinates to scan coordinates.
///
/// The first 10 values parameterize `x'`, the last 10 parameterize `y'`:
///
/// ```text
/// x' = a0 c1^3 + a1 c2^3 + a2 c2 c1^2 + a3 c1 c2^2
///    + a4 c1^2 + a5 c2^2 + a6 c1 c2 + a7 c1 + a8 c2 + a9
/// ```
///
/// The default is the unit vector that makes [`apply`](Self::apply) an
/// identity, so an uncalibrated system degrades to a passthrough instead
/// of failing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformCoeffs {
    pub a: [f64; COEFF_COUNT],
}

impl Default for TransformCoeffs {
    fn default() -> Self {
        Self::unit()
    }
}

/// Cubic monomial basis evaluated at one input coordinate.
#[inline]
pub(crate) fn cubic_basis(c1: f64, c2: f64) -> [f64; 10] {
    [
        c1 * c1 * c1,
        c2 * c2 * c2,
        c2 * c1 * c1,
        c1 * c2 * c2,
        c1 * c1,
        c2 * c2,
        c1 * c2,
        c1,
        c2,
        1.0,
    ]
}

impl TransformCoeffs {
    /// Identity-like "unit" coefficients: `x' = c1`, `y' = c2`.
    pub fn unit() -> Self {
        let mut a = [0.0; COEFF_COUNT];
        a[7] = 1.0;
        a[18] = 1.0;
        Self { a }
    }

    pub fn from_slice(values: &[f64]) -> Option<Self> {
        let a: [f64; COEFF_COUNT] = values.try_into().ok()?;
        Some(Self { a })
    }

    /// Evaluate the fitted cubic for a single input coordinate.
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let basis = cubic_basis(p.x, p.y);
        let mut x = 0.0;
        let mut y = 0.0;
        for (i, b) in basis.iter().enumerate() {
            x += self.a[i] * b;
            y += self.a[10 + i] * b;
        }
        Point2::new(x, y)
    }

    /// Write the coefficients as 20 newline-separated values.
    pub fn save_txt(&self, path: impl AsRef<Path>) -> Result<(), CoeffsIoError> {
        let body: String = self
            .a
            .iter()
            .map(|v| format!("{v:e}\n"))
            .collect::<Vec<_>>()
            .concat();
        std::fs::write(path, body)?;
        Ok(())
    }

    /// Load coefficients from a flat record of 20 whitespace-separated
    /// values.
    pub fn load_txt(path: impl AsRef<Path>) -> Result<Self, CoeffsIoError> {
        let raw = std::fs::read_to_string(path)?;
        let mut values = Vec::with_capacity(COEFF_COUNT);
        for token in raw.split_whitespace() {
            let v = token
                .parse::<f64>()
                .map_err(|_| CoeffsIoError::BadNumber(token.to_owned()))?;
            values.push(v);
        }
        Self::from_slice(&values).ok_or(CoeffsIoError::BadCount(values.len()))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CoeffsIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("expected {COEFF_COUNT} coefficients, got {0}")]
    BadCount(usize),

    #[error("malformed coefficient {0:?}")]
    BadNumber(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn unit_coefficients_are_identity() {
        let unit = TransformCoeffs::unit();
        for p in [
            Point2::new(0.0, 0.0),
            Point2::new(3.5, -1.25),
            Point2::new(-120.0, 87.5),
        ] {
            let q = unit.apply(p);
            assert_relative_eq!(q.x, p.x, epsilon = 1e-12);
            assert_relative_eq!(q.y, p.y, epsilon = 1e-12);
        }
    }

    #[test]
    fn unit_vector_layout_matches_the_persisted_form() {
        let expected = [
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
        ];
        assert_eq!(TransformCoeffs::unit().a, expected);
    }

    #[test]
    fn apply_evaluates_the_cubic() {
        let mut a = [0.0; COEFF_COUNT];
        a[0] = 2.0; // 2 c1^3
        a[8] = 1.0; // + c2
        a[19] = 5.0; // y' = 5
        let t = TransformCoeffs { a };
        let q = t.apply(Point2::new(2.0, 3.0));
        assert_relative_eq!(q.x, 2.0 * 8.0 + 3.0, epsilon = 1e-12);
        assert_relative_eq!(q.y, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn txt_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coeffs.txt");
        let mut a = [0.0; COEFF_COUNT];
        for (i, v) in a.iter_mut().enumerate() {
            *v = i as f64 * 0.125 - 1.0;
        }
        let coeffs = TransformCoeffs { a };
        coeffs.save_txt(&path).unwrap();
        let loaded = TransformCoeffs::load_txt(&path).unwrap();
        for (x, y) in coeffs.a.iter().zip(loaded.a.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn load_rejects_wrong_count_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let short = dir.path().join("short.txt");
        std::fs::write(&short, "1.0 2.0 3.0").unwrap();
        assert!(matches!(
            TransformCoeffs::load_txt(&short),
            Err(CoeffsIoError::BadCount(3))
        ));

        let bad = dir.path().join("bad.txt");
        std::fs::write(&bad, "1.0 nope 3.0").unwrap();
        assert!(matches!(
            TransformCoeffs::load_txt(&bad),
            Err(CoeffsIoError::BadNumber(_))
        ));
    }
}
