//! JSON container for calibration images.
//!
//! A calibration image is a 2-D sample grid plus the physical pixel size of
//! the modality it was recorded with. The physical extent (used for
//! centering high-resolution annotations) is derived from the row count.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum CalibImageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("data length {got} does not match {width}x{height}")]
    BadShape {
        width: usize,
        height: usize,
        got: usize,
    },

    #[error("pixel size must be positive, got {0}")]
    BadPixelSize(f64),
}

/// Structured numeric-array container: a 2-D image plus its physical pixel
/// size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationImage {
    pub width: usize,
    pub height: usize,
    /// Row-major samples, `len = width * height`.
    pub data: Vec<f32>,
    /// Physical pixel size, micrometres.
    pub pixel_size: f64,
}

impl CalibrationImage {
    pub fn new(
        width: usize,
        height: usize,
        data: Vec<f32>,
        pixel_size: f64,
    ) -> Result<Self, CalibImageError> {
        let img = Self {
            width,
            height,
            data,
            pixel_size,
        };
        img.validate()?;
        Ok(img)
    }

    fn validate(&self) -> Result<(), CalibImageError> {
        if self.data.len() != self.width * self.height {
            return Err(CalibImageError::BadShape {
                width: self.width,
                height: self.height,
                got: self.data.len(),
            });
        }
        if self.pixel_size <= 0.0 {
            return Err(CalibImageError::BadPixelSize(self.pixel_size));
        }
        Ok(())
    }

    /// Physical field size along the row axis.
    pub fn extent(&self) -> f64 {
        self.pixel_size * self.height as f64
    }

    /// Load a JSON container from disk, validating the shape.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibImageError> {
        let raw = std::fs::read_to_string(path)?;
        let img: Self = serde_json::from_str(&raw)?;
        img.validate()?;
        Ok(img)
    }

    /// Write this container to disk as JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibImageError> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
