//! Binary region-of-interest mask built from a short stack of frames.

use crate::{filter, Frame};

/// Boolean grid with the same shape as the fast-modality frames; `true`
/// marks pixels inside the region of interest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryMask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<bool>,
}

impl BinaryMask {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }

    /// Number of pixels inside the region of interest.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MaskError {
    #[error("malformed numeric input for {field}: {text:?}")]
    BadNumber {
        field: &'static str,
        text: String,
        source: std::num::ParseFloatError,
    },

    #[error("frame shape {got_w}x{got_h} does not match capture stack {want_w}x{want_h}")]
    ShapeMismatch {
        want_w: usize,
        want_h: usize,
        got_w: usize,
        got_h: usize,
    },

    #[error("mask capture already complete")]
    CaptureComplete,

    #[error("mask capture needs at least one frame")]
    EmptyStack,
}

/// Parameters for a mask capture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskParams {
    /// Frames to accumulate before the mask is computed.
    pub frames: usize,
    /// Gaussian smoothing sigma applied to the stack mean, in pixels.
    pub sigma: f32,
    /// Threshold on the smoothed mean; strictly-greater pixels are inside.
    pub threshold: f32,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            frames: 10,
            sigma: 2.0,
            threshold: 10.0,
        }
    }
}

impl MaskParams {
    /// Parse operator-entered sigma and threshold text.
    ///
    /// Malformed numerics fail fast instead of silently defaulting.
    pub fn parse(sigma: &str, threshold: &str) -> Result<Self, MaskError> {
        let sigma_val = sigma
            .trim()
            .parse::<f32>()
            .map_err(|source| MaskError::BadNumber {
                field: "sigma",
                text: sigma.to_owned(),
                source,
            })?;
        let threshold_val =
            threshold
                .trim()
                .parse::<f32>()
                .map_err(|source| MaskError::BadNumber {
                    field: "threshold",
                    text: threshold.to_owned(),
                    source,
                })?;
        Ok(Self {
            sigma: sigma_val,
            threshold: threshold_val,
            ..Self::default()
        })
    }
}

/// Outcome of feeding one frame to the builder.
#[derive(Clone, Debug)]
pub enum MaskProgress {
    /// Still accumulating; `have` of `need` frames collected.
    Accumulating { have: usize, need: usize },
    /// Stack complete; the finished mask. Further pushes are rejected.
    Complete(BinaryMask),
}

/// Accumulates a fixed-size stack of frames and thresholds the smoothed
/// stack mean into a [`BinaryMask`].
#[derive(Debug)]
pub struct BinaryMaskBuilder {
    params: MaskParams,
    stack: Vec<Frame>,
    done: bool,
}

impl BinaryMaskBuilder {
    pub fn new(params: MaskParams) -> Self {
        Self {
            params,
            stack: Vec::with_capacity(params.frames),
            done: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.done
    }

    /// Add one frame to the capture stack.
    ///
    /// Once the configured count is reached the mean is smoothed and
    /// thresholded (strict `>`) and the finished mask is returned; the
    /// builder then stops consuming frames.
    pub fn push(&mut self, frame: &Frame) -> Result<MaskProgress, MaskError> {
        if self.done {
            return Err(MaskError::CaptureComplete);
        }
        if let Some(first) = self.stack.first() {
            if !first.same_shape(frame) {
                return Err(MaskError::ShapeMismatch {
                    want_w: first.width,
                    want_h: first.height,
                    got_w: frame.width,
                    got_h: frame.height,
                });
            }
        }
        self.stack.push(frame.clone());
        if self.stack.len() < self.params.frames.max(1) {
            return Ok(MaskProgress::Accumulating {
                have: self.stack.len(),
                need: self.params.frames,
            });
        }

        let mean = filter::mean_stack(&self.stack).ok_or(MaskError::EmptyStack)?;
        let smoothed = filter::gaussian_blur(&mean, self.params.sigma);
        let data = smoothed
            .data
            .iter()
            .map(|&v| v > self.params.threshold)
            .collect();
        self.done = true;
        self.stack.clear();
        log::debug!(
            "binary mask complete ({}x{}, sigma {}, threshold {})",
            smoothed.width,
            smoothed.height,
            self.params.sigma,
            self.params.threshold
        );
        Ok(MaskProgress::Complete(BinaryMask {
            width: smoothed.width,
            height: smoothed.height,
            data,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_from_constant(value: f32, threshold: f32) -> BinaryMask {
        let params = MaskParams {
            frames: 4,
            sigma: 1.0,
            threshold,
        };
        let mut builder = BinaryMaskBuilder::new(params);
        for _ in 0..3 {
            match builder.push(&Frame::constant(6, 6, value)).unwrap() {
                MaskProgress::Accumulating { .. } => {}
                MaskProgress::Complete(_) => panic!("completed early"),
            }
        }
        match builder.push(&Frame::constant(6, 6, value)).unwrap() {
            MaskProgress::Complete(mask) => mask,
            MaskProgress::Accumulating { .. } => panic!("expected completion"),
        }
    }

    #[test]
    fn constant_above_threshold_is_all_true() {
        let mask = build_from_constant(12.0, 10.0);
        assert_eq!(mask.count(), 36);
    }

    #[test]
    fn constant_below_threshold_is_all_false() {
        let mask = build_from_constant(8.0, 10.0);
        assert_eq!(mask.count(), 0);
    }

    #[test]
    fn threshold_is_strict() {
        // V == T must deterministically stay outside the mask.
        let mask = build_from_constant(10.0, 10.0);
        assert_eq!(mask.count(), 0);
    }

    #[test]
    fn capture_stops_after_completion() {
        let params = MaskParams {
            frames: 1,
            sigma: 1.0,
            threshold: 0.0,
        };
        let mut builder = BinaryMaskBuilder::new(params);
        assert!(matches!(
            builder.push(&Frame::constant(3, 3, 1.0)),
            Ok(MaskProgress::Complete(_))
        ));
        assert!(matches!(
            builder.push(&Frame::constant(3, 3, 1.0)),
            Err(MaskError::CaptureComplete)
        ));
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let mut builder = BinaryMaskBuilder::new(MaskParams::default());
        builder.push(&Frame::constant(4, 4, 1.0)).unwrap();
        assert!(matches!(
            builder.push(&Frame::constant(5, 4, 1.0)),
            Err(MaskError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn parse_rejects_malformed_numbers() {
        assert!(matches!(
            MaskParams::parse("abc", "10"),
            Err(MaskError::BadNumber { field: "sigma", .. })
        ));
        assert!(matches!(
            MaskParams::parse("2.0", ""),
            Err(MaskError::BadNumber {
                field: "threshold",
                ..
            })
        ));
        let params = MaskParams::parse(" 2.5 ", "7").unwrap();
        assert_eq!(params.sigma, 2.5);
        assert_eq!(params.threshold, 7.0);
    }
}
