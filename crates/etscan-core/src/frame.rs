use std::time::Instant;

/// Single fast-modality camera frame.
///
/// Samples are stored row-major as `f32`, `len = width * height`. Frames are
/// produced by a frame source and never mutated downstream; the runner and
/// buffers only clone or borrow them.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
    pub captured_at: Instant,
}

impl Frame {
    /// Wrap an owned sample buffer. Returns `None` on a shape mismatch.
    pub fn from_data(width: usize, height: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != width * height {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
            captured_at: Instant::now(),
        })
    }

    /// Frame filled with a constant value.
    pub fn constant(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
            captured_at: Instant::now(),
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn same_shape(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn min_max(&self) -> (f32, f32) {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for &v in &self.data {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        (lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_data_rejects_shape_mismatch() {
        assert!(Frame::from_data(3, 2, vec![0.0; 5]).is_none());
        assert!(Frame::from_data(3, 2, vec![0.0; 6]).is_some());
    }

    #[test]
    fn indexing_is_row_major() {
        let f = Frame::from_data(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(f.get(0, 0), 1.0);
        assert_eq!(f.get(1, 0), 2.0);
        assert_eq!(f.get(0, 1), 3.0);
        assert_eq!(f.get(1, 1), 4.0);
    }

    #[test]
    fn min_max_scans_all_samples() {
        let f = Frame::from_data(2, 2, vec![-1.0, 7.0, 3.0, 0.5]).unwrap();
        assert_eq!(f.min_max(), (-1.0, 7.0));
    }
}
