//! Pixel-wise stack mean and separable Gaussian smoothing.

use crate::Frame;

/// Pixel-wise mean over a stack of same-shape frames.
///
/// Returns `None` for an empty stack or mismatched shapes.
pub fn mean_stack(frames: &[Frame]) -> Option<Frame> {
    let first = frames.first()?;
    if !frames.iter().all(|f| f.same_shape(first)) {
        return None;
    }
    let n = frames.len() as f32;
    let mut acc = vec![0.0f32; first.data.len()];
    for f in frames {
        for (a, &v) in acc.iter_mut().zip(&f.data) {
            *a += v;
        }
    }
    for a in &mut acc {
        *a /= n;
    }
    Frame::from_data(first.width, first.height, acc)
}

fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    // Truncate at 3 sigma, matching the common ndimage default.
    let radius = (3.0 * sigma).ceil().max(1.0) as i32;
    let mut kernel = Vec::with_capacity(2 * radius as usize + 1);
    let s2 = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;
    for i in -radius..=radius {
        let w = (-(i * i) as f32 / s2).exp();
        kernel.push(w);
        sum += w;
    }
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

#[inline]
fn clamp(i: i64, max: usize) -> usize {
    i.clamp(0, max as i64 - 1) as usize
}

/// Separable Gaussian blur with edge clamping.
///
/// `sigma <= 0` returns the input unchanged.
pub fn gaussian_blur(frame: &Frame, sigma: f32) -> Frame {
    if sigma <= 0.0 {
        return frame.clone();
    }
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as i64;
    let (w, h) = (frame.width, frame.height);

    // Horizontal pass.
    let mut tmp = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, &kw) in kernel.iter().enumerate() {
                let sx = clamp(x as i64 + k as i64 - radius, w);
                acc += kw * frame.data[y * w + sx];
            }
            tmp[y * w + x] = acc;
        }
    }

    // Vertical pass.
    let mut out = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, &kw) in kernel.iter().enumerate() {
                let sy = clamp(y as i64 + k as i64 - radius, h);
                acc += kw * tmp[sy * w + x];
            }
            out[y * w + x] = acc;
        }
    }

    Frame {
        width: w,
        height: h,
        data: out,
        captured_at: frame.captured_at,
    }
}
