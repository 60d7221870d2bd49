//! Core types and numerics for event-triggered scan control.
//!
//! This crate is intentionally small and free of orchestration logic. It
//! provides the fast-modality frame type, Gaussian smoothing, the binary
//! region-of-interest mask builder and the bounded pre-event frame history.

mod filter;
mod frame;
mod history;
mod logger;
mod mask;

pub use filter::{gaussian_blur, mean_stack};
pub use frame::Frame;
pub use history::{FrameHistoryBuffer, HISTORY_CAPACITY};
pub use logger::init_with_level;
pub use mask::{BinaryMask, BinaryMaskBuilder, MaskError, MaskParams, MaskProgress};
