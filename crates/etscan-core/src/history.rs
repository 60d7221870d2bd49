use std::collections::VecDeque;

use crate::Frame;

/// Default capacity of the pre-event history buffers.
pub const HISTORY_CAPACITY: usize = 10;

/// Bounded rolling buffers of raw and analyzed frames preceding an event.
///
/// Oldest entries are evicted silently on overflow. Draining (`take_*`)
/// hands the frames to the caller for archiving and clears the buffer,
/// mirroring the save-then-clear step of the event cycle.
#[derive(Debug)]
pub struct FrameHistoryBuffer {
    capacity: usize,
    raw: VecDeque<Frame>,
    analyzed: VecDeque<Frame>,
}

impl Default for FrameHistoryBuffer {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

impl FrameHistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            raw: VecDeque::with_capacity(capacity),
            analyzed: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push_raw(&mut self, frame: Frame) {
        if self.raw.len() == self.capacity {
            self.raw.pop_front();
        }
        self.raw.push_back(frame);
    }

    pub fn push_analyzed(&mut self, frame: Frame) {
        if self.analyzed.len() == self.capacity {
            self.analyzed.pop_front();
        }
        self.analyzed.push_back(frame);
    }

    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    pub fn analyzed_len(&self) -> usize {
        self.analyzed.len()
    }

    /// Drain the raw buffer in arrival order.
    pub fn take_raw(&mut self) -> Vec<Frame> {
        self.raw.drain(..).collect()
    }

    /// Drain the analyzed buffer in arrival order.
    pub fn take_analyzed(&mut self) -> Vec<Frame> {
        self.analyzed.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.raw.clear();
        self.analyzed.clear();
    }
}
