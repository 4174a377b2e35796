//! Bounded FIFO sample buffers shared by the motion detectors.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct SlidingWindow<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> SlidingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one once full.
    pub fn push(&mut self, value: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }
}

impl SlidingWindow<f32> {
    /// Contiguous copy of the samples, oldest first.
    pub fn to_vec(&self) -> Vec<f32> {
        self.buf.iter().copied().collect()
    }

    /// `(min, max)` over the retained samples.
    pub fn bounds(&self) -> Option<(f32, f32)> {
        let mut it = self.buf.iter().copied();
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    pub fn range(&self) -> f32 {
        self.bounds().map_or(0.0, |(lo, hi)| hi - lo)
    }
}
