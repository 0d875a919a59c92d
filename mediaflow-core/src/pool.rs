//! Frame buffer pools.
//!
//! Decoders draw output frames from a pool; callers hand consumed frames back
//! so their plane buffers are reused instead of reallocated.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::frame::{Frame, FrameKind, Plane};

/// A pool of plane sets for one frame layout.
pub struct FramePool {
    available: VecDeque<Vec<Plane>>,
    kind: Option<FrameKind>,
    max_size: usize,
    total_allocated: usize,
}

impl FramePool {
    /// Create a pool keeping at most `max_size` idle buffers.
    pub fn new(max_size: usize) -> Self {
        Self {
            available: VecDeque::with_capacity(max_size),
            kind: None,
            max_size,
            total_allocated: 0,
        }
    }

    /// Get an allocated frame of `kind`, reusing pooled planes if possible.
    ///
    /// Reused planes keep their previous contents.
    pub fn acquire(&mut self, kind: FrameKind) -> Result<Frame> {
        if self.kind != Some(kind) {
            self.available.clear();
            self.kind = Some(kind);
        }
        let frame = Frame::of_kind(kind);
        match self.available.pop_front() {
            Some(planes) => frame.with_planes(planes),
            None => {
                self.total_allocated += 1;
                frame.allocated()
            }
        }
    }

    /// Return a frame's planes to the pool.
    ///
    /// Frames of another layout, or beyond the pool size, are dropped.
    pub fn release(&mut self, mut frame: Frame) {
        if Some(*frame.kind()) != self.kind || self.available.len() >= self.max_size {
            return;
        }
        let planes = frame.take_planes();
        if !planes.is_empty() {
            self.available.push_back(planes);
        }
    }

    pub fn available(&self) -> usize {
        self.available.len()
    }

    /// Number of frames allocated fresh rather than reused.
    pub fn total_allocated(&self) -> usize {
        self.total_allocated
    }

    pub fn clear(&mut self) {
        self.available.clear();
    }
}

/// A thread-safe frame pool.
#[derive(Clone)]
pub struct SharedFramePool {
    inner: Arc<Mutex<FramePool>>,
}

impl SharedFramePool {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FramePool::new(max_size))),
        }
    }

    pub fn acquire(&self, kind: FrameKind) -> Result<Frame> {
        self.inner.lock().acquire(kind)
    }

    pub fn release(&self, frame: Frame) {
        self.inner.lock().release(frame);
    }

    pub fn available(&self) -> usize {
        self.inner.lock().available()
    }

    pub fn total_allocated(&self) -> usize {
        self.inner.lock().total_allocated()
    }
}
