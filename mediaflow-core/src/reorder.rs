//! Bounded reordering of frames and packets by timestamp.
//!
//! A [`ReorderQueue`] holds up to `depth` items. Pushing one more releases
//! the item with the lowest key, so a stream whose items are displaced by at
//! most `depth` positions comes out sorted.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::frame::Frame;
use crate::packet::Packet;

/// Items that carry a reorder key.
pub trait Reorderable {
    /// Sort key; `None` sorts before everything else.
    fn reorder_key(&self) -> Option<i64>;
}

impl Reorderable for Frame {
    fn reorder_key(&self) -> Option<i64> {
        self.pts.or(self.best_effort_timestamp)
    }
}

impl Reorderable for Packet {
    fn reorder_key(&self) -> Option<i64> {
        self.dts.or(self.pts)
    }
}

struct Entry<T> {
    key: i64,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the max-heap pops the smallest key; ties keep insertion order.
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of at most `depth` held items.
pub struct ReorderQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    depth: usize,
    seq: u64,
}

impl<T: Reorderable> ReorderQueue<T> {
    pub fn new(depth: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(depth + 1),
            depth,
            seq: 0,
        }
    }

    /// Insert an item, releasing the lowest one if the queue overflows.
    pub fn push(&mut self, item: T) -> Option<T> {
        let key = item.reorder_key().unwrap_or(i64::MIN);
        self.heap.push(Entry {
            key,
            seq: self.seq,
            item,
        });
        self.seq += 1;
        if self.heap.len() > self.depth {
            self.heap.pop().map(|e| e.item)
        } else {
            None
        }
    }

    /// Remove every held item in key order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.heap.pop() {
            out.push(entry.item);
        }
        out
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}
