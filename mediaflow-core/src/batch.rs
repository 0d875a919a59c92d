//! One-or-many inputs for stage calls.

use crate::frame::Frame;
use crate::packet::Packet;

/// Items handed to a stage in one call.
///
/// Built from a single item or a `Vec`, so stage methods accept either.
#[derive(Debug, Clone, Default)]
pub struct Batch<T>(pub Vec<T>);

impl<T> Batch<T> {
    pub fn into_inner(self) -> Vec<T> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Packet> for Batch<Packet> {
    fn from(packet: Packet) -> Self {
        Batch(vec![packet])
    }
}

impl From<Vec<Packet>> for Batch<Packet> {
    fn from(packets: Vec<Packet>) -> Self {
        Batch(packets)
    }
}

impl From<Frame> for Batch<Frame> {
    fn from(frame: Frame) -> Self {
        Batch(vec![frame])
    }
}

impl From<Vec<Frame>> for Batch<Frame> {
    fn from(frames: Vec<Frame>) -> Self {
        Batch(frames)
    }
}
