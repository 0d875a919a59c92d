//! Compressed media packets.
//!
//! A packet is one encoded unit of a single stream together with its timing.
//! Packets move between stages by value: whoever holds the packet owns the
//! payload and may edit it in place before handing it on.

use std::fmt;

use bitflags::bitflags;

use crate::rational::Rational;
use crate::timestamp::Timestamp;

bitflags! {
    /// Flags for packet properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PacketFlags: u32 {
        /// Packet starts a keyframe; decoding can begin here.
        const KEY = 0x0001;
        /// Packet data is known or suspected to be corrupt.
        const CORRUPT = 0x0002;
        /// Needed to maintain decoder state but not to be displayed.
        const DISCARD = 0x0004;
        /// Packet comes from a trusted source.
        const TRUSTED = 0x0008;
        /// No other frame references this one; safe to drop.
        const DISPOSABLE = 0x0010;
    }
}

/// An encoded media packet.
#[derive(Clone, PartialEq)]
pub struct Packet {
    data: Vec<u8>,
    /// Presentation timestamp in `time_base` units.
    pub pts: Option<i64>,
    /// Decode timestamp in `time_base` units.
    pub dts: Option<i64>,
    /// Duration in `time_base` units, 0 if unknown.
    pub duration: i64,
    /// Time base `pts`, `dts` and `duration` are expressed in; zero means
    /// "the receiving stream's".
    pub time_base: Rational,
    /// Index of the stream this packet belongs to.
    pub stream_index: usize,
    /// Packet flags.
    pub flags: PacketFlags,
    /// Byte offset in the source container, if known.
    pub pos: Option<u64>,
}

impl Packet {
    /// Create a new packet owning `data`, with no timing information.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pts: None,
            dts: None,
            duration: 0,
            time_base: Rational::zero(),
            stream_index: 0,
            flags: PacketFlags::empty(),
            pos: None,
        }
    }

    /// Create an empty packet.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Packet payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable payload, for in-place edits by the current owner.
    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    /// Consume the packet and return its payload.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_key(&self) -> bool {
        self.flags.contains(PacketFlags::KEY)
    }

    pub fn is_corrupt(&self) -> bool {
        self.flags.contains(PacketFlags::CORRUPT)
    }

    /// Presentation time as a comparable timestamp.
    pub fn pts_timestamp(&self) -> Option<Timestamp> {
        self.pts.map(|v| Timestamp::new(v, self.time_base))
    }

    /// Decode time as a comparable timestamp, falling back to pts.
    pub fn dts_timestamp(&self) -> Option<Timestamp> {
        self.dts
            .or(self.pts)
            .map(|v| Timestamp::new(v, self.time_base))
    }

    /// Rescale `pts`, `dts` and `duration` into `target` and adopt it.
    ///
    /// A zero `target` is ignored.
    pub fn rescale_ts(&mut self, target: Rational) {
        if target.is_zero() {
            return;
        }
        if self.time_base == target || self.time_base.is_zero() {
            self.time_base = target;
            return;
        }
        let from = self.time_base;
        self.pts = self.pts.map(|v| from.rescale(v, target));
        self.dts = self.dts.map(|v| from.rescale(v, target));
        self.duration = from.rescale(self.duration, target);
        self.time_base = target;
    }

    pub fn with_timestamps(mut self, pts: Option<i64>, dts: Option<i64>) -> Self {
        self.pts = pts;
        self.dts = dts;
        self
    }

    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.time_base = time_base;
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_stream_index(mut self, index: usize) -> Self {
        self.stream_index = index;
        self
    }

    pub fn with_flags(mut self, flags: PacketFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("size", &self.size())
            .field("pts", &self.pts)
            .field("dts", &self.dts)
            .field("duration", &self.duration)
            .field("time_base", &self.time_base)
            .field("stream_index", &self.stream_index)
            .field("flags", &self.flags)
            .finish()
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::empty()
    }
}
