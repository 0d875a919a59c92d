//! Cross-stream packet interleaving by dts.

use std::collections::VecDeque;

use mediaflow_core::{Packet, Rational, Timestamp};
use tracing::trace;

/// Default for the `max_interleave_delta` option, in microseconds.
pub const DEFAULT_MAX_INTERLEAVE_DELTA: i64 = 10_000_000;

struct Queued {
    key: Timestamp,
    seq: u64,
    packet: Packet,
}

/// Buffers packets of interleaved streams and releases them in dts order.
///
/// A packet is released once every interleaved stream has something queued,
/// or once the queued span exceeds `max_delta` microseconds (0 disables the
/// limit). Packets of non-interleaved streams pass straight through.
pub struct Interleaver {
    queues: Vec<VecDeque<Queued>>,
    interleaved: Vec<bool>,
    time_bases: Vec<Rational>,
    max_delta: i64,
    seq: u64,
}

impl Interleaver {
    /// One entry per stream: its time base and whether it is interleaved.
    pub fn new(streams: impl IntoIterator<Item = (Rational, bool)>, max_delta: i64) -> Self {
        let (time_bases, interleaved): (Vec<_>, Vec<_>) = streams.into_iter().unzip();
        Self {
            queues: time_bases.iter().map(|_| VecDeque::new()).collect(),
            interleaved,
            time_bases,
            max_delta,
            seq: 0,
        }
    }

    pub fn set_max_delta(&mut self, max_delta: i64) {
        self.max_delta = max_delta;
    }

    /// Number of packets held back.
    pub fn buffered(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// Queue a packet and return whatever can be written now.
    ///
    /// The packet's timestamps must already be in its stream's time base.
    pub fn push(&mut self, packet: Packet) -> Vec<Packet> {
        let stream = packet.stream_index;
        if !self.interleaved.get(stream).copied().unwrap_or(false) {
            return vec![packet];
        }
        let key = Timestamp::new(
            packet.dts.or(packet.pts).unwrap_or(i64::MIN),
            self.time_bases[stream],
        );
        self.queues[stream].push_back(Queued {
            key,
            seq: self.seq,
            packet,
        });
        self.seq += 1;

        let mut out = Vec::new();
        while self.ready() {
            match self.pop_lowest() {
                Some(packet) => out.push(packet),
                None => break,
            }
        }
        out
    }

    /// Release everything in dts order.
    pub fn drain(&mut self) -> Vec<Packet> {
        let mut out = Vec::with_capacity(self.buffered());
        while let Some(packet) = self.pop_lowest() {
            out.push(packet);
        }
        out
    }

    fn ready(&self) -> bool {
        let mut any = false;
        let mut all = true;
        for (queue, _) in self
            .queues
            .iter()
            .zip(&self.interleaved)
            .filter(|(_, interleaved)| **interleaved)
        {
            any |= !queue.is_empty();
            all &= !queue.is_empty();
        }
        if !any {
            return false;
        }
        if all {
            return true;
        }
        self.max_delta > 0 && self.span_micros() > self.max_delta
    }

    /// Distance between the newest and the oldest queued packet.
    fn span_micros(&self) -> i64 {
        let heads = self.queues.iter().filter_map(|q| q.front()).map(|q| q.key);
        let tails = self.queues.iter().filter_map(|q| q.back()).map(|q| q.key);
        match (heads.min(), tails.max()) {
            (Some(low), Some(high)) => high.to_micros().saturating_sub(low.to_micros()),
            _ => 0,
        }
    }

    fn pop_lowest(&mut self) -> Option<Packet> {
        let stream = self
            .queues
            .iter()
            .enumerate()
            .filter_map(|(i, q)| q.front().map(|head| (head.key, head.seq, i)))
            .min()
            .map(|(_, _, i)| i)?;
        let queued = self.queues[stream].pop_front()?;
        trace!(stream, seq = queued.seq, "interleaver released packet");
        Some(queued.packet)
    }
}
