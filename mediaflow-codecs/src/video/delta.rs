//! Long-GOP delta video codec.
//!
//! Each packet starts with a one-byte frame type followed by the frame's
//! image with rows packed back to back:
//!
//! | type | payload |
//! |------|---------|
//! | `I`  | the image |
//! | `P`  | byte-wise difference against the previous anchor |
//! | `B`  | byte-wise difference against the previous anchor |
//!
//! I and P frames are anchors and become the reference for what follows in
//! decode order; B frames are never referenced. The encoder holds B frames
//! back until the next anchor arrives, so packets leave in decode order
//! (`I0 P3 B1 B2 P6 B4 B5 ...`) and the decoder's reorder queue restores
//! presentation order. GOPs are closed: the last frame of a GOP is always
//! an anchor.

use std::collections::VecDeque;

use mediaflow_core::{
    CodecError, CodecId, CodecParameters, Frame, FrameFlags, FrameKind, MediaType, Packet,
    PacketFlags, PixelFormat, Result, SharedFramePool, VideoFormat,
};
use tracing::{debug, warn};

use super::rawvideo::stream_geometry;
use crate::config::EncoderConfig;
use crate::traits::{CodecCapabilities, CodecInfo, DecoderBackend, EncoderBackend};

pub static DELTA_INFO: CodecInfo = CodecInfo {
    name: "delta",
    long_name: "long-GOP delta video",
    codec_type: MediaType::Video,
    id: CodecId::Delta,
    capabilities: CodecCapabilities::DELAY
        .union(CodecCapabilities::REORDER)
        .union(CodecCapabilities::LOSSLESS),
    pix_fmts: &[
        PixelFormat::Yuv420p,
        PixelFormat::Yuv422p,
        PixelFormat::Yuv444p,
        PixelFormat::Nv12,
        PixelFormat::Gray8,
        PixelFormat::Rgb24,
    ],
    sample_fmts: &[],
    presets: &["intra", "default"],
};

/// Coded frame type, stored in the first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    I = 0,
    P = 1,
    B = 2,
}

impl FrameType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::I),
            1 => Some(Self::P),
            2 => Some(Self::B),
            _ => None,
        }
    }

    fn is_anchor(self) -> bool {
        self != Self::B
    }
}

/// Frame type for position `pos` within a GOP.
pub fn frame_type(pos: u32, gop_size: u32, max_b_frames: u32) -> FrameType {
    if pos == 0 {
        FrameType::I
    } else if max_b_frames == 0 || pos + 1 == gop_size || pos % (max_b_frames + 1) == 0 {
        FrameType::P
    } else {
        FrameType::B
    }
}

pub struct DeltaEncoder {
    gop_size: u32,
    max_b_frames: u32,
    frame_ticks: i64,
    /// Presentation index of the next input frame.
    frame_index: u64,
    /// B frames waiting for their following anchor.
    pending: Vec<Frame>,
    /// Packed image of the last anchor in decode order.
    reference: Option<Vec<u8>>,
    /// Input pts in presentation order, consumed as dts.
    input_pts: VecDeque<i64>,
    first_pts: Option<i64>,
    /// Packets emitted so far.
    emitted: u64,
    next_pts: i64,
}

impl DeltaEncoder {
    pub fn new(config: &EncoderConfig) -> Self {
        let intra = config.preset.as_deref() == Some("intra");
        Self {
            gop_size: if intra { 1 } else { config.gop_size },
            max_b_frames: if intra { 0 } else { config.max_b_frames },
            frame_ticks: config.time_base.ticks_per(config.frame_rate),
            frame_index: 0,
            pending: Vec::new(),
            reference: None,
            input_pts: VecDeque::new(),
            first_pts: None,
            emitted: 0,
            next_pts: 0,
        }
    }

    pub fn create(config: &EncoderConfig) -> Result<Box<dyn EncoderBackend>> {
        Ok(Box::new(Self::new(config)))
    }

    fn emit(&mut self, frame: &Frame, ftype: FrameType) -> Packet {
        let image = frame.to_packed_bytes();
        let mut payload = Vec::with_capacity(image.len() + 1);
        payload.push(ftype as u8);
        match (ftype, &self.reference) {
            (FrameType::P | FrameType::B, Some(reference)) => {
                payload.extend(image.iter().zip(reference).map(|(a, b)| a.wrapping_sub(*b)));
            }
            _ => payload.extend_from_slice(&image),
        }
        if ftype.is_anchor() {
            self.reference = Some(image);
        }

        let pts = frame.pts.unwrap_or(0);
        let dts = self.next_dts(pts);
        let flags = match ftype {
            FrameType::I => PacketFlags::KEY,
            FrameType::P => PacketFlags::empty(),
            FrameType::B => PacketFlags::DISPOSABLE,
        };
        let duration = if frame.duration > 0 {
            frame.duration
        } else {
            self.frame_ticks
        };
        Packet::new(payload)
            .with_timestamps(Some(pts), Some(dts))
            .with_duration(duration)
            .with_flags(flags)
    }
}

impl DeltaEncoder {
    /// Decode timestamp of the next packet in transmission order.
    ///
    /// Packet `k` takes the pts of presentation frame `k - max_b_frames`.
    /// The first `max_b_frames` packets extrapolate back from the first
    /// pts one frame period at a time.
    fn next_dts(&mut self, pts: i64) -> i64 {
        let delay = u64::from(self.max_b_frames);
        let k = self.emitted;
        self.emitted += 1;
        if k < delay {
            let first = self.first_pts.unwrap_or(pts);
            first - (delay - k) as i64 * self.frame_ticks
        } else {
            self.input_pts.pop_front().unwrap_or(pts)
        }
    }
}

impl EncoderBackend for DeltaEncoder {
    fn encode(&mut self, frame: &Frame) -> Result<Vec<Packet>> {
        let mut frame = frame.clone();
        let pts = frame.pts.unwrap_or(self.next_pts);
        frame.pts = Some(pts);
        self.next_pts = pts + self.frame_ticks;
        self.first_pts.get_or_insert(pts);
        self.input_pts.push_back(pts);

        let pos = (self.frame_index % self.gop_size as u64) as u32;
        self.frame_index += 1;
        let ftype = frame_type(pos, self.gop_size, self.max_b_frames);
        if ftype == FrameType::B {
            self.pending.push(frame);
            return Ok(Vec::new());
        }

        let mut packets = Vec::with_capacity(self.pending.len() + 1);
        packets.push(self.emit(&frame, ftype));
        let pending = std::mem::take(&mut self.pending);
        for b in &pending {
            packets.push(self.emit(b, FrameType::B));
        }
        Ok(packets)
    }

    fn flush(&mut self) -> Result<Vec<Packet>> {
        let mut pending = std::mem::take(&mut self.pending);
        let Some(last) = pending.pop() else {
            return Ok(Vec::new());
        };
        debug!(held = pending.len() + 1, "delta encoder closing open GOP");
        let mut packets = vec![self.emit(&last, FrameType::P)];
        for b in &pending {
            packets.push(self.emit(b, FrameType::B));
        }
        Ok(packets)
    }

    fn reorder_depth(&self) -> u32 {
        self.max_b_frames
    }
}

pub struct DeltaDecoder {
    format: VideoFormat,
    frame_size: usize,
    reference: Option<Vec<u8>>,
}

impl DeltaDecoder {
    pub fn new(params: &CodecParameters) -> Result<Self> {
        let format = stream_geometry("delta", params)?;
        Ok(Self {
            frame_size: format.pixel_format.image_size(format.width, format.height),
            format,
            reference: None,
        })
    }

    pub fn create(params: &CodecParameters) -> Result<Box<dyn DecoderBackend>> {
        Ok(Box::new(Self::new(params)?))
    }
}

impl DecoderBackend for DeltaDecoder {
    fn decode(&mut self, packet: &Packet, pool: &SharedFramePool) -> Result<Vec<Frame>> {
        let Some((&type_byte, body)) = packet.data().split_first() else {
            return Ok(Vec::new());
        };
        let ftype = FrameType::from_u8(type_byte).ok_or_else(|| {
            CodecError::InvalidBitstream(format!("unknown delta frame type {}", type_byte))
        })?;

        let mut corrupt = packet.is_corrupt();
        if body.len() != self.frame_size {
            warn!(
                size = body.len(),
                expected = self.frame_size,
                "delta payload size mismatch"
            );
            corrupt = true;
        }
        let mut image = body.to_vec();
        image.resize(self.frame_size, 0);

        if ftype != FrameType::I {
            match &self.reference {
                Some(reference) => {
                    for (px, r) in image.iter_mut().zip(reference) {
                        *px = px.wrapping_add(*r);
                    }
                }
                None => {
                    debug!(?ftype, pts = ?packet.pts, "missing reference frame");
                    corrupt = true;
                }
            }
        }

        let mut frame = pool.acquire(FrameKind::Video(self.format))?;
        frame.fill_from_packed(&image);
        if ftype.is_anchor() {
            self.reference = Some(image);
        }
        frame.flags = FrameFlags::empty();
        if ftype == FrameType::I {
            frame.flags |= FrameFlags::KEY;
        }
        if corrupt {
            frame.flags |= FrameFlags::CORRUPT;
        }
        frame.pts = packet.pts;
        frame.pkt_dts = packet.dts;
        frame.duration = packet.duration;
        Ok(vec![frame])
    }

    fn flush(&mut self, _pool: &SharedFramePool) -> Result<Vec<Frame>> {
        Ok(Vec::new())
    }

    fn reset(&mut self) {
        self.reference = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaflow_core::{Error, Rational};

    fn config(gop: u32, b: u32) -> EncoderConfig {
        EncoderConfig::video("delta", 4, 4, PixelFormat::Gray8)
            .with_time_base(Rational::new(1, 25))
            .with_gop(gop, b)
    }

    fn frame(pts: i64, fill: u8) -> Frame {
        let mut f = Frame::video(4, 4, PixelFormat::Gray8).allocated().unwrap();
        f.fill_from_packed(&[fill; 16]);
        f.pts = Some(pts);
        f
    }

    #[test]
    fn test_gop_pattern() {
        let types: Vec<FrameType> = (0..12).map(|p| frame_type(p, 12, 2)).collect();
        use FrameType::*;
        assert_eq!(types, vec![I, B, B, P, B, B, P, B, B, P, B, P]);
        assert!((0..5).all(|p| frame_type(p, 5, 0) != B));
    }

    #[test]
    fn test_encoder_emits_decode_order() {
        let mut enc = DeltaEncoder::new(&config(12, 2));
        let mut packets = Vec::new();
        for i in 0..7 {
            packets.extend(enc.encode(&frame(i, i as u8)).unwrap());
        }
        packets.extend(enc.flush().unwrap());
        let pts: Vec<i64> = packets.iter().filter_map(|p| p.pts).collect();
        assert_eq!(pts, vec![0, 3, 1, 2, 6, 4, 5]);
        let dts: Vec<i64> = packets.iter().filter_map(|p| p.dts).collect();
        assert_eq!(dts, vec![-2, -1, 0, 1, 2, 3, 4]);
        assert!(packets.iter().all(|p| p.dts <= p.pts));
        assert!(packets[0].is_key());
        assert!(packets[2].flags.contains(PacketFlags::DISPOSABLE));
    }

    #[test]
    fn test_dts_follows_gapped_input() {
        let mut enc = DeltaEncoder::new(&config(12, 2));
        let mut packets = Vec::new();
        for i in 0..7 {
            packets.extend(enc.encode(&frame(i * 3, i as u8)).unwrap());
        }
        packets.extend(enc.flush().unwrap());
        let pts: Vec<i64> = packets.iter().filter_map(|p| p.pts).collect();
        assert_eq!(pts, vec![0, 9, 3, 6, 18, 12, 15]);
        let dts: Vec<i64> = packets.iter().filter_map(|p| p.dts).collect();
        assert_eq!(dts, vec![-2, -1, 0, 3, 6, 9, 12]);
        assert!(packets.iter().all(|p| p.dts <= p.pts));
        assert!(dts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_flush_closes_pending_b_frames() {
        let mut enc = DeltaEncoder::new(&config(12, 2));
        let mut packets = Vec::new();
        for i in 0..3 {
            packets.extend(enc.encode(&frame(i, 0)).unwrap());
        }
        assert_eq!(packets.len(), 1);
        let tail = enc.flush().unwrap();
        let pts: Vec<i64> = tail.iter().filter_map(|p| p.pts).collect();
        assert_eq!(pts, vec![2, 1]);
        assert_eq!(tail[0].data()[0], FrameType::P as u8);
        assert!(enc.flush().unwrap().is_empty());
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let mut enc = DeltaEncoder::new(&config(4, 1));
        let pool = SharedFramePool::new(4);
        let params = CodecParameters::video(CodecId::Delta, 4, 4, PixelFormat::Gray8);
        let mut dec = DeltaDecoder::new(&params).unwrap();
        let mut decoded = Vec::new();
        for i in 0..8 {
            for packet in enc.encode(&frame(i, (i * 37) as u8)).unwrap() {
                decoded.extend(dec.decode(&packet, &pool).unwrap());
            }
        }
        for packet in enc.flush().unwrap() {
            decoded.extend(dec.decode(&packet, &pool).unwrap());
        }
        assert_eq!(decoded.len(), 8);
        for f in decoded {
            let fill = (f.pts.unwrap() * 37) as u8;
            assert_eq!(f.to_packed_bytes(), vec![fill; 16]);
            assert!(!f.is_corrupt());
        }
    }

    #[test]
    fn test_missing_reference_is_corrupt() {
        let pool = SharedFramePool::new(2);
        let params = CodecParameters::video(CodecId::Delta, 4, 4, PixelFormat::Gray8);
        let mut dec = DeltaDecoder::new(&params).unwrap();
        let mut payload = vec![FrameType::P as u8];
        payload.extend([0u8; 16]);
        let frames = dec.decode(&Packet::new(payload), &pool).unwrap();
        assert!(frames[0].is_corrupt());
        assert!(!frames[0].is_key());
    }

    #[test]
    fn test_unknown_frame_type_is_error() {
        let pool = SharedFramePool::new(2);
        let params = CodecParameters::video(CodecId::Delta, 4, 4, PixelFormat::Gray8);
        let mut dec = DeltaDecoder::new(&params).unwrap();
        let err = dec.decode(&Packet::new(vec![9, 0, 0]), &pool).unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::InvalidBitstream(_))));
    }

    #[test]
    fn test_intra_preset() {
        let mut enc = DeltaEncoder::new(&config(12, 2).with_preset("intra"));
        let packets: Vec<Packet> = (0..3)
            .flat_map(|i| enc.encode(&frame(i, 1)).unwrap())
            .collect();
        assert_eq!(packets.len(), 3);
        assert!(packets.iter().all(|p| p.is_key()));
        assert_eq!(enc.reorder_depth(), 0);
    }
}
