//! Decoder stage.

use std::time::{Duration, Instant};

use mediaflow_core::{
    Batch, CodecParameters, Error, Frame, Offload, Packet, Rational, ReorderQueue, Result,
    SharedFramePool, StageState, Stream,
};
use tracing::{debug, info, trace};

use crate::config::DecoderConfig;
use crate::registry::{find_codec_by_id, resolve, CodecEntry};
use crate::traits::{CodecInfo, DecoderBackend};

/// Frames kept in the decoder's buffer pool.
const POOL_SIZE: usize = 16;

/// Output of one decode or flush call.
#[derive(Debug)]
pub struct DecodeResult {
    /// Frames in presentation order.
    pub frames: Vec<Frame>,
    /// Wall-clock time spent in the call.
    pub total_time: Duration,
}

struct DecoderCore {
    backend: Box<dyn DecoderBackend>,
    reorder: ReorderQueue<Frame>,
    pool: SharedFramePool,
    time_base: Rational,
    next_guess: Option<i64>,
    /// Frames released by a batch that then failed, returned by the next call.
    carried: Vec<Frame>,
}

impl DecoderCore {
    fn decode(&mut self, packets: Vec<Packet>) -> Result<Vec<Frame>> {
        let mut out = std::mem::take(&mut self.carried);
        for mut packet in packets {
            if self.time_base.is_zero() {
                self.time_base = packet.time_base;
            }
            if !self.time_base.is_zero() {
                packet.rescale_ts(self.time_base);
            }
            let frames = match self.backend.decode(&packet, &self.pool) {
                Ok(frames) => frames,
                Err(e) => {
                    self.carried = out;
                    return Err(e);
                }
            };
            for frame in frames {
                let frame = self.stamp(frame);
                out.extend(self.reorder.push(frame));
            }
        }
        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<Frame>> {
        for frame in self.backend.flush(&self.pool)? {
            let frame = self.stamp(frame);
            self.reorder.push(frame);
        }
        let mut out = std::mem::take(&mut self.carried);
        out.extend(self.reorder.drain());
        Ok(out)
    }

    fn reset(&mut self) {
        self.backend.reset();
        self.reorder.clear();
        self.carried.clear();
        self.next_guess = None;
    }

    fn stamp(&mut self, mut frame: Frame) -> Frame {
        frame.time_base = self.time_base;
        let best = frame.pts.or(frame.pkt_dts).or(self.next_guess);
        frame.best_effort_timestamp = best;
        self.next_guess = best.map(|t| t + frame.duration.max(1));
        frame
    }
}

/// Turns packets of one stream into frames in presentation order.
///
/// `decode` and `flush` run the codec on the blocking pool. Taking
/// `&mut self` means at most one call is in flight.
pub struct Decoder {
    info: &'static CodecInfo,
    params: CodecParameters,
    bound_stream: Option<usize>,
    state: StageState,
    core: Offload<DecoderCore>,
    pool: SharedFramePool,
    frames_out: u64,
}

impl Decoder {
    /// Create a decoder by codec name or id.
    pub fn new(config: DecoderConfig) -> Result<Self> {
        let entry = resolve(&config.codec)?;
        let params = config.to_parameters(entry.info);
        Self::build(entry, params, config.time_base, None)
    }

    /// Create a decoder bound to a demuxer stream, copying its parameters.
    ///
    /// Packets from any other stream are rejected.
    pub fn from_stream(stream: &Stream) -> Result<Self> {
        let entry = find_codec_by_id(stream.codecpar.codec_id).ok_or_else(|| {
            Error::unsupported(format!(
                "no decoder for {} (stream {})",
                stream.codecpar.codec_id, stream.index
            ))
        })?;
        Self::build(
            entry,
            stream.codecpar.clone(),
            stream.time_base,
            Some(stream.index),
        )
    }

    fn build(
        entry: &'static CodecEntry,
        params: CodecParameters,
        time_base: Rational,
        bound_stream: Option<usize>,
    ) -> Result<Self> {
        let factory = entry.decoder.ok_or_else(|| {
            Error::unsupported(format!("{} has no decoder", entry.info.name))
        })?;
        let backend = factory(&params)?;
        let pool = SharedFramePool::new(POOL_SIZE);
        info!(
            codec = entry.info.name,
            reorder_depth = params.has_b_frames,
            stream = ?bound_stream,
            "decoder created"
        );
        Ok(Self {
            info: entry.info,
            core: Offload::new(
                "decoder",
                DecoderCore {
                    backend,
                    reorder: ReorderQueue::new(params.has_b_frames as usize),
                    pool: pool.clone(),
                    time_base,
                    next_guess: None,
                    carried: Vec::new(),
                },
            ),
            params,
            bound_stream,
            state: StageState::Ready,
            pool,
            frames_out: 0,
        })
    }

    /// Decode one packet or a batch.
    ///
    /// Returns the frames that became ready, possibly none: frames are held
    /// until the reorder depth guarantees presentation order. If a packet in
    /// the batch fails to decode, frames already released by earlier packets
    /// are kept and returned by the next `decode` or `flush`.
    pub async fn decode(&mut self, packets: impl Into<Batch<Packet>>) -> Result<DecodeResult> {
        self.state.check_accepting("decoder", "decode")?;
        let packets = packets.into().into_inner();
        if let Some(bound) = self.bound_stream {
            if let Some(p) = packets.iter().find(|p| p.stream_index != bound) {
                return Err(Error::invalid_argument(format!(
                    "decoder bound to stream {} got a packet for stream {}",
                    bound, p.stream_index
                )));
            }
        }
        let start = Instant::now();
        let count = packets.len();
        self.state = StageState::Active;
        let frames = self.core.run(move |core| core.decode(packets)).await?;
        self.frames_out += frames.len() as u64;
        trace!(packets = count, frames = frames.len(), "decoded");
        Ok(DecodeResult {
            frames,
            total_time: start.elapsed(),
        })
    }

    /// Drain every held frame. The decoder is terminal afterwards.
    pub async fn flush(&mut self) -> Result<DecodeResult> {
        self.state.check_accepting("decoder", "flush")?;
        let start = Instant::now();
        self.state = StageState::Draining;
        let result = self.core.run(|core| core.flush()).await;
        if !self.core.is_poisoned() {
            self.state = StageState::Terminal;
        }
        let frames = result?;
        self.frames_out += frames.len() as u64;
        debug!(
            codec = self.info.name,
            drained = frames.len(),
            total = self.frames_out,
            "decoder flushed"
        );
        Ok(DecodeResult {
            frames,
            total_time: start.elapsed(),
        })
    }

    /// Discard buffered frames and reference state, e.g. after a seek.
    pub fn reset(&mut self) -> Result<()> {
        self.state.check_accepting("decoder", "reset")?;
        self.core.get_mut()?.reset();
        self.state = StageState::Ready;
        debug!(codec = self.info.name, "decoder reset");
        Ok(())
    }

    /// Hand a consumed frame's buffers back for reuse.
    pub fn recycle(&self, frame: Frame) {
        self.pool.release(frame);
    }

    pub fn codec_info(&self) -> &'static CodecInfo {
        self.info
    }

    pub fn name(&self) -> &'static str {
        self.info.name
    }

    pub fn parameters(&self) -> &CodecParameters {
        &self.params
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    /// Time base of output frames; zero until the first packet if unset.
    pub fn time_base(&self) -> Rational {
        self.core
            .get()
            .map(|c| c.time_base)
            .unwrap_or_else(|_| Rational::zero())
    }

    /// Frames currently held for reordering.
    pub fn buffered(&self) -> usize {
        self.core.get().map(|c| c.reorder.len()).unwrap_or(0)
    }

    /// Frames returned so far.
    pub fn frames_out(&self) -> u64 {
        self.frames_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaflow_core::{CodecId, PixelFormat};

    fn raw_decoder() -> Decoder {
        Decoder::new(
            DecoderConfig::by_name("rawvideo")
                .with_video(2, 2, PixelFormat::Gray8)
                .with_time_base(Rational::new(1, 25)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_decode_batch_and_single() {
        let mut dec = raw_decoder();
        let one = dec
            .decode(Packet::new(vec![1; 4]).with_timestamps(Some(0), Some(0)))
            .await
            .unwrap();
        assert_eq!(one.frames.len(), 1);
        let batch = vec![
            Packet::new(vec![2; 4]).with_timestamps(Some(1), Some(1)),
            Packet::new(vec![3; 4]).with_timestamps(Some(2), Some(2)),
        ];
        let two = dec.decode(batch).await.unwrap();
        assert_eq!(two.frames.len(), 2);
        assert_eq!(two.frames[1].time_base, Rational::new(1, 25));
        assert_eq!(dec.state(), StageState::Active);
    }

    #[tokio::test]
    async fn test_flush_is_terminal() {
        let mut dec = raw_decoder();
        dec.flush().await.unwrap();
        assert!(dec.state().is_terminal());
        let err = dec.flush().await.unwrap_err();
        assert!(err.is_sequence_violation());
        let err = dec.decode(Packet::new(vec![0; 4])).await.unwrap_err();
        assert!(err.is_sequence_violation());
        assert!(dec.reset().unwrap_err().is_sequence_violation());
    }

    #[tokio::test]
    async fn test_bound_stream_rejects_other_packets() {
        let params = CodecParameters::video(CodecId::RawVideo, 2, 2, PixelFormat::Gray8);
        let stream = Stream::new(1, Rational::new(1, 25), params);
        let mut dec = Decoder::from_stream(&stream).unwrap();
        let err = dec
            .decode(Packet::new(vec![0; 4]).with_stream_index(0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let ok = dec
            .decode(Packet::new(vec![0; 4]).with_stream_index(1))
            .await
            .unwrap();
        assert_eq!(ok.frames.len(), 1);
    }

    #[tokio::test]
    async fn test_packets_rescaled_into_stream_time_base() {
        let mut dec = raw_decoder();
        let packet = Packet::new(vec![0; 4])
            .with_time_base(Rational::new(1, 1000))
            .with_timestamps(Some(80), Some(80));
        let out = dec.decode(packet).await.unwrap();
        assert_eq!(out.frames[0].pts, Some(2));
    }

    #[tokio::test]
    async fn test_best_effort_timestamp_extrapolates() {
        let mut dec = raw_decoder();
        let first = Packet::new(vec![0; 4]).with_timestamps(Some(5), None).with_duration(1);
        let second = Packet::new(vec![0; 4]).with_duration(1);
        let out = dec.decode(vec![first, second]).await.unwrap();
        assert_eq!(out.frames[0].best_effort_timestamp, Some(5));
        assert_eq!(out.frames[1].pts, None);
        assert_eq!(out.frames[1].best_effort_timestamp, Some(6));
    }

    #[test]
    fn test_unknown_codec() {
        let err = Decoder::new(DecoderConfig::by_name("h264")).err().unwrap();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_recycle_reuses_buffers() {
        let mut dec = raw_decoder();
        let out = dec.decode(Packet::new(vec![1; 4])).await.unwrap();
        for frame in out.frames {
            dec.recycle(frame);
        }
        assert_eq!(dec.pool.available(), 1);
        dec.decode(Packet::new(vec![1; 4])).await.unwrap();
        assert_eq!(dec.pool.total_allocated(), 1);
    }

    #[tokio::test]
    async fn test_frames_before_failed_packet_are_kept() {
        let mut dec = Decoder::new(
            DecoderConfig::by_name("delta")
                .with_video(2, 2, PixelFormat::Gray8)
                .with_reorder_depth(0)
                .with_time_base(Rational::new(1, 25)),
        )
        .unwrap();
        let good = Packet::new(vec![0, 7, 7, 7, 7]).with_timestamps(Some(0), Some(0));
        let bad = Packet::new(vec![9, 0, 0, 0, 0]).with_timestamps(Some(1), Some(1));
        let err = dec.decode(vec![good, bad]).await.unwrap_err();
        assert!(matches!(err, Error::Codec(_)));

        let next = Packet::new(vec![0, 8, 8, 8, 8]).with_timestamps(Some(2), Some(2));
        let out = dec.decode(next).await.unwrap();
        let pts: Vec<_> = out.frames.iter().map(|f| f.pts).collect();
        assert_eq!(pts, vec![Some(0), Some(2)]);
        assert_eq!(out.frames[0].to_packed_bytes(), vec![7; 4]);
        assert_eq!(dec.frames_out(), 2);
    }
}
