//! Uncompressed video: one packet per frame, rows packed without padding.

use mediaflow_core::{
    CodecId, CodecParameters, Error, Frame, FrameFlags, FrameKind, MediaType, Packet, PacketFlags,
    PixelFormat, Result, SharedFramePool, VideoFormat,
};
use tracing::warn;

use crate::config::EncoderConfig;
use crate::traits::{CodecCapabilities, CodecInfo, DecoderBackend, EncoderBackend};

pub static RAWVIDEO_INFO: CodecInfo = CodecInfo {
    name: "rawvideo",
    long_name: "raw video",
    codec_type: MediaType::Video,
    id: CodecId::RawVideo,
    capabilities: CodecCapabilities::INTRA_ONLY.union(CodecCapabilities::LOSSLESS),
    pix_fmts: PixelFormat::ALL,
    sample_fmts: &[],
    presets: &[],
};

/// Geometry a raw video stream must declare up front.
pub(crate) fn stream_geometry(codec: &str, params: &CodecParameters) -> Result<VideoFormat> {
    params.video_format().ok_or_else(|| {
        Error::invalid_argument(format!(
            "{} decoder needs width, height and pixel format",
            codec
        ))
    })
}

pub struct RawVideoDecoder {
    format: VideoFormat,
    frame_size: usize,
}

impl RawVideoDecoder {
    pub fn new(params: &CodecParameters) -> Result<Self> {
        let format = stream_geometry("rawvideo", params)?;
        Ok(Self {
            frame_size: format.pixel_format.image_size(format.width, format.height),
            format,
        })
    }

    pub fn create(params: &CodecParameters) -> Result<Box<dyn DecoderBackend>> {
        Ok(Box::new(Self::new(params)?))
    }
}

impl DecoderBackend for RawVideoDecoder {
    fn decode(&mut self, packet: &Packet, pool: &SharedFramePool) -> Result<Vec<Frame>> {
        if packet.is_empty() {
            return Ok(Vec::new());
        }
        let mut frame = pool.acquire(FrameKind::Video(self.format))?;
        let copied = frame.fill_from_packed(packet.data());
        frame.flags = FrameFlags::KEY;
        if copied < self.frame_size || packet.is_corrupt() {
            warn!(
                size = packet.size(),
                expected = self.frame_size,
                "short rawvideo packet"
            );
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

    fn reset(&mut self) {}
}

pub struct RawVideoEncoder {
    frame_ticks: i64,
}

impl RawVideoEncoder {
    pub fn create(config: &EncoderConfig) -> Result<Box<dyn EncoderBackend>> {
        Ok(Box::new(Self {
            frame_ticks: config.time_base.ticks_per(config.frame_rate),
        }))
    }
}

impl EncoderBackend for RawVideoEncoder {
    fn encode(&mut self, frame: &Frame) -> Result<Vec<Packet>> {
        let duration = if frame.duration > 0 {
            frame.duration
        } else {
            self.frame_ticks
        };
        let packet = Packet::new(frame.to_packed_bytes())
            .with_timestamps(frame.pts, frame.pts)
            .with_duration(duration)
            .with_flags(PacketFlags::KEY);
        Ok(vec![packet])
    }

    fn flush(&mut self) -> Result<Vec<Packet>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaflow_core::Rational;

    fn params() -> CodecParameters {
        CodecParameters::video(CodecId::RawVideo, 4, 2, PixelFormat::Gray8)
    }

    #[test]
    fn test_decode_one_frame_per_packet() {
        let pool = SharedFramePool::new(2);
        let mut dec = RawVideoDecoder::new(&params()).unwrap();
        let packet = Packet::new((0..8).collect()).with_timestamps(Some(3), Some(3));
        let frames = dec.decode(&packet, &pool).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_key());
        assert!(!frames[0].is_corrupt());
        assert_eq!(frames[0].pts, Some(3));
        assert_eq!(frames[0].to_packed_bytes(), (0..8).collect::<Vec<u8>>());
    }

    #[test]
    fn test_short_packet_is_corrupt() {
        let pool = SharedFramePool::new(2);
        let mut dec = RawVideoDecoder::new(&params()).unwrap();
        let frames = dec.decode(&Packet::new(vec![1, 2, 3]), &pool).unwrap();
        assert!(frames[0].is_corrupt());
    }

    #[test]
    fn test_decoder_requires_geometry() {
        let mut p = params();
        p.pixel_format = None;
        assert!(matches!(
            RawVideoDecoder::new(&p),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_encoder_default_duration() {
        let config = EncoderConfig::video("rawvideo", 4, 2, PixelFormat::Gray8)
            .with_time_base(Rational::new(1, 90000));
        let mut enc = RawVideoEncoder::create(&config).unwrap();
        let mut frame = Frame::video(4, 2, PixelFormat::Gray8).allocated().unwrap();
        frame.pts = Some(0);
        let packets = enc.encode(&frame).unwrap();
        assert_eq!(packets[0].duration, 3600);
        assert!(packets[0].is_key());
        assert_eq!(packets[0].size(), 8);
    }
}
