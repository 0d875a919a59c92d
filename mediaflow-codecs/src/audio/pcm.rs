//! Signed 16-bit little-endian PCM.

use mediaflow_core::{
    AudioFormat, ChannelLayout, CodecId, CodecParameters, Error, Frame, FrameFlags, FrameKind,
    MediaType, Packet, PacketFlags, Rational, Result, SampleFormat, SharedFramePool,
};
use tracing::warn;

use crate::config::EncoderConfig;
use crate::traits::{CodecCapabilities, CodecInfo, DecoderBackend, EncoderBackend};

pub static PCM_S16LE_INFO: CodecInfo = CodecInfo {
    name: "pcm_s16le",
    long_name: "PCM signed 16-bit little-endian",
    codec_type: MediaType::Audio,
    id: CodecId::PcmS16le,
    capabilities: CodecCapabilities::INTRA_ONLY.union(CodecCapabilities::LOSSLESS),
    pix_fmts: &[],
    sample_fmts: &[SampleFormat::S16],
    presets: &[],
};

pub struct PcmDecoder {
    sample_rate: u32,
    channel_layout: ChannelLayout,
    block_align: usize,
}

impl PcmDecoder {
    pub fn new(params: &CodecParameters) -> Result<Self> {
        let channel_layout = params.channel_layout.unwrap_or_default();
        if params.sample_rate == 0 || channel_layout.channels() == 0 {
            return Err(Error::invalid_argument(
                "pcm_s16le decoder needs a sample rate and channel count",
            ));
        }
        Ok(Self {
            sample_rate: params.sample_rate,
            block_align: channel_layout.channels() as usize * 2,
            channel_layout,
        })
    }

    pub fn create(params: &CodecParameters) -> Result<Box<dyn DecoderBackend>> {
        Ok(Box::new(Self::new(params)?))
    }
}

impl DecoderBackend for PcmDecoder {
    fn decode(&mut self, packet: &Packet, pool: &SharedFramePool) -> Result<Vec<Frame>> {
        let nb_samples = packet.size() / self.block_align;
        if nb_samples == 0 {
            return Ok(Vec::new());
        }
        let mut frame = pool.acquire(FrameKind::Audio(AudioFormat {
            nb_samples,
            sample_rate: self.sample_rate,
            channel_layout: self.channel_layout,
            sample_format: SampleFormat::S16,
        }))?;
        frame.fill_from_packed(&packet.data()[..nb_samples * self.block_align]);
        frame.flags = FrameFlags::KEY;
        if packet.size() % self.block_align != 0 || packet.is_corrupt() {
            warn!(size = packet.size(), block_align = self.block_align, "partial PCM block");
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

pub struct PcmEncoder {
    sample_rate: u32,
    time_base: Rational,
}

impl PcmEncoder {
    pub fn create(config: &EncoderConfig) -> Result<Box<dyn EncoderBackend>> {
        Ok(Box::new(Self {
            sample_rate: config.sample_rate,
            time_base: config.time_base,
        }))
    }
}

impl EncoderBackend for PcmEncoder {
    fn encode(&mut self, frame: &Frame) -> Result<Vec<Packet>> {
        let nb_samples = frame.audio_format().map(|a| a.nb_samples).unwrap_or(0);
        let duration =
            Rational::new(1, self.sample_rate as i64).rescale(nb_samples as i64, self.time_base);
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

    fn params() -> CodecParameters {
        CodecParameters::audio(CodecId::PcmS16le, 8000, ChannelLayout::Stereo, SampleFormat::S16)
    }

    #[test]
    fn test_decode_sample_count() {
        let pool = SharedFramePool::new(2);
        let mut dec = PcmDecoder::new(&params()).unwrap();
        let frames = dec.decode(&Packet::new(vec![0; 400]), &pool).unwrap();
        assert_eq!(frames[0].audio_format().unwrap().nb_samples, 100);
        assert!(!frames[0].is_corrupt());
    }

    #[test]
    fn test_partial_block_is_corrupt() {
        let pool = SharedFramePool::new(2);
        let mut dec = PcmDecoder::new(&params()).unwrap();
        let frames = dec.decode(&Packet::new(vec![0; 10]), &pool).unwrap();
        assert_eq!(frames[0].audio_format().unwrap().nb_samples, 2);
        assert!(frames[0].is_corrupt());
        assert!(dec.decode(&Packet::new(vec![0; 3]), &pool).unwrap().is_empty());
    }

    #[test]
    fn test_encode_duration_in_time_base() {
        let config = EncoderConfig::audio("pcm_s16le", 8000, ChannelLayout::Stereo, SampleFormat::S16)
            .with_time_base(Rational::new(1, 1000));
        let mut enc = PcmEncoder::create(&config).unwrap();
        let mut frame = Frame::audio(800, 8000, ChannelLayout::Stereo, SampleFormat::S16)
            .allocated()
            .unwrap();
        frame.pts = Some(0);
        let packets = enc.encode(&frame).unwrap();
        assert_eq!(packets[0].duration, 100);
        assert_eq!(packets[0].size(), 3200);
    }
}
