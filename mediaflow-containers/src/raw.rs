//! Headerless raw formats: `rawvideo` and `s16le`.
//!
//! These carry a single stream whose parameters come from demuxer options.
//! Packet timing is derived from byte offsets, so the seek index is computed
//! rather than read.

use std::io::{self, Read, Seek, SeekFrom, Write};

use mediaflow_core::{
    ChannelLayout, CodecId, CodecParameters, Error, Packet, PacketFlags, Rational, Result,
    SampleFormat, Stream,
};
use tracing::{debug, warn};

use crate::io::SourceReader;
use crate::options::DemuxerPrivateOptions;
use crate::traits::{ContextFlags, DemuxBackend, IndexEntry, MuxBackend};

const DEFAULT_FRAMERATE: Rational = Rational { num: 25, den: 1 };
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_PACKET_SIZE: usize = 4096;

/// Read until `buf` is full or the source ends. Returns the bytes read.
fn read_up_to(io: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match io.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Fixed-size chunking shared by both raw demuxers.
struct Chunker {
    chunk_size: usize,
    /// Timestamp units per full chunk.
    ticks_per_chunk: i64,
    /// Bytes per timestamp unit.
    unit: usize,
}

impl Chunker {
    fn read(&self, io: &mut SourceReader) -> Result<Option<Packet>> {
        let pos = io.position();
        let mut data = vec![0u8; self.chunk_size];
        let n = read_up_to(io, &mut data)?;
        if n == 0 {
            return Ok(None);
        }
        let mut flags = PacketFlags::KEY;
        let duration = if n < self.chunk_size {
            data.truncate(n);
            if n % self.unit != 0 {
                warn!(offset = pos, size = n, "partial raw packet at end of data");
                flags |= PacketFlags::CORRUPT;
            }
            (n / self.unit) as i64
        } else {
            self.ticks_per_chunk
        };
        let ts = self.ts_at(pos);
        let mut packet = Packet::new(data)
            .with_timestamps(Some(ts), Some(ts))
            .with_duration(duration)
            .with_flags(flags);
        packet.pos = Some(pos);
        Ok(Some(packet))
    }

    fn ts_at(&self, pos: u64) -> i64 {
        (pos / self.unit as u64) as i64
    }

    fn index(&self, len: u64) -> Vec<IndexEntry> {
        let step = self.chunk_size as u64;
        (0..len.div_ceil(step))
            .map(|i| {
                let pos = i * step;
                let remaining = (len - pos).min(step) as usize;
                let ts = self.ts_at(pos);
                IndexEntry {
                    stream: 0,
                    pts: Some(ts),
                    dts: Some(ts),
                    duration: if remaining == self.chunk_size {
                        self.ticks_per_chunk
                    } else {
                        (remaining / self.unit) as i64
                    },
                    pos,
                    key: true,
                }
            })
            .collect()
    }
}

/// Raw planar or packed pictures, one per packet.
///
/// Requires `video_size` and `pixel_format`; `framerate` defaults to 25.
pub struct RawVideoDemuxer {
    params: CodecParameters,
    time_base: Rational,
    chunker: Chunker,
}

impl RawVideoDemuxer {
    pub fn new(options: &DemuxerPrivateOptions) -> Result<Self> {
        let (width, height) = options
            .video_size
            .ok_or_else(|| Error::invalid_argument("rawvideo demuxer needs video_size"))?;
        let pixel_format = options
            .pixel_format
            .ok_or_else(|| Error::invalid_argument("rawvideo demuxer needs pixel_format"))?;
        let framerate = options.framerate.unwrap_or(DEFAULT_FRAMERATE);
        let time_base = framerate
            .invert()
            .ok_or_else(|| Error::invalid_argument("framerate must be positive"))?;

        let mut params = CodecParameters::video(CodecId::RawVideo, width, height, pixel_format);
        params.frame_rate = framerate;
        let image_size = pixel_format.image_size(width, height);
        params.bit_rate = (image_size as f64 * 8.0 * framerate.to_f64()) as u64;
        Ok(Self {
            params,
            time_base,
            chunker: Chunker {
                chunk_size: image_size,
                ticks_per_chunk: 1,
                unit: image_size,
            },
        })
    }

    pub fn create(options: &DemuxerPrivateOptions) -> Result<Box<dyn DemuxBackend>> {
        Ok(Box::new(Self::new(options)?))
    }
}

impl DemuxBackend for RawVideoDemuxer {
    fn read_header(&mut self, _io: &mut SourceReader) -> Result<Vec<Stream>> {
        debug!(
            width = self.params.width,
            height = self.params.height,
            frame_size = self.chunker.chunk_size,
            "rawvideo stream configured"
        );
        Ok(vec![Stream::new(0, self.time_base, self.params.clone())])
    }

    fn read_packet(&mut self, io: &mut SourceReader) -> Result<Option<Packet>> {
        self.chunker.read(io)
    }

    fn read_index(&mut self, io: &mut SourceReader) -> Result<Vec<IndexEntry>> {
        Ok(self.chunker.index(io.len().unwrap_or(0)))
    }

    fn seek_to(&mut self, io: &mut SourceReader, pos: u64) -> Result<()> {
        io.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn ctx_flags(&self) -> ContextFlags {
        ContextFlags::NOHEADER
    }
}

/// Signed 16-bit little-endian PCM.
///
/// `sample_rate` defaults to 44100 and `channels` to 1. `packetsize` is
/// rounded down to whole sample frames.
pub struct PcmS16leDemuxer {
    params: CodecParameters,
    chunker: Chunker,
}

impl PcmS16leDemuxer {
    pub fn new(options: &DemuxerPrivateOptions) -> Result<Self> {
        let sample_rate = options.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        let layout = ChannelLayout::from_channels(options.channels.unwrap_or(1));
        let mut params =
            CodecParameters::audio(CodecId::PcmS16le, sample_rate, layout, SampleFormat::S16);
        params.bit_rate = sample_rate as u64 * params.block_align as u64 * 8;

        let block_align = params.block_align as usize;
        let packet_size = options.packetsize.unwrap_or(DEFAULT_PACKET_SIZE);
        let chunk_size = (packet_size / block_align).max(1) * block_align;
        Ok(Self {
            params,
            chunker: Chunker {
                chunk_size,
                ticks_per_chunk: (chunk_size / block_align) as i64,
                unit: block_align,
            },
        })
    }

    pub fn create(options: &DemuxerPrivateOptions) -> Result<Box<dyn DemuxBackend>> {
        Ok(Box::new(Self::new(options)?))
    }
}

impl DemuxBackend for PcmS16leDemuxer {
    fn read_header(&mut self, _io: &mut SourceReader) -> Result<Vec<Stream>> {
        let time_base = Rational::new(1, self.params.sample_rate as i64);
        Ok(vec![Stream::new(0, time_base, self.params.clone())])
    }

    fn read_packet(&mut self, io: &mut SourceReader) -> Result<Option<Packet>> {
        self.chunker.read(io)
    }

    fn read_index(&mut self, io: &mut SourceReader) -> Result<Vec<IndexEntry>> {
        Ok(self.chunker.index(io.len().unwrap_or(0)))
    }

    fn seek_to(&mut self, io: &mut SourceReader, pos: u64) -> Result<()> {
        io.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn ctx_flags(&self) -> ContextFlags {
        ContextFlags::NOHEADER
    }
}

/// Writes packet payloads back to back.
pub struct RawMuxer {
    codec_id: CodecId,
}

impl RawMuxer {
    pub fn rawvideo() -> Box<dyn MuxBackend> {
        Box::new(Self {
            codec_id: CodecId::RawVideo,
        })
    }

    pub fn pcm_s16le() -> Box<dyn MuxBackend> {
        Box::new(Self {
            codec_id: CodecId::PcmS16le,
        })
    }
}

impl MuxBackend for RawMuxer {
    fn check_stream(&self, stream: &Stream) -> Result<()> {
        if stream.index > 0 {
            return Err(Error::invalid_argument(format!(
                "{} output holds a single stream",
                self.codec_id
            )));
        }
        if stream.codecpar.codec_id != self.codec_id {
            return Err(Error::unsupported(format!(
                "{} output cannot carry {}",
                self.codec_id, stream.codecpar.codec_id
            )));
        }
        if self.codec_id == CodecId::PcmS16le
            && stream.codecpar.sample_format != Some(SampleFormat::S16)
        {
            return Err(Error::invalid_argument("s16le output needs s16 samples"));
        }
        Ok(())
    }

    fn write_header(&mut self, _io: &mut dyn Write, _streams: &[Stream]) -> Result<()> {
        Ok(())
    }

    fn write_packet(&mut self, io: &mut dyn Write, packet: &Packet) -> Result<()> {
        io.write_all(packet.data())?;
        Ok(())
    }

    fn write_trailer(&mut self, _io: &mut dyn Write, _streams: &[Stream]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{open_source, MediaSource};
    use mediaflow_core::PixelFormat;

    fn gray_options() -> DemuxerPrivateOptions {
        DemuxerPrivateOptions {
            video_size: Some((4, 2)),
            pixel_format: Some(PixelFormat::Gray8),
            ..Default::default()
        }
    }

    #[test]
    fn test_rawvideo_requires_geometry() {
        let err = RawVideoDemuxer::new(&DemuxerPrivateOptions::default()).err().unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_rawvideo_packets() {
        let mut demux = RawVideoDemuxer::new(&gray_options()).unwrap();
        let mut io = open_source(MediaSource::memory((0u8..20).collect::<Vec<_>>())).unwrap();
        let streams = demux.read_header(&mut io).unwrap();
        assert_eq!(streams[0].time_base, Rational::new(1, 25));

        let mut sizes = Vec::new();
        while let Some(packet) = demux.read_packet(&mut io).unwrap() {
            sizes.push((packet.pts, packet.size(), packet.is_corrupt()));
        }
        assert_eq!(
            sizes,
            vec![
                (Some(0), 8, false),
                (Some(1), 8, false),
                (Some(2), 4, true)
            ]
        );
    }

    #[test]
    fn test_rawvideo_index() {
        let mut demux = RawVideoDemuxer::new(&gray_options()).unwrap();
        let mut io = open_source(MediaSource::memory(vec![0u8; 24])).unwrap();
        let index = demux.read_index(&mut io).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index[2].pos, 16);
        assert_eq!(index[2].pts, Some(2));
        assert!(index.iter().all(|e| e.key));
    }

    #[test]
    fn test_s16le_packet_size_rounding() {
        let options = DemuxerPrivateOptions {
            sample_rate: Some(8000),
            channels: Some(2),
            packetsize: Some(10),
            ..Default::default()
        };
        let mut demux = PcmS16leDemuxer::new(&options).unwrap();
        let mut io = open_source(MediaSource::memory(vec![0u8; 20])).unwrap();
        demux.read_header(&mut io).unwrap();

        let first = demux.read_packet(&mut io).unwrap().unwrap();
        assert_eq!(first.size(), 8);
        assert_eq!(first.duration, 2);
        let second = demux.read_packet(&mut io).unwrap().unwrap();
        assert_eq!(second.pts, Some(2));
        let last = demux.read_packet(&mut io).unwrap().unwrap();
        assert_eq!((last.pts, last.duration, last.size()), (Some(4), 1, 4));
        assert!(demux.read_packet(&mut io).unwrap().is_none());
    }

    #[test]
    fn test_raw_muxer_rejects_other_codecs() {
        let mux = RawMuxer::rawvideo();
        let params = CodecParameters::video(CodecId::Delta, 4, 4, PixelFormat::Gray8);
        assert!(mux.check_stream(&Stream::new(0, Rational::new(1, 25), params)).is_err());
    }
}
