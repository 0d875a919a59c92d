//! Container backend traits and format descriptions.

use std::fmt;
use std::io::Write;

use bitflags::bitflags;
use mediaflow_core::{CodecId, Packet, Result, Stream};

use crate::io::SourceReader;
use crate::options::DemuxerPrivateOptions;

bitflags! {
    /// Format capability flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormatFlags: u32 {
        /// Format does its own I/O; no sink is opened.
        const NOFILE = 0x0001;
        /// Format stores a global header.
        const GLOBALHEADER = 0x0040;
        /// Format does not store timestamps.
        const NOTIMESTAMPS = 0x0080;
        /// Seek index is built by scanning packets when none is stored.
        const GENERIC_INDEX = 0x0100;
        /// Format allows timestamp discontinuities.
        const TS_DISCONT = 0x0200;
        /// Format does not allow seeking by byte.
        const NO_BYTE_SEEK = 0x8000;
    }
}

bitflags! {
    /// Per-demuxer context flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContextFlags: u32 {
        /// Stream parameters come from options, not from a header.
        const NOHEADER = 0x0001;
        /// The source cannot be repositioned.
        const UNSEEKABLE = 0x0002;
    }
}

/// Detects a format from the first bytes of a source.
///
/// Returns a score from 0 (not this format) to 100 (certain).
pub type ProbeFn = fn(&[u8]) -> u32;

/// Creates a demux backend.
pub type DemuxFactory = fn(&DemuxerPrivateOptions) -> Result<Box<dyn DemuxBackend>>;

/// Creates a mux backend.
pub type MuxFactory = fn() -> Box<dyn MuxBackend>;

/// A registered demuxer.
pub struct InputFormatInfo {
    pub name: &'static str,
    pub long_name: &'static str,
    /// Comma-separated file extensions.
    pub extensions: &'static str,
    pub flags: FormatFlags,
    /// Codec of the single stream for headerless formats.
    pub raw_codec_id: Option<CodecId>,
    pub(crate) probe: Option<ProbeFn>,
    pub(crate) create: DemuxFactory,
}

impl fmt::Debug for InputFormatInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputFormatInfo")
            .field("name", &self.name)
            .field("extensions", &self.extensions)
            .field("flags", &self.flags)
            .finish()
    }
}

impl InputFormatInfo {
    pub fn matches_extension(&self, ext: &str) -> bool {
        self.extensions.split(',').any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// A registered muxer.
pub struct OutputFormatInfo {
    pub name: &'static str,
    pub long_name: &'static str,
    pub mime_type: &'static str,
    /// Comma-separated file extensions.
    pub extensions: &'static str,
    /// Default codecs.
    pub video_codec: Option<CodecId>,
    pub audio_codec: Option<CodecId>,
    /// Every codec the format can carry.
    pub codecs: &'static [CodecId],
    pub flags: FormatFlags,
    pub(crate) create: MuxFactory,
}

impl fmt::Debug for OutputFormatInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputFormatInfo")
            .field("name", &self.name)
            .field("extensions", &self.extensions)
            .field("codecs", &self.codecs)
            .field("flags", &self.flags)
            .finish()
    }
}

impl OutputFormatInfo {
    pub fn matches_extension(&self, ext: &str) -> bool {
        self.extensions.split(',').any(|e| e.eq_ignore_ascii_case(ext))
    }

    pub fn accepts(&self, codec: CodecId) -> bool {
        self.codecs.contains(&codec)
    }
}

/// One packet position in a seek index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub stream: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    /// Byte offset of the packet record.
    pub pos: u64,
    pub key: bool,
}

impl IndexEntry {
    pub fn from_packet(packet: &Packet, pos: u64) -> Self {
        Self {
            stream: packet.stream_index,
            pts: packet.pts,
            dts: packet.dts,
            duration: packet.duration,
            pos,
            key: packet.is_key(),
        }
    }

    /// Presentation time, falling back to dts.
    pub fn time(&self) -> Option<i64> {
        self.pts.or(self.dts)
    }
}

/// Container reader for one format.
///
/// All methods run on the blocking pool.
pub trait DemuxBackend: Send {
    /// Parse the header and describe the streams.
    fn read_header(&mut self, io: &mut SourceReader) -> Result<Vec<Stream>>;

    /// Read the next packet in container order; `None` at end of data.
    ///
    /// Packets carry `pos`, the byte offset of their record.
    fn read_packet(&mut self, io: &mut SourceReader) -> Result<Option<Packet>>;

    /// Build the seek index. The read position is restored afterwards.
    fn read_index(&mut self, io: &mut SourceReader) -> Result<Vec<IndexEntry>>;

    /// Continue reading at a record offset taken from the index.
    fn seek_to(&mut self, io: &mut SourceReader, pos: u64) -> Result<()>;

    fn ctx_flags(&self) -> ContextFlags {
        ContextFlags::empty()
    }
}

/// Container writer for one format.
///
/// Backends see packets already validated and interleaved; they only
/// serialise.
pub trait MuxBackend: Send {
    /// Apply a private option. `Ok(false)` means the key is not recognised.
    fn set_option(&mut self, _key: &str, _value: &str) -> Result<bool> {
        Ok(false)
    }

    /// Check that the format can carry `stream`.
    fn check_stream(&self, _stream: &Stream) -> Result<()> {
        Ok(())
    }

    fn write_header(&mut self, io: &mut dyn Write, streams: &[Stream]) -> Result<()>;

    fn write_packet(&mut self, io: &mut dyn Write, packet: &Packet) -> Result<()>;

    fn write_trailer(&mut self, io: &mut dyn Write, streams: &[Stream]) -> Result<()>;
}
