//! The `mpk` ("media packet") container.
//!
//! All integers are little endian.
//!
//! ```text
//! header   "MPK1" version:u8 reserved:u8 nb_streams:u16 stream*
//! stream   codec_id:u32 media_type:u8 id:u32 time_base:2*i64
//!          width:u32 height:u32 pixel_format:str frame_rate:2*i64
//!          sample_aspect_ratio:2*i64 sample_rate:u32 channel_layout:str
//!          sample_format:str block_align:u32 bits_per_coded_sample:u32
//!          bit_rate:u64 has_b_frames:u32 gop_size:u32 extradata:u32+bytes
//! packet   "PK" stream:u16 flags:u8 present:u8 pts:i64 dts:i64
//!          duration:i64 size:u32 data
//! index    "IX" count:u32 (stream:u16 key:u8 present:u8 pts:i64 dts:i64
//!          duration:i64 pos:u64)*
//! end      "EN" index_offset:u64 "MPKE"
//! ```
//!
//! `str` is a u8 length followed by UTF-8 bytes; empty means unset. The
//! `present` byte has bit 0 set when pts is stored and bit 1 for dts. The
//! index is optional; `index_offset` is 0 without one, and readers rebuild
//! it by scanning the packet records.

mod demuxer;
mod muxer;

pub use demuxer::MpkDemuxer;
pub use muxer::MpkMuxer;

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use mediaflow_core::{
    CodecId, CodecParameters, ContainerError, Error, MediaType, Rational, Result, Stream,
};

use crate::traits::IndexEntry;

pub(crate) const MAGIC: &[u8; 4] = b"MPK1";
pub(crate) const END_MAGIC: &[u8; 4] = b"MPKE";
pub(crate) const VERSION: u8 = 1;
pub(crate) const PACKET_SYNC: &[u8; 2] = b"PK";
pub(crate) const INDEX_SYNC: &[u8; 2] = b"IX";
pub(crate) const END_SYNC: &[u8; 2] = b"EN";
/// Size of the end record.
pub(crate) const END_SIZE: u64 = 14;

/// Largest packet payload accepted when reading.
pub(crate) const MAX_PACKET_SIZE: u32 = 64 * 1024 * 1024;

const PTS_PRESENT: u8 = 0x01;
const DTS_PRESENT: u8 = 0x02;

/// Score for the probe: certain on magic.
pub(crate) fn probe(data: &[u8]) -> u32 {
    if data.starts_with(MAGIC) {
        100
    } else {
        0
    }
}

fn media_type_code(t: MediaType) -> u8 {
    match t {
        MediaType::Video => 0,
        MediaType::Audio => 1,
        MediaType::Data => 2,
    }
}

fn media_type_from_code(code: u8) -> Result<MediaType> {
    match code {
        0 => Ok(MediaType::Video),
        1 => Ok(MediaType::Audio),
        2 => Ok(MediaType::Data),
        _ => Err(ContainerError::Other(format!("unknown media type code {}", code)).into()),
    }
}

/// Length-prefixed string, cut to at most 255 bytes on a char boundary.
fn write_str<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let mut len = s.len().min(u8::MAX as usize);
    while !s.is_char_boundary(len) {
        len -= 1;
    }
    w.write_u8(len as u8)?;
    w.write_all(&s.as_bytes()[..len])
}

fn read_str<R: Read>(r: &mut R) -> Result<String> {
    let len = r.read_u8()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| ContainerError::Other("invalid UTF-8 in header".into()).into())
}

fn write_rational<W: Write>(w: &mut W, r: Rational) -> io::Result<()> {
    w.write_i64::<LittleEndian>(r.num)?;
    w.write_i64::<LittleEndian>(r.den)
}

fn read_rational<R: Read>(r: &mut R) -> Result<Rational> {
    let num = r.read_i64::<LittleEndian>()?;
    let den = r.read_i64::<LittleEndian>()?;
    if den == 0 {
        return Err(ContainerError::Other(format!("invalid rational {}/{}", num, den)).into());
    }
    Ok(Rational::new(num, den))
}

fn parse_opt<T: std::str::FromStr<Err = Error>>(s: String) -> Result<Option<T>> {
    if s.is_empty() {
        Ok(None)
    } else {
        s.parse().map(Some)
    }
}

pub(crate) fn write_stream<W: Write>(w: &mut W, stream: &Stream) -> io::Result<()> {
    let par = &stream.codecpar;
    w.write_u32::<LittleEndian>(par.codec_id.id())?;
    w.write_u8(media_type_code(par.codec_type))?;
    w.write_u32::<LittleEndian>(stream.id)?;
    write_rational(w, stream.time_base)?;
    w.write_u32::<LittleEndian>(par.width)?;
    w.write_u32::<LittleEndian>(par.height)?;
    write_str(w, par.pixel_format.map(|f| f.name()).unwrap_or(""))?;
    write_rational(w, par.frame_rate)?;
    write_rational(w, par.sample_aspect_ratio)?;
    w.write_u32::<LittleEndian>(par.sample_rate)?;
    write_str(
        w,
        &par.channel_layout.map(|l| l.to_string()).unwrap_or_default(),
    )?;
    write_str(w, par.sample_format.map(|f| f.name()).unwrap_or(""))?;
    w.write_u32::<LittleEndian>(par.block_align)?;
    w.write_u32::<LittleEndian>(par.bits_per_coded_sample)?;
    w.write_u64::<LittleEndian>(par.bit_rate)?;
    w.write_u32::<LittleEndian>(par.has_b_frames)?;
    w.write_u32::<LittleEndian>(par.gop_size)?;
    w.write_u32::<LittleEndian>(par.extradata.len() as u32)?;
    w.write_all(&par.extradata)
}

pub(crate) fn read_stream<R: Read>(r: &mut R, index: usize) -> Result<Stream> {
    let codec = r.read_u32::<LittleEndian>()?;
    let codec_id = CodecId::from_id(codec)
        .ok_or_else(|| Error::unsupported(format!("stream {} has unknown codec id {}", index, codec)))?;
    let codec_type = media_type_from_code(r.read_u8()?)?;
    let id = r.read_u32::<LittleEndian>()?;
    let time_base = read_rational(r)?;
    if !time_base.is_positive() {
        return Err(ContainerError::Other(format!(
            "stream {} has invalid time base {}",
            index, time_base
        ))
        .into());
    }
    let width = r.read_u32::<LittleEndian>()?;
    let height = r.read_u32::<LittleEndian>()?;
    let pixel_format = parse_opt(read_str(r)?)?;
    let frame_rate = read_rational(r)?;
    let sample_aspect_ratio = read_rational(r)?;
    let sample_rate = r.read_u32::<LittleEndian>()?;
    let channel_layout = parse_opt(read_str(r)?)?;
    let sample_format = parse_opt(read_str(r)?)?;
    let block_align = r.read_u32::<LittleEndian>()?;
    let bits_per_coded_sample = r.read_u32::<LittleEndian>()?;
    let bit_rate = r.read_u64::<LittleEndian>()?;
    let has_b_frames = r.read_u32::<LittleEndian>()?;
    let gop_size = r.read_u32::<LittleEndian>()?;
    let extradata_len = r.read_u32::<LittleEndian>()?;
    if extradata_len > MAX_PACKET_SIZE {
        return Err(ContainerError::Other(format!(
            "extradata size {} exceeds maximum",
            extradata_len
        ))
        .into());
    }
    let mut extradata = vec![0u8; extradata_len as usize];
    r.read_exact(&mut extradata)?;

    let codecpar = CodecParameters {
        codec_type,
        codec_id,
        width,
        height,
        pixel_format,
        sample_aspect_ratio,
        frame_rate,
        sample_rate,
        channel_layout,
        sample_format,
        block_align,
        bits_per_coded_sample,
        bit_rate,
        has_b_frames,
        gop_size,
        extradata,
    };
    let mut stream = Stream::new(index, time_base, codecpar);
    stream.id = id;
    Ok(stream)
}

fn presence(pts: Option<i64>, dts: Option<i64>) -> u8 {
    let mut present = 0;
    if pts.is_some() {
        present |= PTS_PRESENT;
    }
    if dts.is_some() {
        present |= DTS_PRESENT;
    }
    present
}

fn from_presence(present: u8, pts: i64, dts: i64) -> (Option<i64>, Option<i64>) {
    (
        (present & PTS_PRESENT != 0).then_some(pts),
        (present & DTS_PRESENT != 0).then_some(dts),
    )
}

pub(crate) fn write_index_entry<W: Write>(w: &mut W, entry: &IndexEntry) -> io::Result<()> {
    w.write_u16::<LittleEndian>(entry.stream as u16)?;
    w.write_u8(entry.key as u8)?;
    w.write_u8(presence(entry.pts, entry.dts))?;
    w.write_i64::<LittleEndian>(entry.pts.unwrap_or(0))?;
    w.write_i64::<LittleEndian>(entry.dts.unwrap_or(0))?;
    w.write_i64::<LittleEndian>(entry.duration)?;
    w.write_u64::<LittleEndian>(entry.pos)
}

pub(crate) fn read_index_entry<R: Read>(r: &mut R) -> Result<IndexEntry> {
    let stream = r.read_u16::<LittleEndian>()? as usize;
    let key = r.read_u8()? != 0;
    let present = r.read_u8()?;
    let pts = r.read_i64::<LittleEndian>()?;
    let dts = r.read_i64::<LittleEndian>()?;
    let duration = r.read_i64::<LittleEndian>()?;
    let pos = r.read_u64::<LittleEndian>()?;
    let (pts, dts) = from_presence(present, pts, dts);
    Ok(IndexEntry {
        stream,
        pts,
        dts,
        duration,
        pos,
        key,
    })
}

/// Fixed part of a packet record after the sync bytes.
pub(crate) struct PacketHeader {
    pub stream: usize,
    pub flags: u8,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub size: u32,
}

impl PacketHeader {
    pub(crate) fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(PACKET_SYNC)?;
        w.write_u16::<LittleEndian>(self.stream as u16)?;
        w.write_u8(self.flags)?;
        w.write_u8(presence(self.pts, self.dts))?;
        w.write_i64::<LittleEndian>(self.pts.unwrap_or(0))?;
        w.write_i64::<LittleEndian>(self.dts.unwrap_or(0))?;
        w.write_i64::<LittleEndian>(self.duration)?;
        w.write_u32::<LittleEndian>(self.size)
    }

    /// Read the fields following `PK`.
    pub(crate) fn read<R: Read>(r: &mut R) -> Result<Self> {
        let stream = r.read_u16::<LittleEndian>()? as usize;
        let flags = r.read_u8()?;
        let present = r.read_u8()?;
        let pts = r.read_i64::<LittleEndian>()?;
        let dts = r.read_i64::<LittleEndian>()?;
        let duration = r.read_i64::<LittleEndian>()?;
        let size = r.read_u32::<LittleEndian>()?;
        let (pts, dts) = from_presence(present, pts, dts);
        Ok(Self {
            stream,
            flags,
            pts,
            dts,
            duration,
            size,
        })
    }
}
