//! `mpk` muxer.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use mediaflow_core::{Error, Packet, Result, Stream};
use tracing::debug;

use super::{
    write_index_entry, write_stream, PacketHeader, END_MAGIC, END_SYNC, INDEX_SYNC, MAGIC,
    VERSION,
};
use crate::traits::{IndexEntry, MuxBackend};

/// Writes `mpk` files.
///
/// Private options:
/// - `write_index` (bool, default true): store a seek index before the end
///   record.
pub struct MpkMuxer {
    write_index: bool,
    /// Bytes written so far.
    offset: u64,
    index: Vec<IndexEntry>,
}

impl Default for MpkMuxer {
    fn default() -> Self {
        Self {
            write_index: true,
            offset: 0,
            index: Vec::new(),
        }
    }
}

impl MpkMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create() -> Box<dyn MuxBackend> {
        Box::new(Self::new())
    }

    fn emit(&mut self, io: &mut dyn Write, buf: &[u8]) -> Result<()> {
        io.write_all(buf)?;
        self.offset += buf.len() as u64;
        Ok(())
    }
}

/// Parse a boolean option value.
pub(crate) fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::invalid_argument(format!(
            "{} expects a boolean, got '{}'",
            key, other
        ))),
    }
}

impl MuxBackend for MpkMuxer {
    fn set_option(&mut self, key: &str, value: &str) -> Result<bool> {
        match key {
            "write_index" => {
                self.write_index = parse_bool(key, value)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn check_stream(&self, stream: &Stream) -> Result<()> {
        if stream.index > u16::MAX as usize {
            return Err(Error::invalid_argument("mpk holds at most 65536 streams"));
        }
        Ok(())
    }

    fn write_header(&mut self, io: &mut dyn Write, streams: &[Stream]) -> Result<()> {
        let mut buf = Vec::with_capacity(64 * streams.len() + 8);
        buf.extend_from_slice(MAGIC);
        buf.write_u8(VERSION)?;
        buf.write_u8(0)?;
        buf.write_u16::<LittleEndian>(streams.len() as u16)?;
        for stream in streams {
            write_stream(&mut buf, stream)?;
        }
        self.emit(io, &buf)
    }

    fn write_packet(&mut self, io: &mut dyn Write, packet: &Packet) -> Result<()> {
        let size = u32::try_from(packet.size())
            .map_err(|_| Error::invalid_argument(format!("packet of {} bytes", packet.size())))?;
        let header = PacketHeader {
            stream: packet.stream_index,
            flags: packet.flags.bits() as u8,
            pts: packet.pts,
            dts: packet.dts,
            duration: packet.duration,
            size,
        };
        let mut buf = Vec::with_capacity(34);
        header.write(&mut buf)?;
        if self.write_index {
            self.index.push(IndexEntry::from_packet(packet, self.offset));
        }
        self.emit(io, &buf)?;
        self.emit(io, packet.data())
    }

    fn write_trailer(&mut self, io: &mut dyn Write, _streams: &[Stream]) -> Result<()> {
        let mut buf = Vec::new();
        let mut index_offset = 0;
        if self.write_index {
            index_offset = self.offset;
            buf.extend_from_slice(INDEX_SYNC);
            buf.write_u32::<LittleEndian>(self.index.len() as u32)?;
            for entry in &self.index {
                write_index_entry(&mut buf, entry)?;
            }
        }
        buf.extend_from_slice(END_SYNC);
        buf.write_u64::<LittleEndian>(index_offset)?;
        buf.extend_from_slice(END_MAGIC);
        debug!(
            index_entries = self.index.len(),
            bytes = self.offset + buf.len() as u64,
            "mpk trailer written"
        );
        self.emit(io, &buf)
    }
}
