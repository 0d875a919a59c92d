//! `mpk` demuxer.

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use mediaflow_core::{ContainerError, Error, Packet, PacketFlags, Result, Stream};
use tracing::{debug, warn};

use super::{
    read_index_entry, read_stream, PacketHeader, END_MAGIC, END_SIZE, END_SYNC, INDEX_SYNC,
    MAGIC, MAX_PACKET_SIZE, PACKET_SYNC, VERSION,
};
use crate::io::SourceReader;
use crate::options::DemuxerPrivateOptions;
use crate::traits::{DemuxBackend, IndexEntry};

/// Reads `mpk` files.
#[derive(Default)]
pub struct MpkDemuxer {
    nb_streams: usize,
    data_start: u64,
    /// Reached the index or end record.
    done: bool,
}

impl MpkDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(_options: &DemuxerPrivateOptions) -> Result<Box<dyn DemuxBackend>> {
        Ok(Box::new(Self::new()))
    }

    /// Read a record's sync bytes. `None` on clean end of data.
    fn read_sync(io: &mut SourceReader) -> Result<Option<[u8; 2]>> {
        let offset = io.position();
        let mut sync = [0u8; 2];
        let mut filled = 0;
        while filled < 2 {
            match io.read(&mut sync[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(None),
            2 => Ok(Some(sync)),
            _ => Err(ContainerError::Truncated { offset }.into()),
        }
    }

    /// Read the index named by the end record, if there is one.
    fn read_stored_index(&self, io: &mut SourceReader) -> Result<Option<Vec<IndexEntry>>> {
        let Some(len) = io.len() else {
            return Ok(None);
        };
        if len < self.data_start + END_SIZE {
            return Ok(None);
        }
        io.seek(SeekFrom::Start(len - END_SIZE))?;
        let mut sync = [0u8; 2];
        io.read_exact(&mut sync)?;
        let offset = io.read_u64::<LittleEndian>()?;
        let mut magic = [0u8; 4];
        io.read_exact(&mut magic)?;
        if &sync != END_SYNC || &magic != END_MAGIC || offset == 0 {
            return Ok(None);
        }
        if offset < self.data_start || offset >= len {
            return Err(ContainerError::InvalidIndex(format!("index offset {} out of range", offset)).into());
        }

        io.seek(SeekFrom::Start(offset))?;
        io.read_exact(&mut sync)?;
        if &sync != INDEX_SYNC {
            return Err(ContainerError::BadMagic {
                offset,
                expected: "IX",
            }
            .into());
        }
        let count = io.read_u32::<LittleEndian>()? as usize;
        let mut entries = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            let entry = read_index_entry(io)?;
            if entry.stream >= self.nb_streams {
                return Err(ContainerError::InvalidIndex(format!(
                    "index entry for stream {} of {}",
                    entry.stream, self.nb_streams
                ))
                .into());
            }
            entries.push(entry);
        }
        Ok(Some(entries))
    }

    /// Rebuild the index by walking the packet records.
    fn scan_index(&self, io: &mut SourceReader) -> Result<Vec<IndexEntry>> {
        io.seek(SeekFrom::Start(self.data_start))?;
        let mut entries = Vec::new();
        loop {
            let pos = io.position();
            match Self::read_sync(io)? {
                Some(sync) if &sync == PACKET_SYNC => {
                    let header = PacketHeader::read(io).map_err(|e| truncated(e, pos))?;
                    entries.push(IndexEntry {
                        stream: header.stream,
                        pts: header.pts,
                        dts: header.dts,
                        duration: header.duration,
                        pos,
                        key: PacketFlags::from_bits_truncate(header.flags as u32)
                            .contains(PacketFlags::KEY),
                    });
                    io.seek(SeekFrom::Current(header.size as i64))?;
                }
                _ => break,
            }
        }
        Ok(entries)
    }
}

/// Report an unexpected end inside a record as truncation at `offset`.
fn truncated(err: Error, offset: u64) -> Error {
    if err.is_eof() {
        ContainerError::Truncated { offset }.into()
    } else {
        err
    }
}

impl DemuxBackend for MpkDemuxer {
    fn read_header(&mut self, io: &mut SourceReader) -> Result<Vec<Stream>> {
        let mut magic = [0u8; 4];
        io.read_exact(&mut magic).map_err(|e| truncated(e.into(), 0))?;
        if &magic != MAGIC {
            return Err(ContainerError::BadMagic {
                offset: 0,
                expected: "MPK1",
            }
            .into());
        }
        let version = io.read_u8()?;
        if version != VERSION {
            return Err(Error::unsupported(format!("mpk version {}", version)));
        }
        let _reserved = io.read_u8()?;
        let nb_streams = io.read_u16::<LittleEndian>()? as usize;
        let mut streams = Vec::with_capacity(nb_streams);
        for index in 0..nb_streams {
            let offset = io.position();
            streams.push(read_stream(io, index).map_err(|e| truncated(e, offset))?);
        }
        self.nb_streams = nb_streams;
        self.data_start = io.position();
        debug!(streams = nb_streams, data_start = self.data_start, "mpk header read");
        Ok(streams)
    }

    fn read_packet(&mut self, io: &mut SourceReader) -> Result<Option<Packet>> {
        if self.done {
            return Ok(None);
        }
        let pos = io.position();
        let sync = match Self::read_sync(io)? {
            Some(sync) => sync,
            None => {
                warn!(offset = pos, "mpk data ends without an end record");
                self.done = true;
                return Ok(None);
            }
        };
        if &sync == INDEX_SYNC || &sync == END_SYNC {
            self.done = true;
            return Ok(None);
        }
        if &sync != PACKET_SYNC {
            return Err(ContainerError::BadMagic {
                offset: pos,
                expected: "PK",
            }
            .into());
        }

        let header = PacketHeader::read(io).map_err(|e| truncated(e, pos))?;
        if header.stream >= self.nb_streams {
            return Err(ContainerError::StreamNotFound {
                index: header.stream,
            }
            .into());
        }
        if header.size > MAX_PACKET_SIZE {
            return Err(ContainerError::Other(format!(
                "packet size {} at offset {} exceeds maximum",
                header.size, pos
            ))
            .into());
        }
        let mut data = vec![0u8; header.size as usize];
        io.read_exact(&mut data)
            .map_err(|e| truncated(e.into(), pos))?;

        let mut packet = Packet::new(data)
            .with_timestamps(header.pts, header.dts)
            .with_duration(header.duration)
            .with_stream_index(header.stream)
            .with_flags(PacketFlags::from_bits_truncate(header.flags as u32));
        packet.pos = Some(pos);
        Ok(Some(packet))
    }

    fn read_index(&mut self, io: &mut SourceReader) -> Result<Vec<IndexEntry>> {
        let resume = io.position();
        let entries = match self.read_stored_index(io)? {
            Some(entries) => {
                debug!(entries = entries.len(), "mpk index loaded");
                entries
            }
            None => {
                let entries = self.scan_index(io)?;
                debug!(entries = entries.len(), "mpk index rebuilt by scanning");
                entries
            }
        };
        io.seek(SeekFrom::Start(resume))?;
        Ok(entries)
    }

    fn seek_to(&mut self, io: &mut SourceReader, pos: u64) -> Result<()> {
        io.seek(SeekFrom::Start(pos))?;
        self.done = false;
        Ok(())
    }
}
