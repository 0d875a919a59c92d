//! Demuxer stage.

use std::io;

use mediaflow_core::{ContainerError, Error, MediaType, Offload, Packet, Result, Stream, Timestamp};
use tracing::{debug, info, trace};

use crate::io::{open_source, SourceReader};
use crate::options::{DemuxerOptions, DemuxerPrivateOptions, SeekOptions, SeekTarget};
use crate::registry::{find_demuxer, probe, PROBE_SIZE};
use crate::traits::{ContextFlags, DemuxBackend, FormatFlags, IndexEntry, InputFormatInfo};

struct DemuxCore {
    backend: Box<dyn DemuxBackend>,
    io: SourceReader,
    /// Seek index; absent for unseekable sources.
    index: Option<Vec<IndexEntry>>,
}

struct Opened {
    iformat: &'static InputFormatInfo,
    streams: Vec<Stream>,
    core: DemuxCore,
}

fn open_blocking(
    options: DemuxerOptions,
    private: DemuxerPrivateOptions,
    iformat: Option<&'static InputFormatInfo>,
) -> Result<Opened> {
    let url = options.source.as_url().map(str::to_string);
    let mut io = open_source(options.source)?;
    let iformat = match iformat {
        Some(format) => format,
        None => {
            let head = io.peek(PROBE_SIZE)?;
            probe(&head, url.as_deref())?
        }
    };
    let mut backend = (iformat.create)(&private)?;
    let mut streams = backend.read_header(&mut io)?;
    let index = if io.is_seekable() {
        let index = backend.read_index(&mut io)?;
        fill_stream_stats(&mut streams, &index);
        Some(index)
    } else {
        None
    };
    Ok(Opened {
        iformat,
        streams,
        core: DemuxCore { backend, io, index },
    })
}

/// Derive per-stream start time, duration and packet count from the index.
fn fill_stream_stats(streams: &mut [Stream], index: &[IndexEntry]) {
    for stream in streams.iter_mut() {
        let mut start: Option<i64> = None;
        let mut end: Option<i64> = None;
        let mut count = 0u64;
        for entry in index.iter().filter(|e| e.stream == stream.index) {
            count += 1;
            if let Some(t) = entry.time() {
                start = Some(start.map_or(t, |s| s.min(t)));
                let stop = t + entry.duration.max(0);
                end = Some(end.map_or(stop, |e| e.max(stop)));
            }
        }
        if stream.nb_frames == 0 {
            stream.nb_frames = count;
        }
        if stream.start_time.is_none() {
            stream.start_time = start;
        }
        if stream.duration.is_none() {
            stream.duration = start.zip(end).map(|(s, e)| e - s);
        }
    }
}

/// Reads packets of every stream from a container.
///
/// Streams are fixed once the demuxer is open. Reads and seeks run on the
/// blocking pool.
pub struct Demuxer {
    iformat: &'static InputFormatInfo,
    streams: Vec<Stream>,
    ctx_flags: ContextFlags,
    url: Option<String>,
    start_time: Option<i64>,
    duration: Option<i64>,
    bit_rate: u64,
    core: Offload<DemuxCore>,
    packets_read: u64,
    eof: bool,
}

impl Demuxer {
    /// Open a container from a URL, memory buffer or push source.
    ///
    /// The format is the named one if given, otherwise probed from the first
    /// bytes and then the URL extension.
    pub async fn open(options: impl Into<DemuxerOptions>) -> Result<Self> {
        let mut options = options.into();
        let private = DemuxerPrivateOptions::parse(&options.options)?;
        let iformat = match options.format.take() {
            Some(name) => Some(
                find_demuxer(&name)
                    .ok_or_else(|| Error::unsupported(format!("unknown demuxer '{}'", name)))?,
            ),
            None => None,
        };
        let url = options.source.as_url().map(str::to_string);

        let opened = tokio::task::spawn_blocking(move || open_blocking(options, private, iformat))
            .await
            .map_err(|e| Error::TaskFailed(format!("demuxer open task join error: {}", e)))??;

        let mut ctx_flags = opened.core.backend.ctx_flags();
        if !opened.core.io.is_seekable() {
            ctx_flags |= ContextFlags::UNSEEKABLE;
        }
        let size = opened.core.io.len();
        let (start_time, duration) = container_span(&opened.streams);
        let bit_rate = match (size, duration) {
            (Some(size), Some(us)) if us > 0 => (size as u128 * 8 * 1_000_000 / us as u128) as u64,
            _ => 0,
        };

        info!(
            format = opened.iformat.name,
            url = url.as_deref().unwrap_or("<memory>"),
            streams = opened.streams.len(),
            duration_us = duration,
            "demuxer opened"
        );
        Ok(Self {
            iformat: opened.iformat,
            streams: opened.streams,
            ctx_flags,
            url,
            start_time,
            duration,
            bit_rate,
            core: Offload::new("demuxer", opened.core),
            packets_read: 0,
            eof: false,
        })
    }

    /// Read the next packet in container order.
    ///
    /// Returns `Ok(None)` at the end of the data, and keeps doing so until
    /// the next seek.
    pub async fn read(&mut self) -> Result<Option<Packet>> {
        if self.eof {
            return Ok(None);
        }
        let packet = self
            .core
            .run(|core| core.backend.read_packet(&mut core.io))
            .await?;
        let Some(mut packet) = packet else {
            self.eof = true;
            debug!(packets = self.packets_read, "demuxer reached end of data");
            return Ok(None);
        };
        let stream = self.streams.get(packet.stream_index).ok_or(
            ContainerError::StreamNotFound {
                index: packet.stream_index,
            },
        )?;
        packet.time_base = stream.time_base;
        self.packets_read += 1;
        trace!(
            stream = packet.stream_index,
            pts = ?packet.pts,
            dts = ?packet.dts,
            size = packet.size(),
            "demuxed packet"
        );
        Ok(Some(packet))
    }

    /// Reposition the demuxer.
    ///
    /// Decoders fed from this demuxer must be reset afterwards.
    pub async fn seek(&mut self, options: SeekOptions) -> Result<()> {
        if self.ctx_flags.contains(ContextFlags::UNSEEKABLE) {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "source is not seekable").into());
        }
        if matches!(options.target, SeekTarget::Pos(_))
            && self.iformat.flags.contains(FormatFlags::NO_BYTE_SEEK)
        {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{} does not support byte seeking", self.iformat.name),
            )
            .into());
        }
        let stream_index = match options.stream_index {
            Some(index) if index < self.streams.len() => index,
            Some(index) => {
                return Err(Error::invalid_argument(format!(
                    "seek on stream {} of {}",
                    index,
                    self.streams.len()
                )))
            }
            None => self
                .primary_stream()
                .ok_or_else(|| Error::invalid_argument("seek on a source without streams"))?,
        };

        let entry = {
            let index = self.core.get()?.index.as_deref().unwrap_or(&[]);
            select_entry(index, &self.streams[stream_index], &options)?
        };
        self.core
            .run(move |core| core.backend.seek_to(&mut core.io, entry.pos))
            .await?;
        self.eof = false;
        debug!(
            stream = stream_index,
            target = ?options.target,
            landed_pts = ?entry.pts,
            pos = entry.pos,
            key = entry.key,
            "demuxer seek"
        );
        Ok(())
    }

    /// First video stream, else stream 0.
    pub fn primary_stream(&self) -> Option<usize> {
        self.streams
            .iter()
            .position(|s| s.media_type() == MediaType::Video)
            .or_else(|| (!self.streams.is_empty()).then_some(0))
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn iformat(&self) -> &'static InputFormatInfo {
        self.iformat
    }

    pub fn ctx_flags(&self) -> ContextFlags {
        self.ctx_flags
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Earliest stream start, in microseconds.
    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    /// Longest stream extent, in microseconds.
    pub fn duration(&self) -> Option<i64> {
        self.duration
    }

    /// Average bits per second over the whole source, 0 if unknown.
    pub fn bit_rate(&self) -> u64 {
        self.bit_rate
    }
}

/// Container start and duration in microseconds.
fn container_span(streams: &[Stream]) -> (Option<i64>, Option<i64>) {
    let start = streams
        .iter()
        .filter_map(|s| s.start_time.map(|t| Timestamp::new(t, s.time_base).to_micros()))
        .min();
    let end = streams
        .iter()
        .filter_map(|s| {
            let start = s.start_time?;
            let duration = s.duration?;
            Some(Timestamp::new(start + duration, s.time_base).to_micros())
        })
        .max();
    (start, start.zip(end).map(|(s, e)| e - s))
}

/// Pick the index entry a seek lands on.
fn select_entry(index: &[IndexEntry], stream: &Stream, options: &SeekOptions) -> Result<IndexEntry> {
    let out_of_range = |what: String| {
        Error::invalid_argument(format!("{} is outside stream {}", what, stream.index))
    };

    let entries: Vec<&IndexEntry> = index.iter().filter(|e| e.stream == stream.index).collect();
    match options.target {
        SeekTarget::Frame(n) => {
            let n = usize::try_from(n).unwrap_or(usize::MAX);
            if n >= entries.len() {
                return Err(out_of_range(format!(
                    "frame {} ({} frames)",
                    n,
                    entries.len()
                )));
            }
            let found = if options.any {
                Some(entries[n])
            } else if options.backward {
                entries[..=n].iter().rev().find(|e| e.key).copied()
            } else {
                entries[n..].iter().find(|e| e.key).copied()
            };
            found
                .copied()
                .ok_or_else(|| out_of_range(format!("keyframe near frame {}", n)))
        }
        SeekTarget::Timestamp(ts) => by_timestamp(&entries, ts, options.backward, options.any)
            .ok_or_else(|| out_of_range(format!("timestamp {}", ts))),
        SeekTarget::Time(seconds) => {
            let ts = Timestamp::from_seconds(seconds, stream.time_base).value
                + stream.start_time.unwrap_or(0);
            by_timestamp(&entries, ts, options.backward, options.any)
                .ok_or_else(|| out_of_range(format!("time {}s", seconds)))
        }
        // Byte targets consider every stream.
        SeekTarget::Pos(bytes) => index
            .iter()
            .filter(|e| options.any || e.key)
            .find(|e| e.pos >= bytes)
            .copied()
            .ok_or_else(|| out_of_range(format!("byte {}", bytes))),
    }
}

/// Nearest eligible entry at-or-before (`backward`) or at-or-after `ts`.
fn by_timestamp(entries: &[&IndexEntry], ts: i64, backward: bool, any: bool) -> Option<IndexEntry> {
    let eligible = entries
        .iter()
        .filter(|e| any || e.key)
        .filter_map(|e| e.time().map(|t| (t, *e)));
    let found = if backward {
        eligible
            .filter(|(t, _)| *t <= ts)
            .fold(None, |best: Option<(i64, &IndexEntry)>, (t, e)| match best {
                Some((bt, _)) if bt >= t => best,
                _ => Some((t, e)),
            })
    } else {
        eligible
            .filter(|(t, _)| *t >= ts)
            .fold(None, |best: Option<(i64, &IndexEntry)>, (t, e)| match best {
                Some((bt, _)) if bt <= t => best,
                _ => Some((t, e)),
            })
    };
    found.map(|(_, e)| *e)
}
