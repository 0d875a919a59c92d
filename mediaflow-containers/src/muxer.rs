//! Muxer stage.

use std::io::{self, Write};

use mediaflow_codecs::{Encoder, EncoderConfig};
use mediaflow_core::{
    CodecId, CodecParameters, Error, Frame, MediaType, Offload, OptionReport, Packet, Rational,
    Result, Stream,
};
use tracing::{debug, info, trace, warn};

use crate::demuxer::Demuxer;
use crate::interleave::{Interleaver, DEFAULT_MAX_INTERLEAVE_DELTA};
use crate::options::{FormatOptions, IoOptions, MuxerOptions, StreamOptions};
use crate::registry::{find_muxer, muxer_for_filename};
use crate::traits::{FormatFlags, MuxBackend, OutputFormatInfo};

/// Where a muxer is in its lifecycle.
///
/// Every method only accepts the states listed in its documentation; the
/// others fail with [`Error::SequenceViolation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MuxerState {
    Created,
    IoOpened,
    HeaderWritten,
    TrailerWritten,
}

/// What [`Muxer::write_frame`] accepts.
#[derive(Debug)]
pub enum MuxInput {
    Packet(Packet),
    Packets(Vec<Packet>),
    /// A raw frame, encoded by the stream's implicit encoder.
    Frame { frame: Frame, stream_index: usize },
}

impl MuxInput {
    pub fn frame(frame: Frame, stream_index: usize) -> Self {
        MuxInput::Frame {
            frame,
            stream_index,
        }
    }
}

impl From<Packet> for MuxInput {
    fn from(packet: Packet) -> Self {
        MuxInput::Packet(packet)
    }
}

impl From<Vec<Packet>> for MuxInput {
    fn from(packets: Vec<Packet>) -> Self {
        MuxInput::Packets(packets)
    }
}

#[derive(Default)]
struct StreamState {
    interleaved: bool,
    last_dts: Option<i64>,
    encoder: Option<Encoder>,
}

struct MuxCore {
    backend: Box<dyn MuxBackend>,
    io: Box<dyn Write + Send>,
}

/// Writes packets of several streams into one output container.
///
/// Calls must follow the order `new_stream`* → `open_io` → `write_header` →
/// `write_frame`* → `write_trailer`. `open_io` is skipped for formats that
/// need no sink.
pub struct Muxer {
    oformat: &'static OutputFormatInfo,
    filename: Option<String>,
    state: MuxerState,
    streams: Vec<Stream>,
    stream_states: Vec<StreamState>,
    interleaver: Option<Interleaver>,
    max_interleave_delta: i64,
    core: Offload<MuxCore>,
    packets_written: u64,
}

impl Muxer {
    /// Create a muxer by format name or by output filename.
    pub fn new(options: MuxerOptions) -> Result<Self> {
        let oformat = match (&options.format_name, &options.filename) {
            (Some(name), _) => find_muxer(name)
                .ok_or_else(|| Error::unsupported(format!("unknown muxer '{}'", name)))?,
            (None, Some(filename)) => muxer_for_filename(filename).ok_or_else(|| {
                Error::unsupported(format!("no muxer for output '{}'", filename))
            })?,
            (None, None) => {
                return Err(Error::invalid_argument(
                    "muxer needs a format name or a filename",
                ))
            }
        };
        let mut muxer = Self::from_format(oformat);
        muxer.filename = options.filename;
        Ok(muxer)
    }

    pub fn from_format(oformat: &'static OutputFormatInfo) -> Self {
        debug!(format = oformat.name, "muxer created");
        Self {
            oformat,
            filename: None,
            state: MuxerState::Created,
            streams: Vec::new(),
            stream_states: Vec::new(),
            interleaver: None,
            max_interleave_delta: DEFAULT_MAX_INTERLEAVE_DELTA,
            core: Offload::new(
                "muxer",
                MuxCore {
                    backend: (oformat.create)(),
                    io: Box::new(io::sink()),
                },
            ),
            packets_written: 0,
        }
    }

    /// Create a muxer with the demuxer's format and one stream per input
    /// stream, for packet copy.
    pub fn for_passthrough(demuxer: &Demuxer) -> Result<Self> {
        let name = demuxer.iformat().name;
        let oformat = find_muxer(name)
            .ok_or_else(|| Error::unsupported(format!("no muxer for input format '{}'", name)))?;
        let mut muxer = Self::from_format(oformat);
        muxer.filename = demuxer.url().map(str::to_string);
        for stream in demuxer.streams() {
            muxer.new_stream(
                StreamOptions::new(stream.codecpar.codec_name(), stream.time_base)
                    .with_codecpar(stream.codecpar.clone()),
            )?;
        }
        Ok(muxer)
    }

    /// Add an output stream and return its index.
    ///
    /// Allowed until the header is written.
    pub fn new_stream(&mut self, options: StreamOptions) -> Result<usize> {
        if self.state >= MuxerState::HeaderWritten {
            return Err(Error::sequence("new_stream called after write_header"));
        }
        let codec_id: CodecId = options.codec_name.parse()?;
        if !self.oformat.accepts(codec_id) {
            return Err(Error::unsupported(format!(
                "{} cannot carry {}",
                self.oformat.name, codec_id
            )));
        }
        let mut codecpar = options.codecpar.unwrap_or_default();
        codecpar.codec_id = codec_id;
        codecpar.codec_type = codec_id.media_type();

        let index = self.streams.len();
        self.streams
            .push(Stream::new(index, options.time_base, codecpar));
        self.stream_states.push(StreamState {
            interleaved: options.interleaved,
            ..StreamState::default()
        });
        debug!(
            stream = index,
            codec = %codec_id,
            interleaved = options.interleaved,
            "muxer stream added"
        );
        Ok(index)
    }

    /// Edit a stream before the header is written.
    pub fn stream_mut(&mut self, index: usize) -> Result<&mut Stream> {
        if self.state >= MuxerState::HeaderWritten {
            return Err(Error::sequence("streams are frozen once the header is written"));
        }
        let count = self.streams.len();
        self.streams.get_mut(index).ok_or_else(|| {
            Error::invalid_argument(format!("stream {} of {}", index, count))
        })
    }

    /// Bind the output sink and apply private options.
    ///
    /// Allowed once, before the header. Options the format does not know are
    /// listed in the returned report.
    pub async fn open_io(&mut self, options: IoOptions) -> Result<OptionReport> {
        if self.state != MuxerState::Created {
            return Err(Error::sequence(format!(
                "open_io called in state {:?}",
                self.state
            )));
        }
        let report = self.apply_options(&options.options)?;
        let nofile = self.oformat.flags.contains(FormatFlags::NOFILE);
        match options.sink {
            Some(sink) if !nofile => {
                self.core
                    .run(move |core| {
                        core.io = sink.open()?;
                        Ok(())
                    })
                    .await?;
            }
            Some(_) => warn!(format = self.oformat.name, "format writes no output; sink ignored"),
            None if nofile => {}
            None => {
                return Err(Error::invalid_argument(format!(
                    "{} output needs a sink",
                    self.oformat.name
                )))
            }
        }
        self.state = MuxerState::IoOpened;
        Ok(report)
    }

    /// Finalise the streams and write the container header.
    ///
    /// Requires an opened sink unless the format is `NOFILE`.
    pub async fn write_header(&mut self, options: FormatOptions) -> Result<OptionReport> {
        match self.state {
            MuxerState::IoOpened => {}
            MuxerState::Created if self.oformat.flags.contains(FormatFlags::NOFILE) => {}
            MuxerState::Created => {
                return Err(Error::sequence("write_header called before open_io"))
            }
            MuxerState::HeaderWritten | MuxerState::TrailerWritten => {
                return Err(Error::sequence("header already written"))
            }
        }
        let report = self.apply_options(&options)?;

        for stream in &mut self.streams {
            if stream.time_base.is_zero() {
                stream.time_base = default_time_base(&stream.codecpar);
            }
        }
        {
            let backend = &self.core.get()?.backend;
            for stream in &self.streams {
                backend.check_stream(stream)?;
            }
        }
        self.interleaver = Some(Interleaver::new(
            self.streams
                .iter()
                .zip(&self.stream_states)
                .map(|(s, st)| (s.time_base, st.interleaved)),
            self.max_interleave_delta,
        ));

        let streams = self.streams.clone();
        self.core
            .run(move |core| core.backend.write_header(&mut *core.io, &streams))
            .await?;
        self.state = MuxerState::HeaderWritten;
        info!(
            format = self.oformat.name,
            streams = self.streams.len(),
            unset = report.unset.len(),
            "muxer header written"
        );
        Ok(report)
    }

    /// Write packets, or a frame through the stream's implicit encoder.
    ///
    /// Timestamps are rescaled to the stream time base. Interleaved streams
    /// may be held back until the other streams catch up.
    pub async fn write_frame(&mut self, input: impl Into<MuxInput>) -> Result<()> {
        match self.state {
            MuxerState::HeaderWritten => {}
            MuxerState::TrailerWritten => {
                return Err(Error::sequence("write_frame called after write_trailer"))
            }
            _ => return Err(Error::sequence("write_frame called before write_header")),
        }
        match input.into() {
            MuxInput::Packet(packet) => self.submit(vec![packet]).await,
            MuxInput::Packets(packets) => self.submit(packets).await,
            MuxInput::Frame {
                frame,
                stream_index,
            } => {
                let packets = self.encode_implicit(frame, stream_index).await?;
                self.submit(packets).await
            }
        }
    }

    /// Drain implicit encoders and the interleaving queue, write the
    /// trailer and flush the sink.
    pub async fn write_trailer(&mut self) -> Result<()> {
        match self.state {
            MuxerState::HeaderWritten => {}
            MuxerState::TrailerWritten => return Err(Error::sequence("trailer already written")),
            _ => return Err(Error::sequence("write_trailer called before write_header")),
        }
        for index in 0..self.stream_states.len() {
            if let Some(mut encoder) = self.stream_states[index].encoder.take() {
                let flushed = encoder.flush().await?;
                let packets = tag_stream(flushed.packets, index);
                self.submit(packets).await?;
            }
        }
        let rest = match self.interleaver.as_mut() {
            Some(interleaver) => interleaver.drain(),
            None => Vec::new(),
        };
        self.write_packets(rest).await?;

        let streams = self.streams.clone();
        self.core
            .run(move |core| {
                core.backend.write_trailer(&mut *core.io, &streams)?;
                core.io.flush()?;
                core.io = Box::new(io::sink());
                Ok(())
            })
            .await?;
        self.state = MuxerState::TrailerWritten;
        info!(
            format = self.oformat.name,
            packets = self.packets_written,
            "muxer trailer written"
        );
        Ok(())
    }

    pub fn oformat(&self) -> &'static OutputFormatInfo {
        self.oformat
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn state(&self) -> MuxerState {
        self.state
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// Packets handed to the format so far.
    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    fn apply_options(&mut self, options: &FormatOptions) -> Result<OptionReport> {
        let mut report = OptionReport::default();
        let backend = &mut self.core.get_mut()?.backend;
        for (key, value) in options {
            if key == "max_interleave_delta" {
                self.max_interleave_delta = value
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .filter(|v| *v >= 0)
                    .ok_or_else(|| {
                        Error::invalid_argument(format!(
                            "max_interleave_delta must be a non-negative integer, got '{}'",
                            value
                        ))
                    })?;
                if let Some(interleaver) = self.interleaver.as_mut() {
                    interleaver.set_max_delta(self.max_interleave_delta);
                }
            } else if !backend.set_option(key, value)? {
                report.unset.push(key.clone());
            }
        }
        if !report.is_complete() {
            debug!(unset = ?report.unset, "muxer options not applied");
        }
        Ok(report)
    }

    async fn encode_implicit(&mut self, frame: Frame, stream_index: usize) -> Result<Vec<Packet>> {
        let stream = self.streams.get(stream_index).ok_or_else(|| {
            Error::invalid_argument(format!("frame for unknown stream {}", stream_index))
        })?;
        let state = &mut self.stream_states[stream_index];
        if state.encoder.is_none() {
            let config = EncoderConfig::from_parameters(&stream.codecpar, stream.time_base);
            let encoder = Encoder::new(config)?;
            debug!(
                stream = stream_index,
                codec = encoder.name(),
                "implicit encoder created"
            );
            state.encoder = Some(encoder);
        }
        let Some(encoder) = state.encoder.as_mut() else {
            return Ok(Vec::new());
        };
        let encoded = encoder.encode(frame).await?;
        Ok(tag_stream(encoded.packets, stream_index))
    }

    /// Queue a batch and write whatever the interleaver releases.
    ///
    /// The batch is checked as a whole first: if any packet is rejected,
    /// nothing from the batch is queued and the per-stream dts state is left
    /// unchanged.
    async fn submit(&mut self, packets: Vec<Packet>) -> Result<()> {
        let mut last_dts: Vec<Option<i64>> =
            self.stream_states.iter().map(|s| s.last_dts).collect();
        let packets = packets
            .into_iter()
            .map(|packet| self.prepare(packet, &mut last_dts))
            .collect::<Result<Vec<_>>>()?;
        for (state, dts) in self.stream_states.iter_mut().zip(last_dts) {
            state.last_dts = dts;
        }

        let mut ready = Vec::new();
        if let Some(interleaver) = self.interleaver.as_mut() {
            for packet in packets {
                ready.extend(interleaver.push(packet));
            }
        }
        self.write_packets(ready).await
    }

    /// Validate a packet against its stream and move it to the stream time
    /// base. `last_dts` holds the running dts of every stream.
    fn prepare(&self, mut packet: Packet, last_dts: &mut [Option<i64>]) -> Result<Packet> {
        let index = packet.stream_index;
        let stream = self.streams.get(index).ok_or_else(|| {
            Error::invalid_argument(format!(
                "packet for stream {} of {}",
                index,
                self.streams.len()
            ))
        })?;
        packet.rescale_ts(stream.time_base);
        if packet.dts.is_none() {
            packet.dts = packet.pts;
        }
        if let (Some(pts), Some(dts)) = (packet.pts, packet.dts) {
            if pts < dts {
                return Err(Error::invalid_argument(format!(
                    "stream {}: pts {} < dts {}",
                    index, pts, dts
                )));
            }
        }
        let last = &mut last_dts[index];
        if let (Some(dts), Some(last)) = (packet.dts, *last) {
            if dts < last {
                return Err(Error::invalid_argument(format!(
                    "stream {}: dts {} after {} is not monotonic",
                    index, dts, last
                )));
            }
        }
        if packet.dts.is_some() {
            *last = packet.dts;
        }
        Ok(packet)
    }

    async fn write_packets(&mut self, packets: Vec<Packet>) -> Result<()> {
        if packets.is_empty() {
            return Ok(());
        }
        let count = packets.len() as u64;
        self.core
            .run(move |core| {
                for packet in &packets {
                    trace!(
                        stream = packet.stream_index,
                        dts = ?packet.dts,
                        size = packet.size(),
                        "muxing packet"
                    );
                    core.backend.write_packet(&mut *core.io, packet)?;
                }
                Ok(())
            })
            .await?;
        self.packets_written += count;
        Ok(())
    }
}

fn tag_stream(mut packets: Vec<Packet>, stream_index: usize) -> Vec<Packet> {
    for packet in &mut packets {
        packet.stream_index = stream_index;
    }
    packets
}

/// Time base for streams created without one.
fn default_time_base(codecpar: &CodecParameters) -> Rational {
    match codecpar.codec_type {
        MediaType::Video => Rational::new(1, 90000),
        MediaType::Audio if codecpar.sample_rate > 0 => {
            Rational::new(1, codecpar.sample_rate as i64)
        }
        _ => Rational::new(1, 1000),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryBuffer;
    use mediaflow_core::PixelFormat;

    fn delta_stream() -> StreamOptions {
        StreamOptions::new("delta", Rational::new(1, 25)).with_codecpar(CodecParameters::video(
            CodecId::Delta,
            8,
            8,
            PixelFormat::Gray8,
        ))
    }

    #[test]
    fn test_format_selection() {
        assert_eq!(
            Muxer::new(MuxerOptions::filename("out.mpk")).unwrap().oformat().name,
            "mpk"
        );
        let named = MuxerOptions {
            filename: Some("out.yuv".into()),
            format_name: Some("null".into()),
        };
        assert_eq!(Muxer::new(named).unwrap().oformat().name, "null");
        assert!(matches!(
            Muxer::new(MuxerOptions::default()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Muxer::new(MuxerOptions::filename("out.avi")),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_new_stream_checks_codec() {
        let mut muxer = Muxer::new(MuxerOptions::format_name("rawvideo")).unwrap();
        let err = muxer.new_stream(delta_stream()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        let err = muxer
            .new_stream(StreamOptions::new("h264", Rational::new(1, 25)))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_default_time_bases() {
        let video = CodecParameters::video(CodecId::Delta, 8, 8, PixelFormat::Gray8);
        assert_eq!(default_time_base(&video), Rational::new(1, 90000));
        let audio = CodecParameters::audio(
            CodecId::PcmS16le,
            48000,
            mediaflow_core::ChannelLayout::Stereo,
            mediaflow_core::SampleFormat::S16,
        );
        assert_eq!(default_time_base(&audio), Rational::new(1, 48000));
    }

    #[tokio::test]
    async fn test_lifecycle_order() {
        let mut muxer = Muxer::new(MuxerOptions::format_name("mpk")).unwrap();
        muxer.new_stream(delta_stream()).unwrap();
        let packet = Packet::new(vec![1]).with_timestamps(Some(0), Some(0));

        assert!(muxer.write_header(FormatOptions::new()).await.unwrap_err().is_sequence_violation());
        assert!(muxer.write_frame(packet.clone()).await.unwrap_err().is_sequence_violation());

        muxer.open_io(IoOptions::new(MemoryBuffer::new())).await.unwrap();
        assert!(muxer.open_io(IoOptions::new(MemoryBuffer::new())).await.is_err());
        muxer.write_header(FormatOptions::new()).await.unwrap();
        assert!(muxer.new_stream(delta_stream()).unwrap_err().is_sequence_violation());
        assert!(muxer.stream_mut(0).unwrap_err().is_sequence_violation());

        muxer.write_frame(packet.clone()).await.unwrap();
        muxer.write_trailer().await.unwrap();
        assert!(muxer.write_frame(packet).await.unwrap_err().is_sequence_violation());
        assert!(muxer.write_trailer().await.unwrap_err().is_sequence_violation());
    }

    #[tokio::test]
    async fn test_rejects_bad_timestamps() {
        let mut muxer = Muxer::new(MuxerOptions::format_name("null")).unwrap();
        muxer.new_stream(delta_stream()).unwrap();
        muxer.write_header(FormatOptions::new()).await.unwrap();

        let b_before_anchor = Packet::new(vec![0]).with_timestamps(Some(1), Some(2));
        assert!(matches!(
            muxer.write_frame(b_before_anchor).await,
            Err(Error::InvalidArgument(_))
        ));
        muxer
            .write_frame(Packet::new(vec![0]).with_timestamps(Some(5), Some(5)))
            .await
            .unwrap();
        let backwards = Packet::new(vec![0]).with_timestamps(Some(4), Some(4));
        assert!(matches!(
            muxer.write_frame(backwards).await,
            Err(Error::InvalidArgument(_))
        ));
        let stray = Packet::new(vec![0]).with_stream_index(3);
        assert!(matches!(
            muxer.write_frame(stray).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_batch_leaves_no_trace() {
        let mut muxer = Muxer::new(MuxerOptions::format_name("null")).unwrap();
        muxer.new_stream(delta_stream()).unwrap();
        muxer.write_header(FormatOptions::new()).await.unwrap();

        let good = Packet::new(vec![0]).with_timestamps(Some(5), Some(5));
        let bad = Packet::new(vec![0]).with_timestamps(Some(6), Some(7));
        assert!(matches!(
            muxer.write_frame(vec![good, bad]).await,
            Err(Error::InvalidArgument(_))
        ));

        // dts 1 would be non-monotonic had the first packet been accepted.
        muxer
            .write_frame(Packet::new(vec![0]).with_timestamps(Some(1), Some(1)))
            .await
            .unwrap();
        muxer.write_trailer().await.unwrap();
        assert_eq!(muxer.packets_written(), 1);
    }
}
