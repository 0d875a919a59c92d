//! Main transcoding pipeline implementation.

use std::path::Path;
use std::time::{Duration, Instant};

use mediaflow_codecs::{CodecSelector, Decoder, Encoder, EncoderConfig};
use mediaflow_containers::io::url_to_path;
use mediaflow_containers::{
    Demuxer, DemuxerOptions, FormatFlags, FormatOptions, IoOptions, Muxer, MuxerOptions,
    StreamOptions,
};
use mediaflow_core::{Frame, Packet, Stream};
use mediaflow_filters::{Filterer, FiltererOptions, LinkProps};
use tracing::{debug, info, trace};

use crate::config::{InputConfig, OutputConfig, PipelineConfig, StreamMap, StreamRoute, TranscodeRoute};
use crate::error::{PipelineError, Result};

/// Progress callback type.
pub type ProgressCallback = Box<dyn Fn(&PipelineStats) + Send>;

/// Counters collected while a pipeline runs.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Packets read from the demuxer.
    pub packets_read: u64,
    /// Packets of unmapped streams.
    pub packets_skipped: u64,
    /// Packets passed through copy routes.
    pub packets_copied: u64,
    pub frames_decoded: u64,
    /// Frames leaving filter chains.
    pub frames_filtered: u64,
    pub packets_encoded: u64,
    /// Packets the muxer handed to the container.
    pub packets_written: u64,
    /// Latest input presentation time seen, in microseconds.
    pub position_us: i64,
    /// Input duration in microseconds, if the container knows it.
    pub total_duration_us: Option<i64>,
    pub decode_time: Duration,
    pub filter_time: Duration,
    pub encode_time: Duration,
    /// Wall-clock time of the whole run.
    pub elapsed: Duration,
}

impl PipelineStats {
    /// Get progress as percentage (0.0 - 100.0).
    pub fn progress(&self) -> f64 {
        match self.total_duration_us {
            Some(total) if total > 0 => {
                (self.position_us.max(0) as f64 / total as f64 * 100.0).min(100.0)
            }
            _ => 0.0,
        }
    }
}

/// Decoder, optional filter chain and encoder for one re-encoded stream.
struct TranscodeChain {
    output: usize,
    decoder: Decoder,
    filterer: Option<Filterer>,
    encoder: Encoder,
}

impl TranscodeChain {
    async fn new(stream: &Stream, route: &TranscodeRoute, muxer: &mut Muxer) -> Result<Self> {
        let decoder = Decoder::from_stream(stream)?;
        let mut props = LinkProps::from_parameters(decoder.parameters(), stream.time_base)?;
        let filterer = match route.filter.as_deref() {
            Some(filters) => {
                let filterer = Filterer::new(FiltererOptions::simple(filters, props)).await?;
                props = filterer.output_props("out").ok_or_else(|| {
                    PipelineError::InvalidConfig(format!(
                        "stream {}: filter chain has no output",
                        stream.index
                    ))
                })?;
                Some(filterer)
            }
            None => None,
        };

        let mut config = encoder_config(&route.encoder, &props);
        if matches!(&config.codec, CodecSelector::Name(name) if name.is_empty()) {
            config.codec = stream.codecpar.codec_id.into();
        }
        let encoder = Encoder::new(config)?;
        let output = muxer.new_stream(
            StreamOptions::new(encoder.name(), encoder.time_base())
                .with_codecpar(encoder.codec_parameters().clone()),
        )?;
        debug!(
            input = stream.index,
            output,
            decoder = decoder.name(),
            encoder = encoder.name(),
            filter = ?route.filter,
            "transcode route ready"
        );
        Ok(Self {
            output,
            decoder,
            filterer,
            encoder,
        })
    }

    async fn push(&mut self, packet: Packet, stats: &mut PipelineStats) -> Result<Vec<Packet>> {
        let decoded = self.decoder.decode(packet).await?;
        stats.decode_time += decoded.total_time;
        stats.frames_decoded += decoded.frames.len() as u64;
        self.filter_and_encode(decoded.frames, stats).await
    }

    /// Flush decoder, filter chain and encoder, in that order.
    async fn drain(&mut self, stats: &mut PipelineStats) -> Result<Vec<Packet>> {
        let decoded = self.decoder.flush().await?;
        stats.decode_time += decoded.total_time;
        stats.frames_decoded += decoded.frames.len() as u64;
        let mut packets = self.filter_and_encode(decoded.frames, stats).await?;

        if let Some(filterer) = self.filterer.as_mut() {
            let filtered = filterer.flush().await?;
            stats.filter_time += filtered.total_time;
            let frames = filtered.into_frames();
            stats.frames_filtered += frames.len() as u64;
            packets.extend(self.encode(frames, stats).await?);
        }

        let encoded = self.encoder.flush().await?;
        stats.encode_time += encoded.total_time;
        packets.extend(self.tag(encoded.packets, stats));
        Ok(packets)
    }

    async fn filter_and_encode(
        &mut self,
        frames: Vec<Frame>,
        stats: &mut PipelineStats,
    ) -> Result<Vec<Packet>> {
        if frames.is_empty() {
            return Ok(Vec::new());
        }
        let frames = match self.filterer.as_mut() {
            Some(filterer) => {
                let filtered = filterer.filter(frames).await?;
                stats.filter_time += filtered.total_time;
                let frames = filtered.into_frames();
                stats.frames_filtered += frames.len() as u64;
                frames
            }
            None => frames,
        };
        self.encode(frames, stats).await
    }

    async fn encode(&mut self, frames: Vec<Frame>, stats: &mut PipelineStats) -> Result<Vec<Packet>> {
        if frames.is_empty() {
            return Ok(Vec::new());
        }
        let encoded = self.encoder.encode(frames).await?;
        stats.encode_time += encoded.total_time;
        Ok(self.tag(encoded.packets, stats))
    }

    fn tag(&self, mut packets: Vec<Packet>, stats: &mut PipelineStats) -> Vec<Packet> {
        stats.packets_encoded += packets.len() as u64;
        for packet in &mut packets {
            packet.stream_index = self.output;
        }
        packets
    }
}

enum Route {
    Copy { output: usize },
    Transcode(Box<TranscodeChain>),
}

/// Fill encoder settings left unset from the frames that will feed it.
fn encoder_config(base: &EncoderConfig, props: &LinkProps) -> EncoderConfig {
    let mut config = base.clone();
    match props {
        LinkProps::Video(v) => {
            if config.width == 0 {
                config.width = v.width;
            }
            if config.height == 0 {
                config.height = v.height;
            }
            config.pixel_format.get_or_insert(v.pixel_format);
            if config.time_base.is_zero() {
                config.time_base = v.time_base;
                if v.frame_rate.is_positive() {
                    config.frame_rate = v.frame_rate;
                }
            }
        }
        LinkProps::Audio(a) => {
            if config.sample_rate == 0 {
                config.sample_rate = a.sample_rate;
            }
            config.sample_format.get_or_insert(a.sample_format);
            config.channel_layout.get_or_insert(a.channel_layout);
            if config.time_base.is_zero() {
                config.time_base = a.time_base;
            }
        }
    }
    config
}

async fn open_input(input: &InputConfig) -> Result<Demuxer> {
    let mut options = DemuxerOptions::new(input.url.as_str());
    if let Some(format) = &input.format {
        options = options.with_format(format);
    }
    for (key, value) in &input.options {
        options = options.with_option(key, value);
    }
    Ok(Demuxer::open(options).await?)
}

fn create_muxer(output: &OutputConfig) -> Result<Muxer> {
    let options = MuxerOptions {
        filename: (!output.url.is_empty()).then(|| output.url.clone()),
        format_name: output.format.clone(),
    };
    Ok(Muxer::new(options)?)
}

/// Build one route per mapped input stream, adding output streams in
/// mapping order.
async fn build_routes(
    config: &PipelineConfig,
    demuxer: &Demuxer,
    muxer: &mut Muxer,
) -> Result<Vec<Option<Route>>> {
    let streams = demuxer.streams();
    let mappings: Vec<StreamMap> = if config.streams.is_empty() {
        streams.iter().map(|s| StreamMap::copy(s.index)).collect()
    } else {
        config.streams.clone()
    };

    let mut routes: Vec<Option<Route>> = streams.iter().map(|_| None).collect();
    for mapping in &mappings {
        let stream = streams
            .get(mapping.input)
            .ok_or(PipelineError::StreamNotFound(mapping.input))?;
        let route = match &mapping.route {
            StreamRoute::Copy => {
                let output = muxer.new_stream(
                    StreamOptions::new(stream.codecpar.codec_name(), stream.time_base)
                        .with_codecpar(stream.codecpar.clone()),
                )?;
                debug!(input = stream.index, output, "copy route ready");
                Route::Copy { output }
            }
            StreamRoute::Transcode(transcode) => {
                Route::Transcode(Box::new(TranscodeChain::new(stream, transcode, muxer).await?))
            }
        };
        routes[mapping.input] = Some(route);
    }
    Ok(routes)
}

/// Runs a job: demux, then per stream either copy or decode, filter and
/// encode, then mux.
///
/// At end of input every transcode route is drained (decoder, then filter
/// chain, then encoder) before the muxer trailer is written.
pub struct Pipeline {
    config: PipelineConfig,
    progress_callback: Option<ProgressCallback>,
    stats: PipelineStats,
}

impl Pipeline {
    /// Create a pipeline for a validated job.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            progress_callback: None,
            stats: PipelineStats::default(),
        })
    }

    /// Called with the current counters at every progress report.
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PipelineStats) + Send + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Counters of the last run.
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Run the job to completion.
    pub async fn run(&mut self) -> Result<PipelineStats> {
        let started = Instant::now();
        let Self {
            config,
            progress_callback,
            stats,
        } = self;
        *stats = PipelineStats::default();

        info!(
            input = %config.input.url,
            output = %config.output.url,
            "Starting pipeline"
        );
        let mut demuxer = open_input(&config.input).await?;
        stats.total_duration_us = demuxer.duration();
        if let Some(seek) = config.start.clone() {
            debug!(target = ?seek.target, "seeking before first packet");
            demuxer.seek(seek).await?;
        }

        let mut muxer = create_muxer(&config.output)?;
        let nofile = muxer.oformat().flags.contains(FormatFlags::NOFILE);
        if !nofile {
            prepare_output(&config.output.url, config.overwrite).await?;
        }
        let mut routes = build_routes(config, &demuxer, &mut muxer).await?;

        let io = if nofile {
            IoOptions::default()
        } else {
            IoOptions::new(config.output.url.as_str())
        };
        muxer.open_io(io).await?;
        let header_options: FormatOptions = config.output.options.clone();
        let report = muxer.write_header(header_options).await?;
        if !report.is_complete() {
            info!(unset = ?report.unset, "output options not recognised");
        }

        while let Some(mut packet) = demuxer.read().await? {
            stats.packets_read += 1;
            if let Some(ts) = packet.pts_timestamp() {
                stats.position_us = stats.position_us.max(ts.to_micros());
            }
            match routes.get_mut(packet.stream_index).and_then(Option::as_mut) {
                None => {
                    trace!(stream = packet.stream_index, "packet of unmapped stream dropped");
                    stats.packets_skipped += 1;
                }
                Some(Route::Copy { output }) => {
                    packet.stream_index = *output;
                    muxer.write_frame(packet).await?;
                    stats.packets_copied += 1;
                }
                Some(Route::Transcode(chain)) => {
                    let packets = chain.push(packet, stats).await?;
                    if !packets.is_empty() {
                        muxer.write_frame(packets).await?;
                    }
                }
            }

            if config.progress_interval > 0 && stats.packets_read % config.progress_interval == 0 {
                stats.elapsed = started.elapsed();
                report_progress(stats);
                if let Some(callback) = progress_callback.as_ref() {
                    callback(&*stats);
                }
            }
        }

        info!("Flushing pipeline");
        for route in routes.iter_mut().flatten() {
            if let Route::Transcode(chain) = route {
                let packets = chain.drain(stats).await?;
                if !packets.is_empty() {
                    muxer.write_frame(packets).await?;
                }
            }
        }
        muxer.write_trailer().await?;

        stats.packets_written = muxer.packets_written();
        stats.elapsed = started.elapsed();
        info!(
            packets_read = stats.packets_read,
            packets_written = stats.packets_written,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Pipeline finished"
        );
        Ok(stats.clone())
    }
}

/// Refuse to clobber an existing file and create missing parent directories.
async fn prepare_output(url: &str, overwrite: bool) -> Result<()> {
    let path = Path::new(url_to_path(url));
    if !overwrite && tokio::fs::try_exists(path).await? {
        return Err(PipelineError::OutputExists(url.to_string()));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

fn report_progress(stats: &PipelineStats) {
    if stats.total_duration_us.is_some() {
        info!(
            "Progress: {:.1}% ({} packets processed)",
            stats.progress(),
            stats.packets_read
        );
    } else {
        info!("Processed {} packets", stats.packets_read);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaflow_core::{ChannelLayout, PixelFormat, Rational, SampleFormat};
    use mediaflow_filters::{AudioLink, VideoLink};

    #[test]
    fn test_progress() {
        let mut stats = PipelineStats::default();
        assert_eq!(stats.progress(), 0.0);
        stats.total_duration_us = Some(2_000_000);
        stats.position_us = 500_000;
        assert!((stats.progress() - 25.0).abs() < 1e-9);
        stats.position_us = 3_000_000;
        assert_eq!(stats.progress(), 100.0);
    }

    #[test]
    fn test_encoder_config_follows_video_link() {
        let link = VideoLink::new(32, 16, PixelFormat::Yuv420p, Rational::new(1, 10))
            .with_frame_rate(Rational::new(10, 1));
        let base = EncoderConfig {
            codec: "delta".into(),
            ..EncoderConfig::default()
        }
        .with_gop(5, 1);
        let config = encoder_config(&base, &LinkProps::Video(link));
        assert_eq!((config.width, config.height), (32, 16));
        assert_eq!(config.pixel_format, Some(PixelFormat::Yuv420p));
        assert_eq!(config.time_base, Rational::new(1, 10));
        assert_eq!(config.frame_rate, Rational::new(10, 1));
        assert_eq!(config.gop_size, 5);

        // Explicit settings win.
        let fixed = EncoderConfig::video("rawvideo", 8, 8, PixelFormat::Gray8)
            .with_time_base(Rational::new(1, 1000));
        let config = encoder_config(&fixed, &LinkProps::Video(link));
        assert_eq!((config.width, config.height), (8, 8));
        assert_eq!(config.pixel_format, Some(PixelFormat::Gray8));
        assert_eq!(config.time_base, Rational::new(1, 1000));
    }

    #[test]
    fn test_encoder_config_follows_audio_link() {
        let link = AudioLink::new(8000, SampleFormat::S16, ChannelLayout::Stereo);
        let config = encoder_config(&EncoderConfig::default(), &LinkProps::Audio(link));
        assert_eq!(config.sample_rate, 8000);
        assert_eq!(config.sample_format, Some(SampleFormat::S16));
        assert_eq!(config.channel_layout, Some(ChannelLayout::Stereo));
        assert_eq!(config.time_base, Rational::new(1, 8000));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        assert!(Pipeline::new(PipelineConfig::new("", "out.mpk")).is_err());
        let pipeline = Pipeline::new(PipelineConfig::new("in.mpk", "out.mpk")).unwrap();
        assert_eq!(pipeline.config().input.url, "in.mpk");
        assert_eq!(pipeline.stats().packets_read, 0);
    }
}
