//! Transcode command: flags or a JSON job file.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use mediaflow_codecs::EncoderConfig;
use mediaflow_containers::{Demuxer, DemuxerOptions, SeekOptions};
use mediaflow_core::{MediaType, PixelFormat, Stream};
use mediaflow_pipeline::{PipelineConfig, DEFAULT_PROGRESS_INTERVAL};

use super::{parse_key_value, run_pipeline};

/// Re-encode a file, optionally through filter chains.
///
/// Video and audio streams are re-encoded with the input codec unless
/// `--vcodec`/`--acodec` name another one or `copy`. Other streams are
/// copied.
#[derive(Args, Debug)]
pub struct CmdTranscode {
    /// Input file
    #[arg(required_unless_present = "job")]
    pub input: Option<String>,

    /// Output file
    #[arg(required_unless_present = "job")]
    pub output: Option<String>,

    /// Run a JSON job description instead of the flags
    #[arg(long, conflicts_with_all = ["input", "output"])]
    pub job: Option<PathBuf>,

    /// Print the job the flags describe as JSON and exit
    #[arg(long)]
    pub dump_job: bool,

    /// Video codec, or `copy`
    #[arg(long)]
    pub vcodec: Option<String>,

    /// Audio codec, or `copy`
    #[arg(long)]
    pub acodec: Option<String>,

    /// Drop video streams
    #[arg(long)]
    pub vn: bool,

    /// Drop audio streams
    #[arg(long)]
    pub an: bool,

    /// Video filter chain, e.g. "scale=320:-1,fps=10"
    #[arg(long)]
    pub vf: Option<String>,

    /// Audio filter chain, e.g. "volume=-6dB"
    #[arg(long)]
    pub af: Option<String>,

    /// Keyframe interval
    #[arg(long)]
    pub gop: Option<u32>,

    /// Maximum consecutive B-frames
    #[arg(long)]
    pub bf: Option<u32>,

    /// Output pixel format
    #[arg(long)]
    pub pix_fmt: Option<PixelFormat>,

    /// Target bit rate in bits per second
    #[arg(long)]
    pub bitrate: Option<u64>,

    /// Encoder preset
    #[arg(long)]
    pub preset: Option<String>,

    /// Force the muxer
    #[arg(short, long)]
    pub format: Option<String>,

    /// Force the demuxer
    #[arg(long)]
    pub input_format: Option<String>,

    /// Demuxer option (repeatable)
    #[arg(short = 'O', long = "option", value_parser = parse_key_value)]
    pub options: Vec<(String, String)>,

    /// Start at the first keyframe at or after this many seconds
    #[arg(long)]
    pub start: Option<f64>,

    /// Packets between progress reports; 0 disables them
    #[arg(long, default_value_t = DEFAULT_PROGRESS_INTERVAL)]
    pub progress_interval: u64,

    /// Overwrite output file if it exists
    #[arg(short = 'y', long)]
    pub overwrite: bool,
}

impl CmdTranscode {
    pub async fn run(&self, quiet: bool) -> anyhow::Result<()> {
        let config = match &self.job {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("reading job {}", path.display()))?,
            None => {
                let demuxer = Demuxer::open(self.demuxer_options()?).await?;
                self.to_config(demuxer.streams())?
            }
        };
        if self.dump_job {
            println!("{}", config.to_json()?);
            return Ok(());
        }
        run_pipeline(config, quiet).await?;
        Ok(())
    }

    fn demuxer_options(&self) -> anyhow::Result<DemuxerOptions> {
        let input = self.input.as_deref().context("no input given")?;
        let mut options = DemuxerOptions::new(input);
        if let Some(format) = &self.input_format {
            options = options.with_format(format);
        }
        for (key, value) in &self.options {
            options = options.with_option(key, value);
        }
        Ok(options)
    }

    /// Map the flags onto a job for an input with these streams.
    pub fn to_config(&self, streams: &[Stream]) -> anyhow::Result<PipelineConfig> {
        let input = self.input.as_deref().context("no input given")?;
        let output = self.output.as_deref().context("no output given")?;
        let mut config = PipelineConfig::new(input, output)
            .overwrite(self.overwrite)
            .progress_interval(self.progress_interval);
        if let Some(format) = &self.format {
            config = config.output_format(format);
        }
        if let Some(format) = &self.input_format {
            config = config.input_format(format);
        }
        for (key, value) in &self.options {
            config = config.input_option(key, value);
        }
        if let Some(seconds) = self.start {
            config = config.start(SeekOptions::time(seconds));
        }

        for stream in streams {
            let (codec, filter, dropped) = match stream.media_type() {
                MediaType::Video => (self.vcodec.as_deref(), self.vf.as_deref(), self.vn),
                MediaType::Audio => (self.acodec.as_deref(), self.af.as_deref(), self.an),
                MediaType::Data => (Some("copy"), None, false),
            };
            if dropped {
                continue;
            }
            if codec == Some("copy") {
                if filter.is_some() {
                    anyhow::bail!(
                        "stream {}: filters need re-encoding, not copy",
                        stream.index
                    );
                }
                config = config.copy(stream.index);
                continue;
            }
            let encoder = self.encoder_config(stream.media_type(), codec.unwrap_or(""));
            config = config.transcode(stream.index, encoder, filter);
        }
        if config.streams.is_empty() {
            anyhow::bail!("every stream was dropped");
        }
        Ok(config)
    }

    fn encoder_config(&self, media_type: MediaType, codec: &str) -> EncoderConfig {
        let mut config = EncoderConfig {
            codec: codec.into(),
            ..EncoderConfig::default()
        };
        if media_type == MediaType::Video {
            if let Some(gop) = self.gop {
                config.gop_size = gop;
            }
            if let Some(bf) = self.bf {
                config.max_b_frames = bf;
            }
            config.pixel_format = self.pix_fmt;
            if let Some(preset) = &self.preset {
                config = config.with_preset(preset);
            }
        }
        if let Some(bitrate) = self.bitrate {
            config.bit_rate = bitrate;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use mediaflow_codecs::CodecSelector;
    use mediaflow_core::{ChannelLayout, CodecId, CodecParameters, Rational, SampleFormat};
    use mediaflow_pipeline::StreamRoute;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        cmd: CmdTranscode,
    }

    fn parse(args: &[&str]) -> CmdTranscode {
        let mut argv = vec!["mediaflow"];
        argv.extend_from_slice(args);
        Wrapper::parse_from(argv).cmd
    }

    fn streams() -> Vec<Stream> {
        vec![
            Stream::new(
                0,
                Rational::new(1, 25),
                CodecParameters::video(CodecId::Delta, 32, 16, PixelFormat::Yuv420p),
            ),
            Stream::new(
                1,
                Rational::new(1, 8000),
                CodecParameters::audio(CodecId::PcmS16le, 8000, ChannelLayout::Mono, SampleFormat::S16),
            ),
        ]
    }

    #[test]
    fn test_flags_map_to_routes() {
        let cmd = parse(&[
            "in.mpk", "out.mpk", "--vf", "scale=16:8", "--gop", "5", "--bf", "1", "--acodec",
            "copy", "--start", "1.5", "-y",
        ]);
        let config = cmd.to_config(&streams()).unwrap();
        assert!(config.overwrite);
        assert_eq!(config.start, Some(SeekOptions::time(1.5)));
        assert_eq!(config.streams.len(), 2);

        let StreamRoute::Transcode(video) = &config.streams[0].route else {
            panic!("video should be re-encoded");
        };
        assert_eq!(video.filter.as_deref(), Some("scale=16:8"));
        assert_eq!(video.encoder.codec, CodecSelector::Name(String::new()));
        assert_eq!((video.encoder.gop_size, video.encoder.max_b_frames), (5, 1));
        assert_eq!(config.streams[1].route, StreamRoute::Copy);
    }

    #[test]
    fn test_dropped_and_invalid_streams() {
        let cmd = parse(&["in.mpk", "out.mpk", "--an", "--vcodec", "rawvideo"]);
        let config = cmd.to_config(&streams()).unwrap();
        assert_eq!(config.streams.len(), 1);
        assert_eq!(config.streams[0].input, 0);

        let cmd = parse(&["in.mpk", "out.mpk", "--vn", "--an"]);
        assert!(cmd.to_config(&streams()).is_err());

        let cmd = parse(&["in.mpk", "out.mpk", "--vcodec", "copy", "--vf", "hflip"]);
        assert!(cmd.to_config(&streams()).is_err());
    }

    #[test]
    fn test_job_flag_excludes_positionals() {
        let cmd = parse(&["--job", "job.json"]);
        assert!(cmd.input.is_none());
        assert!(Wrapper::try_parse_from(["mediaflow", "in.mpk"]).is_err());
        assert!(Wrapper::try_parse_from(["mediaflow", "a", "b", "--job", "j.json"]).is_err());
    }
}
