//! Media file inspection command.

use clap::Args;
use console::style;
use mediaflow_containers::{ContextFlags, Demuxer, DemuxerOptions};
use mediaflow_core::{MediaType, Stream, Timestamp};
use serde::Serialize;

use super::parse_key_value;

/// Stream information for display.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub index: usize,
    #[serde(rename = "type")]
    pub stream_type: String,
    pub codec: String,
    pub time_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Packets in the seek index, or counted when `--count` is given.
    pub packets: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reorder_depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_layout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_format: Option<String>,
}

impl StreamInfo {
    fn from_stream(stream: &Stream) -> Self {
        let par = &stream.codecpar;
        let seconds = |v: i64| Timestamp::new(v, stream.time_base).to_seconds();
        let video = stream.media_type() == MediaType::Video;
        let audio = stream.media_type() == MediaType::Audio;
        Self {
            index: stream.index,
            stream_type: stream.media_type().to_string(),
            codec: par.codec_name().to_string(),
            time_base: stream.time_base.to_string(),
            start_seconds: stream.start_time.map(seconds),
            duration_seconds: stream.duration.map(seconds),
            packets: stream.nb_frames,
            width: video.then_some(par.width),
            height: video.then_some(par.height),
            pixel_format: par.pixel_format.filter(|_| video).map(|f| f.to_string()),
            frame_rate: (video && par.frame_rate.is_positive()).then(|| par.frame_rate.to_string()),
            reorder_depth: (video && par.has_b_frames > 0).then_some(par.has_b_frames),
            sample_rate: audio.then_some(par.sample_rate),
            channel_layout: par.channel_layout.filter(|_| audio).map(|l| l.to_string()),
            sample_format: par.sample_format.filter(|_| audio).map(|f| f.to_string()),
        }
    }
}

/// Media file information.
#[derive(Debug, Clone, Serialize)]
pub struct MediaInfo {
    pub url: String,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Average bits per second, 0 if unknown.
    pub bit_rate: u64,
    pub seekable: bool,
    pub streams: Vec<StreamInfo>,
}

/// Inspect a media file.
#[derive(Args, Debug)]
pub struct CmdProbe {
    /// File path or url of the media
    pub input: String,

    /// Force the demuxer instead of probing
    #[arg(short, long)]
    pub format: Option<String>,

    /// Demuxer option, e.g. video_size=320x240 (repeatable)
    #[arg(short = 'O', long = "option", value_parser = parse_key_value)]
    pub options: Vec<(String, String)>,

    /// Read every packet to count them
    #[arg(long)]
    pub count: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

impl CmdProbe {
    /// Execute the probe command.
    pub async fn run(&self) -> anyhow::Result<()> {
        let info = self.analyze().await?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&info)?);
        } else {
            print_media_info(&info);
        }
        Ok(())
    }

    async fn analyze(&self) -> anyhow::Result<MediaInfo> {
        let mut options = DemuxerOptions::new(self.input.as_str());
        if let Some(format) = &self.format {
            options = options.with_format(format);
        }
        for (key, value) in &self.options {
            options = options.with_option(key, value);
        }
        let mut demuxer = Demuxer::open(options).await?;

        let mut streams: Vec<StreamInfo> =
            demuxer.streams().iter().map(StreamInfo::from_stream).collect();
        if self.count {
            for stream in &mut streams {
                stream.packets = 0;
            }
            while let Some(packet) = demuxer.read().await? {
                if let Some(stream) = streams.get_mut(packet.stream_index) {
                    stream.packets += 1;
                }
            }
        }

        let micros = |us: i64| us as f64 / 1_000_000.0;
        Ok(MediaInfo {
            url: self.input.clone(),
            format: demuxer.iformat().name.to_string(),
            start_seconds: demuxer.start_time().map(micros),
            duration_seconds: demuxer.duration().map(micros),
            bit_rate: demuxer.bit_rate(),
            seekable: !demuxer.ctx_flags().contains(ContextFlags::UNSEEKABLE),
            streams,
        })
    }
}

fn print_media_info(info: &MediaInfo) {
    println!();
    println!("{}", style("Media Information").cyan().bold());
    println!();
    println!("  {:<12} {}", style("Input:").white(), info.url);
    println!("  {:<12} {}", style("Format:").white(), info.format);
    if let Some(duration) = info.duration_seconds {
        println!("  {:<12} {:.3}s", style("Duration:").white(), duration);
    }
    if info.bit_rate > 0 {
        println!("  {:<12} {} b/s", style("Bitrate:").white(), info.bit_rate);
    }
    if !info.seekable {
        println!("  {:<12} no", style("Seekable:").white());
    }
    println!();

    for s in &info.streams {
        let detail = match s.stream_type.as_str() {
            "video" => format!(
                "{}x{} {} {}",
                s.width.unwrap_or(0),
                s.height.unwrap_or(0),
                s.pixel_format.as_deref().unwrap_or("?"),
                s.frame_rate.as_deref().map(|r| format!("{} fps", r)).unwrap_or_default()
            ),
            "audio" => format!(
                "{} Hz {} {}",
                s.sample_rate.unwrap_or(0),
                s.channel_layout.as_deref().unwrap_or("?"),
                s.sample_format.as_deref().unwrap_or("?")
            ),
            _ => String::new(),
        };
        println!(
            "  {} {} {} {}  ({} packets, tb {})",
            style(format!("#{}", s.index)).yellow(),
            style(&s.stream_type).white().bold(),
            style(&s.codec).green(),
            detail.trim_end(),
            s.packets,
            s.time_base
        );
    }
    println!();
}
