//! Synthetic test clip generator.

use std::f64::consts::TAU;
use std::path::Path;

use anyhow::Context;
use clap::Args;
use console::style;
use mediaflow_codecs::{Encoder, EncoderConfig};
use mediaflow_containers::io::url_to_path;
use mediaflow_containers::options::parse_video_size;
use mediaflow_containers::{FormatFlags, FormatOptions, IoOptions, Muxer, MuxerOptions, StreamOptions};
use mediaflow_core::{ChannelLayout, Frame, Packet, PixelFormat, Rational, SampleFormat};

/// Samples per audio frame.
const AUDIO_FRAME: usize = 1024;

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    parse_video_size(s).map_err(|e| e.to_string())
}

/// Write a clip with a moving gradient and an optional sine tone.
#[derive(Args, Debug)]
pub struct CmdTestsrc {
    /// Output file
    pub output: String,

    /// Force the muxer
    #[arg(short, long)]
    pub format: Option<String>,

    /// Frame size, WxH or an abbreviation such as cif
    #[arg(long, default_value = "320x240", value_parser = parse_size)]
    pub size: (u32, u32),

    /// Frame rate
    #[arg(long, default_value = "25")]
    pub rate: Rational,

    /// Clip length in seconds
    #[arg(long, default_value_t = 2.0)]
    pub duration: f64,

    /// Video codec
    #[arg(long, default_value = "delta")]
    pub vcodec: String,

    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: PixelFormat,

    /// Keyframe interval
    #[arg(long, default_value_t = 12)]
    pub gop: u32,

    /// Maximum consecutive B-frames
    #[arg(long, default_value_t = 0)]
    pub bf: u32,

    /// Add a mono PCM tone of this frequency in Hz
    #[arg(long)]
    pub tone: Option<f64>,

    #[arg(long, default_value_t = 8000)]
    pub sample_rate: u32,

    /// Overwrite output file if it exists
    #[arg(short = 'y', long)]
    pub overwrite: bool,
}

/// One gradient frame.
///
/// The first plane holds a diagonal ramp that moves by two steps per frame;
/// every other byte is mid-grey.
pub fn gradient_frame(
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    index: i64,
) -> mediaflow_core::Result<Frame> {
    let mut frame = Frame::video(width, height, pixel_format).allocated()?;
    let size = pixel_format.image_size(width, height);
    let luma = (width * height) as usize;
    let image: Vec<u8> = (0..size)
        .map(|k| {
            if k < luma {
                let (x, y) = (k as i64 % width as i64, k as i64 / width as i64);
                ((x + y + 2 * index) & 0xff) as u8
            } else {
                128
            }
        })
        .collect();
    frame.fill_from_packed(&image);
    frame.pts = Some(index);
    frame.duration = 1;
    Ok(frame)
}

/// One frame of a sine tone starting at sample `start`.
fn tone_frame(freq: f64, sample_rate: u32, start: i64, nb_samples: usize) -> mediaflow_core::Result<Frame> {
    let mut frame =
        Frame::audio(nb_samples, sample_rate, ChannelLayout::Mono, SampleFormat::S16).allocated()?;
    let amplitude = f64::from(i16::MAX) * 0.5;
    let samples: Vec<u8> = (0..nb_samples as i64)
        .flat_map(|n| {
            let t = (start + n) as f64 / f64::from(sample_rate);
            (((TAU * freq * t).sin() * amplitude) as i16).to_le_bytes()
        })
        .collect();
    frame.fill_from_packed(&samples);
    frame.pts = Some(start);
    frame.time_base = Rational::new(1, i64::from(sample_rate));
    Ok(frame)
}

fn tag(mut packets: Vec<Packet>, stream_index: usize) -> Vec<Packet> {
    for packet in &mut packets {
        packet.stream_index = stream_index;
    }
    packets
}

impl CmdTestsrc {
    pub async fn run(&self, quiet: bool) -> anyhow::Result<()> {
        let time_base = self
            .rate
            .invert()
            .filter(|tb| tb.is_positive())
            .context("frame rate must be positive")?;
        if self.duration.is_nan() || self.duration <= 0.0 {
            anyhow::bail!("duration must be positive");
        }
        let (width, height) = self.size;
        let nb_frames = (self.duration * self.rate.to_f64()).round().max(1.0) as i64;

        let mut venc = Encoder::new(
            EncoderConfig::video(&self.vcodec, width, height, self.pix_fmt)
                .with_gop(self.gop, self.bf)
                .with_frame_rate(self.rate)
                .with_time_base(time_base),
        )?;
        let mut aenc = match self.tone {
            Some(_) => Some(Encoder::new(EncoderConfig::audio(
                "pcm_s16le",
                self.sample_rate,
                ChannelLayout::Mono,
                SampleFormat::S16,
            ))?),
            None => None,
        };

        let mut muxer = Muxer::new(MuxerOptions {
            filename: Some(self.output.clone()),
            format_name: self.format.clone(),
        })?;
        muxer.new_stream(
            StreamOptions::new(venc.name(), venc.time_base())
                .with_codecpar(venc.codec_parameters().clone()),
        )?;
        if let Some(aenc) = &aenc {
            muxer.new_stream(
                StreamOptions::new(aenc.name(), aenc.time_base())
                    .with_codecpar(aenc.codec_parameters().clone()),
            )?;
        }
        if muxer.oformat().flags.contains(FormatFlags::NOFILE) {
            muxer.open_io(IoOptions::default()).await?;
        } else {
            if !self.overwrite && Path::new(url_to_path(&self.output)).exists() {
                anyhow::bail!("Output already exists: {} (use -y)", self.output);
            }
            muxer.open_io(IoOptions::new(self.output.as_str())).await?;
        }
        muxer.write_header(FormatOptions::new()).await?;

        let total_samples = (self.duration * f64::from(self.sample_rate)).round() as i64;
        let mut next_sample = 0i64;
        for i in 0..nb_frames {
            let mut frame = gradient_frame(width, height, self.pix_fmt, i)?;
            frame.time_base = time_base;
            let packets = venc.encode(frame).await?.packets;
            muxer.write_frame(packets).await?;

            if let (Some(aenc), Some(freq)) = (aenc.as_mut(), self.tone) {
                // Keep audio level with the end of this video frame.
                let until = time_base
                    .rescale(i + 1, Rational::new(1, i64::from(self.sample_rate)))
                    .min(total_samples);
                while next_sample < until {
                    let n = (until - next_sample).min(AUDIO_FRAME as i64) as usize;
                    let frame = tone_frame(freq, self.sample_rate, next_sample, n)?;
                    next_sample += n as i64;
                    let packets = aenc.encode(frame).await?.packets;
                    muxer.write_frame(tag(packets, 1)).await?;
                }
            }
        }
        muxer.write_frame(venc.flush().await?.packets).await?;
        if let Some(aenc) = aenc.as_mut() {
            let packets = aenc.flush().await?.packets;
            muxer.write_frame(tag(packets, 1)).await?;
        }
        muxer.write_trailer().await?;

        if !quiet {
            println!("{}", style("Test clip written").green().bold());
            println!("  {:<10} {}", style("Output:").white(), self.output);
            println!(
                "  {:<10} {}x{} {} @ {} fps, {} frames",
                style("Video:").white(),
                width,
                height,
                self.vcodec,
                self.rate,
                nb_frames
            );
            if let Some(freq) = self.tone {
                println!(
                    "  {:<10} {} Hz tone, {} samples @ {} Hz",
                    style("Audio:").white(),
                    freq,
                    next_sample,
                    self.sample_rate
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_moves() {
        let a = gradient_frame(4, 2, PixelFormat::Yuv420p, 0).unwrap().to_packed_bytes();
        let b = gradient_frame(4, 2, PixelFormat::Yuv420p, 1).unwrap().to_packed_bytes();
        assert_eq!(&a[..8], &[0, 1, 2, 3, 1, 2, 3, 4]);
        assert_eq!(&b[..4], &[2, 3, 4, 5]);
        assert!(a[8..].iter().all(|&v| v == 128));
    }

    #[test]
    fn test_tone_frame() {
        let frame = tone_frame(1000.0, 8000, 0, 8).unwrap();
        let bytes = frame.to_packed_bytes();
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        // 1 kHz at 8 kHz: one period every 8 samples.
        assert_eq!(samples[0], 0);
        assert!(samples[2] > 16000);
        assert!(samples[6] < -16000);
        assert_eq!(frame.pts, Some(0));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("16x8").unwrap(), (16, 8));
        assert_eq!(parse_size("cif").unwrap(), (352, 288));
        assert!(parse_size("16").is_err());
    }
}
