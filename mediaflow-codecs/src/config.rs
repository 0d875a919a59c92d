//! Decoder and encoder configuration.
//!
//! Both structures are closed: unknown keys are rejected when deserialising,
//! and values are checked against the codec's capabilities when the stage is
//! constructed.

use std::fmt;

use mediaflow_core::{
    ChannelLayout, CodecId, CodecParameters, Error, MediaType, PixelFormat, Rational, Result,
    SampleFormat,
};
use serde::{Deserialize, Serialize};

use crate::traits::{CodecCapabilities, CodecInfo};

/// Selects a codec by name or by numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecSelector {
    Name(String),
    Id(u32),
}

impl Default for CodecSelector {
    fn default() -> Self {
        CodecSelector::Name(String::new())
    }
}

impl From<&str> for CodecSelector {
    fn from(name: &str) -> Self {
        CodecSelector::Name(name.to_string())
    }
}

impl From<CodecId> for CodecSelector {
    fn from(id: CodecId) -> Self {
        CodecSelector::Id(id.id())
    }
}

impl fmt::Display for CodecSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecSelector::Name(name) => write!(f, "{}", name),
            CodecSelector::Id(id) => write!(f, "#{}", id),
        }
    }
}

/// Configuration for a standalone decoder.
///
/// Decoders bound to a demuxer stream take their parameters from the stream
/// instead (see [`Decoder::from_stream`](crate::Decoder::from_stream)).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DecoderConfig {
    pub codec: CodecSelector,
    pub width: u32,
    pub height: u32,
    pub pixel_format: Option<PixelFormat>,
    pub sample_rate: u32,
    pub channel_layout: Option<ChannelLayout>,
    pub sample_format: Option<SampleFormat>,
    /// Reorder depth; defaults to the codec's maximum.
    pub has_b_frames: Option<u32>,
    /// Time base of incoming packets; zero adopts the first packet's.
    pub time_base: Rational,
}

impl DecoderConfig {
    pub fn by_name(name: &str) -> Self {
        Self {
            codec: name.into(),
            ..Self::default()
        }
    }

    pub fn by_id(id: CodecId) -> Self {
        Self {
            codec: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_video(mut self, width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        self.width = width;
        self.height = height;
        self.pixel_format = Some(pixel_format);
        self
    }

    #[must_use]
    pub fn with_audio(
        mut self,
        sample_rate: u32,
        channel_layout: ChannelLayout,
        sample_format: SampleFormat,
    ) -> Self {
        self.sample_rate = sample_rate;
        self.channel_layout = Some(channel_layout);
        self.sample_format = Some(sample_format);
        self
    }

    #[must_use]
    pub fn with_reorder_depth(mut self, depth: u32) -> Self {
        self.has_b_frames = Some(depth);
        self
    }

    #[must_use]
    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.time_base = time_base;
        self
    }

    /// Stream parameters for a decoder of `info`'s codec.
    pub(crate) fn to_parameters(&self, info: &CodecInfo) -> CodecParameters {
        let mut params = CodecParameters {
            codec_type: info.codec_type,
            codec_id: info.id,
            ..CodecParameters::default()
        };
        match info.codec_type {
            MediaType::Video => {
                params.width = self.width;
                params.height = self.height;
                params.pixel_format = self.pixel_format;
            }
            MediaType::Audio => {
                params.sample_rate = self.sample_rate;
                params.channel_layout = self.channel_layout;
                params.sample_format = self.sample_format;
                if let (Some(layout), Some(fmt)) = (self.channel_layout, self.sample_format) {
                    params.block_align = layout.channels() * fmt.bytes_per_sample() as u32;
                }
            }
            MediaType::Data => {}
        }
        params.has_b_frames = self.has_b_frames.unwrap_or(
            if info.capabilities.contains(CodecCapabilities::REORDER) {
                MAX_B_FRAMES
            } else {
                0
            },
        );
        params
    }
}

/// Largest supported `max_b_frames`.
pub const MAX_B_FRAMES: u32 = 8;

/// Configuration for an encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EncoderConfig {
    pub codec: CodecSelector,
    pub width: u32,
    pub height: u32,
    pub pixel_format: Option<PixelFormat>,
    pub sample_rate: u32,
    pub sample_format: Option<SampleFormat>,
    pub channel_layout: Option<ChannelLayout>,
    /// Time base of frames and packets; zero derives it from the frame rate
    /// (video) or sample rate (audio).
    pub time_base: Rational,
    pub frame_rate: Rational,
    /// Distance between keyframes.
    pub gop_size: u32,
    /// Consecutive B-frames between anchors.
    pub max_b_frames: u32,
    pub bit_rate: u64,
    /// Codec-private speed/quality preset.
    pub preset: Option<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            codec: CodecSelector::default(),
            width: 0,
            height: 0,
            pixel_format: None,
            sample_rate: 0,
            sample_format: None,
            channel_layout: None,
            time_base: Rational::zero(),
            frame_rate: Rational::new(25, 1),
            gop_size: 12,
            max_b_frames: 0,
            bit_rate: 0,
            preset: None,
        }
    }
}

impl EncoderConfig {
    /// Video encoder configuration.
    pub fn video(codec: &str, width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self {
            codec: codec.into(),
            width,
            height,
            pixel_format: Some(pixel_format),
            ..Self::default()
        }
    }

    /// Audio encoder configuration.
    pub fn audio(
        codec: &str,
        sample_rate: u32,
        channel_layout: ChannelLayout,
        sample_format: SampleFormat,
    ) -> Self {
        Self {
            codec: codec.into(),
            sample_rate,
            channel_layout: Some(channel_layout),
            sample_format: Some(sample_format),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_gop(mut self, gop_size: u32, max_b_frames: u32) -> Self {
        self.gop_size = gop_size;
        self.max_b_frames = max_b_frames;
        self
    }

    #[must_use]
    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.time_base = time_base;
        self
    }

    #[must_use]
    pub fn with_frame_rate(mut self, frame_rate: Rational) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    #[must_use]
    pub fn with_bit_rate(mut self, bit_rate: u64) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    #[must_use]
    pub fn with_preset(mut self, preset: &str) -> Self {
        self.preset = Some(preset.to_string());
        self
    }

    /// Configuration that reproduces existing stream parameters.
    pub fn from_parameters(params: &CodecParameters, time_base: Rational) -> Self {
        let defaults = Self::default();
        Self {
            codec: params.codec_id.into(),
            width: params.width,
            height: params.height,
            pixel_format: params.pixel_format,
            sample_rate: params.sample_rate,
            sample_format: params.sample_format,
            channel_layout: params.channel_layout,
            time_base,
            frame_rate: if params.frame_rate.is_positive() {
                params.frame_rate
            } else {
                defaults.frame_rate
            },
            gop_size: if params.gop_size > 0 {
                params.gop_size
            } else {
                defaults.gop_size
            },
            max_b_frames: params.has_b_frames.min(MAX_B_FRAMES),
            bit_rate: params.bit_rate,
            preset: None,
        }
    }

    /// Check the configuration against `info` and fill derived values.
    pub(crate) fn validate(mut self, info: &CodecInfo) -> Result<Self> {
        match info.codec_type {
            MediaType::Video => {
                if self.width == 0 || self.height == 0 {
                    return Err(Error::invalid_argument(format!(
                        "{} encoder needs a frame size, got {}x{}",
                        info.name, self.width, self.height
                    )));
                }
                let fmt = self.pixel_format.ok_or_else(|| {
                    Error::invalid_argument(format!("{} encoder needs a pixel format", info.name))
                })?;
                if !info.pix_fmts.contains(&fmt) {
                    return Err(Error::invalid_argument(format!(
                        "{} encoder does not support pixel format {}",
                        info.name, fmt
                    )));
                }
                if !self.frame_rate.is_positive() {
                    return Err(Error::invalid_argument(format!(
                        "invalid frame rate {}",
                        self.frame_rate
                    )));
                }
                if self.time_base.is_zero() {
                    self.time_base = self
                        .frame_rate
                        .invert()
                        .map(|r| r.reduce())
                        .unwrap_or(Rational::new(1, 25));
                }
            }
            MediaType::Audio => {
                if self.sample_rate == 0 {
                    return Err(Error::invalid_argument(format!(
                        "{} encoder needs a sample rate",
                        info.name
                    )));
                }
                let fmt = self.sample_format.ok_or_else(|| {
                    Error::invalid_argument(format!("{} encoder needs a sample format", info.name))
                })?;
                if !info.sample_fmts.contains(&fmt) {
                    return Err(Error::invalid_argument(format!(
                        "{} encoder does not support sample format {}",
                        info.name, fmt
                    )));
                }
                if self.channel_layout.is_none() {
                    self.channel_layout = Some(ChannelLayout::default());
                }
                if self.time_base.is_zero() {
                    self.time_base = Rational::new(1, self.sample_rate as i64);
                }
            }
            MediaType::Data => {
                return Err(Error::unsupported(format!(
                    "{} is not an encodable media type",
                    info.name
                )))
            }
        }
        if !self.time_base.is_positive() {
            return Err(Error::invalid_argument(format!(
                "invalid time base {}",
                self.time_base
            )));
        }
        if self.gop_size == 0 {
            return Err(Error::invalid_argument("gop_size must be at least 1"));
        }
        if self.max_b_frames > 0 && !info.capabilities.contains(CodecCapabilities::REORDER) {
            return Err(Error::invalid_argument(format!(
                "{} does not support B-frames",
                info.name
            )));
        }
        if self.max_b_frames > MAX_B_FRAMES {
            return Err(Error::invalid_argument(format!(
                "max_b_frames {} exceeds {}",
                self.max_b_frames, MAX_B_FRAMES
            )));
        }
        if let Some(preset) = &self.preset {
            if !info.presets.contains(&preset.as_str()) {
                return Err(Error::invalid_argument(format!(
                    "unknown {} preset '{}'",
                    info.name, preset
                )));
            }
        }
        Ok(self)
    }
}
