//! Media types, codec identifiers and codec parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::frame::{FrameKind, PixelFormat, VideoFormat};
use crate::rational::Rational;
use crate::sample::{ChannelLayout, SampleFormat};

/// Kind of elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    Data,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Data => write!(f, "data"),
        }
    }
}

/// Codec identifier.
///
/// Numeric ids are stable and written into container headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum CodecId {
    /// Uncompressed video.
    RawVideo,
    /// Long-GOP delta video.
    Delta,
    /// Signed 16-bit little-endian PCM.
    PcmS16le,
    /// Opaque data stream.
    Data,
}

impl CodecId {
    pub const ALL: &'static [CodecId] = &[Self::RawVideo, Self::Delta, Self::PcmS16le, Self::Data];

    pub fn name(&self) -> &'static str {
        match self {
            Self::RawVideo => "rawvideo",
            Self::Delta => "delta",
            Self::PcmS16le => "pcm_s16le",
            Self::Data => "data",
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Self::RawVideo => 13,
            Self::Delta => 0x4446_0001,
            Self::PcmS16le => 65536,
            Self::Data => 0x18000,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.id() == id)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            Self::RawVideo | Self::Delta => MediaType::Video,
            Self::PcmS16le => MediaType::Audio,
            Self::Data => MediaType::Data,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CodecId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s.trim())
            .ok_or_else(|| Error::unsupported(format!("unknown codec '{}'", s)))
    }
}

impl Serialize for CodecId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for CodecId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parameters describing an encoded stream.
///
/// Copied from demuxer streams into decoders and from encoders into muxer
/// streams. Video fields are zero/`None` for audio and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CodecParameters {
    pub codec_type: MediaType,
    pub codec_id: CodecId,
    pub width: u32,
    pub height: u32,
    pub pixel_format: Option<PixelFormat>,
    pub sample_aspect_ratio: Rational,
    /// Nominal frame rate, zero if unknown.
    pub frame_rate: Rational,
    pub sample_rate: u32,
    pub channel_layout: Option<ChannelLayout>,
    pub sample_format: Option<SampleFormat>,
    /// Bytes per interleaved sample frame (PCM).
    pub block_align: u32,
    pub bits_per_coded_sample: u32,
    pub bit_rate: u64,
    /// Decoder reorder depth: frames that may be held back before output.
    pub has_b_frames: u32,
    pub gop_size: u32,
    #[serde(skip)]
    pub extradata: Vec<u8>,
}

impl Default for CodecParameters {
    fn default() -> Self {
        Self {
            codec_type: MediaType::Data,
            codec_id: CodecId::Data,
            width: 0,
            height: 0,
            pixel_format: None,
            sample_aspect_ratio: Rational::new(1, 1),
            frame_rate: Rational::zero(),
            sample_rate: 0,
            channel_layout: None,
            sample_format: None,
            block_align: 0,
            bits_per_coded_sample: 0,
            bit_rate: 0,
            has_b_frames: 0,
            gop_size: 0,
            extradata: Vec::new(),
        }
    }
}

impl CodecParameters {
    /// Parameters for a video stream.
    pub fn video(codec_id: CodecId, width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self {
            codec_type: MediaType::Video,
            codec_id,
            width,
            height,
            pixel_format: Some(pixel_format),
            bits_per_coded_sample: pixel_format.bits_per_pixel(),
            ..Self::default()
        }
    }

    /// Parameters for an audio stream.
    pub fn audio(
        codec_id: CodecId,
        sample_rate: u32,
        channel_layout: ChannelLayout,
        sample_format: SampleFormat,
    ) -> Self {
        Self {
            codec_type: MediaType::Audio,
            codec_id,
            sample_rate,
            channel_layout: Some(channel_layout),
            sample_format: Some(sample_format),
            block_align: channel_layout.channels() * sample_format.bytes_per_sample() as u32,
            bits_per_coded_sample: sample_format.bytes_per_sample() as u32 * 8,
            ..Self::default()
        }
    }

    pub fn codec_name(&self) -> &'static str {
        self.codec_id.name()
    }

    pub fn channels(&self) -> u32 {
        self.channel_layout.map(|l| l.channels()).unwrap_or(0)
    }

    /// Video geometry, if all of it is known.
    pub fn video_format(&self) -> Option<VideoFormat> {
        match (self.codec_type, self.pixel_format) {
            (MediaType::Video, Some(pixel_format)) if self.width > 0 && self.height > 0 => {
                Some(VideoFormat {
                    width: self.width,
                    height: self.height,
                    pixel_format,
                    sample_aspect_ratio: self.sample_aspect_ratio,
                })
            }
            _ => None,
        }
    }

    /// True if a frame of `kind` matches these parameters' geometry and format.
    pub fn accepts(&self, kind: &FrameKind) -> bool {
        match kind {
            FrameKind::Video(v) => {
                self.codec_type == MediaType::Video
                    && v.width == self.width
                    && v.height == self.height
                    && Some(v.pixel_format) == self.pixel_format
            }
            FrameKind::Audio(a) => {
                self.codec_type == MediaType::Audio
                    && a.sample_rate == self.sample_rate
                    && Some(a.sample_format) == self.sample_format
                    && Some(a.channel_layout) == self.channel_layout
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn test_codec_id_lookup() {
        assert_eq!(CodecId::from_name("delta"), Some(CodecId::Delta));
        assert_eq!(CodecId::from_id(13), Some(CodecId::RawVideo));
        assert_eq!(CodecId::PcmS16le.media_type(), MediaType::Audio);
        assert!(matches!(
            "h264".parse::<CodecId>(),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_audio_block_align() {
        let p = CodecParameters::audio(
            CodecId::PcmS16le,
            48000,
            ChannelLayout::Stereo,
            SampleFormat::S16,
        );
        assert_eq!(p.block_align, 4);
        assert_eq!(p.bits_per_coded_sample, 16);
        assert_eq!(p.channels(), 2);
    }

    #[test]
    fn test_accepts_frame() {
        let p = CodecParameters::video(CodecId::RawVideo, 64, 48, PixelFormat::Yuv420p);
        let ok = Frame::video(64, 48, PixelFormat::Yuv420p);
        let wrong = Frame::video(64, 48, PixelFormat::Rgb24);
        assert!(p.accepts(ok.kind()));
        assert!(!p.accepts(wrong.kind()));
    }

    #[test]
    fn test_params_json_rejects_unknown_fields() {
        let json = r#"{"codec_type":"video","codec_id":"rawvideo","width":4,"bogus":1}"#;
        assert!(serde_json::from_str::<CodecParameters>(json).is_err());
        let json = r#"{"codec_type":"video","codec_id":"rawvideo","width":4,"height":2,"pixel_format":"gray"}"#;
        let p: CodecParameters = serde_json::from_str(json).unwrap();
        assert_eq!(p.video_format().unwrap().width, 4);
    }
}
