//! Construction and call options for demuxers and muxers.

use std::collections::BTreeMap;

use mediaflow_core::{CodecParameters, Error, PixelFormat, Rational, Result};
use serde::{Deserialize, Serialize};

use crate::io::{MediaSink, MediaSource};

/// String-keyed private options, as given on a command line.
pub type FormatOptions = BTreeMap<String, String>;

/// Options for [`Demuxer::open`](crate::Demuxer::open).
#[derive(Debug)]
pub struct DemuxerOptions {
    pub source: MediaSource,
    /// Demuxer name; probed from the data and URL when absent.
    pub format: Option<String>,
    /// Demuxer private options (see [`DemuxerPrivateOptions`]).
    pub options: FormatOptions,
}

impl DemuxerOptions {
    pub fn new(source: impl Into<MediaSource>) -> Self {
        Self {
            source: source.into(),
            format: None,
            options: FormatOptions::new(),
        }
    }

    #[must_use]
    pub fn with_format(mut self, name: &str) -> Self {
        self.format = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: &str, value: impl ToString) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }
}

impl From<&str> for DemuxerOptions {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<MediaSource> for DemuxerOptions {
    fn from(source: MediaSource) -> Self {
        Self::new(source)
    }
}

/// Typed demuxer private options.
///
/// Headerless formats need these to describe their single stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemuxerPrivateOptions {
    /// `WxH` or an abbreviation such as `vga` or `hd720`.
    pub video_size: Option<(u32, u32)>,
    pub pixel_format: Option<PixelFormat>,
    pub framerate: Option<Rational>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    /// Bytes per packet for raw audio.
    pub packetsize: Option<usize>,
}

impl DemuxerPrivateOptions {
    /// Parse a string map, rejecting unknown keys.
    pub fn parse(options: &FormatOptions) -> Result<Self> {
        let mut out = Self::default();
        for (key, value) in options {
            match key.as_str() {
                "video_size" => out.video_size = Some(parse_video_size(value)?),
                "pixel_format" => out.pixel_format = Some(value.parse()?),
                "framerate" => {
                    let rate: Rational = value.parse()?;
                    if !rate.is_positive() {
                        return Err(Error::invalid_argument(format!(
                            "framerate must be positive, got {}",
                            value
                        )));
                    }
                    out.framerate = Some(rate);
                }
                "sample_rate" => out.sample_rate = Some(parse_positive(key, value)? as u32),
                "channels" => out.channels = Some(parse_positive(key, value)? as u32),
                "packetsize" => out.packetsize = Some(parse_positive(key, value)? as usize),
                _ => {
                    return Err(Error::invalid_argument(format!(
                        "unknown demuxer option '{}'",
                        key
                    )))
                }
            }
        }
        Ok(out)
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u64> {
    match value.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(Error::invalid_argument(format!(
            "{} must be a positive integer, got '{}'",
            key, value
        ))),
    }
}

/// Parse `WxH` or a size abbreviation.
pub fn parse_video_size(value: &str) -> Result<(u32, u32)> {
    let named = match value {
        "qcif" => Some((176, 144)),
        "cif" => Some((352, 288)),
        "vga" => Some((640, 480)),
        "hd720" => Some((1280, 720)),
        "hd1080" => Some((1920, 1080)),
        _ => None,
    };
    if let Some(size) = named {
        return Ok(size);
    }
    let invalid = || Error::invalid_argument(format!("invalid video size '{}'", value));
    let (w, h) = value.split_once(['x', 'X']).ok_or_else(invalid)?;
    let w: u32 = w.trim().parse().map_err(|_| invalid())?;
    let h: u32 = h.trim().parse().map_err(|_| invalid())?;
    if w == 0 || h == 0 {
        return Err(invalid());
    }
    Ok((w, h))
}

/// What a seek lands on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekTarget {
    /// Packet number within the stream, counting from 0 in container order.
    Frame(u64),
    /// Presentation timestamp in the stream's time base.
    Timestamp(i64),
    /// Seconds from the start of the primary stream.
    Time(f64),
    /// Byte offset into the source.
    Pos(u64),
}

/// Options for [`Demuxer::seek`](crate::Demuxer::seek).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeekOptions {
    /// Stream for `Frame` and `Timestamp` targets; the primary stream if
    /// absent.
    #[serde(default)]
    pub stream_index: Option<usize>,
    pub target: SeekTarget,
    /// Land on the nearest keyframe at or before the target instead of at
    /// or after it.
    #[serde(default)]
    pub backward: bool,
    /// Allow landing on non-key packets.
    #[serde(default)]
    pub any: bool,
}

impl SeekOptions {
    pub fn new(target: SeekTarget) -> Self {
        Self {
            stream_index: None,
            target,
            backward: false,
            any: false,
        }
    }

    pub fn timestamp(stream_index: usize, pts: i64) -> Self {
        Self::new(SeekTarget::Timestamp(pts)).with_stream(stream_index)
    }

    pub fn frame(stream_index: usize, frame: u64) -> Self {
        Self::new(SeekTarget::Frame(frame)).with_stream(stream_index)
    }

    pub fn time(seconds: f64) -> Self {
        Self::new(SeekTarget::Time(seconds))
    }

    pub fn pos(bytes: u64) -> Self {
        Self::new(SeekTarget::Pos(bytes))
    }

    #[must_use]
    pub fn with_stream(mut self, stream_index: usize) -> Self {
        self.stream_index = Some(stream_index);
        self
    }

    #[must_use]
    pub fn backward(mut self, backward: bool) -> Self {
        self.backward = backward;
        self
    }

    #[must_use]
    pub fn any(mut self, any: bool) -> Self {
        self.any = any;
        self
    }
}

/// Options for [`Muxer::new`](crate::Muxer::new).
///
/// `format_name` wins over the extension of `filename`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MuxerOptions {
    pub filename: Option<String>,
    pub format_name: Option<String>,
}

impl MuxerOptions {
    pub fn filename(filename: &str) -> Self {
        Self {
            filename: Some(filename.to_string()),
            format_name: None,
        }
    }

    pub fn format_name(name: &str) -> Self {
        Self {
            filename: None,
            format_name: Some(name.to_string()),
        }
    }
}

/// Options for [`Muxer::new_stream`](crate::Muxer::new_stream).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StreamOptions {
    pub codec_name: String,
    /// Stream time base; zero picks a default when the header is written.
    pub time_base: Rational,
    /// Reorder this stream's packets against other interleaved streams.
    pub interleaved: bool,
    /// Initial codec parameters; the codec id and media type always follow
    /// `codec_name`.
    pub codecpar: Option<CodecParameters>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            codec_name: String::new(),
            time_base: Rational::zero(),
            interleaved: true,
            codecpar: None,
        }
    }
}

impl StreamOptions {
    pub fn new(codec_name: &str, time_base: Rational) -> Self {
        Self {
            codec_name: codec_name.to_string(),
            time_base,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_codecpar(mut self, codecpar: CodecParameters) -> Self {
        self.codecpar = Some(codecpar);
        self
    }

    #[must_use]
    pub fn interleaved(mut self, interleaved: bool) -> Self {
        self.interleaved = interleaved;
        self
    }
}

/// Options for [`Muxer::open_io`](crate::Muxer::open_io).
#[derive(Debug, Clone, Default)]
pub struct IoOptions {
    pub sink: Option<MediaSink>,
    /// Muxer private options.
    pub options: FormatOptions,
}

impl IoOptions {
    pub fn new(sink: impl Into<MediaSink>) -> Self {
        Self {
            sink: Some(sink.into()),
            options: FormatOptions::new(),
        }
    }

    #[must_use]
    pub fn with_option(mut self, key: &str, value: impl ToString) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> FormatOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_private_options() {
        let opts = DemuxerPrivateOptions::parse(&map(&[
            ("video_size", "320x240"),
            ("pixel_format", "yuv420p"),
            ("framerate", "30000/1001"),
        ]))
        .unwrap();
        assert_eq!(opts.video_size, Some((320, 240)));
        assert_eq!(opts.pixel_format, Some(PixelFormat::Yuv420p));
        assert_eq!(opts.framerate, Some(Rational::new(30000, 1001)));
    }

    #[test]
    fn test_private_options_reject_unknown() {
        let err = DemuxerPrivateOptions::parse(&map(&[("probesize", "32")])).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(DemuxerPrivateOptions::parse(&map(&[("channels", "0")])).is_err());
        assert!(DemuxerPrivateOptions::parse(&map(&[("video_size", "12")])).is_err());
    }

    #[test]
    fn test_video_size_abbreviation() {
        assert_eq!(parse_video_size("hd720").unwrap(), (1280, 720));
        assert_eq!(parse_video_size("64X48").unwrap(), (64, 48));
    }

    #[test]
    fn test_seek_options_json() {
        let opts: SeekOptions =
            serde_json::from_str(r#"{"target": {"time": 1.5}, "backward": true}"#).unwrap();
        assert_eq!(opts, SeekOptions::time(1.5).backward(true));
        assert!(serde_json::from_str::<SeekOptions>(r#"{"target": {"pos": 0}, "flags": 1}"#).is_err());
    }
}
