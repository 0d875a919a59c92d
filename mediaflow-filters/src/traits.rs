//! The filter seam and the link properties negotiated between filters.

use std::fmt;

use mediaflow_core::{
    ChannelLayout, CodecParameters, Error, Frame, FrameKind, MediaType, PixelFormat, Rational,
    Result, SampleFormat,
};
use serde::{Deserialize, Serialize};

use crate::parser::FilterArgs;

/// Format of the video frames carried by a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoLink {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub time_base: Rational,
    #[serde(default = "square_pixels")]
    pub pixel_aspect: Rational,
    /// Nominal frame rate, zero if unknown.
    #[serde(default)]
    pub frame_rate: Rational,
}

fn square_pixels() -> Rational {
    Rational::new(1, 1)
}

impl VideoLink {
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat, time_base: Rational) -> Self {
        Self {
            width,
            height,
            pixel_format,
            time_base,
            pixel_aspect: square_pixels(),
            frame_rate: Rational::zero(),
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: Rational) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_pixel_aspect(mut self, pixel_aspect: Rational) -> Self {
        self.pixel_aspect = pixel_aspect;
        self
    }
}

/// Format of the audio frames carried by a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioLink {
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    pub channel_layout: ChannelLayout,
    pub time_base: Rational,
}

impl AudioLink {
    /// Audio link whose time base is one tick per sample.
    pub fn new(sample_rate: u32, sample_format: SampleFormat, channel_layout: ChannelLayout) -> Self {
        Self {
            sample_rate,
            sample_format,
            channel_layout,
            time_base: Rational::new(1, i64::from(sample_rate.max(1))),
        }
    }

    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.time_base = time_base;
        self
    }
}

/// Properties of one link in a filter graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LinkProps {
    Video(VideoLink),
    Audio(AudioLink),
}

impl LinkProps {
    /// Link properties for frames decoded from a stream with `params`.
    pub fn from_parameters(params: &CodecParameters, time_base: Rational) -> Result<Self> {
        match params.codec_type {
            MediaType::Video => {
                let v = params.video_format().ok_or_else(|| {
                    Error::invalid_argument("video stream without complete geometry")
                })?;
                Ok(LinkProps::Video(
                    VideoLink::new(v.width, v.height, v.pixel_format, time_base)
                        .with_pixel_aspect(v.sample_aspect_ratio)
                        .with_frame_rate(params.frame_rate),
                ))
            }
            MediaType::Audio => match (params.sample_format, params.channel_layout) {
                (Some(sample_format), Some(channel_layout)) if params.sample_rate > 0 => {
                    Ok(LinkProps::Audio(
                        AudioLink::new(params.sample_rate, sample_format, channel_layout)
                            .with_time_base(time_base),
                    ))
                }
                _ => Err(Error::invalid_argument(
                    "audio stream without sample rate, format or layout",
                )),
            },
            other => Err(Error::invalid_argument(format!(
                "{} streams cannot be filtered",
                other
            ))),
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            LinkProps::Video(_) => MediaType::Video,
            LinkProps::Audio(_) => MediaType::Audio,
        }
    }

    pub fn time_base(&self) -> Rational {
        match self {
            LinkProps::Video(v) => v.time_base,
            LinkProps::Audio(a) => a.time_base,
        }
    }

    pub fn as_video(&self) -> Option<&VideoLink> {
        match self {
            LinkProps::Video(v) => Some(v),
            LinkProps::Audio(_) => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioLink> {
        match self {
            LinkProps::Audio(a) => Some(a),
            LinkProps::Video(_) => None,
        }
    }

    /// Fail unless `frame` fits this link.
    ///
    /// Audio frames may carry any number of samples.
    pub fn check_frame(&self, frame: &Frame, what: &str) -> Result<()> {
        match (self, frame.kind()) {
            (LinkProps::Video(link), FrameKind::Video(v)) => {
                if v.width != link.width
                    || v.height != link.height
                    || v.pixel_format != link.pixel_format
                {
                    return Err(Error::invalid_argument(format!(
                        "{}: expected {}x{} {}, got {}x{} {}",
                        what,
                        link.width,
                        link.height,
                        link.pixel_format,
                        v.width,
                        v.height,
                        v.pixel_format
                    )));
                }
            }
            (LinkProps::Audio(link), FrameKind::Audio(a)) => {
                if a.sample_rate != link.sample_rate
                    || a.sample_format != link.sample_format
                    || a.channel_layout != link.channel_layout
                {
                    return Err(Error::invalid_argument(format!(
                        "{}: expected {} Hz {} {}, got {} Hz {} {}",
                        what,
                        link.sample_rate,
                        link.sample_format,
                        link.channel_layout,
                        a.sample_rate,
                        a.sample_format,
                        a.channel_layout
                    )));
                }
            }
            _ => {
                return Err(Error::invalid_argument(format!(
                    "{}: expected a {} frame, got {}",
                    what,
                    self.media_type(),
                    frame.media_type()
                )))
            }
        }
        if !frame.is_allocated() {
            return Err(Error::invalid_argument(format!(
                "{}: frame has no data",
                what
            )));
        }
        Ok(())
    }
}

impl fmt::Display for LinkProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkProps::Video(v) => {
                write!(
                    f,
                    "video {}x{} {} tb={} sar={}",
                    v.width, v.height, v.pixel_format, v.time_base, v.pixel_aspect
                )?;
                if !v.frame_rate.is_zero() {
                    write!(f, " fps={}", v.frame_rate)?;
                }
                Ok(())
            }
            LinkProps::Audio(a) => write!(
                f,
                "audio {} Hz {} {} tb={}",
                a.sample_rate, a.sample_format, a.channel_layout, a.time_base
            ),
        }
    }
}

/// A frame leaving a filter on output pad `.0`.
pub type PadFrame = (usize, Frame);

/// One node of a filter graph.
///
/// The graph calls `configure` once with the properties of every input link,
/// then `filter` for each frame and finally `flush` once every input has
/// ended. Frames passed to `filter` already match the configured input.
pub trait Filter: Send {
    fn name(&self) -> &'static str;

    fn nb_inputs(&self) -> usize {
        1
    }

    fn nb_outputs(&self) -> usize {
        1
    }

    /// Validate the input links and return the output links.
    fn configure(&mut self, inputs: &[LinkProps]) -> Result<Vec<LinkProps>>;

    /// Process one frame that arrived on input pad `input`.
    fn filter(&mut self, input: usize, frame: Frame) -> Result<Vec<PadFrame>>;

    /// Release anything held back.
    fn flush(&mut self) -> Result<Vec<PadFrame>> {
        Ok(Vec::new())
    }
}

/// Constructs a filter from its parsed arguments.
pub type FilterFactory = fn(&FilterArgs) -> Result<Box<dyn Filter>>;

/// Number of pads on one side of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadCount {
    Fixed(usize),
    /// Chosen by an argument.
    Dynamic,
}

impl fmt::Display for PadCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PadCount::Fixed(n) => write!(f, "{}", n),
            PadCount::Dynamic => f.write_str("N"),
        }
    }
}

/// Registry entry for a built-in filter.
#[derive(Clone, Copy)]
pub struct FilterInfo {
    pub name: &'static str,
    pub description: &'static str,
    /// Media type of every pad.
    pub media_type: MediaType,
    pub inputs: PadCount,
    pub outputs: PadCount,
    pub create: FilterFactory,
}

impl fmt::Debug for FilterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterInfo")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

/// Check that a filter got exactly one input of `media_type`.
pub(crate) fn single_input<'a>(
    name: &str,
    inputs: &'a [LinkProps],
    media_type: MediaType,
) -> Result<&'a LinkProps> {
    match inputs {
        [link] if link.media_type() == media_type => Ok(link),
        [link] => Err(Error::invalid_argument(format!(
            "{} needs {} input, got {}",
            name,
            media_type,
            link.media_type()
        ))),
        _ => Err(Error::invalid_argument(format!(
            "{} needs exactly one input, got {}",
            name,
            inputs.len()
        ))),
    }
}

/// Copy timing and flags from `src` onto a newly built frame.
pub(crate) fn copy_props(src: &Frame, dst: &mut Frame) {
    dst.pts = src.pts;
    dst.pkt_dts = src.pkt_dts;
    dst.best_effort_timestamp = src.best_effort_timestamp;
    dst.duration = src.duration;
    dst.time_base = src.time_base;
    dst.flags = src.flags;
}
