//! Raw (decoded) video and audio frames.
//!
//! Frames follow a factory-then-materialise lifecycle: [`Frame::video`] and
//! [`Frame::audio`] describe the frame without storage, and [`Frame::alloc`]
//! sizes and allocates the planes. [`Frame::with_planes`] adopts caller
//! buffers after validating them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::format::MediaType;
use crate::rational::Rational;
use crate::sample::{ChannelLayout, SampleFormat};

/// Video row alignment in bytes used by [`Frame::alloc`].
pub const LINESIZE_ALIGN: usize = 32;

/// Pixel format for video frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12bpp.
    Yuv420p,
    /// Planar YUV 4:2:2, 16bpp.
    Yuv422p,
    /// Planar YUV 4:4:4, 24bpp.
    Yuv444p,
    /// Y plane plus interleaved UV plane, 4:2:0.
    Nv12,
    /// Packed RGB 8:8:8.
    Rgb24,
    /// Packed BGR 8:8:8.
    Bgr24,
    /// Packed RGBA 8:8:8:8.
    Rgba,
    /// Packed BGRA 8:8:8:8.
    Bgra,
    /// Grayscale, 8bpp.
    Gray8,
    /// Grayscale, 16bpp little endian.
    Gray16le,
}

impl PixelFormat {
    /// Every supported pixel format.
    pub const ALL: &'static [PixelFormat] = &[
        Self::Yuv420p,
        Self::Yuv422p,
        Self::Yuv444p,
        Self::Nv12,
        Self::Rgb24,
        Self::Bgr24,
        Self::Rgba,
        Self::Bgra,
        Self::Gray8,
        Self::Gray16le,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Yuv420p => "yuv420p",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
            Self::Nv12 => "nv12",
            Self::Rgb24 => "rgb24",
            Self::Bgr24 => "bgr24",
            Self::Rgba => "rgba",
            Self::Bgra => "bgra",
            Self::Gray8 => "gray",
            Self::Gray16le => "gray16le",
        }
    }

    /// Number of planes.
    pub fn num_planes(&self) -> usize {
        match self {
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p => 3,
            Self::Nv12 => 2,
            _ => 1,
        }
    }

    /// Number of colour components.
    pub fn num_components(&self) -> usize {
        match self {
            Self::Rgba | Self::Bgra => 4,
            Self::Gray8 | Self::Gray16le => 1,
            _ => 3,
        }
    }

    /// log2 of the chroma subsampling factors (horizontal, vertical).
    pub fn chroma_shift(&self) -> (u32, u32) {
        match self {
            Self::Yuv420p | Self::Nv12 => (1, 1),
            Self::Yuv422p => (1, 0),
            _ => (0, 0),
        }
    }

    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            Self::Yuv420p | Self::Nv12 => 12,
            Self::Yuv422p | Self::Gray16le => 16,
            Self::Yuv444p | Self::Rgb24 | Self::Bgr24 => 24,
            Self::Rgba | Self::Bgra => 32,
            Self::Gray8 => 8,
        }
    }

    pub fn is_planar(&self) -> bool {
        matches!(self, Self::Yuv420p | Self::Yuv422p | Self::Yuv444p | Self::Nv12)
    }

    pub fn is_rgb(&self) -> bool {
        matches!(self, Self::Rgb24 | Self::Bgr24 | Self::Rgba | Self::Bgra)
    }

    /// Bytes per pixel element within `plane`.
    ///
    /// An element is the unit that moves together when the image is
    /// resampled, e.g. one interleaved UV pair in NV12.
    pub fn element_size(&self, plane: usize) -> usize {
        match (self, plane) {
            (Self::Nv12, 1) => 2,
            (Self::Rgb24 | Self::Bgr24, _) => 3,
            (Self::Rgba | Self::Bgra, _) => 4,
            (Self::Gray16le, _) => 2,
            _ => 1,
        }
    }

    /// Plane size in elements (columns, rows) for a `width` x `height` image.
    pub fn plane_dimensions(&self, plane: usize, width: u32, height: u32) -> (usize, usize) {
        let (w, h) = (width as usize, height as usize);
        if plane == 0 {
            return (w, h);
        }
        let (sx, sy) = self.chroma_shift();
        let cw = (w + (1 << sx) - 1) >> sx;
        let ch = (h + (1 << sy) - 1) >> sy;
        (cw, ch)
    }

    /// Minimum bytes per row of `plane`.
    pub fn min_linesize(&self, plane: usize, width: u32) -> usize {
        let (cols, _) = self.plane_dimensions(plane, width, 1);
        cols * self.element_size(plane)
    }

    /// Bytes for a whole image with rows packed back to back.
    pub fn image_size(&self, width: u32, height: u32) -> usize {
        (0..self.num_planes())
            .map(|p| {
                let (_, rows) = self.plane_dimensions(p, width, height);
                self.min_linesize(p, width) * rows
            })
            .sum()
    }

    fn descriptor(&self) -> PixFmtDescriptor {
        let (log2_chroma_w, log2_chroma_h) = self.chroma_shift();
        let mut flags = PixFmtFlags::empty();
        if self.is_planar() {
            flags |= PixFmtFlags::PLANAR;
        }
        if self.is_rgb() {
            flags |= PixFmtFlags::RGB;
        }
        if matches!(self, Self::Rgba | Self::Bgra) {
            flags |= PixFmtFlags::ALPHA;
        }
        PixFmtDescriptor {
            name: self.name(),
            format: *self,
            nb_components: self.num_components(),
            nb_planes: self.num_planes(),
            bits_per_pixel: self.bits_per_pixel(),
            log2_chroma_w,
            log2_chroma_h,
            flags,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s {
            "gray8" => return Ok(Self::Gray8),
            "gray16" => return Ok(Self::Gray16le),
            _ => {}
        }
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .ok_or_else(|| Error::invalid_argument(format!("unknown pixel format '{}'", s)))
    }
}

impl Serialize for PixelFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for PixelFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

bitflags! {
    /// Pixel format properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PixFmtFlags: u32 {
        const PLANAR = 0x0001;
        const RGB = 0x0002;
        const ALPHA = 0x0004;
    }
}

/// Static description of a pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixFmtDescriptor {
    pub name: &'static str,
    pub format: PixelFormat,
    pub nb_components: usize,
    pub nb_planes: usize,
    pub bits_per_pixel: u32,
    pub log2_chroma_w: u32,
    pub log2_chroma_h: u32,
    pub flags: PixFmtFlags,
}

/// All pixel formats, keyed by name.
pub fn pix_fmts() -> &'static BTreeMap<&'static str, PixFmtDescriptor> {
    static PIX_FMTS: OnceLock<BTreeMap<&'static str, PixFmtDescriptor>> = OnceLock::new();
    PIX_FMTS.get_or_init(|| {
        PixelFormat::ALL
            .iter()
            .map(|f| (f.name(), f.descriptor()))
            .collect()
    })
}

bitflags! {
    /// Frame flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u32 {
        /// Frame was coded as a keyframe.
        const KEY = 0x0001;
        /// Frame content is damaged; decoding continued past an error.
        const CORRUPT = 0x0002;
        /// Frame is for reference only and should not be output.
        const DISCARD = 0x0004;
    }
}

/// Geometry and format of a video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub sample_aspect_ratio: Rational,
}

/// Layout and format of an audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub nb_samples: usize,
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    /// Bytes in one plane for this layout.
    pub fn plane_size(&self) -> usize {
        let per_sample = self.sample_format.bytes_per_sample();
        if self.sample_format.is_planar() {
            self.nb_samples * per_sample
        } else {
            self.nb_samples * per_sample * self.channel_layout.channels() as usize
        }
    }

    pub fn num_planes(&self) -> usize {
        if self.sample_format.is_planar() {
            self.channel_layout.channels() as usize
        } else {
            1
        }
    }
}

/// What kind of data a frame holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Video(VideoFormat),
    Audio(AudioFormat),
}

/// One plane of frame data.
#[derive(Clone, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    /// Bytes per row (video) or plane size (audio).
    pub linesize: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, linesize: usize) -> Self {
        Self { data, linesize }
    }
}

impl fmt::Debug for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plane")
            .field("len", &self.data.len())
            .field("linesize", &self.linesize)
            .finish()
    }
}

/// A decoded frame.
#[derive(Clone, PartialEq)]
pub struct Frame {
    kind: FrameKind,
    planes: Vec<Plane>,
    /// Presentation timestamp in `time_base` units.
    pub pts: Option<i64>,
    /// Decode timestamp of the packet that produced this frame.
    pub pkt_dts: Option<i64>,
    /// Best guess of the presentation time.
    pub best_effort_timestamp: Option<i64>,
    /// Duration in `time_base` units, 0 if unknown.
    pub duration: i64,
    /// Unit of `pts` and `duration`; zero means "the receiving stage's".
    pub time_base: Rational,
    pub flags: FrameFlags,
}

impl Frame {
    fn with_kind(kind: FrameKind) -> Self {
        Self {
            kind,
            planes: Vec::new(),
            pts: None,
            pkt_dts: None,
            best_effort_timestamp: None,
            duration: 0,
            time_base: Rational::zero(),
            flags: FrameFlags::empty(),
        }
    }

    /// Describe an unallocated video frame.
    pub fn video(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self::with_kind(FrameKind::Video(VideoFormat {
            width,
            height,
            pixel_format,
            sample_aspect_ratio: Rational::new(1, 1),
        }))
    }

    /// Describe an unallocated audio frame.
    pub fn audio(
        nb_samples: usize,
        sample_rate: u32,
        channel_layout: ChannelLayout,
        sample_format: SampleFormat,
    ) -> Self {
        Self::with_kind(FrameKind::Audio(AudioFormat {
            nb_samples,
            sample_rate,
            channel_layout,
            sample_format,
        }))
    }

    /// Describe an unallocated frame of the given kind.
    pub fn of_kind(kind: FrameKind) -> Self {
        Self::with_kind(kind)
    }

    /// Allocate zeroed planes sized for the frame description.
    ///
    /// Video rows are padded to [`LINESIZE_ALIGN`] bytes.
    pub fn alloc(&mut self) -> Result<()> {
        self.planes = self.layout()?
            .into_iter()
            .map(|(linesize, size)| Plane::new(vec![0u8; size], linesize))
            .collect();
        Ok(())
    }

    /// Allocate and return `self`, for builder-style construction.
    pub fn allocated(mut self) -> Result<Self> {
        self.alloc()?;
        Ok(self)
    }

    /// Build a frame of `kind` over caller-supplied planes.
    pub fn from_planes(kind: FrameKind, planes: Vec<Plane>) -> Result<Self> {
        Self::with_kind(kind).with_planes(planes)
    }

    /// Adopt caller-supplied planes after validating their sizes.
    pub fn with_planes(mut self, planes: Vec<Plane>) -> Result<Self> {
        self.planes = planes;
        self.validate()?;
        Ok(self)
    }

    /// (linesize, byte size) for each plane of a freshly allocated frame.
    pub fn layout(&self) -> Result<Vec<(usize, usize)>> {
        match self.kind {
            FrameKind::Video(v) => {
                if v.width == 0 || v.height == 0 {
                    return Err(Error::invalid_argument(format!(
                        "invalid video frame size {}x{}",
                        v.width, v.height
                    )));
                }
                Ok((0..v.pixel_format.num_planes())
                    .map(|p| {
                        let min = v.pixel_format.min_linesize(p, v.width);
                        let linesize = (min + LINESIZE_ALIGN - 1) & !(LINESIZE_ALIGN - 1);
                        let (_, rows) = v.pixel_format.plane_dimensions(p, v.width, v.height);
                        (linesize, linesize * rows)
                    })
                    .collect())
            }
            FrameKind::Audio(a) => {
                if a.nb_samples == 0 || a.sample_rate == 0 {
                    return Err(Error::invalid_argument(format!(
                        "invalid audio frame: {} samples at {} Hz",
                        a.nb_samples, a.sample_rate
                    )));
                }
                let size = a.plane_size();
                Ok(vec![(size, size); a.num_planes()])
            }
        }
    }

    /// Check that the planes can hold the described image or samples.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            FrameKind::Video(v) => {
                let fmt = v.pixel_format;
                if self.planes.len() != fmt.num_planes() {
                    return Err(Error::invalid_argument(format!(
                        "{} frame needs {} planes, got {}",
                        fmt,
                        fmt.num_planes(),
                        self.planes.len()
                    )));
                }
                for (i, plane) in self.planes.iter().enumerate() {
                    let min = fmt.min_linesize(i, v.width);
                    let (_, rows) = fmt.plane_dimensions(i, v.width, v.height);
                    if plane.linesize < min {
                        return Err(Error::invalid_argument(format!(
                            "plane {} linesize {} below minimum {}",
                            i, plane.linesize, min
                        )));
                    }
                    let needed = plane.linesize * rows.saturating_sub(1) + min;
                    if plane.data.len() < needed {
                        return Err(Error::invalid_argument(format!(
                            "plane {} holds {} bytes, needs {}",
                            i,
                            plane.data.len(),
                            needed
                        )));
                    }
                }
            }
            FrameKind::Audio(a) => {
                if self.planes.len() != a.num_planes() {
                    return Err(Error::invalid_argument(format!(
                        "{} audio frame needs {} planes, got {}",
                        a.sample_format,
                        a.num_planes(),
                        self.planes.len()
                    )));
                }
                let needed = a.plane_size();
                if let Some((i, plane)) = self
                    .planes
                    .iter()
                    .enumerate()
                    .find(|(_, p)| p.data.len() < needed)
                {
                    return Err(Error::invalid_argument(format!(
                        "audio plane {} holds {} bytes, needs {}",
                        i,
                        plane.data.len(),
                        needed
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> &FrameKind {
        &self.kind
    }

    pub fn media_type(&self) -> MediaType {
        match self.kind {
            FrameKind::Video(_) => MediaType::Video,
            FrameKind::Audio(_) => MediaType::Audio,
        }
    }

    pub fn video_format(&self) -> Option<&VideoFormat> {
        match &self.kind {
            FrameKind::Video(v) => Some(v),
            FrameKind::Audio(_) => None,
        }
    }

    pub fn video_format_mut(&mut self) -> Option<&mut VideoFormat> {
        match &mut self.kind {
            FrameKind::Video(v) => Some(v),
            FrameKind::Audio(_) => None,
        }
    }

    pub fn audio_format(&self) -> Option<&AudioFormat> {
        match &self.kind {
            FrameKind::Audio(a) => Some(a),
            FrameKind::Video(_) => None,
        }
    }

    pub fn is_allocated(&self) -> bool {
        !self.planes.is_empty()
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn planes_mut(&mut self) -> &mut [Plane] {
        &mut self.planes
    }

    /// Detach the planes, leaving the frame unallocated.
    pub fn take_planes(&mut self) -> Vec<Plane> {
        std::mem::take(&mut self.planes)
    }

    pub fn is_key(&self) -> bool {
        self.flags.contains(FrameFlags::KEY)
    }

    /// Rescale `pts`, `best_effort_timestamp` and `duration` into `target`.
    ///
    /// A frame with a zero time base simply adopts `target`; a zero
    /// `target` is ignored.
    pub fn rescale_ts(&mut self, target: Rational) {
        if target.is_zero() {
            return;
        }
        let from = self.time_base;
        if from != target && !from.is_zero() {
            self.pts = self.pts.map(|v| from.rescale(v, target));
            self.pkt_dts = self.pkt_dts.map(|v| from.rescale(v, target));
            self.best_effort_timestamp = self.best_effort_timestamp.map(|v| from.rescale(v, target));
            self.duration = from.rescale(self.duration, target);
        }
        self.time_base = target;
    }

    pub fn is_corrupt(&self) -> bool {
        self.flags.contains(FrameFlags::CORRUPT)
    }

    /// Copy the visible image or samples into one contiguous buffer,
    /// dropping row padding.
    pub fn to_packed_bytes(&self) -> Vec<u8> {
        match self.kind {
            FrameKind::Video(v) => {
                let mut out = Vec::with_capacity(v.pixel_format.image_size(v.width, v.height));
                for (i, plane) in self.planes.iter().enumerate() {
                    let row = v.pixel_format.min_linesize(i, v.width);
                    let (_, rows) = v.pixel_format.plane_dimensions(i, v.width, v.height);
                    for r in 0..rows {
                        let start = r * plane.linesize;
                        out.extend_from_slice(&plane.data[start..start + row]);
                    }
                }
                out
            }
            FrameKind::Audio(a) => {
                let size = a.plane_size();
                let mut out = Vec::with_capacity(size * self.planes.len());
                for plane in &self.planes {
                    out.extend_from_slice(&plane.data[..size]);
                }
                out
            }
        }
    }

    /// Fill allocated planes from a contiguous buffer in the layout written
    /// by [`Frame::to_packed_bytes`]. Returns the number of bytes consumed;
    /// a short `src` leaves the remaining rows untouched.
    pub fn fill_from_packed(&mut self, src: &[u8]) -> usize {
        let mut offset = 0;
        match self.kind {
            FrameKind::Video(v) => {
                for (i, plane) in self.planes.iter_mut().enumerate() {
                    let row = v.pixel_format.min_linesize(i, v.width);
                    let (_, rows) = v.pixel_format.plane_dimensions(i, v.width, v.height);
                    for r in 0..rows {
                        let n = row.min(src.len().saturating_sub(offset));
                        if n == 0 {
                            return offset;
                        }
                        let start = r * plane.linesize;
                        plane.data[start..start + n].copy_from_slice(&src[offset..offset + n]);
                        offset += n;
                    }
                }
            }
            FrameKind::Audio(a) => {
                let size = a.plane_size();
                for plane in &mut self.planes {
                    let n = size.min(src.len().saturating_sub(offset));
                    plane.data[..n].copy_from_slice(&src[offset..offset + n]);
                    offset += n;
                }
            }
        }
        offset
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Frame");
        match &self.kind {
            FrameKind::Video(v) => {
                s.field("width", &v.width)
                    .field("height", &v.height)
                    .field("format", &v.pixel_format);
            }
            FrameKind::Audio(a) => {
                s.field("nb_samples", &a.nb_samples)
                    .field("sample_rate", &a.sample_rate)
                    .field("format", &a.sample_format);
            }
        }
        s.field("pts", &self.pts)
            .field("time_base", &self.time_base)
            .field("flags", &self.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_planes() {
        assert_eq!(PixelFormat::Yuv420p.num_planes(), 3);
        assert_eq!(PixelFormat::Nv12.num_planes(), 2);
        assert_eq!(PixelFormat::Rgb24.num_planes(), 1);
    }

    #[test]
    fn test_odd_chroma_rounds_up() {
        assert_eq!(PixelFormat::Yuv420p.plane_dimensions(1, 5, 3), (3, 2));
        assert_eq!(PixelFormat::Yuv422p.plane_dimensions(2, 5, 3), (3, 3));
        assert_eq!(PixelFormat::Nv12.min_linesize(1, 5), 6);
        assert_eq!(PixelFormat::Yuv420p.image_size(4, 4), 16 + 4 + 4);
    }

    #[test]
    fn test_alloc_aligns_linesize() {
        let frame = Frame::video(100, 50, PixelFormat::Yuv420p).allocated().unwrap();
        let planes = frame.planes();
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[0].linesize, 128);
        assert_eq!(planes[0].data.len(), 128 * 50);
        assert_eq!(planes[1].linesize, 64);
        assert_eq!(planes[1].data.len(), 64 * 25);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_alloc_rejects_zero_size() {
        let mut frame = Frame::video(0, 10, PixelFormat::Gray8);
        assert!(matches!(frame.alloc(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_audio_alloc() {
        let packed = Frame::audio(1024, 48000, ChannelLayout::Stereo, SampleFormat::S16)
            .allocated()
            .unwrap();
        assert_eq!(packed.planes().len(), 1);
        assert_eq!(packed.planes()[0].data.len(), 4096);

        let planar = Frame::audio(1024, 48000, ChannelLayout::Stereo, SampleFormat::F32p)
            .allocated()
            .unwrap();
        assert_eq!(planar.planes().len(), 2);
        assert_eq!(planar.planes()[1].data.len(), 4096);
    }

    #[test]
    fn test_with_planes_validation() {
        let frame = Frame::video(4, 2, PixelFormat::Gray8);
        let short = frame.clone().with_planes(vec![Plane::new(vec![0; 7], 4)]);
        assert!(matches!(short, Err(Error::InvalidArgument(_))));
        let narrow = frame.clone().with_planes(vec![Plane::new(vec![0; 8], 3)]);
        assert!(matches!(narrow, Err(Error::InvalidArgument(_))));
        let ok = frame.with_planes(vec![Plane::new(vec![0; 8], 4)]);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_packed_bytes_drop_padding() {
        let mut frame = Frame::video(3, 2, PixelFormat::Gray8).allocated().unwrap();
        assert_eq!(frame.planes()[0].linesize, 32);
        let consumed = frame.fill_from_packed(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(consumed, 6);
        assert_eq!(&frame.planes()[0].data[32..35], &[4, 5, 6]);
        assert_eq!(frame.to_packed_bytes(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_pix_fmts_registry() {
        let fmts = pix_fmts();
        let yuv = fmts.get("yuv420p").unwrap();
        assert_eq!(yuv.nb_planes, 3);
        assert_eq!(yuv.log2_chroma_w, 1);
        assert!(yuv.flags.contains(PixFmtFlags::PLANAR));
        assert!(fmts.get("rgba").unwrap().flags.contains(PixFmtFlags::ALPHA));
        assert_eq!(fmts.len(), PixelFormat::ALL.len());
    }

    #[test]
    fn test_pixel_format_parse() {
        assert_eq!("nv12".parse::<PixelFormat>().unwrap(), PixelFormat::Nv12);
        assert_eq!("gray8".parse::<PixelFormat>().unwrap(), PixelFormat::Gray8);
        assert!("yuv9000".parse::<PixelFormat>().is_err());
    }
}
