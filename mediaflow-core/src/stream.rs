//! Elementary stream descriptions shared by demuxers and muxers.

use serde::Serialize;

use crate::format::{CodecParameters, MediaType};
use crate::rational::Rational;
use crate::timestamp::Timestamp;

/// One elementary stream of a container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stream {
    /// Position in the container's stream table.
    pub index: usize,
    /// Format-specific stream id.
    pub id: u32,
    /// Unit of all packet timestamps in this stream.
    pub time_base: Rational,
    pub codecpar: CodecParameters,
    /// First presentation timestamp, in `time_base` units.
    pub start_time: Option<i64>,
    /// Stream duration, in `time_base` units.
    pub duration: Option<i64>,
    /// Number of packets, 0 if unknown.
    pub nb_frames: u64,
    pub avg_frame_rate: Rational,
    pub sample_aspect_ratio: Rational,
}

impl Stream {
    pub fn new(index: usize, time_base: Rational, codecpar: CodecParameters) -> Self {
        Self {
            index,
            id: index as u32,
            time_base,
            avg_frame_rate: codecpar.frame_rate,
            sample_aspect_ratio: codecpar.sample_aspect_ratio,
            codecpar,
            start_time: None,
            duration: None,
            nb_frames: 0,
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.codecpar.codec_type
    }

    /// Stream duration in microseconds, if known.
    pub fn duration_micros(&self) -> Option<i64> {
        self.duration
            .map(|d| Timestamp::new(d, self.time_base).to_micros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CodecId;
    use crate::frame::PixelFormat;

    #[test]
    fn test_duration_micros() {
        let params = CodecParameters::video(CodecId::RawVideo, 8, 8, PixelFormat::Gray8);
        let mut stream = Stream::new(0, Rational::new(1, 25), params);
        assert_eq!(stream.duration_micros(), None);
        stream.duration = Some(50);
        assert_eq!(stream.duration_micros(), Some(2_000_000));
        assert_eq!(stream.media_type(), MediaType::Video);
    }
}
