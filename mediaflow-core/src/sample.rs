//! Audio sample formats and channel layouts.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Sample format for audio data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SampleFormat {
    /// Unsigned 8-bit.
    U8,
    /// Signed 16-bit.
    S16,
    /// Signed 32-bit.
    S32,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    U8p,
    S16p,
    S32p,
    F32p,
    F64p,
}

impl SampleFormat {
    pub const ALL: &'static [SampleFormat] = &[
        Self::U8,
        Self::S16,
        Self::S32,
        Self::F32,
        Self::F64,
        Self::U8p,
        Self::S16p,
        Self::S32p,
        Self::F32p,
        Self::F64p,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::F32 => "flt",
            Self::F64 => "dbl",
            Self::U8p => "u8p",
            Self::S16p => "s16p",
            Self::S32p => "s32p",
            Self::F32p => "fltp",
            Self::F64p => "dblp",
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::U8 | Self::U8p => 1,
            Self::S16 | Self::S16p => 2,
            Self::S32 | Self::S32p | Self::F32 | Self::F32p => 4,
            Self::F64 | Self::F64p => 8,
        }
    }

    pub fn is_planar(&self) -> bool {
        matches!(
            self,
            Self::U8p | Self::S16p | Self::S32p | Self::F32p | Self::F64p
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64 | Self::F32p | Self::F64p)
    }

    /// The interleaved counterpart of a planar format.
    pub fn packed(&self) -> Self {
        match self {
            Self::U8p => Self::U8,
            Self::S16p => Self::S16,
            Self::S32p => Self::S32,
            Self::F32p => Self::F32,
            Self::F64p => Self::F64,
            other => *other,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s.trim())
            .ok_or_else(|| Error::invalid_argument(format!("unknown sample format '{}'", s)))
    }
}

impl Serialize for SampleFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for SampleFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Static description of a sample format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFmtDescriptor {
    pub name: &'static str,
    pub format: SampleFormat,
    pub bits: u32,
    pub planar: bool,
    /// Name of the interleaved counterpart.
    pub packed: &'static str,
}

/// All sample formats, keyed by name.
pub fn sample_fmts() -> &'static BTreeMap<&'static str, SampleFmtDescriptor> {
    static SAMPLE_FMTS: OnceLock<BTreeMap<&'static str, SampleFmtDescriptor>> = OnceLock::new();
    SAMPLE_FMTS.get_or_init(|| {
        SampleFormat::ALL
            .iter()
            .map(|f| {
                (
                    f.name(),
                    SampleFmtDescriptor {
                        name: f.name(),
                        format: *f,
                        bits: f.bytes_per_sample() as u32 * 8,
                        planar: f.is_planar(),
                        packed: f.packed().name(),
                    },
                )
            })
            .collect()
    })
}

/// Channel layout for audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    Mono,
    #[default]
    Stereo,
    /// 2.1 (FL, FR, LFE).
    Surround21,
    /// FL, FR, BL, BR.
    Quad,
    /// 5.1 (FL, FR, FC, LFE, BL, BR).
    Surround51,
    /// 7.1 (FL, FR, FC, LFE, BL, BR, SL, SR).
    Surround71,
    /// Unordered layout with only a channel count.
    Unspecified(u32),
}

impl ChannelLayout {
    pub fn channels(&self) -> u32 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Surround21 => 3,
            Self::Quad => 4,
            Self::Surround51 => 6,
            Self::Surround71 => 8,
            Self::Unspecified(n) => *n,
        }
    }

    /// Default layout for a channel count.
    pub fn from_channels(channels: u32) -> Self {
        match channels {
            1 => Self::Mono,
            2 => Self::Stereo,
            3 => Self::Surround21,
            4 => Self::Quad,
            6 => Self::Surround51,
            8 => Self::Surround71,
            n => Self::Unspecified(n),
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mono => write!(f, "mono"),
            Self::Stereo => write!(f, "stereo"),
            Self::Surround21 => write!(f, "2.1"),
            Self::Quad => write!(f, "quad"),
            Self::Surround51 => write!(f, "5.1"),
            Self::Surround71 => write!(f, "7.1"),
            Self::Unspecified(n) => write!(f, "{}c", n),
        }
    }
}

impl FromStr for ChannelLayout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let layout = match s {
            "mono" => Self::Mono,
            "stereo" => Self::Stereo,
            "2.1" => Self::Surround21,
            "quad" => Self::Quad,
            "5.1" => Self::Surround51,
            "7.1" => Self::Surround71,
            other => {
                let count = other
                    .strip_suffix('c')
                    .and_then(|n| n.parse::<u32>().ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        Error::invalid_argument(format!("unknown channel layout '{}'", s))
                    })?;
                Self::from_channels(count)
            }
        };
        Ok(layout)
    }
}

impl Serialize for ChannelLayout {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChannelLayout {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_sample() {
        assert_eq!(SampleFormat::S16.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::F64p.bytes_per_sample(), 8);
        assert!(SampleFormat::F32p.is_planar());
        assert_eq!(SampleFormat::F32p.packed(), SampleFormat::F32);
    }

    #[test]
    fn test_sample_fmts_registry() {
        let fmts = sample_fmts();
        assert_eq!(fmts.len(), 10);
        let fltp = fmts.get("fltp").unwrap();
        assert_eq!(fltp.bits, 32);
        assert!(fltp.planar);
        assert_eq!(fltp.packed, "flt");
    }

    #[test]
    fn test_channel_layout_parse() {
        assert_eq!("stereo".parse::<ChannelLayout>().unwrap(), ChannelLayout::Stereo);
        assert_eq!("6c".parse::<ChannelLayout>().unwrap(), ChannelLayout::Surround51);
        assert_eq!("5c".parse::<ChannelLayout>().unwrap().channels(), 5);
        assert!("0c".parse::<ChannelLayout>().is_err());
        assert!("surround".parse::<ChannelLayout>().is_err());
    }
}
