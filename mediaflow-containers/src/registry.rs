//! Registered container formats.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use mediaflow_core::{CodecId, Error, Result};
use tracing::debug;

use crate::io::url_extension;
use crate::mpk::{self, MpkDemuxer, MpkMuxer};
use crate::null::NullMuxer;
use crate::raw::{PcmS16leDemuxer, RawMuxer, RawVideoDemuxer};
use crate::traits::{FormatFlags, InputFormatInfo, OutputFormatInfo};

/// Bytes handed to probe functions.
pub const PROBE_SIZE: usize = 2048;

/// Every demuxer, by name.
pub fn demuxers() -> &'static BTreeMap<&'static str, InputFormatInfo> {
    static DEMUXERS: OnceLock<BTreeMap<&'static str, InputFormatInfo>> = OnceLock::new();
    DEMUXERS.get_or_init(|| {
        [
            InputFormatInfo {
                name: "mpk",
                long_name: "mediaflow packet container",
                extensions: "mpk",
                flags: FormatFlags::GENERIC_INDEX,
                raw_codec_id: None,
                probe: Some(mpk::probe),
                create: MpkDemuxer::create,
            },
            InputFormatInfo {
                name: "rawvideo",
                long_name: "raw video",
                extensions: "yuv,rgb,raw",
                flags: FormatFlags::NOTIMESTAMPS,
                raw_codec_id: Some(CodecId::RawVideo),
                probe: None,
                create: RawVideoDemuxer::create,
            },
            InputFormatInfo {
                name: "s16le",
                long_name: "PCM signed 16-bit little-endian",
                extensions: "pcm,sw",
                flags: FormatFlags::NOTIMESTAMPS,
                raw_codec_id: Some(CodecId::PcmS16le),
                probe: None,
                create: PcmS16leDemuxer::create,
            },
        ]
        .into_iter()
        .map(|f| (f.name, f))
        .collect()
    })
}

/// Every muxer, by name.
pub fn muxers() -> &'static BTreeMap<&'static str, OutputFormatInfo> {
    static MUXERS: OnceLock<BTreeMap<&'static str, OutputFormatInfo>> = OnceLock::new();
    MUXERS.get_or_init(|| {
        [
            OutputFormatInfo {
                name: "mpk",
                long_name: "mediaflow packet container",
                mime_type: "application/x-mpk",
                extensions: "mpk",
                video_codec: Some(CodecId::Delta),
                audio_codec: Some(CodecId::PcmS16le),
                codecs: CodecId::ALL,
                flags: FormatFlags::empty(),
                create: MpkMuxer::create,
            },
            OutputFormatInfo {
                name: "rawvideo",
                long_name: "raw video",
                mime_type: "",
                extensions: "yuv,rgb,raw",
                video_codec: Some(CodecId::RawVideo),
                audio_codec: None,
                codecs: &[CodecId::RawVideo],
                flags: FormatFlags::NOTIMESTAMPS,
                create: RawMuxer::rawvideo,
            },
            OutputFormatInfo {
                name: "s16le",
                long_name: "PCM signed 16-bit little-endian",
                mime_type: "audio/L16",
                extensions: "pcm,sw",
                video_codec: None,
                audio_codec: Some(CodecId::PcmS16le),
                codecs: &[CodecId::PcmS16le],
                flags: FormatFlags::NOTIMESTAMPS,
                create: RawMuxer::pcm_s16le,
            },
            OutputFormatInfo {
                name: "null",
                long_name: "discard all output",
                mime_type: "",
                extensions: "",
                video_codec: Some(CodecId::RawVideo),
                audio_codec: Some(CodecId::PcmS16le),
                codecs: CodecId::ALL,
                flags: FormatFlags::NOFILE.union(FormatFlags::NOTIMESTAMPS),
                create: NullMuxer::create,
            },
        ]
        .into_iter()
        .map(|f| (f.name, f))
        .collect()
    })
}

pub fn find_demuxer(name: &str) -> Option<&'static InputFormatInfo> {
    demuxers().get(name)
}

pub fn find_muxer(name: &str) -> Option<&'static OutputFormatInfo> {
    muxers().get(name)
}

/// First muxer claiming the extension of `filename`.
pub fn muxer_for_filename(filename: &str) -> Option<&'static OutputFormatInfo> {
    let ext = url_extension(filename)?;
    muxers().values().find(|f| f.matches_extension(&ext))
}

/// Pick a demuxer for a source.
///
/// Content probes win; the URL extension is the fallback for headerless
/// formats.
pub fn probe(data: &[u8], url: Option<&str>) -> Result<&'static InputFormatInfo> {
    let best = demuxers()
        .values()
        .filter_map(|f| f.probe.map(|p| (p(data), f)))
        .filter(|(score, _)| *score > 0)
        .max_by_key(|(score, _)| *score);
    if let Some((score, format)) = best {
        debug!(format = format.name, score, "format probed");
        return Ok(format);
    }
    if let Some(ext) = url.and_then(url_extension) {
        if let Some(format) = demuxers().values().find(|f| f.matches_extension(&ext)) {
            debug!(format = format.name, ext = %ext, "format chosen by extension");
            return Ok(format);
        }
    }
    Err(Error::unsupported(match url {
        Some(url) => format!("could not detect the format of '{}'", url),
        None => "could not detect the input format".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_by_content() {
        let format = probe(b"MPK1\x01\x00\x00\x00", Some("clip.yuv")).unwrap();
        assert_eq!(format.name, "mpk");
    }

    #[test]
    fn test_probe_by_extension() {
        assert_eq!(probe(&[0u8; 16], Some("clip.YUV")).unwrap().name, "rawvideo");
        assert!(matches!(
            probe(&[0u8; 16], Some("clip.bin")),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(probe(&[], None).is_err());
    }

    #[test]
    fn test_muxer_lookup() {
        assert_eq!(muxer_for_filename("out.mpk").unwrap().name, "mpk");
        assert_eq!(muxer_for_filename("/tmp/out.pcm").unwrap().name, "s16le");
        assert!(muxer_for_filename("out").is_none());
        assert!(find_muxer("null").unwrap().flags.contains(FormatFlags::NOFILE));
        assert!(!find_muxer("rawvideo").unwrap().accepts(CodecId::Delta));
    }
}
