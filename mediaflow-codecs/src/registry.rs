//! Static codec registry.
//!
//! Built once on first use and never mutated afterwards.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use mediaflow_core::{CodecId, Error, Result};

use crate::audio::{PcmDecoder, PcmEncoder, PCM_S16LE_INFO};
use crate::config::CodecSelector;
use crate::traits::{CodecInfo, DecoderFactory, EncoderFactory};
use crate::video::{
    DeltaDecoder, DeltaEncoder, RawVideoDecoder, RawVideoEncoder, DELTA_INFO, RAWVIDEO_INFO,
};

/// A codec and the factories for its decoder and encoder.
pub struct CodecEntry {
    pub info: &'static CodecInfo,
    pub decoder: Option<DecoderFactory>,
    pub encoder: Option<EncoderFactory>,
}

fn codecs() -> &'static BTreeMap<&'static str, CodecEntry> {
    static CODECS: OnceLock<BTreeMap<&'static str, CodecEntry>> = OnceLock::new();
    CODECS.get_or_init(|| {
        [
            CodecEntry {
                info: &RAWVIDEO_INFO,
                decoder: Some(RawVideoDecoder::create),
                encoder: Some(RawVideoEncoder::create),
            },
            CodecEntry {
                info: &DELTA_INFO,
                decoder: Some(DeltaDecoder::create),
                encoder: Some(DeltaEncoder::create),
            },
            CodecEntry {
                info: &PCM_S16LE_INFO,
                decoder: Some(PcmDecoder::create),
                encoder: Some(PcmEncoder::create),
            },
        ]
        .into_iter()
        .map(|entry| (entry.info.name, entry))
        .collect()
    })
}

/// All codecs with a decoder, keyed by name.
pub fn decoders() -> BTreeMap<&'static str, &'static CodecInfo> {
    codecs()
        .iter()
        .filter(|(_, e)| e.decoder.is_some())
        .map(|(name, e)| (*name, e.info))
        .collect()
}

/// All codecs with an encoder, keyed by name.
pub fn encoders() -> BTreeMap<&'static str, &'static CodecInfo> {
    codecs()
        .iter()
        .filter(|(_, e)| e.encoder.is_some())
        .map(|(name, e)| (*name, e.info))
        .collect()
}

/// Look up a codec by name.
pub fn find_codec(name: &str) -> Option<&'static CodecEntry> {
    codecs().get(name)
}

/// Look up a codec by id.
pub fn find_codec_by_id(id: CodecId) -> Option<&'static CodecEntry> {
    codecs().values().find(|e| e.info.id == id)
}

pub(crate) fn resolve(selector: &CodecSelector) -> Result<&'static CodecEntry> {
    let entry = match selector {
        CodecSelector::Name(name) => find_codec(name),
        CodecSelector::Id(id) => CodecId::from_id(*id).and_then(find_codec_by_id),
    };
    entry.ok_or_else(|| Error::unsupported(format!("no codec matches {}", selector)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaflow_core::MediaType;

    #[test]
    fn test_registry_contents() {
        let dec = decoders();
        assert!(dec.contains_key("rawvideo"));
        assert!(dec.contains_key("delta"));
        assert_eq!(dec["pcm_s16le"].codec_type, MediaType::Audio);
        assert_eq!(encoders().len(), 3);
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve(&"delta".into()).unwrap().info.id, CodecId::Delta);
        assert_eq!(
            resolve(&CodecId::PcmS16le.into()).unwrap().info.name,
            "pcm_s16le"
        );
        assert!(matches!(
            resolve(&"h264".into()),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
