//! Built-in filter registry.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use mediaflow_core::{Error, MediaType, Result};

use crate::audio::{create_anull, create_volume};
use crate::multi::{create_ainterleave, create_asplit, create_interleave, create_split};
use crate::parser::FilterDesc;
use crate::traits::{Filter, FilterInfo, PadCount};
use crate::video::{
    create_fps, create_framestep, create_hflip, create_null, create_scale, create_vflip,
};

const fn simple(
    name: &'static str,
    description: &'static str,
    media_type: MediaType,
    create: crate::traits::FilterFactory,
) -> FilterInfo {
    FilterInfo {
        name,
        description,
        media_type,
        inputs: PadCount::Fixed(1),
        outputs: PadCount::Fixed(1),
        create,
    }
}

static BUILTIN: &[FilterInfo] = &[
    simple("null", "Pass video through unchanged.", MediaType::Video, create_null),
    simple("anull", "Pass audio through unchanged.", MediaType::Audio, create_anull),
    simple(
        "scale",
        "Resize video (nearest neighbour). Args: w, h; -1 keeps aspect.",
        MediaType::Video,
        create_scale,
    ),
    simple("hflip", "Mirror video horizontally.", MediaType::Video, create_hflip),
    simple("vflip", "Flip video vertically.", MediaType::Video, create_vflip),
    simple(
        "fps",
        "Convert to a constant frame rate. Args: fps.",
        MediaType::Video,
        create_fps,
    ),
    simple(
        "framestep",
        "Keep one frame in every step. Args: step.",
        MediaType::Video,
        create_framestep,
    ),
    simple(
        "volume",
        "Change audio gain. Args: volume (factor or dB).",
        MediaType::Audio,
        create_volume,
    ),
    FilterInfo {
        name: "split",
        description: "Copy video to several outputs. Args: outputs.",
        media_type: MediaType::Video,
        inputs: PadCount::Fixed(1),
        outputs: PadCount::Dynamic,
        create: create_split,
    },
    FilterInfo {
        name: "asplit",
        description: "Copy audio to several outputs. Args: outputs.",
        media_type: MediaType::Audio,
        inputs: PadCount::Fixed(1),
        outputs: PadCount::Dynamic,
        create: create_asplit,
    },
    FilterInfo {
        name: "interleave",
        description: "Merge video inputs by timestamp. Args: nb_inputs.",
        media_type: MediaType::Video,
        inputs: PadCount::Dynamic,
        outputs: PadCount::Fixed(1),
        create: create_interleave,
    },
    FilterInfo {
        name: "ainterleave",
        description: "Merge audio inputs by timestamp. Args: nb_inputs.",
        media_type: MediaType::Audio,
        inputs: PadCount::Dynamic,
        outputs: PadCount::Fixed(1),
        create: create_ainterleave,
    },
];

/// All built-in filters, keyed by name.
pub fn filters() -> &'static BTreeMap<&'static str, FilterInfo> {
    static FILTERS: OnceLock<BTreeMap<&'static str, FilterInfo>> = OnceLock::new();
    FILTERS.get_or_init(|| BUILTIN.iter().map(|f| (f.name, *f)).collect())
}

pub fn find_filter(name: &str) -> Option<&'static FilterInfo> {
    filters().get(name)
}

/// Instantiate the filter a description names.
pub fn create_filter(desc: &FilterDesc) -> Result<(&'static FilterInfo, Box<dyn Filter>)> {
    let info = find_filter(&desc.name)
        .ok_or_else(|| Error::unsupported(format!("no filter named '{}'", desc.name)))?;
    let filter = (info.create)(&desc.args)?;
    Ok((info, filter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contents() {
        let names: Vec<_> = filters().keys().copied().collect();
        assert_eq!(
            names,
            vec![
                "ainterleave",
                "anull",
                "asplit",
                "fps",
                "framestep",
                "hflip",
                "interleave",
                "null",
                "scale",
                "split",
                "vflip",
                "volume"
            ]
        );
        assert_eq!(find_filter("volume").unwrap().media_type, MediaType::Audio);
        assert_eq!(find_filter("split").unwrap().outputs, PadCount::Dynamic);
    }

    #[test]
    fn test_create_unknown_filter() {
        let err = create_filter(&FilterDesc::new("blur")).err().unwrap();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        let (info, filter) = create_filter(&FilterDesc::new("hflip")).unwrap();
        assert_eq!(info.name, filter.name());
    }
}
