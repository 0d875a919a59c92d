//! Audio codecs.

pub mod pcm;

pub use pcm::{PcmDecoder, PcmEncoder, PCM_S16LE_INFO};
