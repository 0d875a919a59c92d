//! Video codecs.

pub mod delta;
pub mod rawvideo;

pub use delta::{DeltaDecoder, DeltaEncoder, FrameType, DELTA_INFO};
pub use rawvideo::{RawVideoDecoder, RawVideoEncoder, RAWVIDEO_INFO};
