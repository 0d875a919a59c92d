//! # mediaflow codecs
//!
//! Decoder and encoder stages plus the reference codecs behind them.
//!
//! ## Codecs
//! - `rawvideo`: uncompressed video, one packet per frame
//! - `delta`: long-GOP delta video with I, P and B frames
//! - `pcm_s16le`: signed 16-bit little-endian PCM audio
//!
//! ## Stages
//!
//! - [`Decoder`] turns packets into frames in presentation order
//! - [`Encoder`] turns frames into packets in decode order
//!
//! Both are N:M: a call may return nothing while the codec buffers, and
//! `flush` returns whatever is left. After `flush` a stage is terminal and
//! every further call fails with a sequence violation.
//!
//! Codec work runs on tokio's blocking pool so the stages can be driven from
//! an async task without stalling the runtime.

pub mod audio;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod registry;
pub mod traits;
pub mod video;

pub use config::{CodecSelector, DecoderConfig, EncoderConfig, MAX_B_FRAMES};
pub use decoder::{DecodeResult, Decoder};
pub use encoder::{EncodeResult, Encoder};
pub use registry::{decoders, encoders, find_codec, find_codec_by_id, CodecEntry};
pub use mediaflow_core::StageState;
pub use traits::{CodecCapabilities, CodecInfo, DecoderBackend, EncoderBackend};
