//! # mediaflow core
//!
//! Shared building blocks for every mediaflow stage:
//! - Error handling types
//! - Packet and frame data model
//! - Rational time bases and timestamps
//! - Codec parameters and stream descriptions
//! - Reorder queues, frame pools and blocking-task offload

pub mod batch;
pub mod error;
pub mod format;
pub mod frame;
pub mod packet;
pub mod pool;
pub mod rational;
pub mod reorder;
pub mod sample;
pub mod state;
pub mod stream;
pub mod task;
pub mod timestamp;

pub use batch::Batch;
pub use error::{CodecError, ContainerError, Error, OptionReport, Result};
pub use format::{CodecId, CodecParameters, MediaType};
pub use frame::{
    pix_fmts, AudioFormat, Frame, FrameFlags, FrameKind, PixFmtDescriptor, PixelFormat, Plane,
    VideoFormat,
};
pub use packet::{Packet, PacketFlags};
pub use pool::{FramePool, SharedFramePool};
pub use rational::Rational;
pub use reorder::{ReorderQueue, Reorderable};
pub use sample::{sample_fmts, ChannelLayout, SampleFmtDescriptor, SampleFormat};
pub use state::StageState;
pub use stream::Stream;
pub use task::Offload;
pub use timestamp::Timestamp;
