//! # mediaflow pipeline
//!
//! Runs a whole job: a [`Demuxer`](mediaflow_containers::Demuxer) feeds one
//! route per mapped stream, either packet copy or decode → filter → encode,
//! and every route ends in one [`Muxer`](mediaflow_containers::Muxer).
//!
//! Jobs are described by [`PipelineConfig`], built in code or read from
//! JSON.

pub mod config;
pub mod error;
pub mod pipeline;

pub use config::{
    InputConfig, OutputConfig, PipelineConfig, StreamMap, StreamRoute, TranscodeRoute,
    DEFAULT_PROGRESS_INTERVAL,
};
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineStats, ProgressCallback};
