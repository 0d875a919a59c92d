//! Container stages for mediaflow.
//!
//! [`Demuxer`] splits a container into per-stream packets and seeks by
//! timestamp, frame, time or byte position. [`Muxer`] writes packets of
//! several streams into one container, interleaving them by dts, under a
//! strict `new_stream` → `open_io` → `write_header` → `write_frame` →
//! `write_trailer` lifecycle.
//!
//! Formats:
//! - `mpk`: typed header, framed packets and a trailing seek index
//! - `rawvideo` and `s16le`: headerless, described by demuxer options
//! - `null` (muxer only): discards everything

pub mod demuxer;
pub mod interleave;
pub mod io;
pub mod mpk;
pub mod muxer;
pub mod null;
pub mod options;
pub mod raw;
pub mod registry;
pub mod traits;

pub use demuxer::Demuxer;
pub use interleave::{Interleaver, DEFAULT_MAX_INTERLEAVE_DELTA};
pub use io::{demuxer_stream, DemuxerStreamWriter, MediaSink, MediaSource, MemoryBuffer};
pub use muxer::{MuxInput, Muxer, MuxerState};
pub use options::{
    DemuxerOptions, DemuxerPrivateOptions, FormatOptions, IoOptions, MuxerOptions, SeekOptions,
    SeekTarget, StreamOptions,
};
pub use registry::{demuxers, find_demuxer, find_muxer, muxer_for_filename, muxers, probe};
pub use traits::{
    ContextFlags, DemuxBackend, FormatFlags, IndexEntry, InputFormatInfo, MuxBackend,
    OutputFormatInfo,
};
