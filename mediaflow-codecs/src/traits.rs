//! Codec backend traits.
//!
//! A backend does the actual bit-level work for one codec. The [`Decoder`]
//! and [`Encoder`] stages wrap a backend and add what every codec needs:
//! lifecycle checks, time base handling, output reordering and offloading
//! onto the blocking pool.
//!
//! Backends see packets and frames in *decode order*. Decoder backends return
//! frames as soon as they are reconstructed; the stage reorders them into
//! presentation order using the stream's `has_b_frames` depth.
//!
//! [`Decoder`]: crate::Decoder
//! [`Encoder`]: crate::Encoder

use bitflags::bitflags;
use mediaflow_core::{
    CodecId, CodecParameters, Frame, MediaType, Packet, PixelFormat, Result, SampleFormat,
    SharedFramePool,
};

use crate::config::EncoderConfig;

bitflags! {
    /// Codec capabilities.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CodecCapabilities: u32 {
        /// Encoder or decoder may hold data back until flushed.
        const DELAY = 0x0001;
        /// Stream may contain frames coded out of presentation order.
        const REORDER = 0x0002;
        /// Every frame is a keyframe.
        const INTRA_ONLY = 0x0004;
        const LOSSLESS = 0x0008;
    }
}

/// Information about a codec.
#[derive(Debug, Clone)]
pub struct CodecInfo {
    /// Codec name.
    pub name: &'static str,
    /// Long name/description.
    pub long_name: &'static str,
    pub codec_type: MediaType,
    pub id: CodecId,
    pub capabilities: CodecCapabilities,
    /// Pixel formats the encoder accepts (video).
    pub pix_fmts: &'static [PixelFormat],
    /// Sample formats the encoder accepts (audio).
    pub sample_fmts: &'static [SampleFormat],
    /// Values accepted for the private `preset` option.
    pub presets: &'static [&'static str],
}

/// Bit-level decoder for one codec.
pub trait DecoderBackend: Send {
    /// Decode one packet into zero or more frames, in decode order.
    ///
    /// Output frames carry the packet's `pts` and `dts` (as `pkt_dts`).
    /// Data the codec can continue past yields a frame flagged CORRUPT;
    /// anything else is an error.
    fn decode(&mut self, packet: &Packet, pool: &SharedFramePool) -> Result<Vec<Frame>>;

    /// Return frames still held inside the backend.
    fn flush(&mut self, pool: &SharedFramePool) -> Result<Vec<Frame>>;

    /// Drop reference state, e.g. after a seek.
    fn reset(&mut self);
}

/// Bit-level encoder for one codec.
pub trait EncoderBackend: Send {
    /// Encode one frame into zero or more packets in transmission order.
    ///
    /// Packets carry `pts`, `dts`, `duration` and flags in the encoder time
    /// base.
    fn encode(&mut self, frame: &Frame) -> Result<Vec<Packet>>;

    /// Emit every packet still held for lookahead.
    fn flush(&mut self) -> Result<Vec<Packet>>;

    /// Decoder reorder depth of the produced stream.
    fn reorder_depth(&self) -> u32 {
        0
    }

    /// Global header data for the stream, if any.
    fn extradata(&self) -> &[u8] {
        &[]
    }
}

/// Creates a decoder backend for a stream.
pub type DecoderFactory = fn(&CodecParameters) -> Result<Box<dyn DecoderBackend>>;

/// Creates an encoder backend from a validated configuration.
pub type EncoderFactory = fn(&EncoderConfig) -> Result<Box<dyn EncoderBackend>>;
