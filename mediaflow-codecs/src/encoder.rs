//! Encoder stage.

use std::time::{Duration, Instant};

use mediaflow_core::{
    Batch, CodecError, CodecParameters, Error, Frame, MediaType, Offload, Packet, Rational,
    Result, StageState,
};
use tracing::{debug, info, trace};

use crate::config::EncoderConfig;
use crate::registry::resolve;
use crate::traits::{CodecInfo, EncoderBackend};

/// Output of one encode or flush call.
#[derive(Debug)]
pub struct EncodeResult {
    /// Packets in transmission order, dts non-decreasing.
    pub packets: Vec<Packet>,
    /// Wall-clock time spent in the call.
    pub total_time: Duration,
}

struct EncoderCore {
    backend: Box<dyn EncoderBackend>,
    time_base: Rational,
    last_dts: Option<i64>,
}

impl EncoderCore {
    fn encode(&mut self, frames: Vec<Frame>) -> Result<Vec<Packet>> {
        let mut out = Vec::new();
        for mut frame in frames {
            frame.rescale_ts(self.time_base);
            let packets = self.backend.encode(&frame)?;
            self.accept(packets, &mut out)?;
        }
        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<Packet>> {
        let mut out = Vec::new();
        let packets = self.backend.flush()?;
        self.accept(packets, &mut out)?;
        Ok(out)
    }

    fn accept(&mut self, packets: Vec<Packet>, out: &mut Vec<Packet>) -> Result<()> {
        for mut packet in packets {
            if let (Some(dts), Some(last)) = (packet.dts, self.last_dts) {
                if dts < last {
                    return Err(CodecError::NonMonotonicDts { dts, last }.into());
                }
            }
            self.last_dts = packet.dts.or(self.last_dts);
            packet.time_base = self.time_base;
            out.push(packet);
        }
        Ok(())
    }
}

/// Turns frames into packets.
///
/// Encoders may look ahead: `encode` can return fewer packets than frames
/// submitted, and `flush` returns the remainder.
pub struct Encoder {
    info: &'static CodecInfo,
    config: EncoderConfig,
    params: CodecParameters,
    state: StageState,
    core: Offload<EncoderCore>,
    frames_in: u64,
    packets_out: u64,
}

impl Encoder {
    /// Create an encoder. The configuration is validated against the codec.
    pub fn new(config: EncoderConfig) -> Result<Self> {
        let entry = resolve(&config.codec)?;
        let factory = entry.encoder.ok_or_else(|| {
            Error::unsupported(format!("{} has no encoder", entry.info.name))
        })?;
        let config = config.validate(entry.info)?;
        let backend = factory(&config)?;

        let mut params = CodecParameters {
            codec_type: entry.info.codec_type,
            codec_id: entry.info.id,
            bit_rate: config.bit_rate,
            has_b_frames: backend.reorder_depth(),
            extradata: backend.extradata().to_vec(),
            ..CodecParameters::default()
        };
        match entry.info.codec_type {
            MediaType::Video => {
                params.width = config.width;
                params.height = config.height;
                params.pixel_format = config.pixel_format;
                params.frame_rate = config.frame_rate;
                params.gop_size = config.gop_size;
                params.bits_per_coded_sample =
                    config.pixel_format.map(|f| f.bits_per_pixel()).unwrap_or(0);
            }
            MediaType::Audio => {
                params.sample_rate = config.sample_rate;
                params.channel_layout = config.channel_layout;
                params.sample_format = config.sample_format;
                if let (Some(layout), Some(fmt)) = (config.channel_layout, config.sample_format) {
                    params.block_align = layout.channels() * fmt.bytes_per_sample() as u32;
                    params.bits_per_coded_sample = fmt.bytes_per_sample() as u32 * 8;
                }
            }
            MediaType::Data => {}
        }

        info!(
            codec = entry.info.name,
            time_base = %config.time_base,
            gop_size = config.gop_size,
            max_b_frames = config.max_b_frames,
            "encoder created"
        );
        Ok(Self {
            info: entry.info,
            core: Offload::new(
                "encoder",
                EncoderCore {
                    backend,
                    time_base: config.time_base,
                    last_dts: None,
                },
            ),
            config,
            params,
            state: StageState::Ready,
            frames_in: 0,
            packets_out: 0,
        })
    }

    /// Encode one frame or a batch.
    ///
    /// Frames must match the configured media type, geometry and format.
    pub async fn encode(&mut self, frames: impl Into<Batch<Frame>>) -> Result<EncodeResult> {
        self.state.check_accepting("encoder", "encode")?;
        let frames = frames.into().into_inner();
        for frame in &frames {
            if !self.params.accepts(frame.kind()) {
                return Err(Error::invalid_argument(format!(
                    "{} encoder configured for {} got {:?}",
                    self.info.name,
                    self.describe(),
                    frame.kind()
                )));
            }
            frame.validate()?;
        }
        let start = Instant::now();
        let count = frames.len();
        self.state = StageState::Active;
        let packets = self.core.run(move |core| core.encode(frames)).await?;
        self.frames_in += count as u64;
        self.packets_out += packets.len() as u64;
        trace!(frames = count, packets = packets.len(), "encoded");
        Ok(EncodeResult {
            packets,
            total_time: start.elapsed(),
        })
    }

    /// Drain every held packet. The encoder is terminal afterwards.
    pub async fn flush(&mut self) -> Result<EncodeResult> {
        self.state.check_accepting("encoder", "flush")?;
        let start = Instant::now();
        self.state = StageState::Draining;
        let result = self.core.run(|core| core.flush()).await;
        if !self.core.is_poisoned() {
            self.state = StageState::Terminal;
        }
        let packets = result?;
        self.packets_out += packets.len() as u64;
        debug!(
            codec = self.info.name,
            drained = packets.len(),
            frames = self.frames_in,
            packets = self.packets_out,
            "encoder flushed"
        );
        Ok(EncodeResult {
            packets,
            total_time: start.elapsed(),
        })
    }

    fn describe(&self) -> String {
        match self.params.codec_type {
            MediaType::Video => format!(
                "{}x{} {}",
                self.params.width,
                self.params.height,
                self.params
                    .pixel_format
                    .map(|f| f.name())
                    .unwrap_or("none")
            ),
            MediaType::Audio => format!(
                "{} Hz {} {}",
                self.params.sample_rate,
                self.params.channel_layout.unwrap_or_default(),
                self.params
                    .sample_format
                    .map(|f| f.name())
                    .unwrap_or("none")
            ),
            MediaType::Data => "data".to_string(),
        }
    }

    pub fn codec_info(&self) -> &'static CodecInfo {
        self.info
    }

    pub fn name(&self) -> &'static str {
        self.info.name
    }

    /// Parameters of the produced stream, for creating a muxer stream.
    pub fn codec_parameters(&self) -> &CodecParameters {
        &self.params
    }

    /// The validated configuration.
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn time_base(&self) -> Rational {
        self.config.time_base
    }

    pub fn state(&self) -> StageState {
        self.state
    }
}
