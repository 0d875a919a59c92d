//! Audio filters: `anull` and `volume`.

use byteorder::{ByteOrder, LittleEndian};
use mediaflow_core::{Error, Frame, MediaType, Result, SampleFormat};

use crate::parser::FilterArgs;
use crate::traits::{single_input, AudioLink, Filter, LinkProps, PadFrame};

fn audio_input(name: &str, inputs: &[LinkProps]) -> Result<AudioLink> {
    match single_input(name, inputs, MediaType::Audio)? {
        LinkProps::Audio(a) => Ok(*a),
        LinkProps::Video(_) => Err(Error::invalid_argument(format!(
            "{} needs audio input",
            name
        ))),
    }
}

/// Passes audio through untouched.
pub struct AnullFilter;

pub(crate) fn create_anull(args: &FilterArgs) -> Result<Box<dyn Filter>> {
    args.check_known("anull", &[])?;
    Ok(Box::new(AnullFilter))
}

impl Filter for AnullFilter {
    fn name(&self) -> &'static str {
        "anull"
    }

    fn configure(&mut self, inputs: &[LinkProps]) -> Result<Vec<LinkProps>> {
        Ok(vec![LinkProps::Audio(audio_input("anull", inputs)?)])
    }

    fn filter(&mut self, _input: usize, frame: Frame) -> Result<Vec<PadFrame>> {
        Ok(vec![(0, frame)])
    }
}

/// Multiplies every sample by a constant gain, saturating integer formats.
pub struct VolumeFilter {
    gain: f64,
}

/// Parse a linear factor (`0.5`) or a level in decibels (`-6dB`).
fn parse_gain(raw: &str) -> Result<f64> {
    let raw = raw.trim();
    let invalid = || Error::invalid_argument(format!("volume: invalid value '{}'", raw));
    let gain = match raw
        .strip_suffix("dB")
        .or_else(|| raw.strip_suffix("db"))
    {
        Some(db) => {
            let db: f64 = db.trim().parse().map_err(|_| invalid())?;
            10f64.powf(db / 20.0)
        }
        None => raw.parse().map_err(|_| invalid())?,
    };
    if !gain.is_finite() || gain < 0.0 {
        return Err(invalid());
    }
    Ok(gain)
}

pub(crate) fn create_volume(args: &FilterArgs) -> Result<Box<dyn Filter>> {
    args.check_known("volume", &["volume"])?;
    let gain = match args.get("volume", 0) {
        Some(raw) => parse_gain(raw)?,
        None => 1.0,
    };
    Ok(Box::new(VolumeFilter { gain }))
}

impl Filter for VolumeFilter {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn configure(&mut self, inputs: &[LinkProps]) -> Result<Vec<LinkProps>> {
        Ok(vec![LinkProps::Audio(audio_input("volume", inputs)?)])
    }

    fn filter(&mut self, _input: usize, mut frame: Frame) -> Result<Vec<PadFrame>> {
        if self.gain == 1.0 {
            return Ok(vec![(0, frame)]);
        }
        let format = *frame
            .audio_format()
            .ok_or_else(|| Error::invalid_argument("volume got a non-audio frame"))?;
        let size = format.plane_size();
        for plane in frame.planes_mut() {
            apply_gain(format.sample_format, &mut plane.data[..size], self.gain);
        }
        Ok(vec![(0, frame)])
    }
}

fn apply_gain(format: SampleFormat, data: &mut [u8], gain: f64) {
    match format.packed() {
        SampleFormat::U8 => {
            for b in data.iter_mut() {
                let v = (f64::from(*b) - 128.0) * gain + 128.0;
                *b = v.round().clamp(0.0, 255.0) as u8;
            }
        }
        SampleFormat::S16 => {
            for c in data.chunks_exact_mut(2) {
                let v = f64::from(LittleEndian::read_i16(c)) * gain;
                LittleEndian::write_i16(c, v.round().clamp(i16::MIN.into(), i16::MAX.into()) as i16);
            }
        }
        SampleFormat::S32 => {
            for c in data.chunks_exact_mut(4) {
                let v = f64::from(LittleEndian::read_i32(c)) * gain;
                LittleEndian::write_i32(c, v.round().clamp(i32::MIN.into(), i32::MAX.into()) as i32);
            }
        }
        SampleFormat::F32 => {
            for c in data.chunks_exact_mut(4) {
                let v = LittleEndian::read_f32(c) as f64 * gain;
                LittleEndian::write_f32(c, v as f32);
            }
        }
        SampleFormat::F64 => {
            for c in data.chunks_exact_mut(8) {
                let v = LittleEndian::read_f64(c) * gain;
                LittleEndian::write_f64(c, v);
            }
        }
        // packed() only yields the formats above
        _ => {}
    }
}
