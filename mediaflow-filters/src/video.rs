//! Video filters: `null`, `scale`, `hflip`, `vflip`, `fps` and `framestep`.

use mediaflow_core::{Error, Frame, MediaType, Rational, Result, VideoFormat};
use tracing::trace;

use crate::parser::FilterArgs;
use crate::traits::{copy_props, single_input, Filter, LinkProps, PadFrame, VideoLink};

fn video_input(name: &str, inputs: &[LinkProps]) -> Result<VideoLink> {
    match single_input(name, inputs, MediaType::Video)? {
        LinkProps::Video(v) => Ok(*v),
        LinkProps::Audio(_) => Err(Error::invalid_argument(format!(
            "{} needs video input",
            name
        ))),
    }
}

fn video_format(name: &str, frame: &Frame) -> Result<VideoFormat> {
    frame
        .video_format()
        .copied()
        .ok_or_else(|| Error::invalid_argument(format!("{} got a non-video frame", name)))
}

/// Passes video through untouched.
pub struct NullFilter;

pub(crate) fn create_null(args: &FilterArgs) -> Result<Box<dyn Filter>> {
    args.check_known("null", &[])?;
    Ok(Box::new(NullFilter))
}

impl Filter for NullFilter {
    fn name(&self) -> &'static str {
        "null"
    }

    fn configure(&mut self, inputs: &[LinkProps]) -> Result<Vec<LinkProps>> {
        Ok(vec![LinkProps::Video(video_input("null", inputs)?)])
    }

    fn filter(&mut self, _input: usize, frame: Frame) -> Result<Vec<PadFrame>> {
        Ok(vec![(0, frame)])
    }
}

/// One requested output dimension of `scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dim {
    Pixels(u32),
    InputWidth,
    InputHeight,
    /// Derived from the other dimension, keeping the aspect ratio.
    KeepAspect,
}

impl Dim {
    fn parse(raw: Option<&str>, same: Dim) -> Result<Self> {
        let raw = match raw {
            None => return Ok(same),
            Some(raw) => raw.trim(),
        };
        match raw {
            "iw" | "in_w" => Ok(Dim::InputWidth),
            "ih" | "in_h" => Ok(Dim::InputHeight),
            "-1" => Ok(Dim::KeepAspect),
            "0" => Ok(same),
            _ => raw
                .parse::<u32>()
                .map(Dim::Pixels)
                .map_err(|_| Error::invalid_argument(format!("scale: invalid size '{}'", raw))),
        }
    }

    fn resolve(self, input: &VideoLink) -> Option<u32> {
        match self {
            Dim::Pixels(n) => Some(n),
            Dim::InputWidth => Some(input.width),
            Dim::InputHeight => Some(input.height),
            Dim::KeepAspect => None,
        }
    }
}

/// Nearest-neighbour resize.
pub struct ScaleFilter {
    width: Dim,
    height: Dim,
    output: Option<VideoLink>,
}

pub(crate) fn create_scale(args: &FilterArgs) -> Result<Box<dyn Filter>> {
    args.check_known("scale", &["w", "h"])?;
    let width = Dim::parse(args.get("w", 0), Dim::InputWidth)?;
    let height = Dim::parse(args.get("h", 1), Dim::InputHeight)?;
    Ok(Box::new(ScaleFilter {
        width,
        height,
        output: None,
    }))
}

impl ScaleFilter {
    fn output_size(&self, input: &VideoLink) -> Result<(u32, u32)> {
        let scaled = |num: u32, a: u32, b: u32| -> u32 {
            ((num as u64 * a as u64 + b as u64 / 2) / b.max(1) as u64) as u32
        };
        let (w, h) = match (self.width.resolve(input), self.height.resolve(input)) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, scaled(w, input.height, input.width)),
            (None, Some(h)) => (scaled(h, input.width, input.height), h),
            (None, None) => (input.width, input.height),
        };
        if w == 0 || h == 0 {
            return Err(Error::invalid_argument(format!(
                "scale: output size {}x{} from {}x{}",
                w, h, input.width, input.height
            )));
        }
        Ok((w, h))
    }
}

impl Filter for ScaleFilter {
    fn name(&self) -> &'static str {
        "scale"
    }

    fn configure(&mut self, inputs: &[LinkProps]) -> Result<Vec<LinkProps>> {
        let input = video_input("scale", inputs)?;
        let (width, height) = self.output_size(&input)?;
        let output = VideoLink {
            width,
            height,
            ..input
        };
        self.output = Some(output);
        Ok(vec![LinkProps::Video(output)])
    }

    fn filter(&mut self, _input: usize, frame: Frame) -> Result<Vec<PadFrame>> {
        let output = self
            .output
            .ok_or_else(|| Error::sequence("scale used before configure"))?;
        let src = video_format("scale", &frame)?;
        if src.width == output.width && src.height == output.height {
            return Ok(vec![(0, frame)]);
        }
        let mut dst = Frame::video(output.width, output.height, src.pixel_format).allocated()?;
        resample(&frame, &src, &mut dst, output.width, output.height);
        copy_props(&frame, &mut dst);
        if let Some(v) = dst.video_format_mut() {
            v.sample_aspect_ratio = src.sample_aspect_ratio;
        }
        Ok(vec![(0, dst)])
    }
}

fn resample(src: &Frame, fmt: &VideoFormat, dst: &mut Frame, width: u32, height: u32) {
    let pix = fmt.pixel_format;
    for (p, (from, to)) in src.planes().iter().zip(dst.planes_mut()).enumerate() {
        let (src_cols, src_rows) = pix.plane_dimensions(p, fmt.width, fmt.height);
        let (dst_cols, dst_rows) = pix.plane_dimensions(p, width, height);
        let es = pix.element_size(p);
        for y in 0..dst_rows {
            let sy = y * src_rows / dst_rows;
            let src_row = &from.data[sy * from.linesize..];
            let dst_row = &mut to.data[y * to.linesize..];
            for x in 0..dst_cols {
                let sx = x * src_cols / dst_cols;
                dst_row[x * es..(x + 1) * es].copy_from_slice(&src_row[sx * es..(sx + 1) * es]);
            }
        }
    }
}

/// Mirrors each row.
pub struct HflipFilter;

pub(crate) fn create_hflip(args: &FilterArgs) -> Result<Box<dyn Filter>> {
    args.check_known("hflip", &[])?;
    Ok(Box::new(HflipFilter))
}

impl Filter for HflipFilter {
    fn name(&self) -> &'static str {
        "hflip"
    }

    fn configure(&mut self, inputs: &[LinkProps]) -> Result<Vec<LinkProps>> {
        Ok(vec![LinkProps::Video(video_input("hflip", inputs)?)])
    }

    fn filter(&mut self, _input: usize, mut frame: Frame) -> Result<Vec<PadFrame>> {
        let fmt = video_format("hflip", &frame)?;
        let pix = fmt.pixel_format;
        for (p, plane) in frame.planes_mut().iter_mut().enumerate() {
            let (cols, rows) = pix.plane_dimensions(p, fmt.width, fmt.height);
            let es = pix.element_size(p);
            let linesize = plane.linesize;
            for r in 0..rows {
                let row = &mut plane.data[r * linesize..r * linesize + cols * es];
                for i in 0..cols / 2 {
                    let j = cols - 1 - i;
                    for b in 0..es {
                        row.swap(i * es + b, j * es + b);
                    }
                }
            }
        }
        Ok(vec![(0, frame)])
    }
}

/// Turns the picture upside down.
pub struct VflipFilter;

pub(crate) fn create_vflip(args: &FilterArgs) -> Result<Box<dyn Filter>> {
    args.check_known("vflip", &[])?;
    Ok(Box::new(VflipFilter))
}

impl Filter for VflipFilter {
    fn name(&self) -> &'static str {
        "vflip"
    }

    fn configure(&mut self, inputs: &[LinkProps]) -> Result<Vec<LinkProps>> {
        Ok(vec![LinkProps::Video(video_input("vflip", inputs)?)])
    }

    fn filter(&mut self, _input: usize, mut frame: Frame) -> Result<Vec<PadFrame>> {
        let fmt = video_format("vflip", &frame)?;
        let pix = fmt.pixel_format;
        for (p, plane) in frame.planes_mut().iter_mut().enumerate() {
            let (cols, rows) = pix.plane_dimensions(p, fmt.width, fmt.height);
            let len = cols * pix.element_size(p);
            let linesize = plane.linesize;
            for r in 0..rows / 2 {
                let mirror = rows - 1 - r;
                let (top, bottom) = plane.data.split_at_mut(mirror * linesize);
                top[r * linesize..r * linesize + len].swap_with_slice(&mut bottom[..len]);
            }
        }
        Ok(vec![(0, frame)])
    }
}

/// Converts to a constant frame rate by dropping or duplicating frames.
///
/// Output timestamps count frames at the target rate. Each output tick shows
/// the latest input frame that started at or before it, so one frame is
/// always held back until the next one (or end of stream) arrives. At end of
/// stream the last frame fills the ticks up to its end time.
pub struct FpsFilter {
    rate: Rational,
    in_tb: Rational,
    out_tb: Rational,
    pending: Option<Frame>,
    pending_end: i64,
    next: Option<i64>,
    last_tick: Option<i64>,
    dropped: u64,
    duplicated: u64,
}

pub(crate) fn create_fps(args: &FilterArgs) -> Result<Box<dyn Filter>> {
    args.check_known("fps", &["fps"])?;
    let rate: Rational = args.parse_or("fps", "fps", 0, Rational::new(25, 1))?;
    if !rate.is_positive() {
        return Err(Error::invalid_argument(format!(
            "fps: rate must be positive, got {}",
            rate
        )));
    }
    let out_tb = rate
        .invert()
        .ok_or_else(|| Error::invalid_argument("fps: zero rate"))?;
    Ok(Box::new(FpsFilter {
        rate,
        in_tb: Rational::zero(),
        out_tb,
        pending: None,
        pending_end: 0,
        next: None,
        last_tick: None,
        dropped: 0,
        duplicated: 0,
    }))
}

impl FpsFilter {
    fn tick(&self, ts: i64) -> i64 {
        self.in_tb.rescale(ts, self.out_tb)
    }

    fn emit(&self, frame: &Frame, tick: i64) -> Frame {
        let mut out = frame.clone();
        out.pts = Some(tick);
        out.best_effort_timestamp = Some(tick);
        out.pkt_dts = None;
        out.duration = 1;
        out.time_base = self.out_tb;
        out
    }
}

impl Filter for FpsFilter {
    fn name(&self) -> &'static str {
        "fps"
    }

    fn configure(&mut self, inputs: &[LinkProps]) -> Result<Vec<LinkProps>> {
        let input = video_input("fps", inputs)?;
        self.in_tb = input.time_base;
        Ok(vec![LinkProps::Video(VideoLink {
            time_base: self.out_tb,
            frame_rate: self.rate,
            ..input
        })])
    }

    fn filter(&mut self, _input: usize, frame: Frame) -> Result<Vec<PadFrame>> {
        let tick = match frame.pts.or(frame.best_effort_timestamp) {
            Some(ts) => self.tick(ts),
            None => self.last_tick.map_or(0, |t| t + 1),
        };
        let mut out = Vec::new();
        match self.pending.take() {
            None => {
                self.next.get_or_insert(tick);
            }
            Some(prev) => {
                let mut next = self.next.unwrap_or(tick);
                let start = next;
                while next < tick {
                    out.push((0, self.emit(&prev, next)));
                    next += 1;
                }
                match next - start {
                    0 => self.dropped += 1,
                    n => self.duplicated += (n - 1) as u64,
                }
                self.next = Some(next);
            }
        }
        self.pending_end = match frame.pts {
            Some(pts) if frame.duration > 0 => self.tick(pts + frame.duration),
            _ => tick + 1,
        };
        self.last_tick = Some(tick);
        self.pending = Some(frame);
        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<PadFrame>> {
        let mut out = Vec::new();
        if let Some(last) = self.pending.take() {
            let mut next = self.next.unwrap_or(0);
            while next < self.pending_end {
                out.push((0, self.emit(&last, next)));
                next += 1;
            }
            self.next = Some(next);
        }
        trace!(
            dropped = self.dropped,
            duplicated = self.duplicated,
            "fps filter flushed"
        );
        Ok(out)
    }
}

/// Keeps one frame out of every `step`.
pub struct FramestepFilter {
    step: u64,
    seen: u64,
}

pub(crate) fn create_framestep(args: &FilterArgs) -> Result<Box<dyn Filter>> {
    args.check_known("framestep", &["step"])?;
    let step: u64 = args.parse_or("framestep", "step", 0, 1)?;
    if step == 0 {
        return Err(Error::invalid_argument("framestep: step must be at least 1"));
    }
    Ok(Box::new(FramestepFilter { step, seen: 0 }))
}

impl Filter for FramestepFilter {
    fn name(&self) -> &'static str {
        "framestep"
    }

    fn configure(&mut self, inputs: &[LinkProps]) -> Result<Vec<LinkProps>> {
        let input = video_input("framestep", inputs)?;
        let frame_rate = if input.frame_rate.is_zero() {
            input.frame_rate
        } else {
            Rational::new(input.frame_rate.num, input.frame_rate.den * self.step as i64).reduce()
        };
        Ok(vec![LinkProps::Video(VideoLink {
            frame_rate,
            ..input
        })])
    }

    fn filter(&mut self, _input: usize, mut frame: Frame) -> Result<Vec<PadFrame>> {
        let keep = self.seen % self.step == 0;
        self.seen += 1;
        if !keep {
            return Ok(Vec::new());
        }
        frame.duration *= self.step as i64;
        Ok(vec![(0, frame)])
    }
}
