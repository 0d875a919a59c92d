//! Filters with several pads: `split`/`asplit` and `interleave`/`ainterleave`.

use std::collections::VecDeque;

use mediaflow_core::{Error, Frame, MediaType, Rational, Result};
use tracing::trace;

use crate::parser::FilterArgs;
use crate::traits::{single_input, Filter, LinkProps, PadFrame};

fn pad_count(name: &str, args: &FilterArgs, key: &str) -> Result<usize> {
    let n: usize = args.parse_or(name, key, 0, 2)?;
    if n == 0 {
        return Err(Error::invalid_argument(format!(
            "{}: '{}' must be at least 1",
            name, key
        )));
    }
    Ok(n)
}

/// Copies every input frame to each of its outputs.
pub struct SplitFilter {
    name: &'static str,
    media_type: MediaType,
    outputs: usize,
}

fn create_split_of(
    name: &'static str,
    media_type: MediaType,
    args: &FilterArgs,
) -> Result<Box<dyn Filter>> {
    args.check_known(name, &["outputs"])?;
    Ok(Box::new(SplitFilter {
        name,
        media_type,
        outputs: pad_count(name, args, "outputs")?,
    }))
}

pub(crate) fn create_split(args: &FilterArgs) -> Result<Box<dyn Filter>> {
    create_split_of("split", MediaType::Video, args)
}

pub(crate) fn create_asplit(args: &FilterArgs) -> Result<Box<dyn Filter>> {
    create_split_of("asplit", MediaType::Audio, args)
}

impl Filter for SplitFilter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn nb_outputs(&self) -> usize {
        self.outputs
    }

    fn configure(&mut self, inputs: &[LinkProps]) -> Result<Vec<LinkProps>> {
        let input = single_input(self.name, inputs, self.media_type)?;
        Ok(vec![*input; self.outputs])
    }

    fn filter(&mut self, _input: usize, frame: Frame) -> Result<Vec<PadFrame>> {
        let mut out: Vec<PadFrame> = (0..self.outputs - 1).map(|i| (i, frame.clone())).collect();
        out.push((self.outputs - 1, frame));
        Ok(out)
    }
}

struct Queued {
    pts: i64,
    frame: Frame,
}

/// Merges several inputs into one output ordered by timestamp.
///
/// A frame is released once every input has at least one frame queued, so
/// the earliest queued frame is known to be the earliest overall.
pub struct InterleaveFilter {
    name: &'static str,
    media_type: MediaType,
    queues: Vec<VecDeque<Queued>>,
    time_base: Rational,
}

fn create_interleave_of(
    name: &'static str,
    media_type: MediaType,
    args: &FilterArgs,
) -> Result<Box<dyn Filter>> {
    args.check_known(name, &["nb_inputs"])?;
    let n = pad_count(name, args, "nb_inputs")?;
    Ok(Box::new(InterleaveFilter {
        name,
        media_type,
        queues: (0..n).map(|_| VecDeque::new()).collect(),
        time_base: Rational::zero(),
    }))
}

pub(crate) fn create_interleave(args: &FilterArgs) -> Result<Box<dyn Filter>> {
    create_interleave_of("interleave", MediaType::Video, args)
}

pub(crate) fn create_ainterleave(args: &FilterArgs) -> Result<Box<dyn Filter>> {
    create_interleave_of("ainterleave", MediaType::Audio, args)
}

impl InterleaveFilter {
    fn pop_earliest(&mut self) -> Option<Frame> {
        let input = self
            .queues
            .iter()
            .enumerate()
            .filter_map(|(i, q)| q.front().map(|head| (head.pts, i)))
            .min()
            .map(|(_, i)| i)?;
        self.queues[input].pop_front().map(|q| q.frame)
    }
}

/// True if two links carry the same frames apart from timing.
fn same_format(a: &LinkProps, b: &LinkProps) -> bool {
    match (a, b) {
        (LinkProps::Video(a), LinkProps::Video(b)) => {
            a.width == b.width && a.height == b.height && a.pixel_format == b.pixel_format
        }
        (LinkProps::Audio(a), LinkProps::Audio(b)) => {
            a.sample_rate == b.sample_rate
                && a.sample_format == b.sample_format
                && a.channel_layout == b.channel_layout
        }
        _ => false,
    }
}

impl Filter for InterleaveFilter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn nb_inputs(&self) -> usize {
        self.queues.len()
    }

    fn configure(&mut self, inputs: &[LinkProps]) -> Result<Vec<LinkProps>> {
        let first = inputs.first().ok_or_else(|| {
            Error::invalid_argument(format!("{} configured without inputs", self.name))
        })?;
        if inputs.len() != self.queues.len() {
            return Err(Error::invalid_argument(format!(
                "{} expects {} inputs, got {}",
                self.name,
                self.queues.len(),
                inputs.len()
            )));
        }
        if let Some((i, bad)) = inputs
            .iter()
            .enumerate()
            .find(|(_, link)| link.media_type() != self.media_type || !same_format(first, link))
        {
            return Err(Error::invalid_argument(format!(
                "{}: input {} ({}) does not match input 0 ({})",
                self.name, i, bad, first
            )));
        }
        self.time_base = first.time_base();
        Ok(vec![*first])
    }

    fn filter(&mut self, input: usize, mut frame: Frame) -> Result<Vec<PadFrame>> {
        let queue = self.queues.get_mut(input).ok_or_else(|| {
            Error::invalid_argument(format!("{} has no input {}", self.name, input))
        })?;
        frame.rescale_ts(self.time_base);
        queue.push_back(Queued {
            pts: frame.pts.unwrap_or(i64::MIN),
            frame,
        });
        let mut out = Vec::new();
        while self.queues.iter().all(|q| !q.is_empty()) {
            match self.pop_earliest() {
                Some(frame) => out.push((0, frame)),
                None => break,
            }
        }
        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<PadFrame>> {
        let mut out = Vec::new();
        while let Some(frame) = self.pop_earliest() {
            out.push((0, frame));
        }
        trace!(filter = self.name, drained = out.len(), "interleave flushed");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::VideoLink;
    use mediaflow_core::PixelFormat;

    fn link(tb: Rational) -> LinkProps {
        LinkProps::Video(VideoLink::new(2, 2, PixelFormat::Gray8, tb))
    }

    fn frame(pts: i64, tb: Rational, value: u8) -> Frame {
        let mut f = Frame::video(2, 2, PixelFormat::Gray8).allocated().unwrap();
        f.fill_from_packed(&[value; 4]);
        f.pts = Some(pts);
        f.time_base = tb;
        f
    }

    #[test]
    fn test_split_copies() {
        let args = FilterArgs {
            positional: vec!["3".into()],
            ..FilterArgs::default()
        };
        let mut f = create_split(&args).unwrap();
        assert_eq!(f.nb_outputs(), 3);
        let tb = Rational::new(1, 25);
        assert_eq!(f.configure(&[link(tb)]).unwrap().len(), 3);
        let out = f.filter(0, frame(4, tb, 9)).unwrap();
        let pads: Vec<_> = out.iter().map(|(pad, fr)| (*pad, fr.pts)).collect();
        assert_eq!(pads, vec![(0, Some(4)), (1, Some(4)), (2, Some(4))]);
    }

    #[test]
    fn test_asplit_rejects_video() {
        let mut f = create_asplit(&FilterArgs::default()).unwrap();
        assert_eq!(f.nb_outputs(), 2);
        assert!(f.configure(&[link(Rational::new(1, 25))]).is_err());
    }

    #[test]
    fn test_interleave_orders_by_time() {
        let mut f = create_interleave(&FilterArgs::default()).unwrap();
        let fast = Rational::new(1, 50);
        let slow = Rational::new(1, 25);
        f.configure(&[link(fast), link(slow)]).unwrap();

        assert!(f.filter(0, frame(0, fast, 1)).unwrap().is_empty());
        assert!(f.filter(0, frame(1, fast, 2)).unwrap().is_empty());
        // Input 1 at 1/25 tick 1 == 2/50; both input-0 frames are earlier.
        let out = f.filter(1, frame(1, slow, 3)).unwrap();
        let values: Vec<_> = out.iter().map(|(_, fr)| fr.to_packed_bytes()[0]).collect();
        assert_eq!(values, vec![1, 2]);
        let rest = f.flush().unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].1.pts, Some(2));
        assert_eq!(rest[0].1.time_base, fast);
    }

    #[test]
    fn test_interleave_needs_matching_inputs() {
        let mut f = create_interleave(&FilterArgs::default()).unwrap();
        let other = LinkProps::Video(VideoLink::new(4, 2, PixelFormat::Gray8, Rational::new(1, 25)));
        let err = f.configure(&[link(Rational::new(1, 25)), other]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(f.configure(&[link(Rational::new(1, 25))]).is_err());
    }
}
