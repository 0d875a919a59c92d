//! Filterer stage.

use std::time::{Duration, Instant};

use mediaflow_core::{Error, Frame, Offload, Result, StageState};
use tracing::{debug, info, trace};

use crate::graph::{Graph, InputPad};
use crate::traits::LinkProps;

/// How to build a [`Filterer`].
#[derive(Debug, Clone, PartialEq)]
pub struct FiltererOptions {
    /// Graph description, e.g. `[in]scale=320:240,vflip[out]`.
    pub filters: String,
    pub inputs: Vec<InputPad>,
    /// Output pad names, in the order results are returned.
    pub outputs: Vec<String>,
}

impl FiltererOptions {
    pub fn new(filters: impl Into<String>) -> Self {
        Self {
            filters: filters.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// One input named `in` and one output named `out`.
    pub fn simple(filters: impl Into<String>, input: LinkProps) -> Self {
        Self::new(filters).with_input("in", input).with_output("out")
    }

    pub fn with_input(mut self, name: impl Into<String>, props: LinkProps) -> Self {
        self.inputs.push(InputPad::new(name, props));
        self
    }

    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }
}

/// Frames travelling through one named pad.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedFrames {
    pub name: String,
    pub frames: Vec<Frame>,
}

impl NamedFrames {
    pub fn new(name: impl Into<String>, frames: Vec<Frame>) -> Self {
        Self {
            name: name.into(),
            frames,
        }
    }
}

/// Input of [`Filterer::filter`].
#[derive(Debug, Clone)]
pub enum FilterInput {
    /// Frames for the sole input pad.
    Frames(Vec<Frame>),
    /// Frames addressed to input pads by name.
    Named(Vec<NamedFrames>),
}

impl From<Frame> for FilterInput {
    fn from(frame: Frame) -> Self {
        FilterInput::Frames(vec![frame])
    }
}

impl From<Vec<Frame>> for FilterInput {
    fn from(frames: Vec<Frame>) -> Self {
        FilterInput::Frames(frames)
    }
}

impl From<NamedFrames> for FilterInput {
    fn from(named: NamedFrames) -> Self {
        FilterInput::Named(vec![named])
    }
}

impl From<Vec<NamedFrames>> for FilterInput {
    fn from(named: Vec<NamedFrames>) -> Self {
        FilterInput::Named(named)
    }
}

/// Output of one filter or flush call.
#[derive(Debug)]
pub struct FilterResult {
    /// One entry per output pad, in declaration order.
    pub outputs: Vec<NamedFrames>,
    /// Wall-clock time spent in the call.
    pub total_time: Duration,
}

impl FilterResult {
    pub fn frames(&self, name: &str) -> Option<&[Frame]> {
        self.outputs
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.frames.as_slice())
    }

    /// Every output frame, output pads concatenated in order.
    pub fn into_frames(self) -> Vec<Frame> {
        self.outputs.into_iter().flat_map(|o| o.frames).collect()
    }

    pub fn len(&self) -> usize {
        self.outputs.iter().map(|o| o.frames.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs frames through a filter graph.
///
/// The graph may hold frames back (rate conversion, interleaving), so a call
/// can return more or fewer frames than it was given. `flush` drains the
/// graph once; the filterer is terminal afterwards.
pub struct Filterer {
    options: FiltererOptions,
    state: StageState,
    core: Offload<Graph>,
    frames_in: u64,
    frames_out: u64,
}

fn build_graph(options: &FiltererOptions) -> Result<Graph> {
    Graph::build(&options.filters, &options.inputs, &options.outputs)
}

impl Filterer {
    /// Parse the description and configure the graph on the blocking pool.
    pub async fn new(options: FiltererOptions) -> Result<Self> {
        let for_build = options.clone();
        let graph = tokio::task::spawn_blocking(move || build_graph(&for_build))
            .await
            .map_err(|e| Error::TaskFailed(format!("filterer build task join error: {}", e)))??;
        info!(
            graph = %graph.description(),
            inputs = options.inputs.len(),
            outputs = options.outputs.len(),
            "filterer created"
        );
        Ok(Self {
            options,
            state: StageState::Ready,
            core: Offload::new("filterer", graph),
            frames_in: 0,
            frames_out: 0,
        })
    }

    fn route(&self, input: FilterInput) -> Result<Vec<(usize, Frame)>> {
        match input {
            FilterInput::Frames(frames) => {
                if self.options.inputs.len() != 1 {
                    return Err(Error::invalid_argument(format!(
                        "filterer has {} inputs; frames must be addressed by pad name",
                        self.options.inputs.len()
                    )));
                }
                Ok(frames.into_iter().map(|f| (0, f)).collect())
            }
            FilterInput::Named(named) => {
                let mut routed = Vec::new();
                for bundle in named {
                    let index = self
                        .options
                        .inputs
                        .iter()
                        .position(|p| p.name == bundle.name)
                        .ok_or_else(|| {
                            Error::invalid_argument(format!(
                                "filterer has no input pad '{}'",
                                bundle.name
                            ))
                        })?;
                    routed.extend(bundle.frames.into_iter().map(|f| (index, f)));
                }
                Ok(routed)
            }
        }
    }

    /// Push frames through the graph and collect what reached the outputs.
    pub async fn filter(&mut self, input: impl Into<FilterInput>) -> Result<FilterResult> {
        self.state.check_accepting("filterer", "filter")?;
        let routed = self.route(input.into())?;
        let start = Instant::now();
        let count = routed.len();
        self.state = StageState::Active;
        let outputs = self
            .core
            .run(move |graph| {
                for (index, frame) in routed {
                    graph.send(index, frame)?;
                }
                Ok(graph.take_outputs())
            })
            .await?;
        let result = self.finish(outputs, start);
        self.frames_in += count as u64;
        trace!(frames_in = count, frames_out = result.len(), "filtered");
        Ok(result)
    }

    /// Signal end of stream on every input and drain the graph.
    pub async fn flush(&mut self) -> Result<FilterResult> {
        self.state.check_accepting("filterer", "flush")?;
        let start = Instant::now();
        self.state = StageState::Draining;
        let outputs = self
            .core
            .run(|graph| {
                graph.flush()?;
                Ok(graph.take_outputs())
            })
            .await;
        if !self.core.is_poisoned() {
            self.state = StageState::Terminal;
        }
        let result = self.finish(outputs?, start);
        debug!(
            drained = result.len(),
            total = self.frames_out,
            "filterer flushed"
        );
        Ok(result)
    }

    fn finish(&mut self, outputs: Vec<(String, Vec<Frame>)>, start: Instant) -> FilterResult {
        let outputs: Vec<NamedFrames> = outputs
            .into_iter()
            .map(|(name, frames)| NamedFrames { name, frames })
            .collect();
        let result = FilterResult {
            outputs,
            total_time: start.elapsed(),
        };
        self.frames_out += result.len() as u64;
        result
    }

    /// Rebuild the graph, dropping every buffered frame.
    pub fn reset(&mut self) -> Result<()> {
        self.state.check_accepting("filterer", "reset")?;
        let graph = build_graph(&self.options)?;
        self.core = Offload::new("filterer", graph);
        self.state = StageState::Ready;
        debug!(graph = %self.options.filters, "filterer reset");
        Ok(())
    }

    /// The resolved topology, for diagnostics.
    pub fn dump(&self) -> Result<String> {
        Ok(self.core.get()?.dump())
    }

    pub fn options(&self) -> &FiltererOptions {
        &self.options
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    /// Negotiated properties of an output pad.
    pub fn output_props(&self, name: &str) -> Option<LinkProps> {
        self.core
            .get()
            .ok()
            .and_then(|graph| graph.output_props(name).copied())
    }

    pub fn frames_in(&self) -> u64 {
        self.frames_in
    }

    pub fn frames_out(&self) -> u64 {
        self.frames_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::VideoLink;
    use mediaflow_core::{PixelFormat, Rational};

    fn gray(w: u32, h: u32) -> LinkProps {
        LinkProps::Video(VideoLink::new(w, h, PixelFormat::Gray8, Rational::new(1, 25)))
    }

    fn frame(w: u32, h: u32, pts: i64) -> Frame {
        let mut f = Frame::video(w, h, PixelFormat::Gray8).allocated().unwrap();
        f.pts = Some(pts);
        f.time_base = Rational::new(1, 25);
        f
    }

    #[tokio::test]
    async fn test_simple_filter_and_flush() {
        let mut filterer = Filterer::new(FiltererOptions::simple("[in]scale=2:2[out]", gray(4, 4)))
            .await
            .unwrap();
        assert_eq!(filterer.state(), StageState::Ready);
        let out = filterer
            .filter(vec![frame(4, 4, 0), frame(4, 4, 1)])
            .await
            .unwrap();
        assert_eq!(out.outputs.len(), 1);
        assert_eq!(out.outputs[0].name, "out");
        let frames = out.frames("out").unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].video_format().unwrap().width, 2);
        assert_eq!(filterer.state(), StageState::Active);

        let drained = filterer.flush().await.unwrap();
        assert!(drained.is_empty());
        assert!(filterer.state().is_terminal());
        assert!(filterer.flush().await.unwrap_err().is_sequence_violation());
        assert!(filterer
            .filter(frame(4, 4, 2))
            .await
            .unwrap_err()
            .is_sequence_violation());
        assert_eq!(filterer.frames_in(), 2);
        assert_eq!(filterer.frames_out(), 2);
    }

    #[tokio::test]
    async fn test_flat_input_needs_sole_pad() {
        let options = FiltererOptions::new("[a][b]interleave[out]")
            .with_input("a", gray(2, 2))
            .with_input("b", gray(2, 2))
            .with_output("out");
        let mut filterer = Filterer::new(options).await.unwrap();
        let err = filterer.filter(frame(2, 2, 0)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = filterer
            .filter(NamedFrames::new("c", vec![frame(2, 2, 0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let out = filterer
            .filter(vec![
                NamedFrames::new("a", vec![frame(2, 2, 0)]),
                NamedFrames::new("b", vec![frame(2, 2, 1)]),
            ])
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_construction_errors() {
        let err = Filterer::new(FiltererOptions::simple("[in]nope[out]", gray(2, 2)))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        let err = Filterer::new(FiltererOptions::simple("[in]null[x]", gray(2, 2)))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_reset_drops_buffered_frames() {
        let mut filterer = Filterer::new(FiltererOptions::simple("fps=25", gray(2, 2)))
            .await
            .unwrap();
        let out = filterer.filter(frame(2, 2, 0)).await.unwrap();
        assert!(out.is_empty());
        filterer.reset().unwrap();
        assert_eq!(filterer.state(), StageState::Ready);
        let drained = filterer.flush().await.unwrap();
        assert!(drained.is_empty());
    }

    #[tokio::test]
    async fn test_dump_and_output_props() {
        let filterer = Filterer::new(FiltererOptions::simple("scale=w=8:h=-1", gray(4, 2)))
            .await
            .unwrap();
        let props = filterer.output_props("out").unwrap();
        assert_eq!(props.as_video().unwrap().height, 4);
        let dump = filterer.dump().unwrap();
        assert!(dump.contains("input 'in'"));
        assert!(dump.contains("Parsed_scale_0"));
    }
}
