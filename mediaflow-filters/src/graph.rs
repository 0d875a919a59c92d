//! Filter graph construction and frame routing.
//!
//! Building a graph resolves every link of a [`GraphDesc`]: labelled pads
//! connect by name, consecutive filters of a chain connect implicitly and a
//! remaining unlabelled pad binds to the sole graph input or output. Filters
//! are then configured in topological order so each one sees the negotiated
//! properties of its input links.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;

use mediaflow_core::{Error, Frame, Result};
use tracing::{debug, trace};

use crate::parser::GraphDesc;
use crate::registry::create_filter;
use crate::traits::{Filter, FilterInfo, LinkProps, PadFrame};

/// A named graph input and the frames it accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPad {
    pub name: String,
    pub props: LinkProps,
}

impl InputPad {
    pub fn new(name: impl Into<String>, props: LinkProps) -> Self {
        Self {
            name: name.into(),
            props,
        }
    }
}

/// Where frames leaving a pad go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Node { node: usize, pad: usize },
    Output(usize),
}

/// Where frames arriving at a pad come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Node { node: usize, pad: usize },
    Input(usize),
}

struct Node {
    label: String,
    desc: String,
    info: &'static FilterInfo,
    filter: Box<dyn Filter>,
    sources: Vec<Source>,
    sinks: Vec<Endpoint>,
    input_props: Vec<LinkProps>,
    output_props: Vec<LinkProps>,
}

struct GraphInput {
    name: String,
    props: LinkProps,
    sink: Endpoint,
}

struct GraphOutput {
    name: String,
    props: LinkProps,
    source: Source,
    frames: Vec<Frame>,
}

/// A configured filter graph.
pub struct Graph {
    description: String,
    nodes: Vec<Node>,
    order: Vec<usize>,
    inputs: Vec<GraphInput>,
    outputs: Vec<GraphOutput>,
}

/// Link state while labels are being resolved.
struct Builder {
    nodes: Vec<PendingNode>,
    input_names: Vec<String>,
    output_names: Vec<String>,
    input_sinks: Vec<Option<Endpoint>>,
    output_sources: Vec<Option<Source>>,
    input_labels: Vec<(String, Endpoint)>,
    output_labels: Vec<(String, Source)>,
    open_inputs: Vec<Endpoint>,
    open_outputs: Vec<Source>,
}

struct PendingNode {
    label: String,
    desc: String,
    info: &'static FilterInfo,
    filter: Box<dyn Filter>,
    sources: Vec<Option<Source>>,
    sinks: Vec<Option<Endpoint>>,
}

fn check_pad_names(kind: &str, names: &[String], taken: &HashSet<&str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.is_empty() {
            return Err(Error::invalid_argument(format!("{} pad without a name", kind)));
        }
        if !seen.insert(name.as_str()) || taken.contains(name.as_str()) {
            return Err(Error::invalid_argument(format!(
                "duplicate pad name '{}'",
                name
            )));
        }
    }
    Ok(())
}

impl Builder {
    fn new(inputs: &[InputPad], outputs: &[String]) -> Result<Self> {
        if inputs.is_empty() {
            return Err(Error::invalid_argument("filter graph needs at least one input pad"));
        }
        if outputs.is_empty() {
            return Err(Error::invalid_argument("filter graph needs at least one output pad"));
        }
        if let Some(pad) = inputs.iter().find(|p| !p.props.time_base().is_positive()) {
            return Err(Error::invalid_argument(format!(
                "input pad '{}': time base {} is not positive",
                pad.name,
                pad.props.time_base()
            )));
        }
        let input_names: Vec<String> = inputs.iter().map(|p| p.name.clone()).collect();
        check_pad_names("input", &input_names, &HashSet::new())?;
        let taken: HashSet<&str> = input_names.iter().map(String::as_str).collect();
        check_pad_names("output", outputs, &taken)?;
        Ok(Self {
            nodes: Vec::new(),
            input_sinks: vec![None; inputs.len()],
            output_sources: vec![None; outputs.len()],
            input_names,
            output_names: outputs.to_vec(),
            input_labels: Vec::new(),
            output_labels: Vec::new(),
            open_inputs: Vec::new(),
            open_outputs: Vec::new(),
        })
    }

    fn add_chains(&mut self, desc: &GraphDesc) -> Result<()> {
        for chain in &desc.chains {
            let mut carried: Vec<Source> = Vec::new();
            for filter_desc in &chain.filters {
                let (info, filter) = create_filter(filter_desc)?;
                let node = self.nodes.len();
                let nb_inputs = filter.nb_inputs();
                let nb_outputs = filter.nb_outputs();
                let body = {
                    let mut plain = filter_desc.clone();
                    plain.inputs.clear();
                    plain.outputs.clear();
                    plain.to_string()
                };
                let mut pending = PendingNode {
                    label: format!("Parsed_{}_{}", filter_desc.name, node),
                    desc: body,
                    info,
                    filter,
                    sources: vec![None; nb_inputs],
                    sinks: vec![None; nb_outputs],
                };

                if filter_desc.inputs.len() + carried.len() > nb_inputs {
                    return Err(Error::invalid_argument(format!(
                        "{} has {} inputs but {} are connected",
                        pending.label,
                        nb_inputs,
                        filter_desc.inputs.len() + carried.len()
                    )));
                }
                let mut pad = 0;
                for label in &filter_desc.inputs {
                    self.input_labels
                        .push((label.clone(), Endpoint::Node { node, pad }));
                    pad += 1;
                }
                for source in carried.drain(..) {
                    pending.sources[pad] = Some(source);
                    if let Source::Node { node: from, pad: from_pad } = source {
                        self.nodes[from].sinks[from_pad] = Some(Endpoint::Node { node, pad });
                    }
                    pad += 1;
                }
                self.open_inputs
                    .extend((pad..nb_inputs).map(|pad| Endpoint::Node { node, pad }));

                if filter_desc.outputs.len() > nb_outputs {
                    return Err(Error::invalid_argument(format!(
                        "{} has {} outputs but {} labels",
                        pending.label,
                        nb_outputs,
                        filter_desc.outputs.len()
                    )));
                }
                for (pad, label) in filter_desc.outputs.iter().enumerate() {
                    self.output_labels
                        .push((label.clone(), Source::Node { node, pad }));
                }
                carried.extend(
                    (filter_desc.outputs.len()..nb_outputs).map(|pad| Source::Node { node, pad }),
                );
                self.nodes.push(pending);
            }
            self.open_outputs.append(&mut carried);
        }
        Ok(())
    }

    fn connect(&mut self, source: Source, sink: Endpoint) {
        match source {
            Source::Node { node, pad } => self.nodes[node].sinks[pad] = Some(sink),
            Source::Input(i) => self.input_sinks[i] = Some(sink),
        }
        match sink {
            Endpoint::Node { node, pad } => self.nodes[node].sources[pad] = Some(source),
            Endpoint::Output(o) => self.output_sources[o] = Some(source),
        }
    }

    fn resolve_labels(&mut self) -> Result<()> {
        let mut produced: HashMap<String, Source> = HashMap::new();
        for (label, source) in std::mem::take(&mut self.output_labels) {
            if self.input_names.contains(&label) {
                return Err(Error::invalid_argument(format!(
                    "[{}] names a graph input but is used as a filter output",
                    label
                )));
            }
            if let Some(o) = self.output_names.iter().position(|n| *n == label) {
                if self.output_sources[o].is_some() {
                    return Err(Error::invalid_argument(format!(
                        "output pad [{}] is connected twice",
                        label
                    )));
                }
                self.connect(source, Endpoint::Output(o));
                continue;
            }
            if produced.insert(label.clone(), source).is_some() {
                return Err(Error::invalid_argument(format!(
                    "link label [{}] is produced twice",
                    label
                )));
            }
        }

        let mut consumed: HashSet<String> = HashSet::new();
        for (label, sink) in std::mem::take(&mut self.input_labels) {
            if let Some(i) = self.input_names.iter().position(|n| *n == label) {
                if self.input_sinks[i].is_some() {
                    return Err(Error::invalid_argument(format!(
                        "input pad [{}] is connected twice",
                        label
                    )));
                }
                self.connect(Source::Input(i), sink);
                continue;
            }
            if self.output_names.contains(&label) {
                return Err(Error::invalid_argument(format!(
                    "[{}] names a graph output but is used as a filter input",
                    label
                )));
            }
            if !consumed.insert(label.clone()) {
                return Err(Error::invalid_argument(format!(
                    "link label [{}] is consumed twice",
                    label
                )));
            }
            let source = produced.remove(&label).ok_or_else(|| {
                Error::invalid_argument(format!("link label [{}] is never produced", label))
            })?;
            self.connect(source, sink);
        }

        if let Some(label) = produced.keys().min() {
            return Err(Error::invalid_argument(format!(
                "link label [{}] is never consumed",
                label
            )));
        }
        Ok(())
    }

    fn bind_unlabelled(&mut self) -> Result<()> {
        for sink in std::mem::take(&mut self.open_inputs) {
            let free = self.input_sinks.iter().position(Option::is_none);
            match free {
                Some(i) if self.input_sinks.len() == 1 => self.connect(Source::Input(i), sink),
                _ => return Err(self.unconnected_input(sink)),
            }
        }
        for source in std::mem::take(&mut self.open_outputs) {
            let free = self.output_sources.iter().position(Option::is_none);
            match free {
                Some(o) if self.output_sources.len() == 1 => {
                    self.connect(source, Endpoint::Output(o))
                }
                _ => return Err(self.unconnected_output(source)),
            }
        }
        if let Some(i) = self.input_sinks.iter().position(Option::is_none) {
            return Err(Error::invalid_argument(format!(
                "graph input '{}' is not connected",
                self.input_names[i]
            )));
        }
        if let Some(o) = self.output_sources.iter().position(Option::is_none) {
            return Err(Error::invalid_argument(format!(
                "graph output '{}' is not connected",
                self.output_names[o]
            )));
        }
        Ok(())
    }

    fn unconnected_input(&self, sink: Endpoint) -> Error {
        let what = match sink {
            Endpoint::Node { node, pad } => format!("input {} of {}", pad, self.nodes[node].label),
            Endpoint::Output(o) => format!("graph output '{}'", self.output_names[o]),
        };
        Error::invalid_argument(format!("{} is not connected", what))
    }

    fn unconnected_output(&self, source: Source) -> Error {
        let what = match source {
            Source::Node { node, pad } => format!("output {} of {}", pad, self.nodes[node].label),
            Source::Input(i) => format!("graph input '{}'", self.input_names[i]),
        };
        Error::invalid_argument(format!("{} is not connected", what))
    }
}

/// Kahn's algorithm; lowest node index first among ready nodes.
fn topological_order(nodes: &[PendingNode]) -> Result<Vec<usize>> {
    let mut indegree: Vec<usize> = nodes
        .iter()
        .map(|n| {
            n.sources
                .iter()
                .filter(|s| matches!(s, Some(Source::Node { .. })))
                .count()
        })
        .collect();
    let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(i) = ready.pop_front() {
        order.push(i);
        for sink in nodes[i].sinks.iter().flatten() {
            if let Endpoint::Node { node, .. } = *sink {
                indegree[node] -= 1;
                if indegree[node] == 0 {
                    ready.push_back(node);
                }
            }
        }
    }
    if order.len() != nodes.len() {
        return Err(Error::invalid_argument("filter graph contains a cycle"));
    }
    Ok(order)
}

impl Graph {
    /// Parse `description` and build a configured graph.
    pub fn build(description: &str, inputs: &[InputPad], outputs: &[String]) -> Result<Self> {
        let desc = GraphDesc::parse(description)?;
        let mut builder = Builder::new(inputs, outputs)?;
        builder.add_chains(&desc)?;
        builder.resolve_labels()?;
        builder.bind_unlabelled()?;
        let order = topological_order(&builder.nodes)?;

        let mut nodes = Vec::with_capacity(builder.nodes.len());
        for pending in builder.nodes {
            let lost = || Error::invalid_argument(format!("{} has an unconnected pad", pending.label));
            let sources = pending.sources.iter().copied().collect::<Option<Vec<_>>>();
            let sinks = pending.sinks.iter().copied().collect::<Option<Vec<_>>>();
            let (sources, sinks) = match (sources, sinks) {
                (Some(sources), Some(sinks)) => (sources, sinks),
                _ => return Err(lost()),
            };
            nodes.push(Node {
                label: pending.label,
                desc: pending.desc,
                info: pending.info,
                filter: pending.filter,
                sources,
                sinks,
                input_props: Vec::new(),
                output_props: Vec::new(),
            });
        }

        let mut graph_inputs = Vec::with_capacity(inputs.len());
        for (pad, sink) in inputs.iter().zip(builder.input_sinks) {
            graph_inputs.push(GraphInput {
                name: pad.name.clone(),
                props: pad.props,
                sink: sink.ok_or_else(|| {
                    Error::invalid_argument(format!("graph input '{}' is not connected", pad.name))
                })?,
            });
        }

        let mut graph = Graph {
            description: desc.to_string(),
            nodes,
            order,
            inputs: graph_inputs,
            outputs: Vec::new(),
        };
        graph.configure()?;

        for (name, source) in builder.output_names.into_iter().zip(builder.output_sources) {
            let source = source.ok_or_else(|| {
                Error::invalid_argument(format!("graph output '{}' is not connected", name))
            })?;
            let props = graph.source_props(source)?;
            graph.outputs.push(GraphOutput {
                name,
                props,
                source,
                frames: Vec::new(),
            });
        }

        debug!(
            graph = %graph.description,
            filters = graph.nodes.len(),
            inputs = graph.inputs.len(),
            outputs = graph.outputs.len(),
            "filter graph configured"
        );
        Ok(graph)
    }

    fn source_props(&self, source: Source) -> Result<LinkProps> {
        match source {
            Source::Input(i) => Ok(self.inputs[i].props),
            Source::Node { node, pad } => {
                self.nodes[node].output_props.get(pad).copied().ok_or_else(|| {
                    Error::invalid_argument(format!(
                        "{} output {} is not configured",
                        self.nodes[node].label, pad
                    ))
                })
            }
        }
    }

    fn configure(&mut self) -> Result<()> {
        for idx in self.order.clone() {
            let props = self.nodes[idx]
                .sources
                .iter()
                .map(|s| self.source_props(*s))
                .collect::<Result<Vec<_>>>()?;
            let node = &mut self.nodes[idx];
            if let Some((pad, link)) = props
                .iter()
                .enumerate()
                .find(|(_, link)| link.media_type() != node.info.media_type)
            {
                return Err(Error::invalid_argument(format!(
                    "{} takes {} but input {} is {}",
                    node.label,
                    node.info.media_type,
                    pad,
                    link.media_type()
                )));
            }
            let outputs = node.filter.configure(&props)?;
            if outputs.len() != node.sinks.len() {
                return Err(Error::invalid_argument(format!(
                    "{} configured {} outputs, expected {}",
                    node.label,
                    outputs.len(),
                    node.sinks.len()
                )));
            }
            trace!(filter = %node.label, "configured");
            node.input_props = props;
            node.output_props = outputs;
        }
        Ok(())
    }

    /// Feed one frame into input pad `input`.
    ///
    /// The frame must match the pad; its timestamps are rescaled into the
    /// pad's time base. Frames reaching outputs are kept until
    /// [`Graph::take_outputs`].
    pub fn send(&mut self, input: usize, mut frame: Frame) -> Result<()> {
        let pad = self
            .inputs
            .get(input)
            .ok_or_else(|| Error::invalid_argument(format!("no graph input {}", input)))?;
        pad.props
            .check_frame(&frame, &format!("input pad '{}'", pad.name))?;
        frame.rescale_ts(pad.props.time_base());
        let mut queue = VecDeque::new();
        queue.push_back((pad.sink, frame));
        self.run(queue)
    }

    /// Flush every filter in topological order.
    pub fn flush(&mut self) -> Result<()> {
        for idx in self.order.clone() {
            let produced = self.nodes[idx].filter.flush()?;
            let mut queue = VecDeque::new();
            self.route(idx, produced, &mut queue);
            self.run(queue)?;
        }
        Ok(())
    }

    fn run(&mut self, mut queue: VecDeque<(Endpoint, Frame)>) -> Result<()> {
        while let Some((endpoint, frame)) = queue.pop_front() {
            match endpoint {
                Endpoint::Output(o) => self.outputs[o].frames.push(frame),
                Endpoint::Node { node, pad } => {
                    let produced = self.nodes[node].filter.filter(pad, frame)?;
                    self.route(node, produced, &mut queue);
                }
            }
        }
        Ok(())
    }

    fn route(&self, node: usize, produced: Vec<PadFrame>, queue: &mut VecDeque<(Endpoint, Frame)>) {
        let sinks = &self.nodes[node].sinks;
        for (pad, frame) in produced {
            if let Some(sink) = sinks.get(pad) {
                queue.push_back((*sink, frame));
            }
        }
    }

    /// Frames collected per output pad since the last call, in pad order.
    pub fn take_outputs(&mut self) -> Vec<(String, Vec<Frame>)> {
        self.outputs
            .iter_mut()
            .map(|o| (o.name.clone(), std::mem::take(&mut o.frames)))
            .collect()
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|i| i.name.as_str())
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|o| o.name.as_str())
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|i| i.name == name)
    }

    /// Negotiated properties of an output pad.
    pub fn output_props(&self, name: &str) -> Option<&LinkProps> {
        self.outputs
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.props)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn source_name(&self, source: Source) -> String {
        match source {
            Source::Input(i) => format!("input '{}'", self.inputs[i].name),
            Source::Node { node, pad } => format!("{}:{}", self.nodes[node].label, pad),
        }
    }

    fn sink_name(&self, sink: Endpoint) -> String {
        match sink {
            Endpoint::Output(o) => format!("output '{}'", self.outputs[o].name),
            Endpoint::Node { node, pad } => format!("{}:{}", self.nodes[node].label, pad),
        }
    }

    /// Human-readable topology with negotiated link properties.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "graph: {}", self.description);
        for input in &self.inputs {
            let _ = writeln!(
                out,
                "input '{}': {} -> {}",
                input.name,
                input.props,
                self.sink_name(input.sink)
            );
        }
        for &idx in &self.order {
            let node = &self.nodes[idx];
            let _ = writeln!(out, "{} ({})", node.label, node.desc);
            for (pad, (source, props)) in node.sources.iter().zip(&node.input_props).enumerate() {
                let _ = writeln!(out, "    in {}: {} <- {}", pad, props, self.source_name(*source));
            }
            for (pad, (sink, props)) in node.sinks.iter().zip(&node.output_props).enumerate() {
                let _ = writeln!(out, "    out {}: {} -> {}", pad, props, self.sink_name(*sink));
            }
        }
        for output in &self.outputs {
            let _ = writeln!(
                out,
                "output '{}': {} <- {}",
                output.name,
                output.props,
                self.source_name(output.source)
            );
        }
        out
    }
}
