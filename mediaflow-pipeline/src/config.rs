//! Pipeline job description.
//!
//! A job is plain JSON:
//!
//! ```json
//! {
//!   "input": { "url": "in.mpk" },
//!   "output": { "url": "out.mpk" },
//!   "streams": [
//!     { "input": 0, "route": { "transcode": { "encoder": { "codec": { "name": "delta" } },
//!                                            "filter": "scale=320:-1" } } },
//!     { "input": 1, "route": "copy" }
//!   ],
//!   "start": { "target": { "time": 2.0 }, "backward": true }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use mediaflow_codecs::EncoderConfig;
use mediaflow_containers::SeekOptions;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Packets between two progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100;

fn default_progress_interval() -> u64 {
    DEFAULT_PROGRESS_INTERVAL
}

/// Where the pipeline reads from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    pub url: String,
    /// Demuxer name; probed when absent.
    #[serde(default)]
    pub format: Option<String>,
    /// Demuxer private options, such as `video_size` for raw input.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Where the pipeline writes to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub url: String,
    /// Muxer name; taken from the url extension when absent.
    #[serde(default)]
    pub format: Option<String>,
    /// Muxer options applied when the header is written.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Re-encode settings for one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranscodeRoute {
    /// Encoder settings. Unset geometry, formats and time base follow the
    /// frames feeding the encoder; an empty codec name keeps the input codec.
    #[serde(default)]
    pub encoder: EncoderConfig,
    /// Filter chain between decoder and encoder.
    #[serde(default)]
    pub filter: Option<String>,
}

/// What happens to one input stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamRoute {
    /// Packets go to the muxer untouched.
    Copy,
    /// Packets are decoded, optionally filtered and encoded again.
    Transcode(TranscodeRoute),
}

/// Maps an input stream to a route. Output streams are numbered in mapping
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamMap {
    pub input: usize,
    pub route: StreamRoute,
}

impl StreamMap {
    pub fn copy(input: usize) -> Self {
        Self {
            input,
            route: StreamRoute::Copy,
        }
    }
}

/// Complete description of a pipeline job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    /// Stream mappings. Empty copies every input stream; otherwise unmapped
    /// streams are dropped.
    #[serde(default)]
    pub streams: Vec<StreamMap>,
    /// Seek applied before the first packet is read.
    #[serde(default)]
    pub start: Option<SeekOptions>,
    /// Report progress every this many packets; 0 disables reports.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    /// Replace an existing output file.
    #[serde(default)]
    pub overwrite: bool,
}

impl PipelineConfig {
    /// A job copying every stream of `input` into `output`.
    #[must_use]
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: InputConfig {
                url: input.into(),
                ..InputConfig::default()
            },
            output: OutputConfig {
                url: output.into(),
                ..OutputConfig::default()
            },
            streams: Vec::new(),
            start: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            overwrite: false,
        }
    }

    /// Parse a JSON job description.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON job description from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set the demuxer by name.
    #[must_use]
    pub fn input_format(mut self, name: impl Into<String>) -> Self {
        self.input.format = Some(name.into());
        self
    }

    /// Set a demuxer private option.
    #[must_use]
    pub fn input_option(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.input.options.insert(key.into(), value.to_string());
        self
    }

    /// Set the muxer by name.
    #[must_use]
    pub fn output_format(mut self, name: impl Into<String>) -> Self {
        self.output.format = Some(name.into());
        self
    }

    /// Set a muxer option.
    #[must_use]
    pub fn output_option(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.output.options.insert(key.into(), value.to_string());
        self
    }

    /// Copy an input stream.
    #[must_use]
    pub fn copy(mut self, input: usize) -> Self {
        self.streams.push(StreamMap::copy(input));
        self
    }

    /// Re-encode an input stream, optionally through a filter chain.
    #[must_use]
    pub fn transcode(mut self, input: usize, encoder: EncoderConfig, filter: Option<&str>) -> Self {
        self.streams.push(StreamMap {
            input,
            route: StreamRoute::Transcode(TranscodeRoute {
                encoder,
                filter: filter.map(str::to_string),
            }),
        });
        self
    }

    /// Seek before reading.
    #[must_use]
    pub fn start(mut self, seek: SeekOptions) -> Self {
        self.start = Some(seek);
        self
    }

    #[must_use]
    pub fn progress_interval(mut self, packets: u64) -> Self {
        self.progress_interval = packets;
        self
    }

    #[must_use]
    pub fn overwrite(mut self, enable: bool) -> Self {
        self.overwrite = enable;
        self
    }

    /// Check the job for mistakes that need no input to detect.
    pub fn validate(&self) -> Result<()> {
        if self.input.url.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("no input url".into()));
        }
        if self.output.url.trim().is_empty() && self.output.format.is_none() {
            return Err(PipelineError::InvalidConfig(
                "output needs a url or a format".into(),
            ));
        }
        let mut seen = BTreeSet::new();
        for map in &self.streams {
            if !seen.insert(map.input) {
                return Err(PipelineError::InvalidConfig(format!(
                    "input stream {} is mapped twice",
                    map.input
                )));
            }
            if let StreamRoute::Transcode(TranscodeRoute {
                filter: Some(filter),
                ..
            }) = &map.route
            {
                if filter.trim().is_empty() {
                    return Err(PipelineError::InvalidConfig(format!(
                        "stream {}: empty filter",
                        map.input
                    )));
                }
            }
        }
        Ok(())
    }
}
