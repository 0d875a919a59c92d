//! Packet-copy remux command.

use clap::Args;
use mediaflow_containers::SeekOptions;
use mediaflow_pipeline::PipelineConfig;

use super::{parse_key_value, run_pipeline};

/// Copy every stream of a file into another container without re-encoding.
#[derive(Args, Debug)]
pub struct CmdTransmux {
    /// Input file
    pub input: String,

    /// Output file; the muxer follows its extension unless --format is given
    pub output: String,

    /// Force the muxer
    #[arg(short, long)]
    pub format: Option<String>,

    /// Force the demuxer
    #[arg(long)]
    pub input_format: Option<String>,

    /// Demuxer option (repeatable)
    #[arg(short = 'O', long = "option", value_parser = parse_key_value)]
    pub options: Vec<(String, String)>,

    /// Start at the first keyframe at or after this many seconds
    #[arg(long)]
    pub start: Option<f64>,

    /// Overwrite output file if it exists
    #[arg(short = 'y', long)]
    pub overwrite: bool,
}

impl CmdTransmux {
    pub fn to_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(&self.input, &self.output).overwrite(self.overwrite);
        if let Some(format) = &self.format {
            config = config.output_format(format);
        }
        if let Some(format) = &self.input_format {
            config = config.input_format(format);
        }
        for (key, value) in &self.options {
            config = config.input_option(key, value);
        }
        if let Some(seconds) = self.start {
            config = config.start(SeekOptions::time(seconds));
        }
        config
    }

    pub async fn run(&self, quiet: bool) -> anyhow::Result<()> {
        run_pipeline(self.to_config(), quiet).await?;
        Ok(())
    }
}
