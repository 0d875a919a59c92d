//! CLI subcommand implementations.

pub mod list;
pub mod probe;
pub mod testsrc;
pub mod transcode;
pub mod transmux;

pub use list::CmdList;
pub use probe::CmdProbe;
pub use testsrc::CmdTestsrc;
pub use transcode::CmdTranscode;
pub use transmux::CmdTransmux;

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use mediaflow_pipeline::{Pipeline, PipelineConfig, PipelineStats};
use tracing::debug;

/// Parse `key=value` for repeated option flags.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

/// Run a job with a progress bar unless `quiet`, then print a summary.
pub async fn run_pipeline(config: PipelineConfig, quiet: bool) -> anyhow::Result<PipelineStats> {
    let output = config.output.url.clone();
    debug!(
        input = %config.input.url,
        output = %output,
        mapped = config.streams.len(),
        "running job"
    );
    let mut pipeline = Pipeline::new(config)?;

    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(1000);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {percent:>3}% {msg}")?
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    };
    let progress = bar.clone();
    pipeline = pipeline.on_progress(move |stats| {
        progress.set_position((stats.progress() * 10.0) as u64);
        progress.set_message(format!("{} packets", stats.packets_read));
    });

    let result = pipeline.run().await;
    bar.finish_and_clear();
    let stats = result?;

    if !quiet {
        print_summary(&output, &stats);
    }
    Ok(stats)
}

fn print_summary(output: &str, stats: &PipelineStats) {
    println!("{}", style("Done").green().bold());
    println!("  {:<16} {}", style("Output:").white(), output);
    println!("  {:<16} {}", style("Packets read:").white(), stats.packets_read);
    println!("  {:<16} {}", style("Packets written:").white(), stats.packets_written);
    if stats.frames_decoded > 0 {
        println!("  {:<16} {}", style("Frames decoded:").white(), stats.frames_decoded);
        println!("  {:<16} {}", style("Packets encoded:").white(), stats.packets_encoded);
    }
    println!(
        "  {:<16} {:.2}s",
        style("Time:").white(),
        stats.elapsed.as_secs_f64()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("video_size=16x8").unwrap(),
            ("video_size".to_string(), "16x8".to_string())
        );
        assert_eq!(
            parse_key_value("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
