//! mediaflow CLI - inspect, remux, transcode and synthesise media files.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{CmdList, CmdProbe, CmdTestsrc, CmdTranscode, CmdTransmux};

/// Command-line arguments for the mediaflow tool.
#[derive(Parser, Debug)]
#[command(name = "mediaflow")]
#[command(version)]
#[command(about = "Demux, decode, filter, encode and mux media files")]
#[command(long_about = "mediaflow runs media through a demuxer, decoder, filter graph, \
    encoder and muxer.\n\n\
    EXAMPLES:\n    \
    mediaflow testsrc clip.mpk --duration 2 --tone 440\n    \
    mediaflow probe clip.mpk\n    \
    mediaflow transmux clip.mpk copy.mpk --start 0.5\n    \
    mediaflow transcode clip.mpk small.mpk --vf scale=160:-1 --bf 2\n    \
    mediaflow transcode --job job.json\n    \
    mediaflow list filters")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show container and stream information
    Probe(CmdProbe),
    /// Copy every stream into another container
    Transmux(CmdTransmux),
    /// Re-encode streams, optionally through filters
    Transcode(CmdTranscode),
    /// Write a synthetic test clip
    Testsrc(CmdTestsrc),
    /// List registered codecs, formats, filters and sample layouts
    List(CmdList),
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Probe(cmd) => cmd.run().await,
        Commands::Transmux(cmd) => cmd.run(cli.quiet).await,
        Commands::Transcode(cmd) => cmd.run(cli.quiet).await,
        Commands::Testsrc(cmd) => cmd.run(cli.quiet).await,
        Commands::List(cmd) => cmd.run(),
    }
}
