//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::inspect::InspectArgs;
use crate::commands::replay::ReplayArgs;

/// Reconstructs pump therapy timelines from exported device logs.
///
/// Replays decoded therapy events through the reconstruction engine to
/// produce gap-free insulin-delivery timelines, one per device.
#[derive(Debug, Parser)]
#[command(name = "pumplog", version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replay an exported log into reconstructed timelines.
    Replay(ReplayArgs),

    /// Summarize an exported log without replaying it.
    Inspect(InspectArgs),
}
