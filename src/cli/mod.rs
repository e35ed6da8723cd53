//! CLI Module
//!
//! Command-line interface for exporting lyric blocks from a session file.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::model::OutputFormat;

/// Blockmix - render selected lyric blocks into one audio file
#[derive(Parser, Debug)]
#[command(name = "blockmix")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Session file and block selection shared by every command
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Session JSON (title, stems, mix, markers, blocks)
    #[arg(short, long)]
    pub session: PathBuf,

    /// Block ids to export, in playback order
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub blocks: Vec<String>,

    /// Override the session's playback rate
    #[arg(long)]
    pub rate: Option<f64>,

    /// Export configuration JSON
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the source time range of each selected block
    #[command(name = "resolve")]
    Resolve {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Show the output timeline and check the duration limit
    #[command(name = "plan")]
    Plan {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Output format (mp3 or wav)
        #[arg(short, long, default_value = "mp3")]
        format: OutputFormat,
    },

    /// Render and encode the selection
    #[command(name = "export")]
    Export {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Output file, or a directory to place the generated file name in
        #[arg(short, long)]
        output: PathBuf,

        /// Output format (mp3 or wav)
        #[arg(short, long, default_value = "mp3")]
        format: OutputFormat,

        /// MP3 bitrate in kbps
        #[arg(long)]
        bitrate: Option<u32>,

        /// Instrumental gain in dB
        #[arg(long, allow_hyphen_values = true)]
        instrumental_db: Option<f32>,

        /// Vocals gain in dB
        #[arg(long, allow_hyphen_values = true)]
        vocals_db: Option<f32>,

        /// Write a JSON report next to the export
        #[arg(long)]
        report: Option<PathBuf>,
    },
}
