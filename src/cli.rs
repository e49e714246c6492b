use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "autopilot",
    about = "Keep an interactive coding assistant moving by answering its prompts with a local LLM",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Attach to the target window and drive it until interrupted
    Run {
        /// Override the window title regex
        #[arg(long)]
        title: Option<String>,

        /// Override the model identifier
        #[arg(long)]
        model: Option<String>,

        /// Override the pause between cycles, in seconds
        #[arg(long)]
        interval: Option<f64>,

        /// Override the document appended to the system instructions
        #[arg(long)]
        document: Option<PathBuf>,

        /// Do not write the JSON-lines activity log
        #[arg(long)]
        no_activity_log: bool,
    },

    /// List windows matching the title pattern and classify what each shows
    Windows {
        /// Override the window title regex
        #[arg(long)]
        title: Option<String>,
    },

    /// Show the effective configuration
    Config {
        /// Emit JSON instead of the grouped text view
        #[arg(long)]
        json: bool,
    },
}
