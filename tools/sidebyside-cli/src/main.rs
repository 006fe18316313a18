//! SideBySide CLI: compose before/after clips into one labelled artifact.
//!
//! Usage:
//!   sidebyside compose <BEFORE> <AFTER>   Run a composition job
//!   sidebyside plan                       Print the engine arguments for a job
//!   sidebyside check [--write-config]     Check engine and font availability

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use sidebyside_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "sidebyside",
    about = "Side-by-side before/after clip composer",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Per-clip timing and output format, shared by `compose` and `plan`.
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Where the before clip should start (seconds)
    #[arg(long, default_value = "0")]
    pub before_start: f64,

    /// Where the after clip should start (seconds)
    #[arg(long, default_value = "0")]
    pub after_start: f64,

    /// Declared length of the before clip (seconds, informational)
    #[arg(long)]
    pub before_duration: Option<f64>,

    /// Declared length of the after clip (seconds, informational)
    #[arg(long)]
    pub after_duration: Option<f64>,

    /// Output format: gif|mp4
    #[arg(short, long, default_value = "gif")]
    pub format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose two clips side by side
    Compose {
        /// The "before" clip (left half)
        before: PathBuf,

        /// The "after" clip (right half)
        after: PathBuf,

        #[command(flatten)]
        job: JobArgs,

        /// Output file or directory (defaults to ./output.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Label font (overrides config)
        #[arg(long)]
        font: Option<PathBuf>,

        /// Engine workspace directory (overrides config)
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Print the engine arguments a job would run with
    Plan {
        #[command(flatten)]
        job: JobArgs,

        /// Print as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Check that ffmpeg, ffprobe, and the label font are usable
    Check {
        /// Also write the effective configuration to the config file
        #[arg(long)]
        write_config: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    sidebyside_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Compose {
            before,
            after,
            job,
            output,
            font,
            workspace,
        } => {
            if let Some(font) = font {
                config.engine.font_path = font;
            }
            if workspace.is_some() {
                config.engine.workspace_dir = workspace;
            }
            commands::compose::run(config.engine, before, after, job, output).await
        }
        Commands::Plan { job, json } => commands::plan::run(job, json),
        Commands::Check { write_config } => {
            if write_config {
                config.save()?;
                println!(
                    "Wrote configuration to {}",
                    sidebyside_common::config::config_file_path().display()
                );
            }
            commands::check::run(config.engine).await
        }
    }
}
