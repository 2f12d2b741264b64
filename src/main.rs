// SPDX-License-Identifier: GPL-3.0-only

use camera_session::backends::camera::types::{AspectRatio, LensFacing};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-session")]
#[command(about = "Drive a camera capture session from the command line")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Configuration file (default: ~/.config/camera-session/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Take a photo
    Photo {
        /// Lens to use (back or front)
        #[arg(short, long)]
        facing: Option<LensFacing>,

        /// Aspect ratio, e.g. 4:3 or 16:9
        #[arg(short, long)]
        ratio: Option<AspectRatio>,

        /// Output directory (default: ~/Pictures/camera)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Record a video
    Video {
        /// Lens to use (back or front)
        #[arg(short, long)]
        facing: Option<LensFacing>,

        /// Recording duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Output directory (default: ~/Videos/camera)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Record audio from the microphone
        #[arg(short, long)]
        audio: bool,
    },

    /// Print the effective configuration
    Config {
        /// Write the effective configuration back to disk
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control the log level, e.g. RUST_LOG=camera_session=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(camera_session::Config::default_path);
    let config = camera_session::Config::load(&config_path)?;

    match cli.command {
        Commands::List => cli::list_cameras(),
        Commands::Photo {
            facing,
            ratio,
            output,
        } => cli::take_photo(config, facing, ratio, output).await,
        Commands::Video {
            facing,
            duration,
            output,
            audio,
        } => cli::record_video(config, facing, duration, output, audio).await,
        Commands::Config { save } => cli::show_config(&config, &config_path, save),
    }
}
