use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "vigia",
    version,
    about = "Dashboard client for a remote motion-detection appliance"
)]
pub struct Args {
    /// Base URL of the appliance backend.
    #[arg(long, global = true, env = "VIGIA_SERVER", default_value = "http://127.0.0.1:5000")]
    pub server: String,

    /// Session token store file (defaults to the user configuration
    /// directory).
    #[arg(long, global = true, env = "VIGIA_STORE")]
    pub store: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Authenticate against the appliance and persist the session token.
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },

    /// Drop the persisted session token.
    Logout,

    /// Start motion detection on the appliance.
    Start,

    /// Stop motion detection.
    Stop,

    /// Pause detection; the camera keeps streaming.
    Pause,

    /// Resume detection after a pause.
    Resume,

    /// Set the motion detection threshold, in percent.
    Threshold {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        value: u8,
    },

    /// Start monitoring and follow the live feed and alert log until
    /// interrupted.
    Watch {
        /// Write every received frame as a JPEG into this directory.
        #[arg(long)]
        frames_dir: Option<PathBuf>,

        /// Do not open the video feed; follow alerts only.
        #[arg(long)]
        hide_feed: bool,
    },
}
