use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "yt-transcripts",
    about = "YT Transcript Scraper - Retrieve YouTube transcripts for single videos or whole channels",
    version,
    long_about = "Drives a headless Chromium so the YouTube player issues its own transcript request, replays that request and parses the response into plain text. Channel runs are resumable: transcripts and failures are persisted per channel and skipped on the next run."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file to use instead of the default location
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Retrieve the transcript of a single video
    Video {
        /// Video ID (e.g. dQw4w9WgXcQ)
        #[arg(value_name = "VIDEO_ID", required_unless_present = "url", conflicts_with = "url")]
        video_id: Option<String>,

        /// Watch, short or youtu.be URL of the video
        #[arg(short, long, value_name = "URL")]
        url: Option<String>,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Retrieve transcripts for every upload of a channel
    Channel {
        /// Channel ID (e.g. UC_x5XG1OV2P6uZZ5FSM9Ttw)
        #[arg(value_name = "CHANNEL_ID")]
        channel_id: String,

        /// YouTube Data API key
        #[arg(short = 'k', long, env = "YT_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Directory holding the raw/ and failed/ result files
        #[arg(short = 's', long, value_name = "DIR")]
        save_dir: Option<PathBuf>,

        /// Re-attempt videos recorded as failed by earlier runs
        #[arg(short = 'r', long)]
        retry_failed: bool,

        /// Videos processed between checkpoints
        #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
        checkpoint_every: Option<u64>,
    },

    /// Show or initialize configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON with video URL, language flag and source
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
