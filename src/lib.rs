//! YT Transcript Scraper - retrieve spoken-word transcripts for YouTube videos
//!
//! This library drives a headless browser to make the YouTube player issue its own
//! transcript (or caption) request, replays that request outside the browser and parses
//! the payload into plain text. On top of that, a resumable batch pipeline walks every
//! upload of a channel and persists successes and failures between runs.

pub mod browser;
pub mod channel;
pub mod cli;
pub mod config;
pub mod output;
pub mod pipeline;
pub mod store;
pub mod transcript;
pub mod utils;

pub use browser::{BrowserError, BrowserSurface, CapturedRequest};
pub use channel::{ChannelCatalog, ChannelMetadataProvider, YouTubeDataApi};
pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use pipeline::{BatchPipeline, PipelineOptions, RunSummary};
pub use store::{DictionaryStore, FailureRecord, JsonFileStore, VideoRecord};
pub use transcript::{SourceKind, TranscriptEngine, TranscriptResult, TranscriptSource};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// JSON path that was missing or had an unexpected type while walking a payload
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("missing or mistyped field `{path}`")]
pub struct FieldError {
    pub path: String,
}

/// A transcript payload that did not have the expected shape
#[derive(thiserror::Error, Debug)]
#[error("Failed to parse {kind} JSON: {source} \n Vid URL: {video_url}")]
pub struct ParseError {
    /// Which payload was being parsed ("transcript" or "timedtext")
    pub kind: &'static str,

    /// Watch URL of the video, kept for diagnostics
    pub video_url: String,

    #[source]
    pub source: FieldError,
}

/// Error types specific to transcript acquisition
#[derive(thiserror::Error, Debug)]
pub enum ScraperError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Browser session error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Failed to intercept both get_transcript and timedtext requests: {reason}")]
    Interception { reason: String },

    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Captured request body is not valid JSON: {0}")]
    CapturedBody(#[source] serde_json::Error),

    #[error("No english transcript available")]
    NonEnglish,
}

/// Failure of a single `get_transcript` call
#[derive(thiserror::Error, Debug)]
#[error("Failed to get transcript for {video_id}: {cause}")]
pub struct AcquisitionError {
    pub video_id: String,

    #[source]
    pub cause: ScraperError,
}

impl AcquisitionError {
    pub fn new(video_id: impl Into<String>, cause: impl Into<ScraperError>) -> Self {
        Self {
            video_id: video_id.into(),
            cause: cause.into(),
        }
    }
}
