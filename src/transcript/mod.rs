use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::browser::{BrowserError, BrowserSurface};
use crate::config::InterceptionSettings;
use crate::utils::video_url;
use crate::{AcquisitionError, ScraperError};

pub mod intercept;
pub mod parser;
pub mod replay;

pub use intercept::{Capture, InterceptionController};
pub use replay::ReplayClient;

/// Which capture strategy produced a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    TranscriptPanel,
    CaptionsFallback,
}

/// Transcript of a single video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// Space-joined transcript segments; may be empty
    pub text: String,

    /// Canonical watch URL of the video
    pub video_url: String,

    pub is_english: bool,

    pub source_kind: SourceKind,
}

/// Anything that can produce a transcript for a video ID
#[async_trait]
pub trait TranscriptSource: Send {
    async fn get_transcript(&mut self, video_id: &str) -> Result<TranscriptResult, AcquisitionError>;
}

/// Interception, replay and parsing over one reusable browser session.
///
/// The engine does not open or close browsers per video: the caller creates the session,
/// hands it over, and must call [`TranscriptEngine::close`] when the run ends.
pub struct TranscriptEngine<B> {
    controller: InterceptionController<B>,
    replay: ReplayClient,
}

impl<B: BrowserSurface> TranscriptEngine<B> {
    pub fn new(surface: B, settings: InterceptionSettings, replay: ReplayClient) -> Self {
        Self {
            controller: InterceptionController::new(surface, settings),
            replay,
        }
    }

    /// Acquire the transcript for `video_id`
    pub async fn get_transcript(&mut self, video_id: &str) -> Result<TranscriptResult, AcquisitionError> {
        self.acquire(video_id)
            .await
            .map_err(|cause| AcquisitionError::new(video_id, cause))
    }

    async fn acquire(&mut self, video_id: &str) -> Result<TranscriptResult, ScraperError> {
        let video_url = video_url(video_id);

        match self.controller.capture(&video_url).await? {
            Capture::PanelCaptured(request) => {
                let json = self.replay.replay_transcript_panel(&request).await?;
                let (text, is_english) = parser::parse_transcript_panel(&json, &video_url)?;
                Ok(TranscriptResult {
                    text,
                    video_url,
                    is_english,
                    source_kind: SourceKind::TranscriptPanel,
                })
            }
            Capture::FallbackCaptured { timedtext_url } => {
                let json = self.replay.replay_captions_fallback(&timedtext_url).await?;
                let is_english = parser::captions_url_is_english(&timedtext_url);
                let text = parser::parse_captions_fallback(&json, &video_url)?;
                Ok(TranscriptResult {
                    text,
                    video_url,
                    is_english,
                    source_kind: SourceKind::CaptionsFallback,
                })
            }
            Capture::Failed { reason } => Err(ScraperError::Interception { reason }),
        }
    }

    /// Release the browser session
    pub async fn close(mut self) -> Result<(), BrowserError> {
        self.controller.surface_mut().close().await
    }
}

#[async_trait]
impl<B: BrowserSurface> TranscriptSource for TranscriptEngine<B> {
    async fn get_transcript(&mut self, video_id: &str) -> Result<TranscriptResult, AcquisitionError> {
        TranscriptEngine::get_transcript(self, video_id).await
    }
}
