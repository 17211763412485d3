//! Two-strategy capture of the player's transcript requests.
//!
//! ```text
//! clear routes -> navigate -> panel strategy --captured--> PanelCaptured
//!                                   | timeout / nothing captured
//!                                   v
//!                             captions strategy --captured--> FallbackCaptured
//!                                   | timeout / nothing captured
//!                                   v
//!                                 Failed
//! ```

use std::time::Duration;

use crate::browser::{BrowserError, BrowserSurface, CapturedRequest, RouteFilter, Target};
use crate::config::InterceptionSettings;

const EXPAND_DESCRIPTION: Target = Target::Role {
    role: "button",
    name: "...more",
};
const SHOW_TRANSCRIPT: Target = Target::Role {
    role: "button",
    name: "Show transcript",
};
const MOVIE_PLAYER: Target = Target::Css("#movie_player");
const CAPTIONS_TOGGLE: Target = Target::Css("button.ytp-subtitles-button");

/// Outcome of one capture attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    /// The transcript panel issued a `get_transcript` request
    PanelCaptured(CapturedRequest),

    /// The captions toggle issued a `timedtext` request
    FallbackCaptured { timedtext_url: String },

    /// Neither strategy produced a request
    Failed { reason: String },
}

/// Drives a [`BrowserSurface`] through the panel strategy, then the captions fallback
pub struct InterceptionController<B> {
    surface: B,
    settings: InterceptionSettings,
}

impl<B: BrowserSurface> InterceptionController<B> {
    pub fn new(surface: B, settings: InterceptionSettings) -> Self {
        Self { surface, settings }
    }

    /// Capture the transcript request for `video_url`.
    ///
    /// Only a failure to clear the previous route is returned as an error; every other
    /// failure ends in [`Capture::Failed`].
    pub async fn capture(&mut self, video_url: &str) -> Result<Capture, BrowserError> {
        self.surface.clear_routes().await?;

        let panel_failure = match self.attempt_panel(video_url).await {
            Ok(Some(request)) => {
                tracing::debug!("Transcript panel captured for {}", video_url);
                return Ok(Capture::PanelCaptured(request));
            }
            Ok(None) => "transcript panel opened but no get_transcript request was seen".to_string(),
            Err(PanelError::Navigation(err)) => {
                return Ok(Capture::Failed {
                    reason: err.to_string(),
                });
            }
            Err(PanelError::Browser(err)) => err.to_string(),
        };
        tracing::debug!("Panel strategy failed for {}: {}", video_url, panel_failure);

        match self.attempt_fallback().await {
            Ok(Some(timedtext_url)) => {
                tracing::debug!("Captions fallback captured for {}", video_url);
                Ok(Capture::FallbackCaptured { timedtext_url })
            }
            Ok(None) => Ok(Capture::Failed {
                reason: format!(
                    "{}; captions enabled but no timedtext request was seen",
                    panel_failure
                ),
            }),
            Err(err) => Ok(Capture::Failed {
                reason: format!("{}; {}", panel_failure, err),
            }),
        }
    }

    async fn attempt_panel(&mut self, video_url: &str) -> Result<Option<CapturedRequest>, PanelError> {
        let panel_timeout = self.settings.panel_timeout();

        self.surface
            .route(RouteFilter::TRANSCRIPT_PANEL)
            .await
            .map_err(PanelError::Browser)?;
        self.surface
            .goto(video_url)
            .await
            .map_err(PanelError::Navigation)?;
        self.surface
            .click(EXPAND_DESCRIPTION, panel_timeout)
            .await
            .map_err(PanelError::Browser)?;
        self.surface
            .click(SHOW_TRANSCRIPT, panel_timeout)
            .await
            .map_err(PanelError::Browser)?;

        Ok(self.settled_capture(self.settings.capture_settle()).await)
    }

    async fn attempt_fallback(&mut self) -> Result<Option<String>, BrowserError> {
        let fallback_timeout = self.settings.fallback_timeout();

        self.surface.route(RouteFilter::TIMEDTEXT).await?;
        self.surface.hover(MOVIE_PLAYER, fallback_timeout).await?;
        self.surface.wait(self.settings.hover_settle()).await;
        self.surface.click(CAPTIONS_TOGGLE, fallback_timeout).await?;

        Ok(self
            .settled_capture(self.settings.capture_settle())
            .await
            .map(|request| request.url))
    }

    async fn settled_capture(&mut self, settle: Duration) -> Option<CapturedRequest> {
        self.surface.wait(settle).await;
        self.surface.take_captured().await
    }

    /// The browser surface the controller drives
    pub fn surface_mut(&mut self) -> &mut B {
        &mut self.surface
    }
}

enum PanelError {
    Navigation(BrowserError),
    Browser(BrowserError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::MockBrowserSurface;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::collections::BTreeMap;

    const VIDEO_URL: &str = "https://www.youtube.com/watch?v=abc";

    fn settings() -> InterceptionSettings {
        InterceptionSettings {
            panel_timeout_ms: 1000,
            fallback_timeout_ms: 2000,
            hover_settle_ms: 1,
            capture_settle_ms: 2,
        }
    }

    fn transcript_request() -> CapturedRequest {
        CapturedRequest {
            url: "https://www.youtube.com/youtubei/v1/get_transcript".to_string(),
            headers: BTreeMap::new(),
            body: Some("{}".to_string()),
        }
    }

    fn timeout_error(target: Target) -> BrowserError {
        BrowserError::Timeout {
            target: target.to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    fn expect_navigation(mock: &mut MockBrowserSurface, seq: &mut Sequence) {
        mock.expect_clear_routes()
            .times(1)
            .in_sequence(seq)
            .returning(|| Ok(()));
        mock.expect_route()
            .with(eq(RouteFilter::TRANSCRIPT_PANEL))
            .times(1)
            .in_sequence(seq)
            .returning(|_| Ok(()));
        mock.expect_goto()
            .with(eq(VIDEO_URL))
            .times(1)
            .in_sequence(seq)
            .returning(|_| Ok(()));
    }

    #[tokio::test]
    async fn panel_strategy_captures_transcript_request() {
        let mut mock = MockBrowserSurface::new();
        let mut seq = Sequence::new();
        expect_navigation(&mut mock, &mut seq);
        mock.expect_click()
            .with(eq(EXPAND_DESCRIPTION), eq(Duration::from_millis(1000)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mock.expect_click()
            .with(eq(SHOW_TRANSCRIPT), eq(Duration::from_millis(1000)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mock.expect_wait().returning(|_| ());
        mock.expect_take_captured()
            .times(1)
            .returning(|| Some(transcript_request()));
        mock.expect_hover().never();

        let mut controller = InterceptionController::new(mock, settings());
        let capture = controller.capture(VIDEO_URL).await.unwrap();
        assert_eq!(capture, Capture::PanelCaptured(transcript_request()));
    }

    #[tokio::test]
    async fn panel_timeout_falls_back_to_captions() {
        let mut mock = MockBrowserSurface::new();
        let mut seq = Sequence::new();
        expect_navigation(&mut mock, &mut seq);
        mock.expect_click()
            .with(eq(EXPAND_DESCRIPTION), eq(Duration::from_millis(1000)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|target, _| Err(timeout_error(target)));
        mock.expect_route()
            .with(eq(RouteFilter::TIMEDTEXT))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_hover()
            .with(eq(MOVIE_PLAYER), eq(Duration::from_millis(2000)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mock.expect_wait()
            .with(eq(Duration::from_millis(1)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| ());
        mock.expect_click()
            .with(eq(CAPTIONS_TOGGLE), eq(Duration::from_millis(2000)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mock.expect_wait()
            .with(eq(Duration::from_millis(2)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| ());
        mock.expect_take_captured()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Some(CapturedRequest {
                    url: "https://www.youtube.com/api/timedtext?v=abc&hl=en".to_string(),
                    headers: BTreeMap::new(),
                    body: None,
                })
            });

        let mut controller = InterceptionController::new(mock, settings());
        let capture = controller.capture(VIDEO_URL).await.unwrap();
        assert_eq!(
            capture,
            Capture::FallbackCaptured {
                timedtext_url: "https://www.youtube.com/api/timedtext?v=abc&hl=en".to_string()
            }
        );
    }

    #[tokio::test]
    async fn panel_without_capture_falls_back() {
        let mut mock = MockBrowserSurface::new();
        let mut seq = Sequence::new();
        expect_navigation(&mut mock, &mut seq);
        mock.expect_click()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mock.expect_wait().returning(|_| ());
        mock.expect_take_captured()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| None);
        mock.expect_route()
            .with(eq(RouteFilter::TIMEDTEXT))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_hover()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|target, _| Err(timeout_error(target)));

        let mut controller = InterceptionController::new(mock, settings());
        match controller.capture(VIDEO_URL).await.unwrap() {
            Capture::Failed { reason } => {
                assert!(reason.contains("no get_transcript request"));
                assert!(reason.contains("#movie_player"));
            }
            other => panic!("unexpected capture: {other:?}"),
        }
    }

    #[tokio::test]
    async fn both_strategies_exhausted_is_failed() {
        let mut mock = MockBrowserSurface::new();
        mock.expect_clear_routes().returning(|| Ok(()));
        mock.expect_route().returning(|_| Ok(()));
        mock.expect_goto().returning(|_| Ok(()));
        mock.expect_hover().returning(|_, _| Ok(()));
        mock.expect_wait().returning(|_| ());
        mock.expect_click()
            .with(eq(EXPAND_DESCRIPTION), mockall::predicate::always())
            .returning(|target, _| Err(timeout_error(target)));
        mock.expect_click()
            .with(eq(CAPTIONS_TOGGLE), mockall::predicate::always())
            .returning(|_, _| Ok(()));
        mock.expect_take_captured().times(1).returning(|| None);

        let mut controller = InterceptionController::new(mock, settings());
        let capture = controller.capture(VIDEO_URL).await.unwrap();
        assert!(matches!(capture, Capture::Failed { .. }));
    }

    #[tokio::test]
    async fn navigation_failure_skips_fallback() {
        let mut mock = MockBrowserSurface::new();
        mock.expect_clear_routes().returning(|| Ok(()));
        mock.expect_route()
            .with(eq(RouteFilter::TRANSCRIPT_PANEL))
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_goto().returning(|url| {
            Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            })
        });
        mock.expect_click().never();
        mock.expect_hover().never();

        let mut controller = InterceptionController::new(mock, settings());
        match controller.capture(VIDEO_URL).await.unwrap() {
            Capture::Failed { reason } => assert!(reason.contains("ERR_NAME_NOT_RESOLVED")),
            other => panic!("unexpected capture: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failing_to_clear_routes_is_fatal() {
        let mut mock = MockBrowserSurface::new();
        mock.expect_clear_routes()
            .returning(|| Err(BrowserError::Protocol("target closed".to_string())));
        mock.expect_goto().never();

        let mut controller = InterceptionController::new(mock, settings());
        let err = controller.capture(VIDEO_URL).await.unwrap_err();
        assert!(matches!(err, BrowserError::Protocol(_)));
    }
}
