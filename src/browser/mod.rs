use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub mod chrome;
pub mod cookies;

pub use chrome::ChromeSession;
pub use cookies::{load_cookies, SessionCookie};

/// Errors raised by the browser automation surface
#[derive(thiserror::Error, Debug)]
pub enum BrowserError {
    #[error("Timed out after {timeout:?} waiting for {target}")]
    Timeout { target: String, timeout: Duration },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Browser protocol error: {0}")]
    Protocol(String),
}

/// A network request observed by the active route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub url: String,

    pub headers: BTreeMap<String, String>,

    /// Raw POST body, JSON-encoded for transcript requests
    pub body: Option<String>,
}

/// Selects which requests the active route records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteFilter {
    url_fragment: &'static str,
}

impl RouteFilter {
    /// Transcript panel requests (`/youtubei/v1/get_transcript`)
    pub const TRANSCRIPT_PANEL: Self = Self {
        url_fragment: "get_transcript",
    };

    /// Caption track requests (`/api/timedtext`)
    pub const TIMEDTEXT: Self = Self {
        url_fragment: "timedtext",
    };

    pub fn matches(&self, url: &str) -> bool {
        url.contains(self.url_fragment)
    }
}

/// An element on the page, located either by accessible role and name or by CSS selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Role {
        role: &'static str,
        name: &'static str,
    },
    Css(&'static str),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Role { role, name } => write!(f, "{} \"{}\"", role, name),
            Target::Css(selector) => write!(f, "{}", selector),
        }
    }
}

/// The calls the transcript engine issues against a browser page.
///
/// At most one route is active at a time; [`BrowserSurface::route`] replaces the previous
/// one and discards anything it captured.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserSurface: Send {
    /// Remove the active route, if any
    async fn clear_routes(&mut self) -> Result<(), BrowserError>;

    /// Install `filter` as the only active route
    async fn route(&mut self, filter: RouteFilter) -> Result<(), BrowserError>;

    /// Navigate the page and wait for it to load
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Click `target` once it appears, failing after `timeout`
    async fn click(&mut self, target: Target, timeout: Duration) -> Result<(), BrowserError>;

    /// Move the pointer over `target` once it appears, failing after `timeout`
    async fn hover(&mut self, target: Target, timeout: Duration) -> Result<(), BrowserError>;

    /// Let the page run for `duration`
    async fn wait(&mut self, duration: Duration);

    /// Take the most recent request recorded by the active route
    async fn take_captured(&mut self) -> Option<CapturedRequest>;

    /// Close the page, the browser and the underlying driver
    async fn close(&mut self) -> Result<(), BrowserError>;
}
