use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ScraperError;

/// A cookie in the shape browser exports produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// Expiry in seconds since the epoch; `-1` marks a session cookie
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: Option<bool>,
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(default)]
    pub same_site: Option<String>,
}

/// Load a JSON array of cookies used to seed the browser session
pub fn load_cookies(path: &Path) -> Result<Vec<SessionCookie>, ScraperError> {
    let content = fs_err::read_to_string(path).map_err(|err| {
        ScraperError::Configuration(format!("Failed to read cookies file: {}", err))
    })?;

    let cookies: Vec<SessionCookie> = serde_json::from_str(&content).map_err(|err| {
        ScraperError::Configuration(format!(
            "Malformed cookies file {}: {}",
            path.display(),
            err
        ))
    })?;

    tracing::debug!("Loaded {} cookies from {}", cookies.len(), path.display());
    Ok(cookies)
}
