//! Conversion of the two transcript payload shapes into plain text.
//!
//! Both parsers distinguish optional elements, which are skipped when absent, from required
//! structure, whose absence fails the whole payload with a [`ParseError`].

use serde_json::Value;
use url::Url;

use crate::{FieldError, ParseError};

const PANEL_RENDERER: &str = "/actions/0/updateEngagementPanelAction/content/transcriptRenderer/content/transcriptSearchPanelRenderer";
const LANGUAGE_MENU: &str =
    "/footer/transcriptFooterRenderer/languageMenu/sortFilterSubMenuRenderer/subMenuItems";
const SEGMENT_LIST: &str = "/body/transcriptSegmentListRenderer/initialSegments";

/// A value that exists and is not empty, null or `false`
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|value| match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        Value::Number(_) => true,
    })
}

fn at<'a>(value: &'a Value, pointer: &str) -> Result<&'a Value, FieldError> {
    value.pointer(pointer).ok_or_else(|| FieldError {
        path: pointer.to_string(),
    })
}

fn array_at<'a>(value: &'a Value, pointer: &str) -> Result<&'a [Value], FieldError> {
    at(value, pointer)?
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| FieldError {
            path: pointer.to_string(),
        })
}

/// Parse a `get_transcript` response into `(text, is_english)`.
///
/// The English flag comes from the language menu entry marked `selected`. When no entry is
/// selected the transcript is reported as non-English.
pub fn parse_transcript_panel(json: &Value, video_url: &str) -> Result<(String, bool), ParseError> {
    panel_text(json).map_err(|source| ParseError {
        kind: "transcript",
        video_url: video_url.to_string(),
        source,
    })
}

fn panel_text(json: &Value) -> Result<(String, bool), FieldError> {
    let panel = at(json, PANEL_RENDERER)?;

    let languages = array_at(panel, LANGUAGE_MENU)?;
    let active_language = languages
        .iter()
        .find(|item| present(item.get("selected")).is_some())
        .map(|item| item.get("title").and_then(Value::as_str).unwrap_or("Unknown"));

    let segments = array_at(panel, SEGMENT_LIST)?;
    let mut lines = Vec::with_capacity(segments.len());
    for (idx, segment) in segments.iter().enumerate() {
        let Some(renderer) = present(segment.get("transcriptSegmentRenderer")) else {
            continue;
        };
        let Some(snippet) = present(renderer.get("snippet")) else {
            continue;
        };
        let text = snippet
            .pointer("/runs/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| FieldError {
                path: format!(
                    "{SEGMENT_LIST}/{idx}/transcriptSegmentRenderer/snippet/runs/0/text"
                ),
            })?;
        lines.push(text);
    }

    let is_english = active_language
        .map(|title| title.to_lowercase().contains("english"))
        .unwrap_or(false);

    Ok((lines.join(" "), is_english))
}

/// Parse a `timedtext` (json3) response into text.
///
/// Each caption event with segments contributes every segment's trimmed `utf8` text;
/// events without segments (window and style events) are skipped.
pub fn parse_captions_fallback(json: &Value, video_url: &str) -> Result<String, ParseError> {
    captions_text(json).map_err(|source| ParseError {
        kind: "timedtext",
        video_url: video_url.to_string(),
        source,
    })
}

fn captions_text(json: &Value) -> Result<String, FieldError> {
    let events = array_at(json, "/events")?;

    let mut parts = Vec::new();
    for (idx, event) in events.iter().enumerate() {
        let Some(segs) = present(event.get("segs")) else {
            continue;
        };
        let segs = segs.as_array().ok_or_else(|| FieldError {
            path: format!("/events/{idx}/segs"),
        })?;
        for (seg_idx, seg) in segs.iter().enumerate() {
            let text = seg
                .get("utf8")
                .and_then(Value::as_str)
                .ok_or_else(|| FieldError {
                    path: format!("/events/{idx}/segs/{seg_idx}/utf8"),
                })?;
            parts.push(text.trim());
        }
    }

    Ok(parts.join(" "))
}

/// Whether a captured `timedtext` URL requested English (`hl=en...`).
///
/// Only the URL is inspected; the caption payload itself plays no part.
pub fn captions_url_is_english(timedtext_url: &str) -> bool {
    match Url::parse(timedtext_url) {
        Ok(parsed) => parsed
            .query_pairs()
            .any(|(key, value)| key == "hl" && value.starts_with("en")),
        Err(_) => timedtext_url.contains("hl=en"),
    }
}
