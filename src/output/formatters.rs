use anyhow::Result;

use crate::transcript::TranscriptResult;

/// Plain transcript text
pub fn format_as_text(result: &TranscriptResult) -> String {
    result.text.clone()
}

/// Pretty-printed JSON of the whole result
pub fn format_as_json(result: &TranscriptResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}
