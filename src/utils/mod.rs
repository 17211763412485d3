use anyhow::Result;
use url::Url;

const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Build the canonical watch URL for a video ID
pub fn video_url(video_id: &str) -> String {
    format!("{}{}", WATCH_URL_PREFIX, video_id)
}

fn is_youtube_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == "youtube.com" || host == "youtu.be" || host.ends_with(".youtube.com")
}

/// Extract the video ID from the common YouTube URL shapes
pub fn extract_video_id(input: &str) -> Result<String> {
    let parsed = Url::parse(input)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", input))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    let host = parsed
        .host_str()
        .filter(|host| is_youtube_host(host))
        .ok_or_else(|| anyhow::anyhow!("Not a YouTube URL: {}", input))?;

    let candidate = if host.eq_ignore_ascii_case("youtu.be") {
        parsed.path_segments().and_then(|mut segs| segs.next()).map(str::to_string)
    } else if parsed.path().starts_with("/watch") {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
    } else {
        parsed.path_segments().and_then(|mut segs| {
            match (segs.next(), segs.next()) {
                (Some("shorts" | "embed" | "live"), Some(id)) => Some(id.to_string()),
                _ => None,
            }
        })
    };

    candidate
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow::anyhow!("No video ID found in URL: {}", input))
}

/// First `max_chars` characters of a transcript, for log lines
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
