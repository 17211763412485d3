use anyhow::Result;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::transcript::TranscriptResult;

pub mod formatters;

pub use formatters::*;

fn render(result: &TranscriptResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_as_text(result)),
        OutputFormat::Json => format_as_json(result),
    }
}

/// Save a transcript to file
pub async fn save_to_file(result: &TranscriptResult, path: &Path, format: OutputFormat) -> Result<()> {
    let content = render(result, format)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs_err::create_dir_all(parent)?;
        }
    }
    fs_err::write(path, content)?;
    Ok(())
}

/// Print a transcript to console
pub fn print_to_console(result: &TranscriptResult, format: OutputFormat) -> Result<()> {
    let content = render(result, format)?;
    println!("{}", content);
    Ok(())
}
