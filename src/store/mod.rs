//! Success and failure dictionaries persisted as JSON objects keyed by video ID.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// In-memory form of a persisted dictionary
pub type Dictionary<V> = BTreeMap<String, V>;

/// A transcript that was acquired and confirmed English
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub transcript: String,
    pub title: String,
    pub published_at: String,
}

/// A video whose transcript could not be acquired, or was not English
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub title: String,
    pub published_at: String,
}

/// Load-all / save-all key-value store
pub trait DictionaryStore<V>: Send + Sync {
    /// Load every entry; a store that was never written is empty
    fn load(&self) -> Result<Dictionary<V>>;

    /// Replace the stored contents with `entries` atomically
    fn save(&self, entries: &Dictionary<V>) -> Result<()>;
}

/// Dictionary stored as one JSON object in a file
#[derive(Debug, Clone)]
pub struct JsonFileStore<V> {
    path: PathBuf,
    _record: PhantomData<fn() -> V>,
}

impl<V> JsonFileStore<V> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<V> DictionaryStore<V> for JsonFileStore<V>
where
    V: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Dictionary<V>> {
        let content = match fs_err::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No store at {}, starting empty", self.path.display());
                return Ok(Dictionary::new());
            }
            Err(err) => return Err(err.into()),
        };

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse store file: {}", self.path.display()))
    }

    fn save(&self, entries: &Dictionary<V>) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs_err::create_dir_all(parent)?;

        let data = serde_json::to_vec_pretty(entries)
            .context("Failed to serialize store")?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        tmp.write_all(&data)
            .context("Failed to write store temp file")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to flush store temp file")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace store file: {}", self.path.display()))?;

        tracing::debug!("Saved {} entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}
