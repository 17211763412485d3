use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::time::{Duration, Instant};

use crate::channel::{CatalogEntry, ChannelCatalog};
use crate::store::{Dictionary, DictionaryStore, FailureRecord, VideoRecord};
use crate::transcript::TranscriptSource;
use crate::utils::{excerpt, video_url};
use crate::ScraperError;

const EXCERPT_CHARS: usize = 50;

/// Knobs of a batch run
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Re-attempt videos already recorded as failed
    pub retry_failed: bool,

    /// Acquisition attempts between checkpoints
    pub checkpoint_every: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            retry_failed: false,
            checkpoint_every: 10,
        }
    }
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Transcripts newly written to the success store
    pub succeeded: usize,

    /// Attempts recorded as failures, including non-English transcripts
    pub failed: usize,

    /// Videos skipped because they were already stored
    pub skipped: usize,

    pub elapsed: Duration,
}

/// In-memory copy of both dictionaries plus what changed since the last save
struct RunState {
    successes: Dictionary<VideoRecord>,
    failures: Dictionary<FailureRecord>,
    successes_dirty: bool,
    failures_dirty: bool,
}

impl RunState {
    fn record_success(&mut self, entry: &CatalogEntry, transcript: String) {
        self.successes.insert(
            entry.video_id.clone(),
            VideoRecord {
                transcript,
                title: entry.title.clone(),
                published_at: entry.published_at.clone(),
            },
        );
        self.successes_dirty = true;
        self.clear_failure(&entry.video_id);
    }

    fn record_failure(&mut self, entry: &CatalogEntry) {
        self.failures.insert(
            entry.video_id.clone(),
            FailureRecord {
                title: entry.title.clone(),
                published_at: entry.published_at.clone(),
            },
        );
        self.failures_dirty = true;
    }

    fn clear_failure(&mut self, video_id: &str) {
        if self.failures.remove(video_id).is_some() {
            self.failures_dirty = true;
        }
    }

    /// Drop failure entries for videos that already have a stored transcript
    fn drop_stale_failures(&mut self) {
        let before = self.failures.len();
        let successes = &self.successes;
        self.failures.retain(|video_id, _| !successes.contains_key(video_id));

        let dropped = before - self.failures.len();
        if dropped > 0 {
            tracing::debug!("Dropped {} failure entries that already have transcripts", dropped);
            self.failures_dirty = true;
        }
    }
}

/// Drives transcript acquisition across a channel catalog with checkpointed persistence
pub struct BatchPipeline<'a, S, F> {
    success_store: &'a S,
    failure_store: &'a F,
    options: PipelineOptions,
    progress: ProgressBar,
}

impl<'a, S, F> BatchPipeline<'a, S, F>
where
    S: DictionaryStore<VideoRecord>,
    F: DictionaryStore<FailureRecord>,
{
    /// A `checkpoint_every` of zero is treated as one.
    pub fn new(success_store: &'a S, failure_store: &'a F, mut options: PipelineOptions) -> Self {
        if options.checkpoint_every == 0 {
            tracing::warn!("checkpoint_every must be at least 1, checkpointing after every attempt");
            options.checkpoint_every = 1;
        }
        Self {
            success_store,
            failure_store,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report per-video progress on `progress`
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Acquire every catalog video not yet stored.
    ///
    /// Per-video failures are recorded and never abort the run; only store I/O errors do.
    pub async fn run<T>(&self, catalog: &ChannelCatalog, source: &mut T) -> Result<RunSummary>
    where
        T: TranscriptSource + ?Sized,
    {
        let started = Instant::now();
        let mut state = RunState {
            successes: self.success_store.load().context("Failed to load transcript store")?,
            failures: self.failure_store.load().context("Failed to load failure store")?,
            successes_dirty: false,
            failures_dirty: false,
        };
        state.drop_stale_failures();

        let work = self.work_list(catalog, &state.failures);
        let total = work.len();
        self.progress.set_length(total as u64);

        let mut summary = RunSummary {
            succeeded: 0,
            failed: 0,
            skipped: 0,
            elapsed: Duration::ZERO,
        };
        let mut attempts = 0usize;

        for (position, entry) in work.iter().enumerate() {
            let video_id = entry.video_id.as_str();
            self.progress.set_message(video_id.to_string());

            if state.successes.contains_key(video_id) {
                state.clear_failure(video_id);
                summary.skipped += 1;
                self.progress.inc(1);
                continue;
            }
            if state.failures.contains_key(video_id) && !self.options.retry_failed {
                summary.skipped += 1;
                self.progress.inc(1);
                continue;
            }

            tracing::info!("Processing video {}/{}: {}", position + 1, total, video_id);
            match source.get_transcript(video_id).await {
                Ok(result) if result.is_english => {
                    tracing::info!(
                        "Transcript Excerpt: {}..., Vid URL: {}, Source: {:?}",
                        excerpt(&result.text, EXCERPT_CHARS),
                        result.video_url,
                        result.source_kind
                    );
                    state.record_success(entry, result.text);
                    summary.succeeded += 1;
                }
                Ok(result) => {
                    tracing::warn!(
                        "Error: {}, Vid URL: {}",
                        ScraperError::NonEnglish,
                        result.video_url
                    );
                    state.record_failure(entry);
                    summary.failed += 1;
                }
                Err(err) => {
                    tracing::warn!("Error: {}, Vid URL: {}", err.cause, video_url(video_id));
                    state.record_failure(entry);
                    summary.failed += 1;
                }
            }
            self.progress.inc(1);

            attempts += 1;
            if attempts % self.options.checkpoint_every == 0 {
                self.checkpoint(&mut state)?;
            }
        }

        self.save_failures(&mut state)?;
        self.save_successes(&mut state)?;
        self.progress.finish_and_clear();

        summary.elapsed = started.elapsed();
        tracing::info!(
            "# new transcripts scraped: {}, # transcripts failed to scrape: {}",
            summary.succeeded,
            summary.failed
        );
        Ok(summary)
    }

    /// Catalog order, followed (when retrying) by failures the catalog no longer lists
    fn work_list(&self, catalog: &ChannelCatalog, failures: &Dictionary<FailureRecord>) -> Vec<CatalogEntry> {
        let mut work: Vec<CatalogEntry> = catalog.iter().cloned().collect();

        if self.options.retry_failed {
            let orphans = failures
                .iter()
                .filter(|(video_id, _)| !catalog.contains(video_id.as_str()))
                .map(|(video_id, record)| CatalogEntry {
                    video_id: video_id.clone(),
                    title: record.title.clone(),
                    published_at: record.published_at.clone(),
                });
            work.extend(orphans);
        }

        work
    }

    /// Persist what changed since the last checkpoint.
    ///
    /// Failures are written first so a success is never on disk while its stale failure
    /// entry is.
    fn checkpoint(&self, state: &mut RunState) -> Result<()> {
        if state.failures_dirty {
            self.save_failures(state)?;
        }
        if state.successes_dirty {
            self.save_successes(state)?;
            tracing::info!("Checkpoint: {} transcripts saved", state.successes.len());
        }
        Ok(())
    }

    fn save_failures(&self, state: &mut RunState) -> Result<()> {
        self.failure_store
            .save(&state.failures)
            .context("Failed to save failure store")?;
        state.failures_dirty = false;
        Ok(())
    }

    fn save_successes(&self, state: &mut RunState) -> Result<()> {
        self.success_store
            .save(&state.successes)
            .context("Failed to save transcript store")?;
        state.successes_dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonFileStore;
    use crate::transcript::{SourceKind, TranscriptResult};
    use crate::AcquisitionError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[derive(Clone, Copy)]
    enum Outcome {
        English(&'static str),
        NonEnglish,
        Fail,
    }

    /// Transcript source with a fixed outcome per video
    struct ScriptedSource {
        outcomes: HashMap<&'static str, Outcome>,
        calls: Vec<String>,
        /// Success-store entries on disk at the time of each call
        watch: Option<PathBuf>,
        on_disk: Vec<usize>,
        /// Failure-store keys on disk at the time of each call
        watch_failures: Option<PathBuf>,
        failures_on_disk: Vec<Vec<String>>,
    }

    impl ScriptedSource {
        fn new(outcomes: &[(&'static str, Outcome)]) -> Self {
            Self {
                outcomes: outcomes.iter().copied().collect(),
                calls: Vec::new(),
                watch: None,
                on_disk: Vec::new(),
                watch_failures: None,
                failures_on_disk: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl TranscriptSource for ScriptedSource {
        async fn get_transcript(&mut self, video_id: &str) -> Result<TranscriptResult, AcquisitionError> {
            self.calls.push(video_id.to_string());
            if let Some(path) = &self.watch {
                let store: JsonFileStore<VideoRecord> = JsonFileStore::new(path);
                self.on_disk.push(store.load().unwrap().len());
            }
            if let Some(path) = &self.watch_failures {
                let store: JsonFileStore<FailureRecord> = JsonFileStore::new(path);
                self.failures_on_disk.push(store.load().unwrap().into_keys().collect());
            }

            let result = |text: &str, is_english| TranscriptResult {
                text: text.to_string(),
                video_url: video_url(video_id),
                is_english,
                source_kind: SourceKind::TranscriptPanel,
            };
            match self.outcomes.get(video_id).copied().unwrap_or(Outcome::Fail) {
                Outcome::English(text) => Ok(result(text, true)),
                Outcome::NonEnglish => Ok(result("hola", false)),
                Outcome::Fail => Err(AcquisitionError::new(
                    video_id,
                    ScraperError::Interception {
                        reason: "no transcript affordance".to_string(),
                    },
                )),
            }
        }
    }

    fn catalog(ids: &[&str]) -> ChannelCatalog {
        ids.iter()
            .enumerate()
            .map(|(n, id)| CatalogEntry {
                video_id: id.to_string(),
                title: format!("Title{}", n + 1),
                published_at: format!("2024-01-0{}T00:00:00Z", n + 1),
            })
            .collect()
    }

    struct Stores {
        _dir: TempDir,
        success: JsonFileStore<VideoRecord>,
        failure: JsonFileStore<FailureRecord>,
    }

    fn stores() -> Stores {
        let dir = TempDir::new().unwrap();
        Stores {
            success: JsonFileStore::new(dir.path().join("raw").join("UC.json")),
            failure: JsonFileStore::new(dir.path().join("failed").join("UC.json")),
            _dir: dir,
        }
    }

    fn options(retry_failed: bool) -> PipelineOptions {
        PipelineOptions {
            retry_failed,
            checkpoint_every: 10,
        }
    }

    #[tokio::test]
    async fn success_and_failure_are_split_between_stores() {
        let stores = stores();
        let mut source = ScriptedSource::new(&[("v1", Outcome::English("hello world")), ("v2", Outcome::Fail)]);

        let pipeline = BatchPipeline::new(&stores.success, &stores.failure, options(false));
        let summary = pipeline.run(&catalog(&["v1", "v2"]), &mut source).await.unwrap();

        assert_eq!((summary.succeeded, summary.failed), (1, 1));
        let successes = stores.success.load().unwrap();
        assert_eq!(
            successes.get("v1"),
            Some(&VideoRecord {
                transcript: "hello world".to_string(),
                title: "Title1".to_string(),
                published_at: "2024-01-01T00:00:00Z".to_string(),
            })
        );
        assert!(!successes.contains_key("v2"));
        let failures = stores.failure.load().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures["v2"].title, "Title2");
    }

    #[tokio::test]
    async fn non_english_transcript_is_recorded_as_failure() {
        let stores = stores();
        let mut source = ScriptedSource::new(&[("v1", Outcome::NonEnglish)]);

        let pipeline = BatchPipeline::new(&stores.success, &stores.failure, options(false));
        let summary = pipeline.run(&catalog(&["v1"]), &mut source).await.unwrap();

        assert_eq!((summary.succeeded, summary.failed), (0, 1));
        assert!(stores.success.load().unwrap().is_empty());
        assert!(stores.failure.load().unwrap().contains_key("v1"));
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let stores = stores();
        let catalog = catalog(&["v1", "v2", "v3"]);
        let outcomes = [
            ("v1", Outcome::English("one")),
            ("v2", Outcome::Fail),
            ("v3", Outcome::NonEnglish),
        ];

        let pipeline = BatchPipeline::new(&stores.success, &stores.failure, options(false));
        pipeline.run(&catalog, &mut ScriptedSource::new(&outcomes)).await.unwrap();
        let success_bytes = fs_err::read(stores.success.path()).unwrap();
        let failure_bytes = fs_err::read(stores.failure.path()).unwrap();

        let mut source = ScriptedSource::new(&outcomes);
        let summary = pipeline.run(&catalog, &mut source).await.unwrap();

        assert!(source.calls.is_empty());
        assert_eq!((summary.succeeded, summary.failed, summary.skipped), (0, 0, 3));
        assert_eq!(fs_err::read(stores.success.path()).unwrap(), success_bytes);
        assert_eq!(fs_err::read(stores.failure.path()).unwrap(), failure_bytes);
    }

    #[tokio::test]
    async fn retry_failed_reattempts_each_failure_once() {
        let stores = stores();
        let mut failures = Dictionary::new();
        for id in ["v2", "gone"] {
            failures.insert(
                id.to_string(),
                FailureRecord {
                    title: format!("old {}", id),
                    published_at: "2020".to_string(),
                },
            );
        }
        stores.failure.save(&failures).unwrap();

        let mut source = ScriptedSource::new(&[
            ("v1", Outcome::English("one")),
            ("v2", Outcome::English("two")),
            ("gone", Outcome::Fail),
        ]);
        let pipeline = BatchPipeline::new(&stores.success, &stores.failure, options(true));
        let summary = pipeline.run(&catalog(&["v1", "v2"]), &mut source).await.unwrap();

        assert_eq!(source.calls, ["v1", "v2", "gone"]);
        assert_eq!((summary.succeeded, summary.failed), (2, 1));
        let successes = stores.success.load().unwrap();
        let failures = stores.failure.load().unwrap();
        assert!(successes.contains_key("v2"));
        assert!(!failures.contains_key("v2"));
        assert_eq!(failures["gone"].title, "old gone");
    }

    #[tokio::test]
    async fn failures_are_skipped_without_retry() {
        let stores = stores();
        let mut failures = Dictionary::new();
        failures.insert(
            "v1".to_string(),
            FailureRecord {
                title: "Title1".to_string(),
                published_at: "2024".to_string(),
            },
        );
        stores.failure.save(&failures).unwrap();

        let mut source = ScriptedSource::new(&[("v1", Outcome::English("one"))]);
        let pipeline = BatchPipeline::new(&stores.success, &stores.failure, options(false));
        let summary = pipeline.run(&catalog(&["v1"]), &mut source).await.unwrap();

        assert!(source.calls.is_empty());
        assert_eq!(summary.skipped, 1);
        assert_eq!(stores.failure.load().unwrap(), failures);
    }

    #[tokio::test]
    async fn stale_failure_of_stored_success_is_removed() {
        let stores = stores();
        let mut successes = Dictionary::new();
        successes.insert(
            "v1".to_string(),
            VideoRecord {
                transcript: "one".to_string(),
                title: "Title1".to_string(),
                published_at: "2024".to_string(),
            },
        );
        stores.success.save(&successes).unwrap();
        let mut failures = Dictionary::new();
        failures.insert(
            "v1".to_string(),
            FailureRecord {
                title: "Title1".to_string(),
                published_at: "2024".to_string(),
            },
        );
        stores.failure.save(&failures).unwrap();

        let mut source = ScriptedSource::new(&[]);
        let pipeline = BatchPipeline::new(&stores.success, &stores.failure, options(true));
        pipeline.run(&catalog(&["v1"]), &mut source).await.unwrap();

        assert!(source.calls.is_empty());
        assert!(stores.failure.load().unwrap().is_empty());
        assert_eq!(stores.success.load().unwrap(), successes);
    }

    #[tokio::test]
    async fn checkpoints_persist_successes_during_the_run() {
        let stores = stores();
        let ids = ["v1", "v2", "v3", "v4", "v5"];
        let mut source = ScriptedSource::new(&[
            ("v1", Outcome::English("a")),
            ("v2", Outcome::English("b")),
            ("v3", Outcome::Fail),
            ("v4", Outcome::English("d")),
            ("v5", Outcome::English("e")),
        ]);
        source.watch = Some(stores.success.path().to_path_buf());

        let pipeline = BatchPipeline::new(
            &stores.success,
            &stores.failure,
            PipelineOptions {
                retry_failed: false,
                checkpoint_every: 2,
            },
        );
        pipeline.run(&catalog(&ids), &mut source).await.unwrap();

        // Checkpoints after the 2nd and 4th attempts
        assert_eq!(source.on_disk, [0, 0, 2, 2, 3]);
        assert_eq!(stores.success.load().unwrap().len(), 4);
    }

    fn seed_overlap(stores: &Stores, video_id: &str) {
        let mut successes = Dictionary::new();
        successes.insert(
            video_id.to_string(),
            VideoRecord {
                transcript: "kept".to_string(),
                title: "Kept".to_string(),
                published_at: "2023".to_string(),
            },
        );
        stores.success.save(&successes).unwrap();
        let mut failures = Dictionary::new();
        failures.insert(
            video_id.to_string(),
            FailureRecord {
                title: "Kept".to_string(),
                published_at: "2023".to_string(),
            },
        );
        stores.failure.save(&failures).unwrap();
    }

    #[tokio::test]
    async fn stored_overlap_outside_catalog_is_resolved() {
        let stores = stores();
        seed_overlap(&stores, "old");

        let mut source = ScriptedSource::new(&[("v1", Outcome::Fail)]);
        let pipeline = BatchPipeline::new(&stores.success, &stores.failure, PipelineOptions::default());
        pipeline.run(&catalog(&["v1"]), &mut source).await.unwrap();

        assert_eq!(source.calls, ["v1"]);
        assert!(stores.success.load().unwrap().contains_key("old"));
        let failures = stores.failure.load().unwrap();
        assert!(!failures.contains_key("old"));
        assert!(failures.contains_key("v1"));
    }

    #[tokio::test]
    async fn checkpoints_never_persist_a_stored_success_as_failure() {
        let stores = stores();
        seed_overlap(&stores, "v3");

        let mut source = ScriptedSource::new(&[("v1", Outcome::Fail), ("v2", Outcome::Fail)]);
        source.watch_failures = Some(stores.failure.path().to_path_buf());
        let pipeline = BatchPipeline::new(
            &stores.success,
            &stores.failure,
            PipelineOptions {
                retry_failed: false,
                checkpoint_every: 1,
            },
        );
        pipeline.run(&catalog(&["v1", "v2", "v3"]), &mut source).await.unwrap();

        // The failure store as left by the checkpoint after v1
        assert_eq!(source.failures_on_disk[1], ["v1"]);
        let failures = stores.failure.load().unwrap();
        assert_eq!(failures.into_keys().collect::<Vec<_>>(), ["v1", "v2"]);
    }

    #[tokio::test]
    async fn zero_checkpoint_interval_checkpoints_every_attempt() {
        let stores = stores();
        let mut source = ScriptedSource::new(&[("v1", Outcome::English("a")), ("v2", Outcome::English("b"))]);
        source.watch = Some(stores.success.path().to_path_buf());

        let pipeline = BatchPipeline::new(
            &stores.success,
            &stores.failure,
            PipelineOptions {
                retry_failed: false,
                checkpoint_every: 0,
            },
        );
        let summary = pipeline.run(&catalog(&["v1", "v2"]), &mut source).await.unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(source.on_disk, [0, 1]);
    }
}
