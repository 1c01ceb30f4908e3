//! Ingestion and query coordination over a single active corpus.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use onboard_index::{
    EmbeddedChunk, Index, Segmenter, SourceFile, VectorStore, VectorizeError, Vectorizer,
};
use onboard_llm::LlmProvider;
use serde::Serialize;
use tokio::sync::{Mutex, watch};

use crate::answer::Answer;
use crate::config::{Config, IngestConfig};
use crate::error::{ConfigError, ErrorKind, PipelineError};
use crate::grounding::Grounder;
use crate::source::RepositorySource;

/// Lifecycle of the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CorpusStatus {
    Empty,
    Ingesting,
    Ready,
    Error,
}

impl CorpusStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Ingesting => "ingesting",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CorpusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the active corpus was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusSnapshot {
    pub locator: String,
    pub generation: u64,
    pub file_count: usize,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CorpusState {
    pub status: CorpusStatus,
    /// The corpus queries are answered from. Kept while a re-ingestion runs
    /// and after one fails.
    pub snapshot: Option<Arc<CorpusSnapshot>>,
    pub last_error: Option<String>,
}

impl Default for CorpusState {
    fn default() -> Self {
        Self {
            status: CorpusStatus::Empty,
            snapshot: None,
            last_error: None,
        }
    }
}

/// A file-level problem that did not stop the ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileWarning {
    pub path: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub locator: String,
    /// Files indexed, including those that only produced blank chunks.
    pub file_count: usize,
    pub files_skipped: usize,
    pub chunk_count: usize,
    pub blank_chunks_skipped: usize,
    pub warnings: Vec<FileWarning>,
    pub generation: u64,
    pub duration_ms: u64,
}

struct FileOutcome {
    path: String,
    entries: Vec<EmbeddedChunk>,
    blank: usize,
    warnings: Vec<FileWarning>,
    skipped: bool,
}

/// Sequences segmentation, embedding and indexing, and serves questions from
/// whatever corpus is currently active.
///
/// Only one ingestion runs at a time; a second request while one is in flight
/// is rejected with [`PipelineError::IngestionInProgress`]. The new corpus
/// replaces the old one only once it has been written completely.
pub struct Coordinator<P, S, R> {
    source: R,
    segmenter: Arc<Segmenter>,
    vectorizer: Arc<Vectorizer<P>>,
    index: Arc<Index<S>>,
    grounder: Grounder<P, S>,
    ingest: IngestConfig,
    ingest_lock: Mutex<()>,
    state: watch::Sender<CorpusState>,
}

impl<P, S, R> Coordinator<P, S, R>
where
    P: LlmProvider,
    S: VectorStore,
    R: RepositorySource,
{
    #[must_use]
    pub fn new(provider: Arc<P>, store: S, source: R, config: &Config) -> Self {
        let retry = config.llm.retry_policy();
        let vectorizer = Arc::new(Vectorizer::new(
            Arc::clone(&provider),
            config.embedding.clone(),
            retry,
        ));
        let index = Arc::new(
            Index::new(store, config.embedding.dimension)
                .with_score_threshold(config.retrieval.score_threshold),
        );
        let grounder = Grounder::new(
            provider,
            Arc::clone(&vectorizer),
            Arc::clone(&index),
            config.retrieval.clone(),
            retry,
        );
        let (state, _) = watch::channel(CorpusState::default());

        Self {
            source,
            segmenter: Arc::new(Segmenter::new(config.chunking.clone())),
            vectorizer,
            index,
            grounder,
            ingest: config.ingest.clone(),
            ingest_lock: Mutex::new(()),
            state,
        }
    }

    /// Check that the embedding model produces vectors of the configured
    /// dimension. Run once at startup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DimensionMismatch`] or the provider failure.
    pub async fn verify(&self) -> Result<usize, ConfigError> {
        match self.vectorizer.check_dimension().await {
            Ok(dimension) => {
                tracing::info!(dimension, model = self.vectorizer.model(), "embedding model verified");
                Ok(dimension)
            }
            Err(VectorizeError::DimensionMismatch { expected, actual }) => {
                Err(ConfigError::DimensionMismatch { expected, actual })
            }
            Err(e) => Err(ConfigError::Embedding(e)),
        }
    }

    #[must_use]
    pub fn status(&self) -> CorpusStatus {
        self.state.borrow().status
    }

    #[must_use]
    pub fn state(&self) -> CorpusState {
        self.state.borrow().clone()
    }

    /// Watch lifecycle transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CorpusState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn grounder(&self) -> &Grounder<P, S> {
        &self.grounder
    }

    /// Answer a question from the active corpus.
    pub async fn ask(&self, question: &str) -> Answer {
        self.grounder.answer(question).await
    }

    /// The predefined overview question; needs no input.
    pub async fn where_do_i_start(&self) -> Answer {
        self.grounder.where_do_i_start().await
    }

    /// Build a new corpus from the repository at `locator` and make it active.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::IngestionInProgress`] if another ingestion is
    /// running, the source failure, [`PipelineError::NothingIndexed`] if every
    /// file failed, a configuration error from the embedding provider, or the
    /// index write failure. The previous corpus stays active on error.
    pub async fn ingest(&self, locator: &str) -> Result<IngestReport, PipelineError> {
        let Ok(_guard) = self.ingest_lock.try_lock() else {
            tracing::warn!(locator, "rejecting ingestion while another is in progress");
            return Err(PipelineError::IngestionInProgress);
        };

        let previous = self.state.borrow().status;
        self.state.send_modify(|s| s.status = CorpusStatus::Ingesting);
        let mut cancelled = CancelGuard {
            state: &self.state,
            previous,
            armed: true,
        };
        let result = self.run_ingest(locator).await;
        cancelled.armed = false;

        match &result {
            Ok(report) => {
                let snapshot = CorpusSnapshot {
                    locator: locator.to_owned(),
                    generation: report.generation,
                    file_count: report.file_count,
                    chunk_count: report.chunk_count,
                    ingested_at: Utc::now(),
                };
                self.state.send_replace(CorpusState {
                    status: CorpusStatus::Ready,
                    snapshot: Some(Arc::new(snapshot)),
                    last_error: None,
                });
            }
            Err(e) => {
                tracing::error!(locator, error = %e, "ingestion failed");
                self.state.send_modify(|s| {
                    s.status = CorpusStatus::Error;
                    s.last_error = Some(e.to_string());
                });
            }
        }
        result
    }

    async fn run_ingest(&self, locator: &str) -> Result<IngestReport, PipelineError> {
        let started = Instant::now();
        let files = self.source.fetch(locator).await?;
        let total = files.len();
        tracing::info!(locator, files = total, "ingestion started");

        let mut outcomes: Vec<FileOutcome> = futures::stream::iter(files)
            .map(|file| self.process_file(file))
            .buffer_unordered(self.ingest.concurrency.max(1))
            .try_collect()
            .await?;
        outcomes.sort_by(|a, b| a.path.cmp(&b.path));

        let mut report = IngestReport {
            locator: locator.to_owned(),
            file_count: 0,
            files_skipped: 0,
            chunk_count: 0,
            blank_chunks_skipped: 0,
            warnings: Vec::new(),
            generation: 0,
            duration_ms: 0,
        };
        let mut entries = Vec::new();
        for outcome in outcomes {
            if outcome.skipped {
                report.files_skipped += 1;
            } else {
                report.file_count += 1;
            }
            report.blank_chunks_skipped += outcome.blank;
            report.warnings.extend(outcome.warnings);
            entries.extend(outcome.entries);
        }

        if total > 0 && report.file_count == 0 {
            return Err(PipelineError::NothingIndexed { files: total });
        }

        report.chunk_count = entries.len();
        report.generation = self.index.upsert(entries).await?;
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::info!(
            locator,
            files = report.file_count,
            skipped = report.files_skipped,
            chunks = report.chunk_count,
            warnings = report.warnings.len(),
            generation = report.generation,
            duration_ms = report.duration_ms,
            "ingestion complete"
        );
        Ok(report)
    }

    /// Segment and embed one file. Per-file failures become warnings; only a
    /// configuration problem, which would fail every file, aborts the run.
    async fn process_file(&self, file: SourceFile) -> Result<FileOutcome, PipelineError> {
        let path = file.path.clone();
        let segmenter = Arc::clone(&self.segmenter);
        let chunks = match tokio::task::spawn_blocking(move || segmenter.segment(&file)).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::error!(file = %path, error = %e, "segmentation task failed");
                return Ok(FileOutcome::skipped(
                    path,
                    ErrorKind::Internal,
                    format!("segmentation failed: {e}"),
                ));
            }
        };

        let mut warnings = Vec::new();
        if let Some(reason) = chunks
            .iter()
            .find_map(|c| c.metadata.get("fallback_reason"))
            .filter(|reason| reason.as_str() != "unsupported_language")
        {
            warnings.push(FileWarning {
                path: path.clone(),
                kind: ErrorKind::Structural,
                message: format!("boundary detection failed ({reason}); indexed with fixed-size windows"),
            });
        }

        let (blank, content): (Vec<_>, Vec<_>) = chunks.into_iter().partition(|c| c.is_blank());
        if content.is_empty() {
            return Ok(FileOutcome {
                path,
                entries: Vec::new(),
                blank: blank.len(),
                warnings,
                skipped: false,
            });
        }

        match self.vectorizer.embed_chunks(content).await {
            Ok(entries) => {
                tracing::debug!(file = %path, chunks = entries.len(), "file embedded");
                Ok(FileOutcome {
                    path,
                    entries,
                    blank: blank.len(),
                    warnings,
                    skipped: false,
                })
            }
            Err(VectorizeError::DimensionMismatch { expected, actual }) => {
                Err(ConfigError::DimensionMismatch { expected, actual }.into())
            }
            Err(e) if e.is_configuration() => Err(ConfigError::Embedding(e).into()),
            Err(e) => {
                let kind = if e.is_transient() {
                    ErrorKind::TransientProvider
                } else {
                    ErrorKind::Internal
                };
                tracing::warn!(file = %path, error = %e, "skipping file after embedding failure");
                let mut outcome = FileOutcome::skipped(path, kind, e.to_string());
                warnings.append(&mut outcome.warnings);
                outcome.warnings = warnings;
                Ok(outcome)
            }
        }
    }
}

/// Puts the status back if an ingestion future is dropped before it settles.
struct CancelGuard<'a> {
    state: &'a watch::Sender<CorpusState>,
    previous: CorpusStatus,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(status = %self.previous, "ingestion cancelled");
            let previous = self.previous;
            self.state.send_modify(|s| {
                s.status = previous;
                s.last_error = Some("ingestion cancelled".to_owned());
            });
        }
    }
}

impl FileOutcome {
    fn skipped(path: String, kind: ErrorKind, message: String) -> Self {
        Self {
            warnings: vec![FileWarning {
                path: path.clone(),
                kind,
                message,
            }],
            path,
            entries: Vec::new(),
            blank: 0,
            skipped: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use onboard_index::store::MemoryStore;
    use onboard_llm::mock::MockProvider;

    use super::*;
    use crate::error::SourceError;

    /// In-memory repository keyed by locator.
    struct StaticSource {
        files: Vec<SourceFile>,
        delay_ms: u64,
        fetches: AtomicUsize,
    }

    impl StaticSource {
        fn new(files: Vec<SourceFile>) -> Self {
            Self {
                files,
                delay_ms: 0,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl RepositorySource for StaticSource {
        async fn fetch(&self, locator: &str) -> Result<Vec<SourceFile>, SourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            if locator == "missing" {
                return Err(SourceError::NotFound(locator.into()));
            }
            Ok(self.files.clone())
        }
    }

    fn config(dimension: usize) -> Config {
        let mut config = Config::default();
        config.embedding.dimension = dimension;
        config.llm.max_retries = 1;
        config.llm.backoff_base_ms = 1;
        config.llm.backoff_max_ms = 2;
        config
    }

    fn coordinator(
        mock: MockProvider,
        files: Vec<SourceFile>,
    ) -> Coordinator<MockProvider, MemoryStore, StaticSource> {
        let dimension = mock.dimension;
        Coordinator::new(
            Arc::new(mock),
            MemoryStore::new(),
            StaticSource::new(files),
            &config(dimension),
        )
    }

    fn repo() -> Vec<SourceFile> {
        vec![
            SourceFile::new("app.py", "def main():\n    run()\n"),
            SourceFile::new("util.js", "function helper(a) {\n  return a + 1;\n}\n"),
            SourceFile::new("blank.py", "\n\n\n"),
        ]
    }

    #[tokio::test]
    async fn starts_empty_and_becomes_ready() {
        let c = coordinator(MockProvider::default(), repo());
        assert_eq!(c.status(), CorpusStatus::Empty);

        let report = c.ingest("repo").await.unwrap();
        assert_eq!(c.status(), CorpusStatus::Ready);
        assert_eq!(report.file_count, 3);
        assert_eq!(report.chunk_count, 2);
        assert_eq!(report.blank_chunks_skipped, 1);
        assert!(report.warnings.is_empty());

        let state = c.state();
        let snapshot = state.snapshot.unwrap();
        assert_eq!(snapshot.generation, report.generation);
        assert_eq!(snapshot.chunk_count, 2);
    }

    #[tokio::test]
    async fn concurrent_ingestion_is_rejected() {
        let mut source = StaticSource::new(repo());
        source.delay_ms = 200;
        let mock = MockProvider::default();
        let dimension = mock.dimension;
        let c = Coordinator::new(Arc::new(mock), MemoryStore::new(), source, &config(dimension));

        let (first, second) = tokio::join!(c.ingest("repo"), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            c.ingest("repo").await
        });
        assert!(first.is_ok());
        assert!(matches!(second, Err(PipelineError::IngestionInProgress)));
        assert_eq!(c.source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(c.status(), CorpusStatus::Ready);
    }

    #[tokio::test]
    async fn status_is_ingesting_while_running() {
        let mut source = StaticSource::new(repo());
        source.delay_ms = 200;
        let mock = MockProvider::default();
        let dimension = mock.dimension;
        let c = Coordinator::new(Arc::new(mock), MemoryStore::new(), source, &config(dimension));
        let mut rx = c.subscribe();

        let (report, observed) = tokio::join!(c.ingest("repo"), async {
            rx.changed().await.unwrap();
            rx.borrow().status
        });
        assert!(report.is_ok());
        assert_eq!(observed, CorpusStatus::Ingesting);
    }

    #[tokio::test]
    async fn cancelled_ingestion_restores_status() {
        let mut source = StaticSource::new(repo());
        source.delay_ms = 300;
        let mock = MockProvider::default();
        let dimension = mock.dimension;
        let c = Arc::new(Coordinator::new(
            Arc::new(mock),
            MemoryStore::new(),
            source,
            &config(dimension),
        ));

        let task = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.ingest("repo").await.map(|r| r.generation) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(c.status(), CorpusStatus::Ingesting);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        let state = c.state();
        assert_eq!(state.status, CorpusStatus::Empty);
        assert_eq!(state.last_error.as_deref(), Some("ingestion cancelled"));
        assert!(state.snapshot.is_none());

        c.ingest("repo").await.unwrap();
        assert_eq!(c.status(), CorpusStatus::Ready);
        assert!(c.state().last_error.is_none());
    }

    #[tokio::test]
    async fn failed_reingestion_keeps_previous_corpus() {
        let c = coordinator(MockProvider::default(), repo());
        let first = c.ingest("repo").await.unwrap();

        let err = c.ingest("missing").await.unwrap_err();
        assert!(matches!(err, PipelineError::Source(SourceError::NotFound(_))));

        let state = c.state();
        assert_eq!(state.status, CorpusStatus::Error);
        assert!(state.last_error.unwrap().contains("missing"));
        assert_eq!(state.snapshot.unwrap().generation, first.generation);

        let answer = c.ask("what does main run").await;
        assert!(answer.error.is_none());
        assert!(!answer.sources.is_empty());
    }

    #[tokio::test]
    async fn permanent_embedding_failure_skips_every_file() {
        let mut files = repo();
        files.pop();
        let c = coordinator(MockProvider::default().with_failing_embeddings(), files);
        let err = c.ingest("repo").await.unwrap_err();
        assert!(matches!(err, PipelineError::NothingIndexed { files: 2 }));
        assert_eq!(c.status(), CorpusStatus::Error);
    }

    #[tokio::test]
    async fn missing_embedding_model_is_a_configuration_error() {
        let c = coordinator(MockProvider::default().without_embeddings(), repo());
        let err = c.ingest("repo").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn dimension_mismatch_fails_verification() {
        let mock = MockProvider::default().with_dimension(32);
        let c = Coordinator::new(
            Arc::new(mock),
            MemoryStore::new(),
            StaticSource::new(repo()),
            &config(64),
        );
        let err = c.verify().await.unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DimensionMismatch {
                expected: 64,
                actual: 32
            }
        ));
    }

    #[tokio::test]
    async fn verify_reports_dimension() {
        let c = coordinator(MockProvider::default(), repo());
        assert_eq!(c.verify().await.unwrap(), 64);
    }

    #[tokio::test]
    async fn malformed_file_is_indexed_with_structural_warning() {
        let files = vec![
            SourceFile::new("Broken.java", "class Broken {\n  void run() {\n    if (x) {\n"),
            SourceFile::new("ok.py", "def ok():\n    return 1\n"),
        ];
        let c = coordinator(MockProvider::default(), files);
        let report = c.ingest("repo").await.unwrap();
        assert_eq!(report.file_count, 2);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, ErrorKind::Structural);
        assert_eq!(report.warnings[0].path, "Broken.java");
    }

    #[tokio::test]
    async fn empty_repository_is_ready_and_answers_nothing_found() {
        let c = coordinator(MockProvider::default(), Vec::new());
        let report = c.ingest("repo").await.unwrap();
        assert_eq!(report.file_count, 0);
        assert_eq!(c.status(), CorpusStatus::Ready);
        let answer = c.ask("anything?").await;
        assert_eq!(answer.sources.len(), 0);
        assert!(answer.confidence.abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn queries_before_ingestion_find_nothing() {
        let c = coordinator(MockProvider::default(), repo());
        let answer = c.where_do_i_start().await;
        assert!(answer.error.is_none());
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn reingestion_supersedes_previous_corpus() {
        let c = coordinator(MockProvider::default(), repo());
        let first = c.ingest("repo").await.unwrap();
        let second = c.ingest("repo").await.unwrap();
        assert!(second.generation > first.generation);
        assert_eq!(c.index.len().await.unwrap(), second.chunk_count);
    }
}
