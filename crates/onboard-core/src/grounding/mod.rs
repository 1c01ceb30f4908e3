//! Retrieval-grounded answering.
//!
//! A question is embedded, the nearest chunks are packed into a context block
//! under a token budget, and the model is asked to answer from that block
//! alone. Its reply is then checked: every `path:start-end` it cites must lie
//! inside a chunk it was actually shown. Citations that do not are removed
//! from the text and lower the answer's confidence.

pub mod citations;
pub mod confidence;
pub mod prompt;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use onboard_index::{ChunkId, Index, SearchResult, VectorStore, Vectorizer};
use onboard_llm::LlmProvider;
use onboard_llm::retry::{RetryPolicy, with_retry};

use crate::answer::{Answer, SourceReference};
use crate::config::RetrievalConfig;
use crate::error::{ErrorKind, QueryError};
use citations::Verification;
use prompt::{OVERVIEW_QUERIES, PromptKind, WHERE_DO_I_START};

pub struct Grounder<P, S> {
    provider: Arc<P>,
    vectorizer: Arc<Vectorizer<P>>,
    index: Arc<Index<S>>,
    config: RetrievalConfig,
    retry: RetryPolicy,
}

impl<P: LlmProvider, S: VectorStore> Grounder<P, S> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        vectorizer: Arc<Vectorizer<P>>,
        index: Arc<Index<S>>,
        config: RetrievalConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            vectorizer,
            index,
            config,
            retry,
        }
    }

    /// Token budget for the context block: the configured budget, capped at
    /// half the model's context window when the provider reports one.
    #[must_use]
    pub fn context_budget(&self) -> usize {
        let configured = self.config.context_budget_tokens;
        match self.provider.context_window() {
            Some(window) => configured.min(window / 2),
            None => configured,
        }
    }

    /// Answer `question`; failures come back as an answer carrying an error.
    pub async fn answer(&self, question: &str) -> Answer {
        let started = Instant::now();
        self.try_answer(question).await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, kind = ?err.kind(), "question failed");
            Answer::from_error(&err, elapsed_ms(started))
        })
    }

    /// # Errors
    ///
    /// Returns [`QueryError::EmptyQuestion`] for blank input before any
    /// provider is called, [`QueryError::Timeout`] when the overall deadline
    /// passes, or the embedding, search or generation failure.
    pub async fn try_answer(&self, question: &str) -> Result<Answer, QueryError> {
        if question.trim().is_empty() {
            return Err(QueryError::EmptyQuestion);
        }
        self.run_with_deadline(PromptKind::Question, question).await
    }

    /// The predefined newcomer question, answered from the repository's
    /// entry points, configuration, data models and documentation.
    pub async fn where_do_i_start(&self) -> Answer {
        let started = Instant::now();
        self.try_where_do_i_start().await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, kind = ?err.kind(), "overview failed");
            Answer::from_error(&err, elapsed_ms(started))
        })
    }

    /// # Errors
    ///
    /// See [`Grounder::try_answer`].
    pub async fn try_where_do_i_start(&self) -> Result<Answer, QueryError> {
        self.run_with_deadline(PromptKind::Overview, WHERE_DO_I_START)
            .await
    }

    async fn run_with_deadline(
        &self,
        kind: PromptKind,
        question: &str,
    ) -> Result<Answer, QueryError> {
        let started = Instant::now();
        let deadline = self.config.query_timeout();
        let mut answer = tokio::time::timeout(deadline, self.run(kind, question))
            .await
            .map_err(|_| QueryError::Timeout(deadline))??;
        answer.processing_time_ms = elapsed_ms(started);
        Ok(answer)
    }

    async fn run(&self, kind: PromptKind, question: &str) -> Result<Answer, QueryError> {
        let hits = self.retrieve(kind, question).await?;
        let Some(top_similarity) = hits.first().map(|hit| hit.score) else {
            tracing::info!("no candidate chunks retrieved");
            return Ok(Answer::no_relevant_code(0));
        };

        let budget = self.context_budget();
        let retrieved = hits.len();
        let context = prompt::pack_context(hits, budget);
        if context.is_empty() {
            tracing::info!(budget, "no retrieved chunk fits the context budget");
            return Ok(Answer::no_relevant_code(0));
        }
        tracing::debug!(retrieved, packed = context.len(), budget, "context assembled");

        let messages = prompt::build_messages(kind, question, &context);
        let reply = with_retry("chat", &self.retry, || self.provider.chat(&messages))
            .await
            .map_err(|exhausted| QueryError::Generate {
                attempts: exhausted.attempts,
                source: exhausted.error,
            })?;

        let verification = citations::verify(&reply, &context);
        if !verification.unverified.is_empty() {
            tracing::warn!(
                kind = ?ErrorKind::GroundingViolation,
                stripped = verification.unverified.len(),
                verified = verification.verified.len(),
                "answer cited locations outside the supplied context"
            );
        }

        let sources = self.references(&context, &verification);
        let confidence = confidence::confidence(
            top_similarity,
            verification.verified.len(),
            verification.distinct_citations(),
        );

        Ok(Answer {
            answer: verification.text,
            sources,
            confidence,
            processing_time_ms: 0,
            unverified_citations: verification.unverified,
            error: None,
        })
    }

    async fn retrieve(
        &self,
        kind: PromptKind,
        question: &str,
    ) -> Result<Vec<SearchResult>, QueryError> {
        let top_k = self.config.top_k;
        match kind {
            PromptKind::Question => {
                let vector = self.vectorizer.embed_query(question).await?;
                Ok(self.index.search(&vector, top_k).await?)
            }
            PromptKind::Overview => {
                let mut queries = vec![question.to_owned()];
                queries.extend(OVERVIEW_QUERIES.iter().map(|query| (*query).to_owned()));
                let vectors = self.vectorizer.embed(&queries).await?;
                let per_query = try_join_all(
                    vectors
                        .iter()
                        .map(|vector| self.index.search(vector, top_k)),
                )
                .await?;
                Ok(merge_by_best_score(per_query, top_k))
            }
        }
    }

    fn references(&self, context: &[SearchResult], verification: &Verification) -> Vec<SourceReference> {
        let preview_chars = self.config.preview_chars;
        if verification.verified.is_empty() {
            return context
                .iter()
                .map(|hit| {
                    SourceReference::from_chunk(
                        &hit.chunk,
                        hit.chunk.start_line,
                        hit.chunk.end_line,
                        preview_chars,
                    )
                })
                .collect();
        }

        let mut seen = HashSet::new();
        verification
            .verified
            .iter()
            .filter_map(|cited| {
                let chunk = &context[cited.context_index].chunk;
                seen.insert((chunk.id.clone(), cited.start, cited.end))
                    .then(|| SourceReference::from_chunk(chunk, cited.start, cited.end, preview_chars))
            })
            .collect()
    }
}

/// Union of several result lists, one entry per chunk at its best score,
/// re-ranked and cut to `top_k`.
fn merge_by_best_score(lists: Vec<Vec<SearchResult>>, top_k: usize) -> Vec<SearchResult> {
    let mut best: HashMap<ChunkId, SearchResult> = HashMap::new();
    for hit in lists.into_iter().flatten() {
        match best.get_mut(&hit.chunk.id) {
            Some(existing) if existing.score >= hit.score => {}
            Some(existing) => *existing = hit,
            None => {
                best.insert(hit.chunk.id.clone(), hit);
            }
        }
    }

    let mut merged: Vec<SearchResult> = best.into_values().collect();
    merged.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    merged.truncate(top_k);
    for (i, hit) in merged.iter_mut().enumerate() {
        hit.rank = i + 1;
    }
    merged
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
