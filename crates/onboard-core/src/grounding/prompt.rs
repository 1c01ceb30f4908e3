//! Context packing and prompt construction.

use std::fmt::Write;

use onboard_index::SearchResult;
use onboard_index::context::{chunk_display_header, estimate_tokens};
use onboard_llm::Message;

/// Tokens charged per chunk for its header line and code fence.
pub const CHUNK_OVERHEAD_TOKENS: usize = 20;

pub const GROUNDING_RULES: &str = "\
You are a code onboarding assistant answering questions about a single repository.
Answer only from the code context in the user message. Do not rely on outside knowledge of this codebase.
If the context does not contain enough information to answer, say so explicitly instead of guessing.
Every factual claim must cite the chunk it comes from in the form [path:start-end], using the paths and line numbers from the chunk headers.
Never cite a file or line range that is not shown in the context.";

pub const OVERVIEW_RULES: &str = "\
Give a short structural overview of the repository: entry points, main modules and how they fit together.
Then suggest exactly one concrete first task for a newcomer, citing the file and lines where it starts.";

/// Question asked on behalf of a newcomer who does not know what to ask.
pub const WHERE_DO_I_START: &str = "\
Where should a new developer start in this repository? Describe its overall structure and suggest one concrete first task.";

/// Searches merged into the overview context, one per architectural concern.
pub const OVERVIEW_QUERIES: [&str; 6] = [
    "main entry point application startup",
    "API endpoints routes controllers",
    "configuration settings environment",
    "data models database schemas",
    "core business logic services",
    "README documentation getting started",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Question,
    Overview,
}

/// Tokens a chunk costs inside the context block.
#[must_use]
pub fn context_cost(hit: &SearchResult) -> usize {
    estimate_tokens(&hit.chunk.content) + CHUNK_OVERHEAD_TOKENS
}

/// Keep the best hits that fit in `budget_tokens`.
///
/// Hits are taken in the given (relevance) order and packing stops at the
/// first one that does not fit, so lower-ranked chunks are dropped before
/// higher-ranked ones and no chunk is ever cut.
#[must_use]
pub fn pack_context(hits: Vec<SearchResult>, budget_tokens: usize) -> Vec<SearchResult> {
    let mut packed = Vec::new();
    let mut used_tokens = 0;

    for hit in hits {
        let cost = context_cost(&hit);
        if used_tokens + cost > budget_tokens {
            tracing::debug!(
                chunk = %hit.chunk.id,
                cost,
                used_tokens,
                budget_tokens,
                "context budget reached"
            );
            break;
        }
        used_tokens += cost;
        packed.push(hit);
    }

    packed
}

/// Render the numbered, fenced context block.
#[must_use]
pub fn format_context(context: &[SearchResult]) -> String {
    let mut out = String::new();
    for (i, hit) in context.iter().enumerate() {
        let _ = writeln!(out, "[{}] {}", i + 1, chunk_display_header(&hit.chunk));
        let _ = writeln!(out, "```{}", hit.chunk.language.id());
        out.push_str(&hit.chunk.content);
        if !hit.chunk.content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n\n");
    }
    out
}

#[must_use]
pub fn build_messages(kind: PromptKind, question: &str, context: &[SearchResult]) -> Vec<Message> {
    let system = match kind {
        PromptKind::Question => GROUNDING_RULES.to_owned(),
        PromptKind::Overview => format!("{GROUNDING_RULES}\n{OVERVIEW_RULES}"),
    };

    let mut user = String::from("Code context:\n\n");
    user.push_str(&format_context(context));
    let _ = write!(user, "Question: {}", question.trim());

    vec![Message::system(system), Message::user(user)]
}
