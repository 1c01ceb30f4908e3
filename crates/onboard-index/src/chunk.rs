//! Data model shared by segmentation, embedding and search.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::languages::{Lang, detect_language};

/// One file of the corpus, identified by its repository-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
    pub language: Lang,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl SourceFile {
    /// Build a file from text already in memory, detecting the language from
    /// the path.
    #[must_use]
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let path = path.into();
        let text = text.into();
        Self {
            language: detect_language(std::path::Path::new(&path)),
            size_bytes: text.len() as u64,
            path,
            text,
            modified: None,
        }
    }

    /// Decode raw bytes lossily; invalid UTF-8 sequences become U+FFFD.
    #[must_use]
    pub fn from_bytes(
        path: impl Into<String>,
        bytes: &[u8],
        modified: Option<DateTime<Utc>>,
    ) -> Self {
        let mut file = Self::new(path, String::from_utf8_lossy(bytes).into_owned());
        file.size_bytes = bytes.len() as u64;
        file.modified = modified;
        file
    }

    #[must_use]
    pub fn with_language(mut self, language: Lang) -> Self {
        self.language = language;
        self
    }
}

/// What a chunk represents in its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Class,
    Module,
    Fallback,
}

impl ChunkKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Module => "module",
            Self::Fallback => "fallback",
        }
    }

    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "function" => Some(Self::Function),
            "class" => Some(Self::Class),
            "module" => Some(Self::Module),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic chunk identity: 32 lowercase hex chars.
///
/// The value doubles as a simple-format UUID, which is how it is used as a
/// point id by stores that require one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    #[must_use]
    pub fn derive(file_path: &str, start_line: usize, end_line: usize, ordinal: usize) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(file_path.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(start_line as u64).to_le_bytes());
        hasher.update(&(end_line as u64).to_le_bytes());
        hasher.update(&(ordinal as u64).to_le_bytes());
        let hex = hasher.finalize().to_hex();
        Self(hex[..32].to_owned())
    }

    /// Wrap an id read back from storage.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id as a UUID, `None` if it was not produced by [`ChunkId::derive`].
    #[must_use]
    pub fn as_uuid(&self) -> Option<uuid::Uuid> {
        uuid::Uuid::try_parse(&self.0).ok()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A line-addressed slice of one source file.
///
/// Lines are 1-based and inclusive. The first `overlap_lines` lines repeat the
/// tail of the previous chunk; the remaining lines form the primary span, and
/// primary spans of one file are disjoint and cover it completely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub file_path: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default)]
    pub overlap_lines: usize,
    pub language: Lang,
    pub kind: ChunkKind,
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub content_hash: String,
}

impl Chunk {
    /// Lines owned by this chunk alone.
    #[must_use]
    pub fn primary_span(&self) -> (usize, usize) {
        (self.start_line + self.overlap_lines, self.end_line)
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.end_line + 1 - self.start_line
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Whether `start..=end` lies inside this chunk's lines.
    #[must_use]
    pub fn contains_range(&self, start: usize, end: usize) -> bool {
        start <= end && self.start_line <= start && end <= self.end_line
    }

    /// Lines `start..=end` of this chunk's content; `None` when out of range.
    #[must_use]
    pub fn slice_lines(&self, start: usize, end: usize) -> Option<String> {
        if !self.contains_range(start, end) {
            return None;
        }
        Some(
            self.content
                .split_inclusive('\n')
                .skip(start - self.start_line)
                .take(end + 1 - start)
                .collect(),
        )
    }
}

/// A chunk and its embedding, as owned by the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

/// One ranked search hit. `rank` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub score: f32,
    pub rank: usize,
}
