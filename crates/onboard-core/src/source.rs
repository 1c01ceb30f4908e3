//! Repository sources: where the files of a corpus come from.

use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use onboard_index::SourceFile;
use onboard_index::languages::is_code_file;

use crate::error::SourceError;

pub trait RepositorySource: Send + Sync {
    /// All ingestible files of the repository at `locator`.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be reached at all.
    fn fetch(&self, locator: &str)
    -> impl Future<Output = Result<Vec<SourceFile>, SourceError>> + Send;
}

/// A checkout on the local filesystem, walked with `.gitignore` rules applied.
#[derive(Debug, Clone)]
pub struct LocalSource {
    max_file_size: u64,
}

impl LocalSource {
    #[must_use]
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }
}

impl RepositorySource for LocalSource {
    async fn fetch(&self, locator: &str) -> Result<Vec<SourceFile>, SourceError> {
        let root = PathBuf::from(locator);
        let max_file_size = self.max_file_size;
        tokio::task::spawn_blocking(move || walk(&root, max_file_size))
            .await
            .map_err(|e| SourceError::Read {
                path: PathBuf::from(locator),
                source: std::io::Error::other(e),
            })?
    }
}

fn walk(root: &Path, max_file_size: u64) -> Result<Vec<SourceFile>, SourceError> {
    if !root.exists() {
        return Err(SourceError::NotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(SourceError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .build()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) || !is_code_file(entry.path()) {
            continue;
        }

        let rel_path = relative_path(root, entry.path());
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(file = %rel_path, error = %e, "skipping file without metadata");
                continue;
            }
        };
        if metadata.len() > max_file_size {
            tracing::debug!(file = %rel_path, size = metadata.len(), "skipping oversized file");
            continue;
        }

        let bytes = match std::fs::read(entry.path()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(file = %rel_path, error = %e, "skipping unreadable file");
                continue;
            }
        };
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        files.push(SourceFile::from_bytes(rel_path, &bytes, modified));
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::info!(root = %root.display(), files = files.len(), "repository scanned");
    Ok(files)
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
