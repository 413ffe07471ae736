//! Stored-book access
//!
//! Callers name files by paths relative to the storage root. Every such path
//! is resolved here and rejected if it would leave the root.

use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::ShelfError;
use crate::parser::{format_of, reader_for, run_blocking};
use crate::types::{BookFormat, BookMetadata, ChapterContent, LocalBookFile, TocEntry};

/// Read-only view of the storage root
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    /// Library over `config.storage_root`
    pub fn new(config: &Config) -> Self {
        Self::with_root(config.storage_root.clone())
    }

    /// Library over an explicit root directory
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a caller-supplied relative path to an existing file inside the root
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, ShelfError> {
        let relative = relative.trim();
        if relative.is_empty() {
            return Err(ShelfError::InvalidRequest("relative_path must not be empty".into()));
        }

        let candidate = Path::new(relative);
        let escapes = candidate.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(ShelfError::PathNotAllowed(relative.to_string()));
        }

        let joined = self.root.join(candidate);
        if !joined.is_file() {
            return Err(ShelfError::FileNotFound(relative.to_string()));
        }

        // Symlinks may still point outside the root
        let root = self
            .root
            .canonicalize()
            .map_err(|e| ShelfError::storage("failed to resolve storage root", e))?;
        let resolved = joined
            .canonicalize()
            .map_err(|_| ShelfError::FileNotFound(relative.to_string()))?;
        if !resolved.starts_with(&root) {
            return Err(ShelfError::PathNotAllowed(relative.to_string()));
        }
        Ok(resolved)
    }

    /// Every EPUB, PDF and text file under the root, sorted by path
    pub fn list(&self) -> Result<Vec<LocalBookFile>, ShelfError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut books = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(format) = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(BookFormat::from_extension)
            else {
                continue;
            };
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            books.push(LocalBookFile {
                relative_path: relative.to_string_lossy().replace('\\', "/"),
                format,
                size_bytes,
            });
        }

        books.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(books)
    }

    /// Metadata of a stored book
    pub async fn metadata(&self, relative: &str) -> Result<BookMetadata, ShelfError> {
        let path = self.resolve(relative)?;
        let reader = reader_for(format_of(&path)?);
        run_blocking(move || reader.metadata(&path)).await
    }

    /// Table of contents of a stored book
    pub async fn toc(&self, relative: &str) -> Result<Vec<TocEntry>, ShelfError> {
        let path = self.resolve(relative)?;
        let reader = reader_for(format_of(&path)?);
        run_blocking(move || reader.toc(&path)).await
    }

    /// One chapter of a stored book
    pub async fn chapter(&self, relative: &str, selector: &str) -> Result<ChapterContent, ShelfError> {
        let path = self.resolve(relative)?;
        let reader = reader_for(format_of(&path)?);
        let selector = selector.to_string();
        run_blocking(move || reader.chapter_content(&path, &selector)).await
    }
}
