//! Book file readers
//!
//! Each supported format has a [`BookReader`]. Readers are synchronous and
//! CPU-bound; async callers go through [`run_blocking`].

mod epub;
mod pdf;
mod text;

pub use self::epub::EpubReader;
pub use self::pdf::PdfReader;
pub use self::text::TextReader;

use std::path::Path;

use crate::error::ShelfError;
use crate::types::{BookFormat, BookMetadata, ChapterContent, TocEntry};

/// Format-specific access to a stored book
pub trait BookReader: Send + Sync {
    /// Format handled by this reader
    fn format(&self) -> BookFormat;

    /// Descriptive metadata
    fn metadata(&self, path: &Path) -> Result<BookMetadata, ShelfError>;

    /// Table of contents, nested entries flattened depth-first
    fn toc(&self, path: &Path) -> Result<Vec<TocEntry>, ShelfError>;

    /// One chapter selected by id/href (EPUB) or title substring (PDF)
    fn chapter_content(&self, path: &Path, selector: &str) -> Result<ChapterContent, ShelfError>;

    /// Plain text of the first `n` units (chapters or pages)
    fn leading_units(&self, path: &Path, n: usize) -> Result<Vec<String>, ShelfError>;
}

static EPUB_READER: EpubReader = EpubReader;
static PDF_READER: PdfReader = PdfReader;
static TEXT_READER: TextReader = TextReader;

/// Reader for a format
pub fn reader_for(format: BookFormat) -> &'static dyn BookReader {
    match format {
        BookFormat::Epub => &EPUB_READER,
        BookFormat::Pdf => &PDF_READER,
        BookFormat::Text => &TEXT_READER,
    }
}

/// Format of a stored file, judged by its extension
pub fn format_of(path: &Path) -> Result<BookFormat, ShelfError> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(BookFormat::from_extension)
        .ok_or_else(|| ShelfError::UnsupportedFormat(path.display().to_string()))
}

/// Size of a file in bytes
pub(crate) fn file_size(path: &Path) -> Result<u64, ShelfError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| ShelfError::unreadable(path.display().to_string(), e))
}

/// Run a parsing closure on the blocking thread pool
pub async fn run_blocking<T, F>(f: F) -> Result<T, ShelfError>
where
    F: FnOnce() -> Result<T, ShelfError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ShelfError::Internal(format!("parser task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_reader_for() {
        for format in BookFormat::PREFERENCE {
            assert_eq!(reader_for(format).format(), format);
        }
    }

    #[test]
    fn test_format_of() {
        assert_eq!(
            format_of(&PathBuf::from("downloaded/abc_book.EPUB")).unwrap(),
            BookFormat::Epub
        );
        assert_eq!(format_of(&PathBuf::from("a.txt")).unwrap(), BookFormat::Text);
        assert!(matches!(
            format_of(&PathBuf::from("cover.jpg")),
            Err(ShelfError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let value = run_blocking(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);
        let err = run_blocking::<(), _>(|| Err(ShelfError::ChapterNotFound("x".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, ShelfError::ChapterNotFound(_)));
    }
}
