//! Plain-text reader

use std::path::Path;

use super::{file_size, BookReader};
use crate::error::ShelfError;
use crate::types::{BookFormat, BookMetadata, ChapterContent, TocEntry};

/// Reader for `.txt` files; no navigation structure
#[derive(Debug, Default, Clone, Copy)]
pub struct TextReader;

fn read_lossy(path: &Path) -> Result<String, ShelfError> {
    let bytes =
        std::fs::read(path).map_err(|e| ShelfError::unreadable(path.display().to_string(), e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

impl BookReader for TextReader {
    fn format(&self) -> BookFormat {
        BookFormat::Text
    }

    fn metadata(&self, path: &Path) -> Result<BookMetadata, ShelfError> {
        Ok(BookMetadata::empty(BookFormat::Text, file_size(path)?))
    }

    fn toc(&self, _path: &Path) -> Result<Vec<TocEntry>, ShelfError> {
        Err(ShelfError::UnsupportedFormat(
            "plain text has no table of contents".into(),
        ))
    }

    fn chapter_content(&self, _path: &Path, _selector: &str) -> Result<ChapterContent, ShelfError> {
        Err(ShelfError::UnsupportedFormat("plain text has no chapters".into()))
    }

    fn leading_units(&self, path: &Path, _n: usize) -> Result<Vec<String>, ShelfError> {
        let text = read_lossy(path)?;
        let text = text.trim();
        Ok(if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "  Call me Ishmael.\n\nSome years ago...  ").unwrap();

        let units = TextReader.leading_units(&path, 3).unwrap();
        assert_eq!(units, vec!["Call me Ishmael.\n\nSome years ago...".to_string()]);
        assert_eq!(TextReader.metadata(&path).unwrap().file_size, 39);
        assert!(matches!(
            TextReader.toc(&path),
            Err(ShelfError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            TextReader.chapter_content(&path, "1"),
            Err(ShelfError::UnsupportedFormat(_))
        ));
    }
}
