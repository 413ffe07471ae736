//! PDF reader built on `lopdf`

use lopdf::{Document, Object};
use std::path::Path;
use tracing::debug;

use super::{file_size, BookReader};
use crate::convert::clean_whitespace;
use crate::error::ShelfError;
use crate::types::{BookFormat, BookMetadata, ChapterContent, TocEntry};

/// Reader for `.pdf` files
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfReader;

fn open(path: &Path) -> Result<Document, ShelfError> {
    Document::load(path).map_err(|e| ShelfError::unreadable(path.display().to_string(), e))
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise byte-wise)
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    String::from_utf8_lossy(bytes).into_owned()
}

fn object_text(object: &Object) -> Option<String> {
    let text = match object {
        Object::String(bytes, _) => decode_pdf_string(bytes),
        Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
        Object::Integer(i) => i.to_string(),
        Object::Boolean(b) => b.to_string(),
        _ => return None,
    };
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Copy the trailer's Info dictionary into `meta`
fn apply_info_dictionary(doc: &Document, meta: &mut BookMetadata) {
    let Ok(info_ref) = doc.trailer.get(b"Info") else {
        return;
    };
    let Ok((_, info)) = doc.dereference(info_ref) else {
        return;
    };
    let Ok(info) = info.as_dict() else {
        return;
    };

    for (key, value) in info.iter() {
        let key = String::from_utf8_lossy(key).into_owned();
        let value = match doc.dereference(value) {
            Ok((_, resolved)) => object_text(resolved),
            Err(_) => object_text(value),
        };
        let Some(value) = value else { continue };

        match key.as_str() {
            "Title" => meta.title = Some(value),
            "Author" => meta.authors = split_list(&value),
            "Subject" => meta.description = Some(value),
            "Keywords" => meta.subjects = split_list(&value),
            "CreationDate" => meta.date = Some(value),
            _ => {
                meta.extra.insert(key, value);
            }
        }
    }
}

/// Text of a set of 1-based pages
fn pages_text(doc: &Document, pages: &[u32]) -> String {
    match doc.extract_text(pages) {
        Ok(text) => clean_whitespace(&text),
        Err(e) => {
            debug!(?pages, error = %e, "Text extraction failed");
            String::new()
        }
    }
}

fn outline(doc: &Document) -> Vec<TocEntry> {
    match doc.get_toc() {
        Ok(toc) => toc
            .toc
            .into_iter()
            .map(|entry| TocEntry {
                title: entry.title.trim().to_string(),
                location: entry.page.to_string(),
                level: entry.level.max(1),
            })
            .collect(),
        Err(e) => {
            debug!(error = %e, "PDF has no readable outline");
            Vec::new()
        }
    }
}

/// Pages `[start, next_start)` for the first outline entry whose title contains `selector`
fn chapter_pages(toc: &[TocEntry], selector: &str, page_count: u32) -> Option<(String, Vec<u32>)> {
    let needle = selector.to_lowercase();
    let index = toc
        .iter()
        .position(|e| e.title.to_lowercase().contains(&needle))?;
    let start: u32 = toc[index].location.parse().ok()?;
    let end = toc[index + 1..]
        .iter()
        .filter_map(|e| e.location.parse::<u32>().ok())
        .find(|page| *page > start)
        .unwrap_or(page_count + 1);
    Some((toc[index].title.clone(), (start..end.max(start + 1)).collect()))
}

impl BookReader for PdfReader {
    fn format(&self) -> BookFormat {
        BookFormat::Pdf
    }

    fn metadata(&self, path: &Path) -> Result<BookMetadata, ShelfError> {
        let size = file_size(path)?;
        let doc = open(path)?;
        let mut meta = BookMetadata::empty(BookFormat::Pdf, size);
        meta.page_count = Some(doc.get_pages().len() as u32);
        meta.pdf_version = Some(doc.version.clone());
        meta.encrypted = Some(doc.is_encrypted());
        apply_info_dictionary(&doc, &mut meta);
        Ok(meta)
    }

    fn toc(&self, path: &Path) -> Result<Vec<TocEntry>, ShelfError> {
        let doc = open(path)?;
        Ok(outline(&doc))
    }

    fn chapter_content(&self, path: &Path, selector: &str) -> Result<ChapterContent, ShelfError> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(ShelfError::InvalidRequest("chapter must not be empty".into()));
        }
        let doc = open(path)?;
        let page_count = doc.get_pages().len() as u32;
        let (title, pages) = chapter_pages(&outline(&doc), selector, page_count)
            .ok_or_else(|| ShelfError::ChapterNotFound(selector.to_string()))?;

        Ok(ChapterContent {
            selector: selector.to_string(),
            title: Some(title),
            content: pages_text(&doc, &pages),
            pages,
        })
    }

    fn leading_units(&self, path: &Path, n: usize) -> Result<Vec<String>, ShelfError> {
        let doc = open(path)?;
        Ok(doc
            .get_pages()
            .into_keys()
            .take(n)
            .map(|page| pages_text(&doc, &[page]))
            .filter(|text| !text.is_empty())
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Stream};

    /// Write a PDF with one line of text per page
    pub(crate) fn write_sample_pdf(path: &Path, pages: &[&str]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Tide Tables"),
            "Author" => Object::string_literal("Harbor Office; Second Clerk"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn test_metadata_and_units() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tides.pdf");
        write_sample_pdf(&path, &["First page text", "Second page text", "Third page text"]);

        let meta = PdfReader.metadata(&path).unwrap();
        assert_eq!(meta.page_count, Some(3));
        assert_eq!(meta.title.as_deref(), Some("Tide Tables"));
        assert_eq!(meta.authors, vec!["Harbor Office", "Second Clerk"]);
        assert_eq!(meta.encrypted, Some(false));

        let units = PdfReader.leading_units(&path, 2).unwrap();
        assert_eq!(units.len(), 2);
        assert!(units[0].contains("First"));
        assert!(units[1].contains("Second"));
    }

    #[test]
    fn test_no_outline_means_chapter_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.pdf");
        write_sample_pdf(&path, &["Only page"]);

        assert!(PdfReader.toc(&path).unwrap().is_empty());
        assert!(matches!(
            PdfReader.chapter_content(&path, "Intro"),
            Err(ShelfError::ChapterNotFound(_))
        ));
    }

    #[test]
    fn test_chapter_pages() {
        let toc = vec![
            TocEntry { title: "Preface".into(), location: "1".into(), level: 1 },
            TocEntry { title: "Chapter I. Departure".into(), location: "3".into(), level: 1 },
            TocEntry { title: "Section".into(), location: "3".into(), level: 2 },
            TocEntry { title: "Chapter II".into(), location: "6".into(), level: 1 },
        ];
        let (title, pages) = chapter_pages(&toc, "departure", 8).unwrap();
        assert_eq!(title, "Chapter I. Departure");
        assert_eq!(pages, vec![3, 4, 5]);

        let (_, last) = chapter_pages(&toc, "chapter ii", 8).unwrap();
        assert_eq!(last, vec![6, 7, 8]);

        assert!(chapter_pages(&toc, "appendix", 8).is_none());
    }

    #[test]
    fn test_decode_pdf_string() {
        assert_eq!(decode_pdf_string(b"plain"), "plain");
        assert_eq!(decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69]), "Hi");
    }

    #[test]
    fn test_unreadable_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();
        assert!(matches!(
            PdfReader.leading_units(&path, 1),
            Err(ShelfError::UnreadableFile { .. })
        ));
    }
}
