//! EPUB reader built on the `epub` crate
//!
//! Navigation comes from the crate's TOC; descriptive metadata is read from
//! the OPF package document directly so every Dublin Core field survives.

use ::epub::doc::{EpubDoc, NavPoint};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{file_size, BookReader};
use crate::convert::{chapter_markdown, chapter_text, slice_fragment};
use crate::error::ShelfError;
use crate::types::{BookFormat, BookMetadata, ChapterContent, TocEntry};

const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

type Doc = EpubDoc<BufReader<File>>;

/// Reader for `.epub` files
#[derive(Debug, Default, Clone, Copy)]
pub struct EpubReader;

/// One flattened navigation entry
#[derive(Debug, Clone)]
struct NavTarget {
    title: String,
    path: String,
    fragment: Option<String>,
    level: usize,
}

impl NavTarget {
    fn href(&self) -> String {
        match &self.fragment {
            Some(fragment) => format!("{}#{}", self.path, fragment),
            None => self.path.clone(),
        }
    }

    fn matches(&self, selector: &str) -> bool {
        let href = self.href();
        let suffix = format!("/{}", selector);
        href == selector
            || self.path == selector
            || href.ends_with(&suffix)
            || self.path.ends_with(&suffix)
    }
}

fn open(path: &Path) -> Result<Doc, ShelfError> {
    EpubDoc::new(path).map_err(|e| ShelfError::unreadable(path.display().to_string(), e))
}

fn split_href(href: &str) -> (String, Option<String>) {
    match href.split_once('#') {
        Some((path, fragment)) => (
            path.to_string(),
            (!fragment.is_empty()).then(|| fragment.to_string()),
        ),
        None => (href.to_string(), None),
    }
}

fn flatten(points: &[NavPoint], level: usize, out: &mut Vec<NavTarget>) {
    for point in points {
        let content = point.content.to_string_lossy().replace('\\', "/");
        let (path, fragment) = split_href(&content);
        out.push(NavTarget {
            title: point.label.trim().to_string(),
            path,
            fragment,
            level,
        });
        flatten(&point.children, level + 1, out);
    }
}

fn nav_targets(doc: &Doc) -> Vec<NavTarget> {
    let mut targets = Vec::new();
    flatten(&doc.toc, 1, &mut targets);
    targets
}

/// Read an archive entry, trying the path as given and then under the OPF directory
fn read_resource(doc: &mut Doc, path: &str) -> Option<String> {
    if let Some(body) = doc.get_resource_str_by_path(path) {
        return Some(body);
    }
    let under_root: PathBuf = doc.root_base.join(path);
    doc.get_resource_str_by_path(under_root)
}

/// Copy Dublin Core and `<meta>` entries from an OPF document
fn apply_opf_metadata(opf: &str, meta: &mut BookMetadata) {
    let Ok(doc) = roxmltree::Document::parse(opf) else {
        debug!("OPF package document is not well-formed; skipping metadata");
        return;
    };
    let Some(metadata) = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "metadata")
    else {
        return;
    };

    for node in metadata.children().filter(|n| n.is_element()) {
        let text = node
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from);

        if node.tag_name().namespace() == Some(DC_NS) {
            let Some(text) = text else { continue };
            match node.tag_name().name() {
                "title" => {
                    meta.title.get_or_insert(text);
                }
                "creator" => meta.authors.push(text),
                "subject" => meta.subjects.push(text),
                "language" => {
                    meta.language.get_or_insert(text);
                }
                "publisher" => {
                    meta.publisher.get_or_insert(text);
                }
                "description" => {
                    meta.description.get_or_insert(text);
                }
                "identifier" => {
                    meta.identifier.get_or_insert(text);
                }
                "date" => {
                    meta.date.get_or_insert(text);
                }
                other => {
                    meta.extra.entry(other.to_string()).or_insert(text);
                }
            }
        } else if node.tag_name().name() == "meta" {
            if let (Some(name), Some(content)) = (node.attribute("name"), node.attribute("content")) {
                meta.extra.insert(name.to_string(), content.to_string());
            } else if let (Some(property), Some(text)) = (node.attribute("property"), text) {
                meta.extra.insert(property.to_string(), text);
            }
        }
    }
}

/// Locate the chapter a selector names, returning its title and XHTML slice
fn resolve_chapter(doc: &mut Doc, selector: &str) -> Result<(Option<String>, String), ShelfError> {
    let targets = nav_targets(doc);
    if let Some(index) = targets.iter().position(|t| t.matches(selector)) {
        let target = &targets[index];
        let next_anchor = targets[index + 1..]
            .iter()
            .filter(|t| t.path == target.path)
            .find(|t| t.level <= target.level)
            .and_then(|t| t.fragment.as_deref());

        let html = read_resource(doc, &target.path)
            .ok_or_else(|| ShelfError::ChapterNotFound(selector.to_string()))?;
        let slice = slice_fragment(&html, target.fragment.as_deref(), next_anchor).to_string();
        return Ok((Some(target.title.clone()).filter(|t| !t.is_empty()), slice));
    }

    // Manifest ids of content documents are accepted as a last resort
    match doc.get_resource_str(selector) {
        Some((html, mime)) if is_content_document(&mime) => Ok((None, html)),
        _ => Err(ShelfError::ChapterNotFound(selector.to_string())),
    }
}

fn is_content_document(mime: &str) -> bool {
    matches!(
        mime.split(';').next().unwrap_or("").trim(),
        "application/xhtml+xml" | "text/html"
    )
}

/// Plain text of each spine item in reading order
fn spine_texts(doc: &mut Doc, n: usize) -> Vec<String> {
    let mut units = Vec::new();
    loop {
        if let Some((html, _mime)) = doc.get_current_str() {
            let text = chapter_text(&html);
            if !text.is_empty() {
                units.push(text);
            }
        }
        if units.len() >= n || !doc.go_next() {
            break;
        }
    }
    units
}

impl BookReader for EpubReader {
    fn format(&self) -> BookFormat {
        BookFormat::Epub
    }

    fn metadata(&self, path: &Path) -> Result<BookMetadata, ShelfError> {
        let size = file_size(path)?;
        let mut doc = open(path)?;
        let mut meta = BookMetadata::empty(BookFormat::Epub, size);

        let opf_path = doc.root_file.clone();
        if let Some(opf) = doc.get_resource_str_by_path(&opf_path) {
            apply_opf_metadata(&opf, &mut meta);
        }
        Ok(meta)
    }

    fn toc(&self, path: &Path) -> Result<Vec<TocEntry>, ShelfError> {
        let doc = open(path)?;
        Ok(nav_targets(&doc)
            .into_iter()
            .map(|t| TocEntry {
                location: t.href(),
                title: t.title,
                level: t.level,
            })
            .collect())
    }

    fn chapter_content(&self, path: &Path, selector: &str) -> Result<ChapterContent, ShelfError> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(ShelfError::InvalidRequest("chapter must not be empty".into()));
        }
        let mut doc = open(path)?;
        let (title, html) = resolve_chapter(&mut doc, selector)?;
        Ok(ChapterContent {
            selector: selector.to_string(),
            title,
            content: chapter_markdown(&html),
            pages: Vec::new(),
        })
    }

    fn leading_units(&self, path: &Path, n: usize) -> Result<Vec<String>, ShelfError> {
        let mut doc = open(path)?;
        let mut units = Vec::new();
        let mut seen: Vec<String> = Vec::new();

        for target in nav_targets(&doc) {
            if units.len() >= n {
                break;
            }
            if seen.contains(&target.path) {
                continue;
            }
            seen.push(target.path.clone());
            if let Some(html) = read_resource(&mut doc, &target.path) {
                let text = chapter_text(&html);
                if !text.is_empty() {
                    units.push(text);
                }
            }
        }

        if units.is_empty() {
            debug!(path = %path.display(), "No usable TOC; reading spine order");
            units = spine_texts(&mut doc, n);
        }
        Ok(units)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Write a minimal EPUB 2 package with `chapters` single-file chapters
    pub(crate) fn write_sample_epub(path: &Path, chapters: usize) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

        zip.start_file("mimetype", options).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();

        zip.start_file("META-INF/container.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
        )
        .unwrap();

        let mut manifest = String::from(
            r#"<item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>"#,
        );
        let mut spine = String::new();
        let mut nav = String::new();
        for i in 1..=chapters {
            manifest.push_str(&format!(
                r#"<item id="ch{i}" href="chapter{i}.xhtml" media-type="application/xhtml+xml"/>"#
            ));
            spine.push_str(&format!(r#"<itemref idref="ch{i}"/>"#));
            nav.push_str(&format!(
                r#"<navPoint id="np{i}" playOrder="{i}"><navLabel><text>Chapter {i}</text></navLabel><content src="chapter{i}.xhtml"/></navPoint>"#
            ));
        }

        zip.start_file("OEBPS/content.opf", options).unwrap();
        zip.write_all(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>Sample Voyage</dc:title>
    <dc:creator>Ann Author</dc:creator>
    <dc:language>en</dc:language>
    <dc:identifier id="bookid">urn:uuid:sample-voyage</dc:identifier>
    <dc:subject>Sea stories</dc:subject>
    <meta name="generator" content="fixture"/>
  </metadata>
  <manifest>{manifest}</manifest>
  <spine toc="ncx">{spine}</spine>
</package>"#
            )
            .as_bytes(),
        )
        .unwrap();

        zip.start_file("OEBPS/toc.ncx", options).unwrap();
        zip.write_all(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="urn:uuid:sample-voyage"/></head>
  <docTitle><text>Sample Voyage</text></docTitle>
  <navMap>{nav}</navMap>
</ncx>"#
            )
            .as_bytes(),
        )
        .unwrap();

        for i in 1..=chapters {
            zip.start_file(format!("OEBPS/chapter{i}.xhtml"), options)
                .unwrap();
            zip.write_all(
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Chapter {i}</title><style>p {{ margin: 0 }}</style></head>
<body><h1>Chapter {i}</h1><p>Body of chapter number {i}.</p></body></html>"#
                )
                .as_bytes(),
            )
            .unwrap();
        }

        zip.finish().unwrap();
    }

    fn sample(chapters: usize) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.epub");
        write_sample_epub(&path, chapters);
        (dir, path)
    }

    #[test]
    fn test_metadata() {
        let (_dir, path) = sample(2);
        let meta = EpubReader.metadata(&path).unwrap();
        assert_eq!(meta.format, BookFormat::Epub);
        assert_eq!(meta.title.as_deref(), Some("Sample Voyage"));
        assert_eq!(meta.authors, vec!["Ann Author".to_string()]);
        assert_eq!(meta.language.as_deref(), Some("en"));
        assert_eq!(meta.subjects, vec!["Sea stories".to_string()]);
        assert_eq!(meta.extra.get("generator").map(String::as_str), Some("fixture"));
        assert!(meta.file_size > 0);
    }

    #[test]
    fn test_toc_order() {
        let (_dir, path) = sample(3);
        let toc = EpubReader.toc(&path).unwrap();
        let titles: Vec<_> = toc.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Chapter 1", "Chapter 2", "Chapter 3"]);
        assert!(toc[1].location.ends_with("chapter2.xhtml"));
        assert!(toc.iter().all(|e| e.level == 1));
    }

    #[test]
    fn test_chapter_by_href_and_id() {
        let (_dir, path) = sample(3);

        let by_href = EpubReader.chapter_content(&path, "chapter2.xhtml").unwrap();
        assert_eq!(by_href.title.as_deref(), Some("Chapter 2"));
        assert!(by_href.content.contains("Body of chapter number 2."));
        assert!(!by_href.content.contains("margin"));

        let by_id = EpubReader.chapter_content(&path, "ch3").unwrap();
        assert!(by_id.content.contains("Body of chapter number 3."));
    }

    #[test]
    fn test_chapter_not_found() {
        let (_dir, path) = sample(2);
        let err = EpubReader.chapter_content(&path, "epilogue.xhtml").unwrap_err();
        assert!(matches!(err, ShelfError::ChapterNotFound(_)));

        // Non-content manifest items are not chapters
        let err = EpubReader.chapter_content(&path, "ncx").unwrap_err();
        assert!(matches!(err, ShelfError::ChapterNotFound(_)));
    }

    #[test]
    fn test_is_content_document() {
        assert!(is_content_document("application/xhtml+xml"));
        assert!(is_content_document("text/html; charset=utf-8"));
        assert!(!is_content_document("application/x-dtbncx+xml"));
        assert!(!is_content_document("text/css"));
    }

    #[test]
    fn test_leading_units() {
        let (_dir, path) = sample(10);
        let units = EpubReader.leading_units(&path, 2).unwrap();
        assert_eq!(units.len(), 2);
        assert!(units[0].contains("chapter number 1."));
        assert!(units[1].contains("chapter number 2."));
    }

    #[test]
    fn test_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.epub");
        std::fs::write(&path, b"not a zip archive").unwrap();
        assert!(matches!(
            EpubReader.metadata(&path),
            Err(ShelfError::UnreadableFile { .. })
        ));
    }

    #[test]
    fn test_split_href() {
        assert_eq!(
            split_href("OEBPS/ch1.xhtml#sec"),
            ("OEBPS/ch1.xhtml".to_string(), Some("sec".to_string()))
        );
        assert_eq!(split_href("ch1.xhtml#"), ("ch1.xhtml".to_string(), None));
    }
}
