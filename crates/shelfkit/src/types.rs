//! Core types for ShelfKit

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::ShelfError;

/// Book file formats the service downloads and parses
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Epub,
    Pdf,
    Text,
}

impl BookFormat {
    /// Download preference order: EPUB, then PDF, then plain text
    pub const PREFERENCE: [BookFormat; 3] = [BookFormat::Epub, BookFormat::Pdf, BookFormat::Text];

    /// File extension used for stored files
    pub fn extension(&self) -> &'static str {
        match self {
            BookFormat::Epub => "epub",
            BookFormat::Pdf => "pdf",
            BookFormat::Text => "txt",
        }
    }

    /// Map a media type (parameters allowed) to a format
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let mime = media_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/epub+zip" => Some(BookFormat::Epub),
            "application/pdf" | "application/x-pdf" => Some(BookFormat::Pdf),
            "text/plain" => Some(BookFormat::Text),
            _ => None,
        }
    }

    /// Infer a format from the dotted tokens of a URL's last path segment
    ///
    /// Handles Gutenberg-style names such as `84.epub3.images` and
    /// `1342.txt.utf-8` as well as plain `book.pdf`.
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = url::Url::parse(url).ok()?;
        let last = parsed.path_segments()?.next_back()?.to_ascii_lowercase();
        last.split('.').skip(1).find_map(|token| {
            if token.starts_with("epub") {
                Some(BookFormat::Epub)
            } else if token == "pdf" {
                Some(BookFormat::Pdf)
            } else if token == "txt" {
                Some(BookFormat::Text)
            } else {
                None
            }
        })
    }

    /// Map a stored file's extension to a format
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "epub" => Some(BookFormat::Epub),
            "pdf" => Some(BookFormat::Pdf),
            "txt" | "text" => Some(BookFormat::Text),
            _ => None,
        }
    }
}

impl FromStr for BookFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "epub" => Ok(BookFormat::Epub),
            "pdf" => Ok(BookFormat::Pdf),
            "text" | "txt" => Ok(BookFormat::Text),
            _ => Err(format!("Invalid format: {}", s)),
        }
    }
}

impl std::fmt::Display for BookFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookFormat::Epub => write!(f, "epub"),
            BookFormat::Pdf => write!(f, "pdf"),
            BookFormat::Text => write!(f, "text"),
        }
    }
}

/// One catalog record normalized across backends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DiscoveryResult {
    pub title: String,

    /// Authors joined with ", "
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Backend-specific identifier (Gutenberg id, OpenLibrary key, OPDS id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// Backend that produced the record
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Download URL per supported format
    #[serde(default)]
    pub download_urls: BTreeMap<BookFormat, String>,
}

impl DiscoveryResult {
    /// Best available download, preferring EPUB over PDF over plain text
    pub fn best_download(&self) -> Option<(BookFormat, &str)> {
        BookFormat::PREFERENCE.iter().find_map(|format| {
            self.download_urls
                .get(format)
                .map(|url| (*format, url.as_str()))
        })
    }
}

/// A backend that failed during an aggregate search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BackendFailure {
    pub backend: String,
    pub message: String,
}

/// Aggregate discovery response
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DiscoverySearch {
    pub query: String,
    pub results: Vec<DiscoveryResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BackendFailure>,
}

/// A downloaded file inside the storage root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LocalBookFile {
    /// Path relative to the storage root
    pub relative_path: String,
    pub format: BookFormat,
    pub size_bytes: u64,
}

/// Leading excerpt of a downloaded book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ParsedSummary {
    pub relative_path: String,
    pub format: BookFormat,
    pub size_bytes: u64,
    pub summary: String,
}

/// Descriptive metadata extracted from a book file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BookMetadata {
    pub format: BookFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    pub file_size: u64,
    /// Remaining key/value metadata not mapped to a field above
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl BookMetadata {
    /// Empty metadata for a file of the given format and size
    pub fn empty(format: BookFormat, file_size: u64) -> Self {
        Self {
            format,
            title: None,
            authors: Vec::new(),
            language: None,
            publisher: None,
            description: None,
            identifier: None,
            date: None,
            subjects: Vec::new(),
            page_count: None,
            pdf_version: None,
            encrypted: None,
            file_size,
            extra: BTreeMap::new(),
        }
    }
}

/// One table-of-contents entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TocEntry {
    pub title: String,
    /// EPUB content href (with fragment) or 1-based PDF page number
    pub location: String,
    /// Nesting depth, 1 for top-level entries
    pub level: usize,
}

/// Extracted chapter body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChapterContent {
    pub selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Markdown for EPUB, plain text for PDF
    pub content: String,
    /// 1-based page numbers covered (PDF only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<u32>,
}

/// A summarized topic-pipeline download with its catalog origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopicItem {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub url: String,
    #[serde(flatten)]
    pub summary: ParsedSummary,
}

/// Batched topic-pipeline result
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TopicReport {
    pub query: String,
    /// Summaries in completion order
    pub items: Vec<TopicItem>,
    /// Candidates whose download or parse failed
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_backends: Vec<BackendFailure>,
}

/// Incremental topic-pipeline progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TopicEvent {
    /// Discovery finished; `candidates` downloads will be attempted
    Started {
        query: String,
        candidates: usize,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        failed_backends: Vec<BackendFailure>,
    },
    /// One candidate downloaded and summarized
    Item { index: usize, item: TopicItem },
    /// One candidate failed and was skipped
    Skipped { url: String, error: String },
    /// All candidates finished
    Completed { count: usize, skipped: usize },
}

fn default_limit_units() -> usize {
    3
}

fn default_discover_limit() -> usize {
    5
}

fn default_topic_limit() -> usize {
    30
}

fn check_range(name: &str, value: usize, min: usize, max: usize) -> Result<(), ShelfError> {
    if value < min || value > max {
        return Err(ShelfError::InvalidRequest(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

/// Request to search discovery backends
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiscoverRequest {
    /// Free-text query
    pub query: String,
    /// Backends to query: gutendex, openlibrary, standard-ebooks (default: all)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    /// Maximum merged results (1-20, default 5)
    #[serde(default = "default_discover_limit")]
    pub limit: usize,
}

impl DiscoverRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            sources: None,
            limit: default_discover_limit(),
        }
    }

    pub fn validate(&self) -> Result<(), ShelfError> {
        if self.query.trim().is_empty() {
            return Err(ShelfError::InvalidRequest("query must not be empty".into()));
        }
        check_range("limit", self.limit, 1, 20)
    }
}

/// Request to download one URL and summarize it
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchParseRequest {
    /// Book URL (http:// or https://)
    pub url: String,
    /// PDF pages to summarize (1-12, default 3)
    #[serde(default = "default_limit_units")]
    pub limit_pages: usize,
    /// EPUB chapters to summarize (1-12, default 3)
    #[serde(default = "default_limit_units")]
    pub limit_chapters: usize,
}

impl FetchParseRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            limit_pages: default_limit_units(),
            limit_chapters: default_limit_units(),
        }
    }

    pub fn limits(mut self, limit_pages: usize, limit_chapters: usize) -> Self {
        self.limit_pages = limit_pages;
        self.limit_chapters = limit_chapters;
        self
    }

    pub fn validate(&self) -> Result<(), ShelfError> {
        if self.url.is_empty() {
            return Err(ShelfError::MissingUrl);
        }
        check_range("limit_pages", self.limit_pages, 1, 12)?;
        check_range("limit_chapters", self.limit_chapters, 1, 12)
    }
}

/// Request to run the topic pipeline
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TopicRequest {
    /// Topic query (at least 2 characters)
    pub query: String,
    /// Backends to query (default: all)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    /// Discovery result cap (1-50, default 30)
    #[serde(default = "default_topic_limit")]
    pub limit: usize,
    /// Maximum downloads (1-100, default 30, capped at `limit`)
    #[serde(default = "default_topic_limit")]
    pub download_limit: usize,
    #[serde(default = "default_limit_units")]
    pub limit_pages: usize,
    #[serde(default = "default_limit_units")]
    pub limit_chapters: usize,
}

impl TopicRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            sources: None,
            limit: default_topic_limit(),
            download_limit: default_topic_limit(),
            limit_pages: default_limit_units(),
            limit_chapters: default_limit_units(),
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn download_limit(mut self, download_limit: usize) -> Self {
        self.download_limit = download_limit;
        self
    }

    pub fn sources(mut self, sources: Vec<String>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn validate(&self) -> Result<(), ShelfError> {
        if normalize_query(&self.query).chars().count() < 2 {
            return Err(ShelfError::InvalidRequest(
                "query must be at least 2 characters".into(),
            ));
        }
        check_range("limit", self.limit, 1, 50)?;
        check_range("download_limit", self.download_limit, 1, 100)?;
        check_range("limit_pages", self.limit_pages, 1, 12)?;
        check_range("limit_chapters", self.limit_chapters, 1, 12)
    }
}

/// Request naming a stored file
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PathRequest {
    /// Path relative to the storage root
    pub relative_path: String,
}

/// Request for one chapter of a stored file
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChapterRequest {
    /// Path relative to the storage root
    pub relative_path: String,
    /// EPUB chapter id/href, or PDF chapter title substring
    pub chapter: String,
}

fn default_catalog_limit() -> usize {
    10
}

/// Request to search the OpenLibrary catalog
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CatalogSearchRequest {
    /// Free-text query
    pub query: String,
    /// Extra keywords appended to the query ("intro" and "updated" are expanded)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Maximum records (1-50, default 10)
    #[serde(default = "default_catalog_limit")]
    pub limit: usize,
}

impl CatalogSearchRequest {
    pub fn validate(&self) -> Result<(), ShelfError> {
        if self.query.trim().is_empty() && self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ShelfError::InvalidRequest("query must not be empty".into()));
        }
        check_range("limit", self.limit, 1, 50)
    }
}

/// Request to look up an author
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AuthorRequest {
    /// Author name, or a book title when `by_book` is set
    pub query: String,
    /// Treat `query` as a book title and return that book's author
    #[serde(default)]
    pub by_book: bool,
}

impl AuthorRequest {
    pub fn validate(&self) -> Result<(), ShelfError> {
        if self.query.trim().is_empty() {
            return Err(ShelfError::InvalidRequest("query must not be empty".into()));
        }
        Ok(())
    }
}

/// Collapse `+` and whitespace runs into single spaces
pub fn normalize_query(query: &str) -> String {
    query
        .replace('+', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
