//! ShelfKit - public-domain book discovery, download and summarization
//!
//! This crate finds books in public catalogs, downloads EPUB/PDF/plain-text
//! files into a local storage root, and extracts metadata, tables of
//! contents and chapter text from them.
//!
//! ## Components
//!
//! - [`DiscoveryClient`] - queries Gutendex, OpenLibrary and Standard Ebooks
//!   concurrently and merges their results round-robin
//! - [`Fetcher`] - hash-named, atomic downloads into the storage root
//! - [`BookReader`] - per-format metadata, TOC and chapter extraction
//! - [`Pipeline`] - fetch-and-summarize and the streaming topic pipeline
//! - [`Library`] - listing and safe path resolution for stored books
//! - [`OpenLibraryCatalog`] - keyword search and author lookup
//! - [`Tool`] - every operation as a named JSON tool

pub mod catalog;
pub mod client;
pub mod config;
mod convert;
pub mod discovery;
mod error;
pub mod fetcher;
pub mod library;
pub mod parser;
pub mod pipeline;
mod tool;
mod types;

pub use catalog::{AuthorDetails, AuthorWork, BookDetails, BookSearch, OpenLibraryCatalog};
pub use config::Config;
pub use convert::{chapter_markdown, chapter_text};
pub use discovery::{
    BackendOutcome, DiscoveryBackend, DiscoveryClient, GutendexBackend, OpenLibraryBackend,
    StandardEbooksBackend,
};
pub use error::{ErrorKind, ErrorReport, ShelfError};
pub use fetcher::Fetcher;
pub use library::Library;
pub use parser::{reader_for, BookReader, EpubReader, PdfReader, TextReader};
pub use pipeline::Pipeline;
pub use tool::{Tool, ToolBuilder, ToolDefinition, TOOL_NAMES};
pub use types::{
    normalize_query, AuthorRequest, BackendFailure, BookFormat, BookMetadata,
    CatalogSearchRequest, ChapterContent, ChapterRequest, DiscoverRequest, DiscoveryResult,
    DiscoverySearch, FetchParseRequest, LocalBookFile, ParsedSummary, PathRequest, TocEntry,
    TopicEvent, TopicItem, TopicReport, TopicRequest,
};

/// Default User-Agent string
pub const DEFAULT_USER_AGENT: &str = "ShelfKit/1.0";

/// Tool description for LLM consumption
pub const TOOL_DESCRIPTION: &str = r#"Finds public-domain books, downloads them and extracts their text.

- Searches Gutendex, OpenLibrary and Standard Ebooks
- Downloads EPUB, PDF and plain-text files into a local library
- Summarizes the first chapters or pages of a download
- Reads metadata, tables of contents and single chapters of stored books"#;

/// Extended documentation for LLM consumption (llmtxt)
pub const TOOL_LLMTXT: &str = r#"# ShelfKit Tools

Finds public-domain books, downloads them into a local library and extracts
their text.

## Tools
- `discover_books`: search catalogs. Input: `query`, optional `sources`
  (`gutendex`, `openlibrary`, `standard-ebooks`), `limit` (1-20, default 5).
  Results from different sources are interleaved round-robin.
- `fetch_and_parse`: download one URL and summarize it. Input: `url`,
  `limit_pages` (PDF, 1-12, default 3), `limit_chapters` (EPUB, 1-12, default 3).
- `topic_summaries`: search a topic and summarize up to `download_limit`
  results. Input: `query` (at least 2 characters), `sources`, `limit` (1-50,
  default 30), `download_limit` (1-100, default 30), `limit_pages`,
  `limit_chapters`. Failed downloads are skipped and counted in `skipped`.
- `list_books`: stored books with `relative_path`, `format`, `size_bytes`.
- `book_metadata`, `book_toc`: input `relative_path`.
- `book_chapter`: input `relative_path` and `chapter`. EPUB chapters are
  selected by TOC href, file name or manifest id and returned as Markdown;
  PDF chapters are selected by a case-insensitive title substring and
  returned as plain text with the pages they cover.
- `search_catalog`: OpenLibrary records. Input: `query`, `keywords`, `limit`.
- `author_lookup`: OpenLibrary author with up to ten works. Input: `query`,
  `by_book` (treat `query` as a book title).

## Summary Output
- `relative_path`: path inside the library, `downloaded/{hash}_{slug}.{ext}`
- `format`: "epub", "pdf" or "text"
- `size_bytes`: file size
- `summary`: leading chapters or pages, at most 4096 characters

## Errors
Errors carry a `kind` and a `message`. Kinds: `missing_url`,
`invalid_url_scheme`, `invalid_request`, `unsupported_format`,
`storage_error`, `unreadable_file`, `chapter_not_found`,
`discovery_backend_error`, `all_backends_failed`, `download_failed`,
`file_not_found`, `path_not_allowed`, `internal`.

## Examples

### Summarize a Gutenberg EPUB
```json
{"url": "https://www.gutenberg.org/ebooks/84.epub3.images", "limit_chapters": 2}
```

### Summarize a topic
```json
{"query": "sea stories", "limit": 10, "download_limit": 3}
```
"#;
