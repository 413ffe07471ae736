//! ShelfKit CLI - find, download and read public-domain books

mod mcp;

use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use shelfkit::{
    AuthorDetails, AuthorRequest, BookMetadata, BookSearch, CatalogSearchRequest, ChapterContent,
    Config, DiscoverRequest, DiscoverySearch, FetchParseRequest, LocalBookFile, ParsedSummary,
    ShelfError, TocEntry, Tool, TopicEvent, TopicRequest, TOOL_LLMTXT,
};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Output format for subcommands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Markdown, with YAML frontmatter where a record has fields
    #[default]
    Md,
    /// JSON (NDJSON for streamed topic events)
    Json,
}

/// ShelfKit - public-domain book discovery and parsing
#[derive(Parser, Debug)]
#[command(name = "shelfkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Print full help with examples (llmtxt)
    #[arg(long)]
    llmtxt: bool,

    /// Directory holding downloaded books
    #[arg(long, global = true, env = "EBOOK_ROOT_PATH")]
    root: Option<PathBuf>,

    /// Custom User-Agent
    #[arg(long, global = true, env = "SHELFKIT_USER_AGENT")]
    user_agent: Option<String>,

    /// Output format
    #[arg(long, short, global = true, default_value = "md")]
    output: OutputFormat,
}

#[derive(Args, Debug)]
struct UnitLimits {
    /// PDF pages to summarize
    #[arg(long, default_value_t = 3)]
    limit_pages: usize,

    /// EPUB chapters to summarize
    #[arg(long, default_value_t = 3)]
    limit_chapters: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as MCP (Model Context Protocol) server over stdio
    Mcp,
    /// Search the OpenLibrary catalog
    Search {
        query: String,

        /// Extra keyword (repeatable)
        #[arg(long = "keyword", short)]
        keywords: Vec<String>,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Search discovery backends for downloadable books
    Discover {
        query: String,

        /// Backend to query (repeatable): gutendex, openlibrary, standard-ebooks
        #[arg(long = "source", short)]
        sources: Vec<String>,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Look up an OpenLibrary author
    Author {
        query: String,

        /// Treat the query as a book title
        #[arg(long)]
        by_book: bool,
    },
    /// Download a book URL and summarize it
    Fetch {
        url: String,

        #[command(flatten)]
        limits: UnitLimits,
    },
    /// Search a topic, download and summarize the results
    Topic {
        query: String,

        #[arg(long = "source", short)]
        sources: Vec<String>,

        #[arg(long, default_value_t = 30)]
        limit: usize,

        #[arg(long, default_value_t = 30)]
        download_limit: usize,

        #[command(flatten)]
        limits: UnitLimits,
    },
    /// List stored books
    List,
    /// Show metadata of a stored book
    Metadata { relative_path: String },
    /// Show the table of contents of a stored book
    Toc { relative_path: String },
    /// Print one chapter of a stored book
    Chapter {
        relative_path: String,
        chapter: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Handle --llmtxt flag
    if cli.llmtxt {
        writeln_safe(TOOL_LLMTXT);
        std::process::exit(0);
    }

    init_tracing();

    let Some(command) = cli.command else {
        eprintln!("Usage: shelfkit fetch <URL>");
        eprintln!("   or: shelfkit topic <QUERY>");
        eprintln!("   or: shelfkit mcp");
        eprintln!("   or: shelfkit --help");
        std::process::exit(1);
    };

    let mut config = Config::from_env();
    if let Some(root) = cli.root {
        config = config.with_storage_root(root);
    }
    if let Some(ua) = cli.user_agent {
        config = config.with_user_agent(ua);
    }

    let tool = match Tool::builder().config(config).build() {
        Ok(tool) => tool,
        Err(e) => fail(e),
    };

    if let Err(e) = run(&tool, command, cli.output).await {
        fail(e);
    }
}

/// Log to stderr; `RUST_LOG` wins over `LOG_LEVEL`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_default()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}

async fn run(tool: &Tool, command: Commands, output: OutputFormat) -> Result<(), ShelfError> {
    match command {
        Commands::Mcp => {
            mcp::run_server(tool.clone()).await;
            Ok(())
        }
        Commands::Search {
            query,
            keywords,
            limit,
        } => {
            let req = CatalogSearchRequest {
                query,
                keywords,
                limit,
            };
            req.validate()?;
            let search = tool
                .catalog()
                .search_books(&req.query, &req.keywords, req.limit)
                .await?;
            emit(output, &search, format_catalog_md)
        }
        Commands::Discover {
            query,
            sources,
            limit,
        } => {
            let req = DiscoverRequest {
                sources: (!sources.is_empty()).then_some(sources),
                limit,
                ..DiscoverRequest::new(query)
            };
            req.validate()?;
            let search = tool
                .pipeline()
                .discovery()
                .search(req.query.trim(), req.sources.as_deref(), req.limit)
                .await?;
            emit(output, &search, format_discovery_md)
        }
        Commands::Author { query, by_book } => {
            let req = AuthorRequest { query, by_book };
            req.validate()?;
            let author = if req.by_book {
                tool.catalog()
                    .search_author_with_book_name(req.query.trim())
                    .await?
            } else {
                tool.catalog().search_author(req.query.trim()).await?
            };
            emit(output, &author, format_author_md)
        }
        Commands::Fetch { url, limits } => {
            let req = FetchParseRequest::new(url).limits(limits.limit_pages, limits.limit_chapters);
            let summary = tool.pipeline().fetch_and_parse(&req).await?;
            emit(output, &summary, format_md_with_frontmatter)
        }
        Commands::Topic {
            query,
            sources,
            limit,
            download_limit,
            limits,
        } => {
            let mut req = TopicRequest::new(query)
                .limit(limit)
                .download_limit(download_limit);
            if !sources.is_empty() {
                req = req.sources(sources);
            }
            req.limit_pages = limits.limit_pages;
            req.limit_chapters = limits.limit_chapters;

            let events = tool.pipeline().topic_stream(&req).await?;
            // A closed reader ends the run after in-flight downloads are dropped
            write_topic_events(&mut io::stdout(), events, output).await?;
            Ok(())
        }
        Commands::List => {
            let books = tool.library().list()?;
            emit(output, &books, |books: &Vec<LocalBookFile>| {
                format_list_md(books)
            })
        }
        Commands::Metadata { relative_path } => {
            let metadata = tool.library().metadata(&relative_path).await?;
            emit(output, &metadata, format_metadata_md)
        }
        Commands::Toc { relative_path } => {
            let toc = tool.library().toc(&relative_path).await?;
            emit(output, &toc, |toc: &Vec<TocEntry>| format_toc_md(toc))
        }
        Commands::Chapter {
            relative_path,
            chapter,
        } => {
            let content = tool.library().chapter(&relative_path, &chapter).await?;
            emit(output, &content, format_chapter_md)
        }
    }
}

/// Print a value as pretty JSON or through its markdown renderer
fn emit<T: Serialize>(
    output: OutputFormat,
    value: &T,
    md: impl Fn(&T) -> String,
) -> Result<(), ShelfError> {
    let text = match output {
        OutputFormat::Md => md(value),
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map_err(|e| ShelfError::Internal(format!("failed to serialize output: {}", e)))?,
    };
    writeln_safe(&text);
    Ok(())
}

/// Write topic events until the stream ends or the reader goes away.
///
/// Returns `false` when the reader closed the pipe. The stream is dropped
/// before returning, so pending downloads clean up their partial files.
async fn write_topic_events<W: Write>(
    out: &mut W,
    mut events: BoxStream<'static, TopicEvent>,
    output: OutputFormat,
) -> Result<bool, ShelfError> {
    while let Some(event) = events.next().await {
        let line = match output {
            OutputFormat::Md => format_topic_event_md(&event),
            OutputFormat::Json => to_json_line(&event)?,
        };
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            drop(events);
            if e.kind() == io::ErrorKind::BrokenPipe {
                return Ok(false);
            }
            return Err(ShelfError::Internal(format!("failed to write output: {}", e)));
        }
    }
    Ok(true)
}

fn to_json_line<T: Serialize>(value: &T) -> Result<String, ShelfError> {
    serde_json::to_string(value)
        .map_err(|e| ShelfError::Internal(format!("failed to serialize output: {}", e)))
}

/// Format a summary as markdown with YAML frontmatter
fn format_md_with_frontmatter(summary: &ParsedSummary) -> String {
    let mut output = String::new();

    output.push_str("---\n");
    output.push_str(&format!("relative_path: {}\n", summary.relative_path));
    output.push_str(&format!("format: {}\n", summary.format));
    output.push_str(&format!("size_bytes: {}\n", summary.size_bytes));
    output.push_str("---\n");
    output.push_str(&summary.summary);

    output
}

fn format_topic_event_md(event: &TopicEvent) -> String {
    match event {
        TopicEvent::Started {
            query,
            candidates,
            failed_backends,
        } => {
            let mut out = format!("# {}\n\n{} candidate(s)", query, candidates);
            for failure in failed_backends {
                out.push_str(&format!("\n> {} failed: {}", failure.backend, failure.message));
            }
            out
        }
        TopicEvent::Item { item, .. } => {
            let mut out = format!("\n## {}\n\n", item.title);
            if let Some(ref author) = item.author {
                out.push_str(&format!("*{}* ({})\n\n", author, item.source));
            }
            out.push_str(&format_md_with_frontmatter(&item.summary));
            out
        }
        TopicEvent::Skipped { url, error } => format!("\n> skipped {}: {}", url, error),
        TopicEvent::Completed { count, skipped } => {
            format!("\n---\n{} summarized, {} skipped", count, skipped)
        }
    }
}

fn format_discovery_md(search: &DiscoverySearch) -> String {
    let mut out = String::new();
    for (i, result) in search.results.iter().enumerate() {
        out.push_str(&format!("{}. {}", i + 1, result.title));
        if let Some(ref author) = result.author {
            out.push_str(&format!(" by {}", author));
        }
        out.push_str(&format!(" [{}]\n", result.source));
        for (format, url) in &result.download_urls {
            out.push_str(&format!("   - {}: {}\n", format, url));
        }
    }
    for failure in &search.failures {
        out.push_str(&format!("> {} failed: {}\n", failure.backend, failure.message));
    }
    if out.is_empty() {
        out.push_str("No results");
    }
    out.trim_end().to_string()
}

fn format_catalog_md(search: &BookSearch) -> String {
    let mut out = format!("{} result(s) for \"{}\"\n", search.num_found, search.q);
    for doc in &search.docs {
        out.push_str(&format!("- {}", doc.title.as_deref().unwrap_or("(untitled)")));
        if let Some(ref author) = doc.author_name {
            out.push_str(&format!(" by {}", author));
        }
        if let Some(year) = doc.first_publish_year {
            out.push_str(&format!(" ({})", year));
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn format_author_md(author: &AuthorDetails) -> String {
    let mut out = format!("# {}\n", author.name.as_deref().unwrap_or("Unknown author"));
    if let (Some(birth), death) = (&author.birth_date, &author.death_date) {
        out.push_str(&format!("\n{} - {}\n", birth, death.as_deref().unwrap_or("")));
    }
    if let Some(ref bio) = author.bio {
        out.push_str(&format!("\n{}\n", bio));
    }
    if !author.works.is_empty() {
        out.push_str("\n## Works\n");
        for work in &author.works {
            out.push_str(&format!("- {}\n", work.title.as_deref().unwrap_or("(untitled)")));
        }
    }
    out.trim_end().to_string()
}

fn format_list_md(books: &[LocalBookFile]) -> String {
    if books.is_empty() {
        return "No books stored".to_string();
    }
    books
        .iter()
        .map(|b| format!("- {} ({}, {} bytes)", b.relative_path, b.format, b.size_bytes))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_metadata_md(metadata: &BookMetadata) -> String {
    let mut output = String::from("---\n");
    output.push_str(&format!("format: {}\n", metadata.format));
    if let Some(ref title) = metadata.title {
        output.push_str(&format!("title: {}\n", title));
    }
    if !metadata.authors.is_empty() {
        output.push_str(&format!("authors: {}\n", metadata.authors.join("; ")));
    }
    for (key, value) in [
        ("language", &metadata.language),
        ("publisher", &metadata.publisher),
        ("identifier", &metadata.identifier),
        ("date", &metadata.date),
        ("pdf_version", &metadata.pdf_version),
    ] {
        if let Some(value) = value {
            output.push_str(&format!("{}: {}\n", key, value));
        }
    }
    if let Some(pages) = metadata.page_count {
        output.push_str(&format!("page_count: {}\n", pages));
    }
    if !metadata.subjects.is_empty() {
        output.push_str(&format!("subjects: {}\n", metadata.subjects.join("; ")));
    }
    output.push_str(&format!("file_size: {}\n", metadata.file_size));
    output.push_str("---\n");
    if let Some(ref description) = metadata.description {
        output.push_str(description);
    }
    output
}

fn format_toc_md(toc: &[TocEntry]) -> String {
    if toc.is_empty() {
        return "No table of contents".to_string();
    }
    toc.iter()
        .map(|entry| {
            format!(
                "{}- {} ({})",
                "  ".repeat(entry.level.saturating_sub(1)),
                entry.title,
                entry.location
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_chapter_md(chapter: &ChapterContent) -> String {
    let mut output = String::from("---\n");
    output.push_str(&format!("chapter: {}\n", chapter.selector));
    if let Some(ref title) = chapter.title {
        output.push_str(&format!("title: {}\n", title));
    }
    if let (Some(first), Some(last)) = (chapter.pages.first(), chapter.pages.last()) {
        output.push_str(&format!("pages: {}-{}\n", first, last));
    }
    output.push_str("---\n");
    output.push_str(&chapter.content);
    output
}

/// Write to stdout, exit silently on broken pipe
fn writeln_safe(s: &str) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", s) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        eprintln!("Error writing to stdout: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use shelfkit::{BookFormat, TopicItem};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Writer whose reader has gone away
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Flags when the stream holding it is dropped
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn summary() -> ParsedSummary {
        ParsedSummary {
            relative_path: "downloaded/0123456789abcdef_frankenstein.epub".to_string(),
            format: BookFormat::Epub,
            size_bytes: 4096,
            summary: "You will rejoice to hear...".to_string(),
        }
    }

    #[test]
    fn test_format_md_basic() {
        let output = format_md_with_frontmatter(&summary());

        assert!(output.starts_with("---\n"));
        assert!(output.contains("relative_path: downloaded/0123456789abcdef_frankenstein.epub\n"));
        assert!(output.contains("format: epub\n"));
        assert!(output.contains("size_bytes: 4096\n"));
        assert!(output.ends_with("---\nYou will rejoice to hear..."));
    }

    #[test]
    fn test_topic_events_md() {
        let item = TopicEvent::Item {
            index: 0,
            item: TopicItem {
                title: "Frankenstein".to_string(),
                author: Some("Mary Shelley".to_string()),
                source: "gutendex".to_string(),
                identifier: Some("84".to_string()),
                url: "https://www.gutenberg.org/ebooks/84.epub3.images".to_string(),
                summary: summary(),
            },
        };
        let output = format_topic_event_md(&item);
        assert!(output.contains("## Frankenstein"));
        assert!(output.contains("*Mary Shelley* (gutendex)"));
        assert!(output.contains("format: epub"));

        let done = format_topic_event_md(&TopicEvent::Completed {
            count: 2,
            skipped: 1,
        });
        assert!(done.ends_with("2 summarized, 1 skipped"));
    }

    #[test]
    fn test_topic_event_json_line() {
        let line = to_json_line(&TopicEvent::Skipped {
            url: "https://x.org/a.epub".to_string(),
            error: "Download failed".to_string(),
        })
        .unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"event\":\"skipped\""));
    }

    #[test]
    fn test_format_toc_md_indents_levels() {
        let toc = vec![
            TocEntry {
                title: "Part One".to_string(),
                location: "part1.xhtml".to_string(),
                level: 1,
            },
            TocEntry {
                title: "Letter 1".to_string(),
                location: "part1.xhtml#l1".to_string(),
                level: 2,
            },
        ];
        assert_eq!(
            format_toc_md(&toc),
            "- Part One (part1.xhtml)\n  - Letter 1 (part1.xhtml#l1)"
        );
    }

    #[test]
    fn test_format_chapter_md_pages() {
        let chapter = ChapterContent {
            selector: "tides".to_string(),
            title: Some("Tides".to_string()),
            content: "High water".to_string(),
            pages: vec![2, 3, 4],
        };
        let output = format_chapter_md(&chapter);
        assert!(output.contains("pages: 2-4\n"));
        assert!(output.ends_with("---\nHigh water"));
    }

    #[tokio::test]
    async fn test_closed_pipe_drops_topic_stream() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        let started = TopicEvent::Started {
            query: "whales".to_string(),
            candidates: 2,
            failed_backends: vec![],
        };
        // The pending tail stands in for a download that never finishes
        let events = stream::once(async move { started })
            .chain(stream::pending::<TopicEvent>().map(move |event| {
                let _held = &flag;
                event
            }))
            .boxed();

        let finished = write_topic_events(&mut ClosedPipe, events, OutputFormat::Json)
            .await
            .unwrap();

        assert!(!finished);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_write_topic_events_to_buffer() {
        let events = stream::iter(vec![TopicEvent::Completed {
            count: 0,
            skipped: 0,
        }])
        .boxed();
        let mut out = Vec::new();

        let finished = write_topic_events(&mut out, events, OutputFormat::Json)
            .await
            .unwrap();

        assert!(finished);
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("\"event\":\"completed\""));
    }
}
