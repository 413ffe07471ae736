//! Tool builder and contract for ShelfKit
//!
//! A [`Tool`] exposes every library operation as a named agent tool with a
//! JSON input schema and a JSON-in, JSON-out [`Tool::call`] entry point.

use schemars::schema_for;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::catalog::OpenLibraryCatalog;
use crate::config::Config;
use crate::error::ShelfError;
use crate::library::Library;
use crate::pipeline::Pipeline;
use crate::types::{
    AuthorRequest, CatalogSearchRequest, ChapterRequest, DiscoverRequest, FetchParseRequest,
    PathRequest, TopicRequest,
};
use crate::{TOOL_DESCRIPTION, TOOL_LLMTXT};

/// Name, description and input schema of one tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Every tool name, in listing order
pub const TOOL_NAMES: [&str; 9] = [
    "discover_books",
    "fetch_and_parse",
    "topic_summaries",
    "list_books",
    "book_metadata",
    "book_toc",
    "book_chapter",
    "search_catalog",
    "author_lookup",
];

fn describe(name: &str) -> &'static str {
    match name {
        "discover_books" => {
            "Search Gutendex, OpenLibrary and Standard Ebooks; results are merged round-robin by source."
        }
        "fetch_and_parse" => {
            "Download an EPUB, PDF or text URL into the library and return a summary of its first chapters or pages."
        }
        "topic_summaries" => {
            "Search a topic, download up to download_limit results and summarize each. Failed downloads are skipped and counted."
        }
        "list_books" => "List stored books with their relative paths, formats and sizes.",
        "book_metadata" => "Return descriptive metadata of a stored EPUB or PDF.",
        "book_toc" => "Return the table of contents of a stored EPUB or PDF.",
        "book_chapter" => {
            "Return one chapter: EPUB chapters by id or href (Markdown), PDF chapters by title substring (text)."
        }
        "search_catalog" => "Search OpenLibrary book records by query and optional keywords.",
        "author_lookup" => "Look up an OpenLibrary author (or a book's author) with up to ten works.",
        _ => "",
    }
}

fn input_schema(name: &str) -> Value {
    let schema = match name {
        "discover_books" => schema_for!(DiscoverRequest),
        "fetch_and_parse" => schema_for!(FetchParseRequest),
        "topic_summaries" => schema_for!(TopicRequest),
        "book_metadata" | "book_toc" => schema_for!(PathRequest),
        "book_chapter" => schema_for!(ChapterRequest),
        "search_catalog" => schema_for!(CatalogSearchRequest),
        "author_lookup" => schema_for!(AuthorRequest),
        _ => {
            return serde_json::json!({"type": "object", "properties": {}});
        }
    };
    serde_json::to_value(schema).unwrap_or_default()
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ShelfError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|e| ShelfError::InvalidRequest(format!("invalid arguments: {}", e)))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, ShelfError> {
    serde_json::to_value(value).map_err(|e| ShelfError::Internal(e.to_string()))
}

/// Builder for configuring the ShelfKit tool
#[derive(Debug, Clone, Default)]
pub struct ToolBuilder {
    config: Config,
    disabled: Vec<String>,
}

impl ToolBuilder {
    /// Create a new tool builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the storage root
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage_root = root.into();
        self
    }

    /// Set custom User-Agent
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    /// Hide a tool from listing and reject calls to it
    pub fn disable(mut self, name: impl Into<String>) -> Self {
        self.disabled.push(name.into());
        self
    }

    /// Build the tool
    pub fn build(self) -> Result<Tool, ShelfError> {
        Ok(Tool {
            pipeline: Pipeline::new(&self.config)?,
            library: Library::new(&self.config),
            catalog: OpenLibraryCatalog::new(&self.config)?,
            disabled: self.disabled,
        })
    }
}

/// Configured ShelfKit tool set
#[derive(Clone)]
pub struct Tool {
    pipeline: Pipeline,
    library: Library,
    catalog: OpenLibraryCatalog,
    disabled: Vec<String>,
}

impl Tool {
    /// Create a new tool builder
    pub fn builder() -> ToolBuilder {
        ToolBuilder::new()
    }

    /// Get tool description
    pub fn description(&self) -> &'static str {
        TOOL_DESCRIPTION
    }

    /// Get full documentation (llmtxt)
    pub fn llmtxt(&self) -> &'static str {
        TOOL_LLMTXT
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn catalog(&self) -> &OpenLibraryCatalog {
        &self.catalog
    }

    fn is_enabled(&self, name: &str) -> bool {
        TOOL_NAMES.iter().any(|n| *n == name) && !self.disabled.iter().any(|d| d == name)
    }

    /// Definitions of every enabled tool
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        TOOL_NAMES
            .iter()
            .copied()
            .filter(|name| self.is_enabled(name))
            .map(|name| ToolDefinition {
                name,
                description: describe(name),
                input_schema: input_schema(name),
            })
            .collect()
    }

    /// Execute a tool by name with JSON arguments
    pub async fn call(&self, name: &str, args: Value) -> Result<Value, ShelfError> {
        if !self.is_enabled(name) {
            return Err(ShelfError::InvalidRequest(format!("Unknown tool: {}", name)));
        }

        match name {
            "discover_books" => {
                let req: DiscoverRequest = parse_args(args)?;
                req.validate()?;
                let search = self
                    .pipeline
                    .discovery()
                    .search(req.query.trim(), req.sources.as_deref(), req.limit)
                    .await?;
                to_json(&search)
            }
            "fetch_and_parse" => {
                let req: FetchParseRequest = parse_args(args)?;
                to_json(&self.pipeline.fetch_and_parse(&req).await?)
            }
            "topic_summaries" => {
                let req: TopicRequest = parse_args(args)?;
                to_json(&self.pipeline.topic(&req).await?)
            }
            "list_books" => to_json(&self.library.list()?),
            "book_metadata" => {
                let req: PathRequest = parse_args(args)?;
                to_json(&self.library.metadata(&req.relative_path).await?)
            }
            "book_toc" => {
                let req: PathRequest = parse_args(args)?;
                to_json(&self.library.toc(&req.relative_path).await?)
            }
            "book_chapter" => {
                let req: ChapterRequest = parse_args(args)?;
                to_json(&self.library.chapter(&req.relative_path, &req.chapter).await?)
            }
            "search_catalog" => {
                let req: CatalogSearchRequest = parse_args(args)?;
                req.validate()?;
                to_json(
                    &self
                        .catalog
                        .search_books(&req.query, &req.keywords, req.limit)
                        .await?,
                )
            }
            "author_lookup" => {
                let req: AuthorRequest = parse_args(args)?;
                req.validate()?;
                let author = if req.by_book {
                    self.catalog.search_author_with_book_name(req.query.trim()).await?
                } else {
                    self.catalog.search_author(req.query.trim()).await?
                };
                to_json(&author)
            }
            other => Err(ShelfError::InvalidRequest(format!("Unknown tool: {}", other))),
        }
    }
}
