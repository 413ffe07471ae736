//! OpenLibrary catalog lookups
//!
//! Metadata-only queries against the OpenLibrary API: keyword-aware book
//! search and author lookup with works. Unlike the discovery backends these
//! return OpenLibrary's own record shapes and never produce download links.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::client::catalog_client;
use crate::config::Config;
use crate::discovery::get_json;
use crate::error::ShelfError;

const BACKEND: &str = "openlibrary";

/// Maximum works attached to an author record
const MAX_AUTHOR_WORKS: usize = 10;

/// One book returned by the OpenLibrary search API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookDetails {
    #[serde(default, deserialize_with = "trimmed")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "first_of")]
    pub author_name: Option<String>,
    #[serde(default, deserialize_with = "first_of")]
    pub author_key: Option<String>,
    #[serde(default)]
    pub edition_count: Option<u32>,
    #[serde(default)]
    pub first_publish_year: Option<i32>,
    #[serde(default, deserialize_with = "first_of")]
    pub language: Option<String>,
}

/// OpenLibrary book search response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookSearch {
    #[serde(default, rename(deserialize = "numFound"))]
    pub num_found: u64,
    /// Query actually sent after keyword normalization
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub docs: Vec<BookDetails>,
}

/// A work attributed to an author
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorWork {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
}

/// Author record with up to ten works
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorDetails {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub alternate_names: Vec<String>,
    #[serde(default, deserialize_with = "text_or_value")]
    pub bio: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub death_date: Option<String>,
    #[serde(default)]
    pub fuller_name: Option<String>,
    #[serde(default)]
    pub top_subjects: Vec<String>,
    #[serde(default)]
    pub works: Vec<AuthorWork>,
}

#[derive(Debug, Deserialize)]
struct AuthorSearch {
    #[serde(default)]
    docs: Vec<AuthorDetails>,
}

#[derive(Debug, Deserialize)]
struct WorksPage {
    #[serde(default)]
    entries: Vec<AuthorWork>,
}

/// Accept either a string or a list of strings, keeping the first
fn first_of<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(s)) => Some(s),
        Some(OneOrMany::Many(v)) => v.into_iter().next(),
        None => None,
    })
}

fn trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.map(|s| s.trim().to_string()))
}

/// OpenLibrary text fields are either plain strings or `{"type", "value"}` objects
fn text_or_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        Plain(String),
        Typed { value: String },
    }
    Ok(Option::<Text>::deserialize(deserializer)?.map(|t| match t {
        Text::Plain(s) => s,
        Text::Typed { value } => value,
    }))
}

/// Build the search string from a query plus optional keywords
///
/// Tokens are lowercased, a few shorthand words are expanded, and
/// duplicates are dropped while keeping first-seen order.
pub fn build_query(query: &str, keywords: &[String]) -> String {
    let mut tokens: Vec<&str> = Vec::new();
    if !query.trim().is_empty() {
        tokens.push(query.trim());
    }
    tokens.extend(keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()));

    let mut seen = HashSet::new();
    let mut normalized = Vec::new();
    for token in tokens {
        let lower = token.to_lowercase();
        let token = match lower.as_str() {
            "intro" => "introduction".to_string(),
            "updated" => "latest".to_string(),
            _ => lower,
        };
        if seen.insert(token.clone()) {
            normalized.push(token);
        }
    }
    normalized.join(" ")
}

/// Client for the OpenLibrary metadata API
#[derive(Debug, Clone)]
pub struct OpenLibraryCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl OpenLibraryCatalog {
    /// Create a catalog client using the configured API base
    pub fn new(config: &Config) -> Result<Self, ShelfError> {
        Ok(Self {
            client: catalog_client(config)?,
            base_url: config.openlibrary_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ShelfError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Calling OpenLibrary API");
        get_json(BACKEND, &self.client, &url, params).await
    }

    /// Search books by query and optional keywords
    pub async fn search_books(
        &self,
        query: &str,
        keywords: &[String],
        limit: usize,
    ) -> Result<BookSearch, ShelfError> {
        let refined = build_query(query, keywords);
        let params = [
            ("q", refined.clone()),
            ("format", "json".to_string()),
            ("limit", limit.to_string()),
        ];
        let mut search: BookSearch = self.get_json("/search.json", &params).await?;
        if search.q.is_empty() {
            search.q = refined;
        }
        search.docs.truncate(limit);
        Ok(search)
    }

    /// Look up the best-matching author and attach their works
    pub async fn search_author(&self, query: &str) -> Result<AuthorDetails, ShelfError> {
        let search: AuthorSearch = self
            .get_json("/search/authors.json", &[("q", query.to_string())])
            .await?;
        let mut author = search.docs.into_iter().next().ok_or_else(|| {
            ShelfError::DiscoveryBackendError {
                backend: BACKEND.to_string(),
                message: format!("Author not found: {}", query),
            }
        })?;

        if let Some(key) = author.key.clone() {
            author.works = self.author_works(&key).await?;
        }
        Ok(author)
    }

    /// Find the author of the best-matching book and return their record
    pub async fn search_author_with_book_name(
        &self,
        query: &str,
    ) -> Result<AuthorDetails, ShelfError> {
        let books = self.search_books(query, &[], 1).await?;
        let author_key = books
            .docs
            .into_iter()
            .next()
            .and_then(|book| book.author_key)
            .ok_or_else(|| ShelfError::DiscoveryBackendError {
                backend: BACKEND.to_string(),
                message: format!("No books found for query: {}", query),
            })?;

        let author_id = author_key.trim_start_matches("/authors/").to_string();
        let mut author: AuthorDetails = self
            .get_json(&format!("/authors/{}.json", author_id), &[])
            .await?;
        author.works = self.author_works(&author_id).await?;
        Ok(author)
    }

    /// First works listed for an author id (`OL23919A` or `/authors/OL23919A`)
    pub async fn author_works(&self, author_id: &str) -> Result<Vec<AuthorWork>, ShelfError> {
        let id = author_id.trim_start_matches("/authors/");
        let page: WorksPage = self
            .get_json(&format!("/authors/{}/works.json", id), &[])
            .await?;
        Ok(page.entries.into_iter().take(MAX_AUTHOR_WORKS).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query() {
        let keywords = vec!["Intro".to_string(), " ".to_string(), "python".to_string()];
        assert_eq!(build_query("Python", &keywords), "python introduction");
        assert_eq!(build_query("  ", &["updated".to_string()]), "latest");
        assert_eq!(build_query("Rust", &[]), "rust");
    }

    #[test]
    fn test_book_details_normalization() {
        let doc: BookDetails = serde_json::from_str(
            r#"{
                "title": "  Dune ",
                "author_name": ["Frank Herbert", "Other"],
                "author_key": ["OL79034A"],
                "language": ["eng", "fre"],
                "edition_count": 120
            }"#,
        )
        .unwrap();
        assert_eq!(doc.title.as_deref(), Some("Dune"));
        assert_eq!(doc.author_name.as_deref(), Some("Frank Herbert"));
        assert_eq!(doc.author_key.as_deref(), Some("OL79034A"));
        assert_eq!(doc.language.as_deref(), Some("eng"));
        assert_eq!(doc.edition_count, Some(120));
    }

    #[test]
    fn test_author_bio_shapes() {
        let plain: AuthorDetails = serde_json::from_str(r#"{"name": "A", "bio": "Plain"}"#).unwrap();
        assert_eq!(plain.bio.as_deref(), Some("Plain"));

        let typed: AuthorDetails = serde_json::from_str(
            r#"{"name": "B", "bio": {"type": "/type/text", "value": "Typed"}}"#,
        )
        .unwrap();
        assert_eq!(typed.bio.as_deref(), Some("Typed"));
    }

    #[test]
    fn test_num_found_both_spellings() {
        // search.json repeats the count under both keys
        let search: BookSearch = serde_json::from_str(
            r#"{"numFound": 42, "numFoundExact": true, "num_found": 42, "q": "dune", "docs": [{"title": "Dune"}]}"#,
        )
        .unwrap();
        assert_eq!(search.num_found, 42);
        assert_eq!(search.q, "dune");
        assert_eq!(search.docs.len(), 1);

        let json = serde_json::to_value(&search).unwrap();
        assert_eq!(json["num_found"], 42);
    }
}
