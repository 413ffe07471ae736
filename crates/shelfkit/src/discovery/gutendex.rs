//! Gutendex (Project Gutenberg) backend

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{get_json, DiscoveryBackend};
use crate::client::catalog_client;
use crate::config::Config;
use crate::error::ShelfError;
use crate::types::{BookFormat, DiscoveryResult};

/// Gutendex search backend
///
/// Queries `{gutendex_url}?search=...&page=1` and maps each book's
/// `formats` media-type table to download URLs.
pub struct GutendexBackend {
    client: reqwest::Client,
    url: String,
}

impl GutendexBackend {
    /// Create a backend using the configured endpoint
    pub fn new(config: &Config) -> Result<Self, ShelfError> {
        Ok(Self {
            client: catalog_client(config)?,
            url: config.gutendex_url.clone(),
        })
    }
}

/// Gutendex list response (partial)
#[derive(Debug, Deserialize)]
struct GutendexPage {
    #[serde(default)]
    results: Vec<GutendexBook>,
}

#[derive(Debug, Deserialize)]
struct GutendexBook {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authors: Vec<GutendexPerson>,
    #[serde(default)]
    formats: BTreeMap<String, String>,
    #[serde(default)]
    copyright_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct GutendexPerson {
    #[serde(default)]
    name: Option<String>,
}

impl GutendexBook {
    fn into_result(self) -> DiscoveryResult {
        let authors: Vec<String> = self.authors.into_iter().filter_map(|a| a.name).collect();

        let mut download_urls = BTreeMap::new();
        for (media_type, url) in &self.formats {
            if url.is_empty() || url.ends_with(".gif") {
                continue;
            }
            if let Some(format) = BookFormat::from_media_type(media_type) {
                download_urls.entry(format).or_insert_with(|| url.clone());
            }
        }

        DiscoveryResult {
            title: self.title.unwrap_or_default(),
            author: (!authors.is_empty()).then(|| authors.join(", ")),
            identifier: Some(self.id.to_string()),
            source: "gutendex".to_string(),
            year: self.copyright_year,
            description: None,
            download_urls,
        }
    }
}

#[async_trait]
impl DiscoveryBackend for GutendexBackend {
    fn name(&self) -> &'static str {
        "gutendex"
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<DiscoveryResult>, ShelfError> {
        let params = [("search", query.to_string()), ("page", "1".to_string())];
        let page: GutendexPage = get_json(self.name(), &self.client, &self.url, &params).await?;

        Ok(page
            .results
            .into_iter()
            .take(limit)
            .map(GutendexBook::into_result)
            .collect())
    }
}
