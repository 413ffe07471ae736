//! OpenLibrary search backend
//!
//! OpenLibrary itself only hosts metadata; downloadable files live on the
//! Internet Archive under the book's `ia` identifier.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{get_json, DiscoveryBackend};
use crate::client::catalog_client;
use crate::config::Config;
use crate::error::ShelfError;
use crate::types::{BookFormat, DiscoveryResult};

/// OpenLibrary search backend
pub struct OpenLibraryBackend {
    client: reqwest::Client,
    search_url: String,
    archive_base: String,
}

impl OpenLibraryBackend {
    /// Create a backend using the configured endpoints
    pub fn new(config: &Config) -> Result<Self, ShelfError> {
        Ok(Self {
            client: catalog_client(config)?,
            search_url: config.openlibrary_search_url.clone(),
            archive_base: config.archive_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn archive_links(&self, ia: &str) -> BTreeMap<BookFormat, String> {
        let mut links = BTreeMap::new();
        links.insert(
            BookFormat::Epub,
            format!("{}/{}/{}.epub", self.archive_base, ia, ia),
        );
        links.insert(
            BookFormat::Pdf,
            format!("{}/{}/{}.pdf", self.archive_base, ia, ia),
        );
        links
    }

    fn normalize(&self, doc: OpenLibraryDoc) -> DiscoveryResult {
        let download_urls = doc
            .ia
            .iter()
            .find(|ia| !ia.is_empty())
            .map(|ia| self.archive_links(ia))
            .unwrap_or_default();

        DiscoveryResult {
            title: doc.title.unwrap_or_default(),
            author: (!doc.author_name.is_empty()).then(|| doc.author_name.join(", ")),
            identifier: doc.key,
            source: "openlibrary".to_string(),
            year: doc.first_publish_year,
            description: doc.subtitle,
            download_urls,
        }
    }
}

/// OpenLibrary search response (partial)
#[derive(Debug, Deserialize)]
struct OpenLibrarySearch {
    #[serde(default)]
    docs: Vec<OpenLibraryDoc>,
}

#[derive(Debug, Deserialize)]
struct OpenLibraryDoc {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    author_name: Vec<String>,
    #[serde(default)]
    first_publish_year: Option<i32>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    ia: Vec<String>,
}

#[async_trait]
impl DiscoveryBackend for OpenLibraryBackend {
    fn name(&self) -> &'static str {
        "openlibrary"
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<DiscoveryResult>, ShelfError> {
        let params = [("q", query.to_string()), ("limit", limit.to_string())];
        let payload: OpenLibrarySearch =
            get_json(self.name(), &self.client, &self.search_url, &params).await?;

        Ok(payload
            .docs
            .into_iter()
            .take(limit)
            .map(|doc| self.normalize(doc))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_links() {
        let config = Config::default();
        let backend = OpenLibraryBackend::new(&config).unwrap();
        let payload = r#"{
            "numFound": 1,
            "docs": [{
                "title": "Mystery",
                "author_name": ["Detective"],
                "first_publish_year": 1920,
                "key": "/works/OL1W",
                "ia": ["Mystery123", "Mystery456"]
            }]
        }"#;
        let search: OpenLibrarySearch = serde_json::from_str(payload).unwrap();
        let result = backend.normalize(search.docs.into_iter().next().unwrap());

        assert_eq!(result.source, "openlibrary");
        assert_eq!(result.identifier.as_deref(), Some("/works/OL1W"));
        assert_eq!(result.year, Some(1920));
        assert_eq!(
            result.download_urls[&BookFormat::Epub],
            "https://archive.org/download/Mystery123/Mystery123.epub"
        );
        assert_eq!(
            result.download_urls[&BookFormat::Pdf],
            "https://archive.org/download/Mystery123/Mystery123.pdf"
        );
    }

    #[test]
    fn test_no_archive_id_means_no_links() {
        let backend = OpenLibraryBackend::new(&Config::default()).unwrap();
        let search: OpenLibrarySearch =
            serde_json::from_str(r#"{"docs": [{"title": "Metadata only"}]}"#).unwrap();
        let result = backend.normalize(search.docs.into_iter().next().unwrap());
        assert!(result.download_urls.is_empty());
        assert!(result.best_download().is_none());
    }
}
