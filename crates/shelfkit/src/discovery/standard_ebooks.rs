//! Standard Ebooks OPDS backend

use async_trait::async_trait;
use std::collections::BTreeMap;
use url::Url;

use super::{backend_error, get_body, DiscoveryBackend};
use crate::client::catalog_client;
use crate::config::Config;
use crate::error::ShelfError;
use crate::types::{BookFormat, DiscoveryResult};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Standard Ebooks backend reading the OPDS (Atom) search feed
pub struct StandardEbooksBackend {
    client: reqwest::Client,
    url: String,
}

impl StandardEbooksBackend {
    /// Create a backend using the configured OPDS endpoint
    pub fn new(config: &Config) -> Result<Self, ShelfError> {
        Ok(Self {
            client: catalog_client(config)?,
            url: config.standard_ebooks_url.clone(),
        })
    }
}

#[async_trait]
impl DiscoveryBackend for StandardEbooksBackend {
    fn name(&self) -> &'static str {
        "standard-ebooks"
    }

    fn matches(&self, source: &str) -> bool {
        matches!(source, "standard-ebooks" | "standard" | "standardebooks")
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<DiscoveryResult>, ShelfError> {
        let params = [("search", query.to_string())];
        let body = get_body(
            self.name(),
            &self.client,
            &self.url,
            &params,
            "application/atom+xml,application/xml",
        )
        .await?;

        parse_feed(&body, &self.url, limit).map_err(|e| backend_error(self.name(), e))
    }
}

fn atom_child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children().find(|c| c.has_tag_name((ATOM_NS, name)))
}

fn atom_text(node: roxmltree::Node, name: &str) -> Option<String> {
    atom_child(node, name)
        .and_then(|c| c.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Parse an OPDS acquisition feed into discovery results
///
/// Relative link targets are resolved against `feed_url`.
fn parse_feed(xml: &str, feed_url: &str, limit: usize) -> Result<Vec<DiscoveryResult>, String> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| format!("malformed OPDS feed: {}", e))?;
    let base = Url::parse(feed_url).ok();

    let entries = doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name((ATOM_NS, "entry")))
        .take(limit);

    let mut results = Vec::new();
    for entry in entries {
        let authors: Vec<String> = entry
            .children()
            .filter(|n| n.has_tag_name((ATOM_NS, "author")))
            .filter_map(|a| atom_text(a, "name"))
            .collect();

        let mut download_urls = BTreeMap::new();
        for link in entry.children().filter(|n| n.has_tag_name((ATOM_NS, "link"))) {
            let Some(href) = link.attribute("href").filter(|h| !h.is_empty()) else {
                continue;
            };
            let rel = link.attribute("rel").unwrap_or_default().to_lowercase();
            let mime_format = link.attribute("type").and_then(BookFormat::from_media_type);
            if !rel.contains("acquisition") && mime_format.is_none() {
                continue;
            }

            let absolute = match &base {
                Some(base) => base.join(href).map(String::from).unwrap_or_else(|_| href.to_string()),
                None => href.to_string(),
            };
            let format = match link.attribute("type") {
                Some(_) => mime_format,
                None => BookFormat::from_url(&absolute),
            };
            if let Some(format) = format {
                download_urls.entry(format).or_insert(absolute);
            }
        }

        results.push(DiscoveryResult {
            title: atom_text(entry, "title").unwrap_or_default(),
            author: (!authors.is_empty()).then(|| authors.join(", ")),
            identifier: atom_text(entry, "id"),
            source: "standard-ebooks".to_string(),
            year: None,
            description: atom_text(entry, "summary"),
            download_urls,
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
        <feed xmlns="http://www.w3.org/2005/Atom">
            <title>Search results</title>
            <entry>
                <id>urn:sample</id>
                <title>Fresh Title</title>
                <author><name>Creator</name></author>
                <summary>Clean EPUB</summary>
                <link rel="http://opds-spec.org/image" href="/cover.jpg" type="image/jpeg"/>
                <link rel="http://opds-spec.org/acquisition/open-access" href="/ebooks/fresh/downloads/fresh.epub" type="application/epub+zip"/>
                <link rel="http://opds-spec.org/acquisition/open-access" href="/ebooks/fresh/downloads/fresh.kepub.epub" type="application/kepub+zip"/>
                <link rel="http://opds-spec.org/acquisition/open-access" href="https://cdn.example.org/fresh.epub" type="application/epub+zip"/>
            </entry>
            <entry>
                <id>urn:second</id>
                <title>Second</title>
            </entry>
        </feed>"#;

    #[test]
    fn test_parse_feed() {
        let results = parse_feed(FEED, "https://standardebooks.org/opds", 10).unwrap();
        assert_eq!(results.len(), 2);

        let first = &results[0];
        assert_eq!(first.title, "Fresh Title");
        assert_eq!(first.author.as_deref(), Some("Creator"));
        assert_eq!(first.identifier.as_deref(), Some("urn:sample"));
        assert_eq!(first.description.as_deref(), Some("Clean EPUB"));
        assert_eq!(first.download_urls.len(), 1);
        assert_eq!(
            first.download_urls[&BookFormat::Epub],
            "https://standardebooks.org/ebooks/fresh/downloads/fresh.epub"
        );

        assert!(results[1].download_urls.is_empty());
    }

    #[test]
    fn test_parse_feed_limit() {
        let results = parse_feed(FEED, "https://standardebooks.org/opds", 1).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_malformed_feed() {
        assert!(parse_feed("<feed><entry>", "https://standardebooks.org/opds", 5).is_err());
    }

    #[test]
    fn test_source_aliases() {
        let backend = StandardEbooksBackend::new(&Config::default()).unwrap();
        assert!(backend.matches("standard"));
        assert!(backend.matches("standard-ebooks"));
        assert!(!backend.matches("gutendex"));
    }
}
