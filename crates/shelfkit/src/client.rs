//! HTTP client construction shared by discovery backends and the fetcher
//!
//! Every outbound call goes through a client built here so that the
//! User-Agent and the fixed timeouts from [`Config`] always apply.

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::error::ShelfError;
use crate::DEFAULT_USER_AGENT;

/// Build a client with the configured User-Agent and the given total timeout
pub fn build_client(config: &Config, timeout: Duration) -> Result<reqwest::Client, ShelfError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&config.user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT)),
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(config.connect_timeout)
        .timeout(timeout)
        .build()
        .map_err(ShelfError::ClientBuildError)
}

/// Client for catalog API calls
pub fn catalog_client(config: &Config) -> Result<reqwest::Client, ShelfError> {
    build_client(config, config.request_timeout)
}

/// Client for book downloads
pub fn download_client(config: &Config) -> Result<reqwest::Client, ShelfError> {
    build_client(config, config.download_timeout)
}

/// Validate that a URL is present and uses http(s)
pub fn parse_http_url(url: &str) -> Result<Url, ShelfError> {
    if url.is_empty() {
        return Err(ShelfError::MissingUrl);
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ShelfError::InvalidUrlScheme);
    }
    Url::parse(url).map_err(|_| ShelfError::InvalidUrlScheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_http_url() {
        assert!(matches!(parse_http_url(""), Err(ShelfError::MissingUrl)));
        assert!(matches!(
            parse_http_url("ftp://example.com/book.epub"),
            Err(ShelfError::InvalidUrlScheme)
        ));
        let url = parse_http_url("https://example.org/book.epub3.images").unwrap();
        assert_eq!(url.host_str(), Some("example.org"));
    }

    #[test]
    fn test_build_client() {
        let config = Config::default().with_user_agent("ShelfKit-Test/1.0");
        assert!(catalog_client(&config).is_ok());
        assert!(download_client(&config).is_ok());
    }
}
