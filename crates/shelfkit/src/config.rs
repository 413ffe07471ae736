//! Runtime configuration
//!
//! Components receive a [`Config`] in their constructors. Only binaries call
//! [`Config::from_env`]; the library never reads process state on its own.

use std::path::PathBuf;
use std::time::Duration;

use crate::DEFAULT_USER_AGENT;

/// Default Gutendex search endpoint
pub const DEFAULT_GUTENDEX_URL: &str = "https://gutendex.com/books/";
/// Default OpenLibrary search endpoint
pub const DEFAULT_OPENLIBRARY_SEARCH_URL: &str = "https://openlibrary.org/search.json";
/// Default OpenLibrary API base
pub const DEFAULT_OPENLIBRARY_BASE_URL: &str = "https://openlibrary.org";
/// Default Internet Archive download base
pub const DEFAULT_ARCHIVE_BASE_URL: &str = "https://archive.org/download";
/// Default Standard Ebooks OPDS endpoint
pub const DEFAULT_STANDARD_EBOOKS_URL: &str = "https://standardebooks.org/opds";

/// Shared configuration for discovery, fetching and the pipeline
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for downloaded books
    pub storage_root: PathBuf,
    pub gutendex_url: String,
    pub openlibrary_search_url: String,
    pub openlibrary_base_url: String,
    pub archive_base_url: String,
    pub standard_ebooks_url: String,
    /// User-Agent sent with every request
    pub user_agent: String,
    /// Connect timeout for every outbound call
    pub connect_timeout: Duration,
    /// Total timeout for catalog API calls
    pub request_timeout: Duration,
    /// Total timeout for a single book download
    pub download_timeout: Duration,
    /// Downloads larger than this are rejected
    pub max_download_bytes: u64,
    /// Upper bound on the `summary` field, in characters
    pub summary_char_limit: usize,
    /// Maximum concurrent fetch+parse jobs in the topic pipeline
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("ebooks"),
            gutendex_url: DEFAULT_GUTENDEX_URL.to_string(),
            openlibrary_search_url: DEFAULT_OPENLIBRARY_SEARCH_URL.to_string(),
            openlibrary_base_url: DEFAULT_OPENLIBRARY_BASE_URL.to_string(),
            archive_base_url: DEFAULT_ARCHIVE_BASE_URL.to_string(),
            standard_ebooks_url: DEFAULT_STANDARD_EBOOKS_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(60),
            max_download_bytes: 200 * 1024 * 1024,
            summary_char_limit: 4096,
            concurrency: 3,
        }
    }
}

impl Config {
    /// Build a configuration from environment variables, falling back to defaults
    ///
    /// Recognized variables: `EBOOK_ROOT_PATH`, `GUTENDEX_BASE_URL`,
    /// `OPENLIBRARY_SEARCH_URL`, `OPENLIBRARY_BASE_URL`, `OPENARCHIVE_BASE_URL`,
    /// `STANDARD_EBOOKS_OPDS_URL`, `SHELFKIT_USER_AGENT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(root) = var("EBOOK_ROOT_PATH") {
            config.storage_root = PathBuf::from(root);
        }
        if let Some(url) = var("GUTENDEX_BASE_URL") {
            config.gutendex_url = url;
        }
        if let Some(url) = var("OPENLIBRARY_SEARCH_URL") {
            config.openlibrary_search_url = url;
        }
        if let Some(url) = var("OPENLIBRARY_BASE_URL") {
            config.openlibrary_base_url = url;
        }
        if let Some(url) = var("OPENARCHIVE_BASE_URL") {
            config.archive_base_url = url;
        }
        if let Some(url) = var("STANDARD_EBOOKS_OPDS_URL") {
            config.standard_ebooks_url = url;
        }
        if let Some(ua) = var("SHELFKIT_USER_AGENT") {
            config.user_agent = ua;
        }
        config
    }

    /// Set the storage root
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    /// Point every catalog backend at one base URL (used by tests and mirrors)
    ///
    /// Paths follow the public services: `/books/`, `/search.json`,
    /// `/download`, `/opds`.
    pub fn with_catalog_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.gutendex_url = format!("{}/books/", base);
        self.openlibrary_search_url = format!("{}/search.json", base);
        self.openlibrary_base_url = base.to_string();
        self.archive_base_url = format!("{}/download", base);
        self.standard_ebooks_url = format!("{}/opds", base);
        self
    }

    /// Set the User-Agent
    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    /// Set the summary character bound
    pub fn with_summary_char_limit(mut self, limit: usize) -> Self {
        self.summary_char_limit = limit;
        self
    }

    /// Set the topic pipeline fan-out (minimum 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the download size cap
    pub fn with_max_download_bytes(mut self, bytes: u64) -> Self {
        self.max_download_bytes = bytes;
        self
    }

    /// Set the per-download timeout
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage_root, PathBuf::from("ebooks"));
        assert_eq!(config.gutendex_url, DEFAULT_GUTENDEX_URL);
        assert_eq!(config.summary_char_limit, 4096);
        assert_eq!(config.concurrency, 3);
        assert!(config.request_timeout <= Duration::from_secs(30));
    }

    #[test]
    fn test_catalog_base() {
        let config = Config::default().with_catalog_base("http://127.0.0.1:9000/");
        assert_eq!(config.gutendex_url, "http://127.0.0.1:9000/books/");
        assert_eq!(config.openlibrary_search_url, "http://127.0.0.1:9000/search.json");
        assert_eq!(config.openlibrary_base_url, "http://127.0.0.1:9000");
        assert_eq!(config.archive_base_url, "http://127.0.0.1:9000/download");
        assert_eq!(config.standard_ebooks_url, "http://127.0.0.1:9000/opds");
    }

    #[test]
    fn test_concurrency_floor() {
        assert_eq!(Config::default().with_concurrency(0).concurrency, 1);
    }
}
