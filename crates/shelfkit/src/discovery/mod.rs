//! Discovery backends for public-domain book catalogs
//!
//! Design: each backend knows one catalog's query format and schema and
//! normalizes its records into [`DiscoveryResult`]. [`DiscoveryClient`]
//! queries the selected backends concurrently, collects one tagged
//! [`BackendOutcome`] per backend, then merges the successes round-robin.

mod gutendex;
mod openlibrary;
mod standard_ebooks;

pub use gutendex::GutendexBackend;
pub use openlibrary::OpenLibraryBackend;
pub use standard_ebooks::StandardEbooksBackend;

use async_trait::async_trait;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ShelfError;
use crate::types::{BackendFailure, DiscoveryResult, DiscoverySearch};

/// Trait for catalog backends
///
/// Implement this trait to add a catalog. `search` performs a single
/// attempt; the client decides what a failure means for the aggregate call.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Identifier used in `sources` lists and in logs
    fn name(&self) -> &'static str;

    /// Returns true if this backend answers to the given source identifier
    fn matches(&self, source: &str) -> bool {
        source == self.name()
    }

    /// Query the catalog and return at most `limit` normalized records
    async fn search(&self, query: &str, limit: usize)
        -> Result<Vec<DiscoveryResult>, ShelfError>;
}

/// Result of querying one backend
#[derive(Debug)]
pub enum BackendOutcome {
    Ok {
        backend: &'static str,
        results: Vec<DiscoveryResult>,
    },
    Failed {
        backend: &'static str,
        error: ShelfError,
    },
}

/// Registry of discovery backends
///
/// Backends are queried in registration order, which is also the order
/// used by the round-robin merge.
pub struct DiscoveryClient {
    backends: Vec<Box<dyn DiscoveryBackend>>,
}

impl Default for DiscoveryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryClient {
    /// Create an empty client
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Create a client with Gutendex, OpenLibrary and Standard Ebooks registered
    pub fn with_defaults(config: &Config) -> Result<Self, ShelfError> {
        let mut client = Self::new();
        client.register(Box::new(GutendexBackend::new(config)?));
        client.register(Box::new(OpenLibraryBackend::new(config)?));
        client.register(Box::new(StandardEbooksBackend::new(config)?));
        Ok(client)
    }

    /// Register a backend
    pub fn register(&mut self, backend: Box<dyn DiscoveryBackend>) {
        self.backends.push(backend);
    }

    /// Names of the registered backends, in query order
    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Resolve requested source identifiers to registered backends
    fn select(&self, sources: Option<&[String]>) -> Result<Vec<&dyn DiscoveryBackend>, ShelfError> {
        let requested: Vec<String> = sources
            .unwrap_or_default()
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        if requested.is_empty() {
            return Ok(self.backends.iter().map(|b| b.as_ref()).collect());
        }

        let mut selected: Vec<&dyn DiscoveryBackend> = Vec::new();
        for source in &requested {
            let backend = self
                .backends
                .iter()
                .find(|b| b.matches(source))
                .ok_or_else(|| ShelfError::InvalidRequest(format!("Unknown source: {}", source)))?;
            if !selected.iter().any(|s| s.name() == backend.name()) {
                selected.push(backend.as_ref());
            }
        }
        Ok(selected)
    }

    /// Query each backend once and collect tagged outcomes
    pub async fn query_all(
        &self,
        query: &str,
        sources: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<BackendOutcome>, ShelfError> {
        let selected = self.select(sources)?;
        let calls = selected.into_iter().map(|backend| async move {
            debug!(backend = backend.name(), query, limit, "Querying discovery backend");
            match backend.search(query, limit).await {
                Ok(results) => BackendOutcome::Ok {
                    backend: backend.name(),
                    results,
                },
                Err(error) => BackendOutcome::Failed {
                    backend: backend.name(),
                    error,
                },
            }
        });
        Ok(join_all(calls).await)
    }

    /// Search the selected backends and merge their results
    ///
    /// A failing backend is skipped and logged. The call fails with
    /// [`ShelfError::AllBackendsFailed`] only when every backend failed.
    pub async fn search(
        &self,
        query: &str,
        sources: Option<&[String]>,
        limit: usize,
    ) -> Result<DiscoverySearch, ShelfError> {
        let outcomes = self.query_all(query, sources, limit).await?;

        let mut batches = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                BackendOutcome::Ok { results, .. } => batches.push(results),
                BackendOutcome::Failed { backend, error } => {
                    warn!(backend, error = %error, "Discovery source failed");
                    failures.push(BackendFailure {
                        backend: backend.to_string(),
                        message: error.to_string(),
                    });
                }
            }
        }

        if batches.is_empty() && !failures.is_empty() {
            return Err(ShelfError::AllBackendsFailed(
                failures
                    .iter()
                    .map(|f| format!("{}: {}", f.backend, f.message))
                    .collect(),
            ));
        }

        Ok(DiscoverySearch {
            query: query.to_string(),
            results: merge_round_robin(batches, limit),
            failures,
        })
    }
}

/// Interleave batches: first record of each batch, then second of each, ...
pub fn merge_round_robin(
    batches: Vec<Vec<DiscoveryResult>>,
    limit: usize,
) -> Vec<DiscoveryResult> {
    let mut iters: Vec<_> = batches.into_iter().map(|b| b.into_iter()).collect();
    let mut merged = Vec::new();

    'outer: loop {
        let mut progressed = false;
        for iter in iters.iter_mut() {
            if merged.len() >= limit {
                break 'outer;
            }
            if let Some(result) = iter.next() {
                merged.push(result);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    merged
}

fn backend_error(backend: &str, message: impl ToString) -> ShelfError {
    ShelfError::DiscoveryBackendError {
        backend: backend.to_string(),
        message: message.to_string(),
    }
}

/// GET a URL and return the body after checking for a 2xx status
async fn get_body(
    backend: &str,
    client: &reqwest::Client,
    url: &str,
    params: &[(&str, String)],
    accept: &'static str,
) -> Result<String, ShelfError> {
    let url = url::Url::parse_with_params(url, params)
        .map_err(|e| backend_error(backend, format!("invalid endpoint {}: {}", url, e)))?;
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, accept)
        .send()
        .await
        .map_err(|e| backend_error(backend, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(backend_error(backend, format!("HTTP {}", status.as_u16())));
    }

    response.text().await.map_err(|e| backend_error(backend, e))
}

/// GET a URL and decode its JSON body
pub(crate) async fn get_json<T: DeserializeOwned>(
    backend: &str,
    client: &reqwest::Client,
    url: &str,
    params: &[(&str, String)],
) -> Result<T, ShelfError> {
    let body = get_body(backend, client, url, params, "application/json").await?;
    serde_json::from_str(&body)
        .map_err(|e| backend_error(backend, format!("malformed payload: {}", e)))
}
