//! Download-and-summarize pipeline
//!
//! Design: the topic pipeline is one lazy [`Stream`] of [`TopicEvent`]s.
//! Candidates are fetched and parsed with bounded fan-out
//! (`buffer_unordered`); events are emitted in completion order and the
//! batched [`Pipeline::topic`] simply collects the stream. Dropping the
//! stream drops in-flight downloads, whose partial files clean themselves up.

use futures::stream::{self, BoxStream, Stream};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::convert::truncate_chars;
use crate::discovery::DiscoveryClient;
use crate::error::ShelfError;
use crate::fetcher::Fetcher;
use crate::parser::{reader_for, run_blocking};
use crate::types::{
    normalize_query, BookFormat, DiscoveryResult, FetchParseRequest, LocalBookFile,
    ParsedSummary, TopicEvent, TopicItem, TopicReport, TopicRequest,
};

/// A discovery result chosen for download, with its preferred URL
#[derive(Debug, Clone)]
struct Candidate {
    result: DiscoveryResult,
    url: String,
}

/// Composes discovery, fetching and parsing
#[derive(Clone)]
pub struct Pipeline {
    discovery: Arc<DiscoveryClient>,
    fetcher: Arc<Fetcher>,
    summary_char_limit: usize,
    concurrency: usize,
}

impl Pipeline {
    /// Pipeline over the default discovery backends
    pub fn new(config: &Config) -> Result<Self, ShelfError> {
        Self::with_discovery(config, DiscoveryClient::with_defaults(config)?)
    }

    /// Pipeline over a caller-assembled discovery client
    pub fn with_discovery(config: &Config, discovery: DiscoveryClient) -> Result<Self, ShelfError> {
        Ok(Self {
            discovery: Arc::new(discovery),
            fetcher: Arc::new(Fetcher::new(config)?),
            summary_char_limit: config.summary_char_limit,
            concurrency: config.concurrency.max(1),
        })
    }

    pub fn discovery(&self) -> &DiscoveryClient {
        &self.discovery
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Download one URL and summarize its leading chapters or pages
    pub async fn fetch_and_parse(
        &self,
        request: &FetchParseRequest,
    ) -> Result<ParsedSummary, ShelfError> {
        request.validate()?;
        let local = self.fetcher.fetch(&request.url).await?;
        self.summarize(local, request.limit_pages, request.limit_chapters)
            .await
    }

    /// Run the topic pipeline and collect every event into a report
    pub async fn topic(&self, request: &TopicRequest) -> Result<TopicReport, ShelfError> {
        let mut events = self.topic_stream(request).await?;
        let mut report = TopicReport {
            query: normalize_query(&request.query),
            ..Default::default()
        };

        while let Some(event) = events.next().await {
            match event {
                TopicEvent::Started {
                    failed_backends, ..
                } => report.failed_backends = failed_backends,
                TopicEvent::Item { item, .. } => report.items.push(item),
                TopicEvent::Skipped { .. } => {}
                TopicEvent::Completed { skipped, .. } => report.skipped = skipped,
            }
        }
        Ok(report)
    }

    /// Run discovery, then return a stream of per-candidate events
    ///
    /// Request validation and discovery errors are returned directly;
    /// per-candidate failures become [`TopicEvent::Skipped`].
    pub async fn topic_stream(
        &self,
        request: &TopicRequest,
    ) -> Result<BoxStream<'static, TopicEvent>, ShelfError> {
        request.validate()?;
        let query = normalize_query(&request.query);
        let search = self
            .discovery
            .search(&query, request.sources.as_deref(), request.limit)
            .await?;

        let candidates =
            select_candidates(search.results, request.download_limit.min(request.limit));
        info!(query = %query, candidates = candidates.len(), "Starting topic pipeline");

        let started = TopicEvent::Started {
            query,
            candidates: candidates.len(),
            failed_backends: search.failures,
        };

        let pipeline = self.clone();
        let (limit_pages, limit_chapters) = (request.limit_pages, request.limit_chapters);
        let work = stream::iter(candidates)
            .map(move |candidate| {
                let pipeline = pipeline.clone();
                async move {
                    let url = candidate.url.clone();
                    let outcome = pipeline
                        .process_candidate(candidate, limit_pages, limit_chapters)
                        .await;
                    (url, outcome)
                }
            })
            .buffer_unordered(self.concurrency)
            .boxed();

        Ok(stream::once(async move { started })
            .chain(progress_events(work))
            .boxed())
    }

    async fn process_candidate(
        &self,
        candidate: Candidate,
        limit_pages: usize,
        limit_chapters: usize,
    ) -> Result<TopicItem, ShelfError> {
        let title = candidate.result.title.trim();
        let title = (!title.is_empty()).then_some(title);
        let local = self.fetcher.fetch_titled(&candidate.url, title).await?;
        let summary = self.summarize(local, limit_pages, limit_chapters).await?;

        Ok(TopicItem {
            title: candidate.result.title,
            author: candidate.result.author,
            source: candidate.result.source,
            identifier: candidate.result.identifier,
            url: candidate.url,
            summary,
        })
    }

    /// Extract the leading units of a stored file and bound the summary
    async fn summarize(
        &self,
        local: LocalBookFile,
        limit_pages: usize,
        limit_chapters: usize,
    ) -> Result<ParsedSummary, ShelfError> {
        let units = match local.format {
            BookFormat::Epub => limit_chapters,
            BookFormat::Pdf => limit_pages,
            BookFormat::Text => 1,
        };
        let path = self.fetcher.storage_root().join(&local.relative_path);
        let reader = reader_for(local.format);
        let texts = run_blocking(move || reader.leading_units(&path, units)).await?;

        Ok(ParsedSummary {
            summary: truncate_chars(&texts.join("\n\n"), self.summary_char_limit),
            relative_path: local.relative_path,
            format: local.format,
            size_bytes: local.size_bytes,
        })
    }
}

/// Distinct preferred download URLs, at most `cap`
fn select_candidates(results: Vec<DiscoveryResult>, cap: usize) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter_map(|result| {
            let url = result.best_download()?.1.to_string();
            seen.insert(url.clone())
                .then_some(Candidate { result, url })
        })
        .take(cap)
        .collect()
}

struct Progress {
    work: BoxStream<'static, (String, Result<TopicItem, ShelfError>)>,
    count: usize,
    skipped: usize,
    finished: bool,
}

/// Turn per-candidate outcomes into item/skipped events followed by `completed`
fn progress_events(
    work: BoxStream<'static, (String, Result<TopicItem, ShelfError>)>,
) -> impl Stream<Item = TopicEvent> + Send {
    let state = Progress {
        work,
        count: 0,
        skipped: 0,
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        let event = match state.work.next().await {
            Some((_, Ok(item))) => {
                let index = state.count;
                state.count += 1;
                TopicEvent::Item { index, item }
            }
            Some((url, Err(error))) => {
                warn!(url = %url, error = %error, "Skipping topic candidate");
                state.skipped += 1;
                TopicEvent::Skipped {
                    url,
                    error: error.to_string(),
                }
            }
            None => {
                state.finished = true;
                TopicEvent::Completed {
                    count: state.count,
                    skipped: state.skipped,
                }
            }
        };
        Some((event, state))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(title: &str, urls: &[(BookFormat, &str)]) -> DiscoveryResult {
        DiscoveryResult {
            title: title.to_string(),
            source: "gutendex".to_string(),
            download_urls: urls.iter().map(|(f, u)| (*f, u.to_string())).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_select_candidates() {
        let results = vec![
            result("No links", &[]),
            result(
                "Both",
                &[
                    (BookFormat::Pdf, "https://x.org/1.pdf"),
                    (BookFormat::Epub, "https://x.org/1.epub"),
                ],
            ),
            result("Duplicate", &[(BookFormat::Epub, "https://x.org/1.epub")]),
            result("Text", &[(BookFormat::Text, "https://x.org/2.txt")]),
            result("Later", &[(BookFormat::Pdf, "https://x.org/3.pdf")]),
        ];

        let candidates = select_candidates(results, 2);
        let urls: Vec<_> = candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.org/1.epub", "https://x.org/2.txt"]);
        assert_eq!(candidates[0].result.title, "Both");
    }

    #[tokio::test]
    async fn test_progress_events() {
        let outcomes: Vec<(String, Result<TopicItem, ShelfError>)> = vec![
            (
                "https://x.org/bad".to_string(),
                Err(ShelfError::UnsupportedFormat("image/png".into())),
            ),
            (
                "https://x.org/good".to_string(),
                Ok(TopicItem {
                    title: "Good".into(),
                    author: None,
                    source: "gutendex".into(),
                    identifier: None,
                    url: "https://x.org/good".into(),
                    summary: ParsedSummary {
                        relative_path: "downloaded/x_good.txt".into(),
                        format: BookFormat::Text,
                        size_bytes: 4,
                        summary: "good".into(),
                    },
                }),
            ),
        ];

        let events: Vec<TopicEvent> = progress_events(stream::iter(outcomes).boxed())
            .collect()
            .await;
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], TopicEvent::Skipped { url, .. } if url == "https://x.org/bad"));
        assert!(matches!(&events[1], TopicEvent::Item { index: 0, .. }));
        assert_eq!(
            events[2],
            TopicEvent::Completed {
                count: 1,
                skipped: 1
            }
        );
    }
}
