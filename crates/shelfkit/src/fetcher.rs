//! Book downloads into the storage root
//!
//! Files land at `downloaded/{hash}_{slug}.{ext}` where `hash` is the first
//! 16 hex digits of the SHA-256 of the URL. Bodies are streamed into a
//! hidden `.part` file private to that download and renamed into place only after the whole body was
//! written and its format identified.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::client::{download_client, parse_http_url};
use crate::config::Config;
use crate::error::ShelfError;
use crate::types::{BookFormat, LocalBookFile};

/// Subdirectory of the storage root that receives downloads
pub const DOWNLOAD_DIR: &str = "downloaded";

const MAX_SLUG_CHARS: usize = 60;
const SNIFF_BYTES: usize = 8;

static PART_SEQ: AtomicU64 = AtomicU64::new(0);

/// Downloads remote books into the storage root
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    storage_root: PathBuf,
    max_bytes: u64,
}

/// Temporary download file, removed on drop unless persisted
struct PartFile {
    path: PathBuf,
    armed: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Part file private to one download of `hash`
    fn for_download(dir: &Path, hash: &str) -> Self {
        let seq = PART_SEQ.fetch_add(1, Ordering::Relaxed);
        Self::new(dir.join(format!(".{}.{}-{}.part", hash, std::process::id(), seq)))
    }

    /// Move into `target`; a target completed by a concurrent download is kept
    async fn persist(mut self, target: &Path) -> Result<(), ShelfError> {
        if is_complete(target).await {
            debug!(path = %target.display(), "Target already written; discarding duplicate download");
            return Ok(());
        }
        if let Err(e) = tokio::fs::rename(&self.path, target).await {
            if is_complete(target).await {
                return Ok(());
            }
            return Err(ShelfError::storage(
                format!("failed to move {}", target.display()),
                e,
            ));
        }
        self.armed = false;
        Ok(())
    }
}

async fn is_complete(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.armed {
            debug!(path = %self.path.display(), "Removing partial download");
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl Fetcher {
    /// Create a fetcher writing under `config.storage_root`
    pub fn new(config: &Config) -> Result<Self, ShelfError> {
        Ok(Self {
            client: download_client(config)?,
            storage_root: config.storage_root.clone(),
            max_bytes: config.max_download_bytes,
        })
    }

    /// Root directory this fetcher writes into
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Download `url`, naming the file after the URL's last path segment
    pub async fn fetch(&self, url: &str) -> Result<LocalBookFile, ShelfError> {
        self.fetch_titled(url, None).await
    }

    /// Download `url`, naming the file after `title` when given
    pub async fn fetch_titled(
        &self,
        url: &str,
        title: Option<&str>,
    ) -> Result<LocalBookFile, ShelfError> {
        let parsed = parse_http_url(url)?;
        let hash = url_hash(url);
        let slug = sanitize_slug(title.unwrap_or_else(|| url_stem(&parsed)));

        let dir = self.storage_root.join(DOWNLOAD_DIR);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ShelfError::storage(format!("failed to create {}", dir.display()), e))?;

        if let Some(existing) = find_existing(&dir, &hash).await? {
            debug!(url, path = %existing.relative_path, "Reusing existing download");
            return Ok(existing);
        }

        debug!(url, "Downloading book");
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| ShelfError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ShelfError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(self.too_large(url));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let part = PartFile::for_download(&dir, &hash);
        let (size_bytes, head) = self.stream_to_part(url, response, &part.path).await?;

        // Another request for the same URL may have finished first
        if let Some(existing) = find_existing(&dir, &hash).await? {
            debug!(url, path = %existing.relative_path, "Reusing concurrent download");
            return Ok(existing);
        }

        let format = detect_format(content_type.as_deref(), url, &head).ok_or_else(|| {
            ShelfError::UnsupportedFormat(
                content_type
                    .clone()
                    .unwrap_or_else(|| "unknown content type".to_string()),
            )
        })?;

        let file_name = format!("{}_{}.{}", hash, slug, format.extension());
        part.persist(&dir.join(&file_name)).await?;

        let relative_path = format!("{}/{}", DOWNLOAD_DIR, file_name);
        info!(url, path = %relative_path, size_bytes, format = %format, "Downloaded book");
        Ok(LocalBookFile {
            relative_path,
            format,
            size_bytes,
        })
    }

    /// Stream the body into `path`, returning bytes written and the leading bytes
    async fn stream_to_part(
        &self,
        url: &str,
        response: reqwest::Response,
        path: &Path,
    ) -> Result<(u64, Bytes), ShelfError> {
        let file = File::create(path)
            .await
            .map_err(|e| ShelfError::storage(format!("failed to create {}", path.display()), e))?;
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        let mut head = BytesMut::with_capacity(SNIFF_BYTES);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ShelfError::from_reqwest(url, e))?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(self.too_large(url));
            }
            if head.len() < SNIFF_BYTES {
                let take = (SNIFF_BYTES - head.len()).min(chunk.len());
                head.extend_from_slice(&chunk[..take]);
            }
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| ShelfError::storage(format!("failed to write {}", path.display()), e))?;
        }

        writer
            .flush()
            .await
            .map_err(|e| ShelfError::storage(format!("failed to write {}", path.display()), e))?;

        Ok((written, head.freeze()))
    }

    fn too_large(&self, url: &str) -> ShelfError {
        ShelfError::DownloadFailed {
            url: url.to_string(),
            reason: format!("response exceeds {} bytes", self.max_bytes),
        }
    }
}

/// Look for a completed download whose name starts with `{hash}_`
async fn find_existing(dir: &Path, hash: &str) -> Result<Option<LocalBookFile>, ShelfError> {
    let prefix = format!("{}_", hash);
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ShelfError::storage(format!("failed to read {}", dir.display()), e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ShelfError::storage(format!("failed to read {}", dir.display()), e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) {
            continue;
        }
        let Some(format) = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(BookFormat::from_extension)
        else {
            continue;
        };
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if meta.is_file() && meta.len() > 0 {
            return Ok(Some(LocalBookFile {
                relative_path: format!("{}/{}", DOWNLOAD_DIR, name),
                format,
                size_bytes: meta.len(),
            }));
        }
    }
    Ok(None)
}

/// First 16 hex digits of the SHA-256 of the URL
pub fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Last path segment up to its first dot (`84.epub3.images` -> `84`)
fn url_stem(url: &url::Url) -> &str {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| last.split('.').next())
        .unwrap_or("")
}

/// Reduce untrusted text to a filename component
///
/// Keeps ASCII alphanumerics, `-` and `_`, lowercased; any other run of
/// characters becomes one `_`. Capped at 60 characters, `book` when empty.
pub fn sanitize_slug(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch.to_ascii_lowercase());
            prev_sep = false;
        } else if !prev_sep {
            out.push('_');
            prev_sep = true;
        }
    }

    let slug: String = out.trim_matches('_').chars().take(MAX_SLUG_CHARS).collect();
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "book".to_string()
    } else {
        slug.to_string()
    }
}

/// Identify a download by Content-Type, then URL suffix, then magic bytes
pub fn detect_format(content_type: Option<&str>, url: &str, head: &[u8]) -> Option<BookFormat> {
    content_type
        .and_then(BookFormat::from_media_type)
        .or_else(|| BookFormat::from_url(url))
        .or_else(|| sniff_format(head))
}

fn sniff_format(head: &[u8]) -> Option<BookFormat> {
    if head.starts_with(b"PK\x03\x04") {
        Some(BookFormat::Epub)
    } else if head.starts_with(b"%PDF") {
        Some(BookFormat::Pdf)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_hash_is_stable() {
        let a = url_hash("https://example.org/book.epub");
        assert_eq!(a.len(), 16);
        assert_eq!(a, url_hash("https://example.org/book.epub"));
        assert_ne!(a, url_hash("https://example.org/book.pdf"));
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sanitize_slug() {
        assert_eq!(sanitize_slug("Pride and Prejudice"), "pride_and_prejudice");
        assert_eq!(sanitize_slug("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_slug("a\\b:c"), "a_b_c");
        assert_eq!(sanitize_slug("???"), "book");
        assert_eq!(sanitize_slug(""), "book");
        assert_eq!(sanitize_slug(&"x".repeat(100)).len(), 60);
    }

    #[test]
    fn test_url_stem() {
        let url = url::Url::parse("https://www.gutenberg.org/ebooks/84.epub3.images").unwrap();
        assert_eq!(url_stem(&url), "84");
        let root = url::Url::parse("https://example.org/").unwrap();
        assert_eq!(sanitize_slug(url_stem(&root)), "book");
    }

    #[test]
    fn test_detect_format_order() {
        assert_eq!(
            detect_format(Some("application/pdf"), "https://x.org/a.epub", b""),
            Some(BookFormat::Pdf)
        );
        assert_eq!(
            detect_format(
                Some("application/octet-stream"),
                "https://x.org/a.epub3.images",
                b"%PDF-1.5"
            ),
            Some(BookFormat::Epub)
        );
        assert_eq!(
            detect_format(None, "https://x.org/download", b"PK\x03\x04rest"),
            Some(BookFormat::Epub)
        );
        assert_eq!(
            detect_format(Some("image/png"), "https://x.org/cover", b"\x89PNG"),
            None
        );
    }

    #[test]
    fn test_part_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".abc.part");
        std::fs::write(&path, b"partial").unwrap();
        drop(PartFile::new(path.clone()));
        assert!(!path.exists());
    }

    #[test]
    fn test_part_files_are_per_download() {
        let dir = tempfile::tempdir().unwrap();
        let a = PartFile::for_download(dir.path(), "0123456789abcdef");
        let b = PartFile::for_download(dir.path(), "0123456789abcdef");
        assert_ne!(a.path, b.path);
        assert!(a
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(".0123456789abcdef."));
    }

    #[tokio::test]
    async fn test_persist_keeps_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("0123456789abcdef_book.txt");
        std::fs::write(&target, b"first").unwrap();

        let part = PartFile::for_download(dir.path(), "0123456789abcdef");
        let part_path = part.path.clone();
        std::fs::write(&part_path, b"second").unwrap();

        part.persist(&target).await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"first");
        assert!(!part_path.exists());
    }
}
