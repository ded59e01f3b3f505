//! Offline image cache for product photos.
//!
//! Downloads catalog images once and serves them from disk afterwards. A
//! JSON index file in the cache directory maps the remote URL to the local
//! file; the index is the source of truth and is only updated after a
//! download has fully succeeded, so a failed download never poisons it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const INDEX_FILE: &str = "index.json";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    file_name: String,
    cached_at: String,
}

/// Success and failure counts for a batch prefetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheBatchReport {
    pub cached: usize,
    pub failed: usize,
}

pub struct ImageCache {
    dir: PathBuf,
    client: reqwest::Client,
}

impl ImageCache {
    /// Open a cache rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            client: reqwest::Client::builder()
                .timeout(DOWNLOAD_TIMEOUT)
                .build()?,
        })
    }

    /// Ensure `url` is cached, downloading it if the index has no entry.
    ///
    /// Indexed entries are trusted without re-checking the filesystem; a
    /// purged or deleted file is simply re-downloaded on the next pass
    /// after `purge` clears the index.
    pub async fn ensure_cached(&self, url: &str) -> Result<PathBuf> {
        if url.trim().is_empty() {
            return Err(Error::InvalidInput("image URL must not be empty".to_string()));
        }

        let mut index = self.read_index();
        if let Some(entry) = index.get(url) {
            return Ok(self.dir.join(&entry.file_name));
        }

        let file_name = file_name_for(url);
        let path = self.dir.join(&file_name);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::RemoteRejected(format!(
                "image download failed with HTTP {} for {url}",
                response.status().as_u16()
            )));
        }
        let bytes = response.bytes().await?;
        std::fs::write(&path, &bytes)?;

        index.insert(
            url.to_string(),
            CacheEntry {
                file_name,
                cached_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        self.write_index(&index)?;

        Ok(path)
    }

    /// Sequential best-effort prefetch. Failures are counted and logged,
    /// never propagated; `on_progress` is called once per URL.
    pub async fn ensure_cached_batch(
        &self,
        urls: &[String],
        mut on_progress: Option<&mut (dyn FnMut(usize, usize) + Send)>,
    ) -> CacheBatchReport {
        let mut report = CacheBatchReport::default();
        let total = urls.len();
        for (index, url) in urls.iter().enumerate() {
            match self.ensure_cached(url).await {
                Ok(_) => report.cached += 1,
                Err(e) => {
                    tracing::warn!("Image prefetch failed for {url}: {e}");
                    report.failed += 1;
                }
            }
            if let Some(callback) = on_progress.as_deref_mut() {
                callback(index + 1, total);
            }
        }
        report
    }

    /// Local path when cached, otherwise the original remote reference so
    /// the caller can still attempt an online load.
    pub fn resolve_for_display(&self, url: &str) -> String {
        self.read_index().get(url).map_or_else(
            || url.to_string(),
            |entry| self.dir.join(&entry.file_name).to_string_lossy().into_owned(),
        )
    }

    /// Delete every cached file and the index. Running against an empty or
    /// already-purged cache is a no-op.
    pub fn purge(&self) -> Result<()> {
        let index = self.read_index();
        for entry in index.values() {
            let path = self.dir.join(&entry.file_name);
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
        }
        let index_path = self.dir.join(INDEX_FILE);
        if let Err(e) = std::fs::remove_file(&index_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// A corrupt or missing index reads as empty; the cache rebuilds itself
    /// through subsequent downloads.
    fn read_index(&self) -> HashMap<String, CacheEntry> {
        let path = self.dir.join(INDEX_FILE);
        match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    fn write_index(&self, index: &HashMap<String, CacheEntry>) -> Result<()> {
        let path = self.dir.join(INDEX_FILE);
        std::fs::write(&path, serde_json::to_vec(index)?)?;
        Ok(())
    }
}

/// Deterministic local file name for a URL: sha256 prefix plus the URL's
/// extension (query string stripped), `jpg` when none is present.
fn file_name_for(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut hash = String::with_capacity(32);
    for byte in &digest[..16] {
        use std::fmt::Write;
        let _ = write!(hash, "{byte:02x}");
    }
    format!("{hash}.{}", extension_of(url))
}

fn extension_of(url: &str) -> &str {
    let without_query = url.split('?').next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map_or("jpg", |(_, ext)| if ext.is_empty() { "jpg" } else { ext })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn file_names_are_deterministic() {
        let a = file_name_for("https://cdn.example.com/images/oil.png?v=2");
        let b = file_name_for("https://cdn.example.com/images/oil.png?v=2");
        assert_eq!(a, b);
        assert!(a.ends_with(".png"));

        let bare = file_name_for("https://cdn.example.com/images/oil");
        assert!(bare.ends_with(".jpg"));
    }

    #[test]
    fn resolve_falls_back_to_remote_reference() {
        let dir = TempDir::new().unwrap();
        let cache = ImageCache::open(dir.path()).unwrap();
        let url = "https://cdn.example.com/images/oil.png";
        assert_eq!(cache.resolve_for_display(url), url);
    }

    #[tokio::test]
    async fn indexed_entry_is_trusted_without_download() {
        let dir = TempDir::new().unwrap();
        let cache = ImageCache::open(dir.path()).unwrap();
        let url = "https://cdn.example.invalid/images/oil.png";

        let mut index = HashMap::new();
        index.insert(
            url.to_string(),
            CacheEntry {
                file_name: "abc.png".to_string(),
                cached_at: "2024-05-01T00:00:00Z".to_string(),
            },
        );
        cache.write_index(&index).unwrap();

        // The host is unresolvable; success proves no network was touched.
        let path = cache.ensure_cached(url).await.unwrap();
        assert_eq!(path, dir.path().join("abc.png"));
        assert_eq!(cache.resolve_for_display(url), path.to_string_lossy());
    }

    #[tokio::test]
    async fn failed_download_leaves_index_untouched() {
        let dir = TempDir::new().unwrap();
        let cache = ImageCache::open(dir.path()).unwrap();
        let url = "https://cdn.example.invalid/images/oil.png";

        assert!(cache.ensure_cached(url).await.is_err());
        assert!(cache.read_index().is_empty());
        assert_eq!(cache.resolve_for_display(url), url);
    }

    #[tokio::test]
    async fn batch_counts_failures_and_reports_progress() {
        let dir = TempDir::new().unwrap();
        let cache = ImageCache::open(dir.path()).unwrap();

        let mut index = HashMap::new();
        index.insert(
            "https://cdn.example.invalid/a.png".to_string(),
            CacheEntry {
                file_name: "a.png".to_string(),
                cached_at: "2024-05-01T00:00:00Z".to_string(),
            },
        );
        cache.write_index(&index).unwrap();

        let urls = vec![
            "https://cdn.example.invalid/a.png".to_string(),
            "https://cdn.example.invalid/b.png".to_string(),
        ];
        let mut seen = Vec::new();
        let mut progress = |done: usize, total: usize| seen.push((done, total));
        let report = cache.ensure_cached_batch(&urls, Some(&mut progress)).await;

        assert_eq!(report.cached, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(seen, vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn purge_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cache = ImageCache::open(dir.path()).unwrap();

        let file = dir.path().join("abc.png");
        std::fs::write(&file, b"bytes").unwrap();
        let mut index = HashMap::new();
        index.insert(
            "https://cdn.example.com/abc.png".to_string(),
            CacheEntry {
                file_name: "abc.png".to_string(),
                cached_at: "2024-05-01T00:00:00Z".to_string(),
            },
        );
        cache.write_index(&index).unwrap();

        cache.purge().unwrap();
        assert!(!file.exists());
        assert!(cache.read_index().is_empty());
        cache.purge().unwrap();
    }
}
