use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use sha2::{Digest, Sha256};
use url::Url;

use crate::corpus::extract::{unzip_to_dir, ExtractionLimits};
use crate::corpus::{count_files, resolve_root, unwrap_archive_root, CorpusSource, COMPLETE_MARKER};
use crate::utils::{
    config::absolute_path,
    error::{CorpusError, GateError, GateResult},
    types::CorpusLocation,
};

/// A zip archive fetched over HTTP(S) or from a `file://` URL
pub struct ArchiveSource {
    url: Url,
    cache_dir: PathBuf,
    subdir: Option<String>,
    refresh: bool,
    connect_timeout: Duration,
    limits: ExtractionLimits,
}

impl ArchiveSource {
    /// Create a source for `url`, unpacking below `cache_dir`
    pub fn new(url: &str, cache_dir: &Path) -> GateResult<Self> {
        let parsed = Url::parse(url).map_err(|e| CorpusError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        match parsed.scheme() {
            "http" | "https" | "file" => {}
            other => {
                return Err(CorpusError::InvalidUrl {
                    url: url.to_string(),
                    reason: format!("unsupported scheme '{}'", other),
                }
                .into())
            }
        }

        let cache_dir = absolute_path(cache_dir).map_err(|e| CorpusError::io(cache_dir, e))?;

        Ok(Self {
            url: parsed,
            cache_dir,
            subdir: None,
            refresh: false,
            connect_timeout: Duration::from_secs(30),
            limits: ExtractionLimits::default(),
        })
    }

    /// Descend into a subdirectory of the unpacked archive
    pub fn with_subdir(mut self, subdir: Option<String>) -> Self {
        self.subdir = subdir;
        self
    }

    /// Discard any cached extraction and fetch again
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Override the extraction safety limits
    pub fn with_limits(mut self, limits: ExtractionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Directory this archive unpacks into
    pub fn extraction_dir(&self) -> PathBuf {
        self.cache_dir.join(cache_key(&self.url))
    }

    async fn download_to(&self, dest: &Path) -> GateResult<u64> {
        if self.url.scheme() == "file" {
            let path = self.url.to_file_path().map_err(|_| CorpusError::InvalidUrl {
                url: self.url.to_string(),
                reason: "not a local file path".to_string(),
            })?;
            if !path.is_file() {
                return Err(CorpusError::NotFound(path).into());
            }
            let bytes = tokio::fs::copy(&path, dest)
                .await
                .map_err(|e| CorpusError::io(&path, e))?;
            return Ok(bytes);
        }

        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| CorpusError::Download(format!("Failed to build HTTP client: {}", e)))?;

        let response = client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| CorpusError::Download(format!("Request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CorpusError::Download(format!("HTTP {} from {}", status, self.url)).into());
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| CorpusError::io(dest, e))?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CorpusError::Download(format!("Transfer interrupted: {}", e)))?;
            file.write_all(&chunk).await.map_err(|e| CorpusError::io(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| CorpusError::io(dest, e))?;

        Ok(written)
    }

    /// A cached extraction counts only when its marker names this URL
    async fn is_cached(&self, extraction_dir: &Path) -> bool {
        match tokio::fs::read_to_string(extraction_dir.join(COMPLETE_MARKER)).await {
            Ok(recorded) => recorded.trim() == self.url.as_str(),
            Err(_) => false,
        }
    }

    fn location(&self, extraction_dir: &Path, freshly_fetched: bool) -> GateResult<CorpusLocation> {
        let root = resolve_root(&unwrap_archive_root(extraction_dir)?, self.subdir.as_deref())?;
        let file_count = count_files(&root);
        if file_count == 0 {
            return Err(CorpusError::Empty(root).into());
        }
        Ok(CorpusLocation {
            root,
            source: self.describe(),
            freshly_fetched,
            file_count,
        })
    }
}

#[async_trait]
impl CorpusSource for ArchiveSource {
    fn describe(&self) -> String {
        format!("archive {}", self.url)
    }

    async fn fetch(&self) -> GateResult<CorpusLocation> {
        let extraction_dir = self.extraction_dir();

        if !self.refresh && self.is_cached(&extraction_dir).await {
            tracing::info!(dir = %extraction_dir.display(), "reusing cached corpus");
            return self.location(&extraction_dir, false);
        }

        if extraction_dir.exists() {
            tokio::fs::remove_dir_all(&extraction_dir)
                .await
                .map_err(|e| CorpusError::io(&extraction_dir, e))?;
        }
        tokio::fs::create_dir_all(&extraction_dir)
            .await
            .map_err(|e| CorpusError::io(&extraction_dir, e))?;

        let archive = tempfile::Builder::new()
            .prefix("corpus-")
            .suffix(".zip")
            .tempfile_in(&self.cache_dir)
            .map_err(|e| CorpusError::io(&self.cache_dir, e))?;

        let started = Instant::now();
        tracing::info!(url = %self.url, "downloading corpus");
        let bytes = self.download_to(archive.path()).await?;
        tracing::info!(bytes, elapsed_ms = started.elapsed().as_millis() as u64, "download complete");

        let archive_path = archive.path().to_path_buf();
        let dest = extraction_dir.clone();
        let limits = self.limits;
        let stats = tokio::task::spawn_blocking(move || unzip_to_dir(&archive_path, &dest, limits))
            .await
            .map_err(|e| GateError::Internal(format!("Extraction task failed: {}", e)))??;
        tracing::info!(
            files = stats.files,
            directories = stats.directories,
            skipped = stats.skipped,
            "archive extracted"
        );
        drop(archive);

        let location = self.location(&extraction_dir, true)?;

        tokio::fs::write(extraction_dir.join(COMPLETE_MARKER), self.url.as_str())
            .await
            .map_err(|e| CorpusError::io(&extraction_dir, e))?;

        Ok(location)
    }
}

/// Filesystem-safe directory name derived from a URL
///
/// The readable part keeps host and path; the digest suffix covers the full
/// URL so that scheme or query differences never share a directory.
pub fn cache_key(url: &Url) -> String {
    let raw = format!("{}{}", url.host_str().unwrap_or("local"), url.path());
    let mut key: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    key = key.trim_matches('_').to_string();
    if key.len() > 100 {
        key = key[key.len() - 100..].to_string();
    }
    if key.is_empty() {
        key.push_str("corpus");
    }
    let digest = format!("{:x}", Sha256::digest(url.as_str().as_bytes()));
    format!("{}-{}", key, &digest[..12])
}
