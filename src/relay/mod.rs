use std::collections::HashSet;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::bridge::types::Attachment;
use crate::bridge::{BridgeError, FeedSource};
use crate::fedi::{Destination, FediError};
use crate::retry::{self, RetryError, RetryPolicy};

/// Mime types that get re-uploaded. Everything else is ignored.
pub const RELAYABLE_TYPES: &[&str] = &["image/jpeg", "image/png"];

const FALLBACK_FILE_NAME: &str = "media";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("downloading {url}: {source}")]
    Download { url: String, source: BridgeError },
    #[error("writing {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("uploading {}: {source}", .path.display())]
    Upload { path: PathBuf, source: RetryError<FediError> },
}

/// A file fetched into the cache directory, not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedMedia {
    pub mime_type: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Dry run: what would have been uploaded.
    Preview(Vec<CachedMedia>),
    /// Destination media ids, in attachment order.
    Uploaded(Vec<String>),
}

impl RelayOutcome {
    pub fn is_empty(&self) -> bool {
        match self {
            RelayOutcome::Preview(v) => v.is_empty(),
            RelayOutcome::Uploaded(v) => v.is_empty(),
        }
    }

    /// Human-readable handles for logging and reports.
    pub fn labels(&self) -> Vec<String> {
        match self {
            RelayOutcome::Preview(v) => v.iter().map(|m| format!("{} ({})", m.path.display(), m.mime_type)).collect(),
            RelayOutcome::Uploaded(v) => v.clone(),
        }
    }
}

/// Downloads tweet images into the cache directory and re-uploads them.
#[derive(Debug, Clone)]
pub struct MediaRelay {
    cache_dir: PathBuf,
    policy: RetryPolicy,
}

impl MediaRelay {
    pub fn new(cache_dir: impl Into<PathBuf>, policy: RetryPolicy) -> Self {
        Self { cache_dir: cache_dir.into(), policy }
    }

    pub async fn relay(
        &self,
        source: &dyn FeedSource,
        dest: &dyn Destination,
        attachments: &[Attachment],
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<RelayOutcome, RelayError> {
        let cached = self.download_all(source, attachments).await?;
        if dry_run {
            return Ok(RelayOutcome::Preview(cached));
        }
        let ids = self.upload_all(dest, &cached, cancel).await?;
        Ok(RelayOutcome::Uploaded(ids))
    }

    async fn download_all(&self, source: &dyn FeedSource, attachments: &[Attachment]) -> Result<Vec<CachedMedia>, RelayError> {
        let mut out = Vec::new();
        let mut used_names = HashSet::new();
        for (idx, att) in attachments.iter().enumerate() {
            if !is_relayable(&att.mime_type) {
                debug!(mime_type = %att.mime_type, url = %att.url, "skipping attachment type");
                continue;
            }
            if att.url.trim().is_empty() {
                debug!(mime_type = %att.mime_type, "skipping attachment without url");
                continue;
            }
            let bytes = source
                .fetch_media(&att.url)
                .await
                .map_err(|e| RelayError::Download { url: att.url.clone(), source: e })?;
            let mut name = cache_file_name(&att.url);
            // same basename from two hosts/paths within one item
            if !used_names.insert(name.clone()) {
                name = format!("{idx}-{name}");
                used_names.insert(name.clone());
            }
            let path = self.write_cached(&name, &bytes).await?;
            debug!(path = %path.display(), bytes = bytes.len(), "cached media");
            out.push(CachedMedia { mime_type: att.mime_type.clone(), path });
        }
        Ok(out)
    }

    async fn write_cached(&self, file_name: &str, bytes: &Bytes) -> Result<PathBuf, RelayError> {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| RelayError::Io { path: self.cache_dir.clone(), source: e })?;
        let path = self.cache_dir.join(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| RelayError::Io { path: path.clone(), source: e })?;
        Ok(path)
    }

    async fn upload_all(&self, dest: &dyn Destination, cached: &[CachedMedia], cancel: &CancellationToken) -> Result<Vec<String>, RelayError> {
        let mut ids = Vec::with_capacity(cached.len());
        for media in cached {
            let data = Bytes::from(
                tokio::fs::read(&media.path)
                    .await
                    .map_err(|e| RelayError::Io { path: media.path.clone(), source: e })?,
            );
            let file_name = file_name_of(&media.path);
            let (file_name, mime_type) = (file_name.as_str(), media.mime_type.as_str());
            let id = retry::retry(&self.policy, cancel, "media upload", || {
                dest.upload_media(data.clone(), file_name, mime_type)
            })
            .await
            .map_err(|e| RelayError::Upload { path: media.path.clone(), source: e })?;
            info!(media_id = %id, path = %media.path.display(), "🖼️ uploaded media");
            ids.push(id);
        }
        Ok(ids)
    }
}

pub fn is_relayable(mime_type: &str) -> bool {
    RELAYABLE_TYPES.contains(&mime_type)
}

/// Last path segment of `url` with the query dropped. Names that could
/// escape the cache dir fall back to a fixed name.
pub fn cache_file_name(url: &str) -> String {
    let segment = match Url::parse(url) {
        Ok(u) => u.path_segments().and_then(|mut s| s.next_back()).unwrap_or("").to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or("").rsplit('/').next().unwrap_or("").to_string(),
    };
    match segment.as_str() {
        "" | "." | ".." => FALLBACK_FILE_NAME.to_string(),
        s if s.contains('\\') => FALLBACK_FILE_NAME.to_string(),
        _ => segment,
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}
