//! Artifact transfer: plain GET of a URL to a local path.
//!
//! Resumption policy: an existing local file of the expected size is
//! accepted without re-download only after a hash re-check.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use ota_crypto::sha256_hex;
use parking_lot::RwLock;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{ArtifactError, ArtifactResult};

/// Fetches one artifact to a local path.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Download `url` to `dest`, honoring the resume policy when
    /// `expected_size` and `expected_hash` are provided.
    ///
    /// # Errors
    /// Returns an error on transfer failure or (when `expected_hash` is
    /// given) on a digest mismatch of the downloaded file.
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        expected_hash: Option<&str>,
        expected_size: Option<u64>,
    ) -> ArtifactResult<()>;
}

async fn verify_file_hash(dest: &Path, expected: &str) -> ArtifactResult<()> {
    let bytes = fs::read(dest).await?;
    let actual = sha256_hex(&bytes);
    if actual == expected {
        Ok(())
    } else {
        Err(ArtifactError::HashMismatch {
            path: dest.display().to_string(),
            expected: expected.to_owned(),
            actual,
        })
    }
}

async fn reusable_local_copy(
    dest: &Path,
    expected_hash: Option<&str>,
    expected_size: Option<u64>,
) -> bool {
    let (Some(expected_hash), Some(expected_size)) = (expected_hash, expected_size) else {
        return false;
    };
    let Ok(meta) = fs::metadata(dest).await else {
        return false;
    };
    if meta.len() != expected_size {
        return false;
    }
    match verify_file_hash(dest, expected_hash).await {
        Ok(()) => {
            info!(path = %dest.display(), "existing artifact verified, skipping download");
            true
        }
        Err(e) => {
            warn!(path = %dest.display(), error = %e, "existing artifact rejected, re-downloading");
            false
        }
    }
}

/// HTTP artifact fetcher.
pub struct HttpArtifactFetcher {
    client: reqwest::Client,
}

impl HttpArtifactFetcher {
    /// Create a fetcher with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpArtifactFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        expected_hash: Option<&str>,
        expected_size: Option<u64>,
    ) -> ArtifactResult<()> {
        if reusable_local_copy(dest, expected_hash, expected_size).await {
            return Ok(());
        }

        info!(url, path = %dest.display(), "downloading artifact");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ArtifactError::Transfer {
                url: url.to_owned(),
                message: e.to_string(),
            })?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ArtifactError::Transfer {
                url: url.to_owned(),
                message: e.to_string(),
            })?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        if let Some(expected) = expected_hash {
            verify_file_hash(dest, expected).await?;
        }
        Ok(())
    }
}

/// In-memory artifact store doubling as a fetcher, for tests and the
/// single-process simulation.
#[derive(Default, Clone)]
pub struct MemoryArtifactStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryArtifactStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Host an artifact under a URL.
    pub fn put(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.objects.write().insert(url.into(), bytes);
    }
}

#[async_trait]
impl ArtifactFetcher for MemoryArtifactStore {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        expected_hash: Option<&str>,
        expected_size: Option<u64>,
    ) -> ArtifactResult<()> {
        if reusable_local_copy(dest, expected_hash, expected_size).await {
            return Ok(());
        }

        let bytes = self
            .objects
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(url.to_owned()))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(dest, &bytes).await?;

        if let Some(expected) = expected_hash {
            verify_file_hash(dest, expected).await?;
        }
        Ok(())
    }
}
