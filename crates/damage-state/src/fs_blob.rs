//! Filesystem-backed image blob store
//!
//! Layout: `<root>/<user>/<timestamp>_<digest12>_<nonce>_<file name>`, where
//! user and file name are reduced to `[A-Za-z0-9._-]` and the nonce is random
//! per save. Locators are the path relative to the root. Files are never
//! overwritten: a name clash fails the save.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

use crate::error::{StateError, StorageError};
use crate::storage_traits::{BlobStore, ImageLocator, StorageResult, UserId};

const MAX_NAME_LEN: usize = 96;

/// Reduce `raw` to a safe single path component.
fn sanitize(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    trimmed.chars().take(MAX_NAME_LEN).collect()
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> crate::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|source| StateError::BlobRoot {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a locator back to a path, refusing anything outside the root.
    fn resolve(&self, locator: &ImageLocator) -> StorageResult<PathBuf> {
        let invalid = |reason: &str| StorageError::InvalidLocator {
            locator: locator.to_string(),
            reason: reason.to_string(),
        };

        let relative = Path::new(locator.as_str());
        let mut parts = 0;
        for component in relative.components() {
            match component {
                Component::Normal(_) => parts += 1,
                _ => return Err(invalid("must be a relative path without '.' or '..'")),
            }
        }
        if parts != 2 {
            return Err(invalid("expected <user>/<file>"));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn save(
        &self,
        user: &UserId,
        file_name: &str,
        bytes: &[u8],
    ) -> StorageResult<ImageLocator> {
        let user_dir = sanitize(user.as_str(), "user");
        let digest = hex::encode(Sha256::digest(bytes));
        let nonce = Uuid::new_v4().simple().to_string();
        let stored_name = format!(
            "{}_{}_{}_{}",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
            &digest[..12],
            &nonce[..8],
            sanitize(file_name, "image")
        );
        let locator = ImageLocator(format!("{user_dir}/{stored_name}"));

        let dir = self.root.join(&user_dir);
        let path = dir.join(&stored_name);
        let data = bytes.to_vec();

        // Atomic write: temp file in the target directory, then link into place.
        let written = path.clone();
        tokio::task::spawn_blocking(move || -> StorageResult<()> {
            std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
            let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| io_err(&dir, e))?;
            tmp.write_all(&data).map_err(|e| io_err(&written, e))?;
            tmp.persist_noclobber(&written)
                .map_err(|e| io_err(&written, e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Backend(format!("blob write task failed: {e}")))??;

        debug!(locator = %locator, size = bytes.len(), "saved image blob");
        Ok(locator)
    }

    async fn load(&self, locator: &ImageLocator) -> StorageResult<Vec<u8>> {
        let path = self.resolve(locator)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::BlobNotFound {
                    locator: locator.to_string(),
                }
            } else {
                io_err(&path, e)
            }
        })
    }

    async fn delete(&self, locator: &ImageLocator) -> StorageResult<()> {
        let path = self.resolve(locator)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, e)),
        }
    }
}
