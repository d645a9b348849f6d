//! In-memory fakes for storage traits (testing and demo mode)
//!
//! `MemoryAnalysisStore` and `MemoryBlobStore` satisfy the trait contracts
//! without any external dependencies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

fn poisoned() -> StorageError {
    StorageError::Backend("in-memory store lock poisoned".to_string())
}

// ---------------------------------------------------------------------------
// MemoryAnalysisStore
// ---------------------------------------------------------------------------

/// In-memory analysis store. Records are kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryAnalysisStore {
    records: Mutex<Vec<AnalysisRecord>>,
}

impl MemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across all users.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn create(&self, record: NewAnalysisRecord) -> StorageResult<AnalysisRecord> {
        let record = AnalysisRecord::from_new(record);
        let mut records = self.records.lock().map_err(|_| poisoned())?;
        records.push(record.clone());
        Ok(record)
    }

    async fn get(&self, user: &UserId, id: &AnalysisId) -> StorageResult<AnalysisRecord> {
        let records = self.records.lock().map_err(|_| poisoned())?;
        records
            .iter()
            .find(|r| &r.id == id && &r.user_id == user)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })
    }

    async fn list_for_user(
        &self,
        user: &UserId,
        filter: HistoryFilter,
        limit: Option<usize>,
    ) -> StorageResult<Vec<AnalysisRecord>> {
        let records = self.records.lock().map_err(|_| poisoned())?;
        // Reverse insertion order first so equal timestamps stay newest-first
        // after the stable sort.
        let mut matching: Vec<AnalysisRecord> = records
            .iter()
            .rev()
            .filter(|r| &r.user_id == user && filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn summary(&self, user: &UserId) -> StorageResult<UserSummary> {
        let records = self.records.lock().map_err(|_| poisoned())?;
        Ok(UserSummary::from_records(
            records.iter().filter(|r| &r.user_id == user),
        ))
    }

    async fn delete(&self, user: &UserId, id: &AnalysisId) -> StorageResult<AnalysisRecord> {
        let mut records = self.records.lock().map_err(|_| poisoned())?;
        let pos = records
            .iter()
            .position(|r| &r.id == id && &r.user_id == user)
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })?;
        Ok(records.remove(pos))
    }
}

// ---------------------------------------------------------------------------
// MemoryBlobStore
// ---------------------------------------------------------------------------

/// In-memory blob store keyed by `mem://<user>/<seq>_<file name>`.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    seq: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn save(
        &self,
        user: &UserId,
        file_name: &str,
        bytes: &[u8],
    ) -> StorageResult<ImageLocator> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let key = format!(
            "mem://{}/{}_{seq}_{file_name}",
            user.as_str(),
            Utc::now().timestamp_millis()
        );
        let mut blobs = self.blobs.lock().map_err(|_| poisoned())?;
        blobs.insert(key.clone(), bytes.to_vec());
        Ok(ImageLocator(key))
    }

    async fn load(&self, locator: &ImageLocator) -> StorageResult<Vec<u8>> {
        let blobs = self.blobs.lock().map_err(|_| poisoned())?;
        blobs
            .get(locator.as_str())
            .cloned()
            .ok_or_else(|| StorageError::BlobNotFound {
                locator: locator.to_string(),
            })
    }

    async fn delete(&self, locator: &ImageLocator) -> StorageResult<()> {
        let mut blobs = self.blobs.lock().map_err(|_| poisoned())?;
        blobs.remove(locator.as_str());
        Ok(())
    }
}
