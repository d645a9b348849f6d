//! Storage trait definitions for damage analyses
//!
//! - `AnalysisStore`: immutable per-user analysis records (create/get/list/delete)
//! - `BlobStore`: uploaded image bytes addressed by an opaque locator
//!
//! Both traits are async and backend-agnostic. In-memory fakes live in the
//! `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use damage_core::{AnalysisError, AnalysisErrorKind, AnalysisResult};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Store-generated analysis id (UUID v4 string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisId(pub String);

impl AnalysisId {
    pub fn new() -> Self {
        AnalysisId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AnalysisId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AnalysisId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AnalysisId {
    fn from(s: &str) -> Self {
        AnalysisId(s.to_string())
    }
}

/// Opaque caller identity. Any non-empty string without control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

const MAX_USER_ID_LEN: usize = 256;

impl UserId {
    pub fn new(raw: impl Into<String>) -> StorageResult<Self> {
        let raw = raw.into();
        let reason = if raw.trim().is_empty() {
            Some("must not be empty")
        } else if raw.len() > MAX_USER_ID_LEN {
            Some("must be at most 256 bytes")
        } else if raw.chars().any(char::is_control) {
            Some("must not contain control characters")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(StorageError::InvalidUserId {
                reason: reason.to_string(),
            }),
            None => Ok(UserId(raw)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        UserId::new(s)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle returned by a [`BlobStore`]; only meaningful to the store
/// that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageLocator(pub String);

impl ImageLocator {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Terminal status of a stored analysis.
///
/// There is no pending state: a record is created only after the pipeline
/// has returned, and records are never updated.
pub enum RecordStatus {
    Completed,
    Failed,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Completed => "completed",
            RecordStatus::Failed => "failed",
        }
    }
}

/// Why an analysis produced no result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub kind: AnalysisErrorKind,
    pub message: String,
}

impl From<&AnalysisError> for FailureInfo {
    fn from(err: &AnalysisError) -> Self {
        FailureInfo {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// What the pipeline produced for one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Completed(AnalysisResult),
    Failed(FailureInfo),
}

/// Input to [`AnalysisStore::create`]. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnalysisRecord {
    pub user_id: UserId,
    pub image: ImageLocator,
    pub file_name: String,
    pub outcome: AnalysisOutcome,
}

impl NewAnalysisRecord {
    pub fn completed(
        user_id: UserId,
        image: ImageLocator,
        file_name: impl Into<String>,
        result: AnalysisResult,
    ) -> Self {
        Self {
            user_id,
            image,
            file_name: file_name.into(),
            outcome: AnalysisOutcome::Completed(result),
        }
    }

    pub fn failed(
        user_id: UserId,
        image: ImageLocator,
        file_name: impl Into<String>,
        failure: FailureInfo,
    ) -> Self {
        Self {
            user_id,
            image,
            file_name: file_name.into(),
            outcome: AnalysisOutcome::Failed(failure),
        }
    }
}

/// A persisted analysis. Immutable once written.
///
/// Exactly one of `result` / `failure` is set, matching `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: AnalysisId,
    pub user_id: UserId,
    pub image: ImageLocator,
    pub file_name: String,
    pub status: RecordStatus,
    pub result: Option<AnalysisResult>,
    pub failure: Option<FailureInfo>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Materialize a new record with a fresh id and the current time.
    pub fn from_new(new: NewAnalysisRecord) -> Self {
        Self::assemble(AnalysisId::new(), Utc::now(), new)
    }

    pub(crate) fn assemble(
        id: AnalysisId,
        created_at: DateTime<Utc>,
        new: NewAnalysisRecord,
    ) -> Self {
        let (status, result, failure) = match new.outcome {
            AnalysisOutcome::Completed(result) => (RecordStatus::Completed, Some(result), None),
            AnalysisOutcome::Failed(failure) => (RecordStatus::Failed, None, Some(failure)),
        };
        Self {
            id,
            user_id: new.user_id,
            image: new.image,
            file_name: new.file_name,
            status,
            result,
            failure,
            created_at,
        }
    }

    /// Completed with damage detected.
    pub fn is_damaged(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.damage_detected)
    }

    /// Completed without damage.
    pub fn is_undamaged(&self) -> bool {
        self.result.as_ref().is_some_and(|r| !r.damage_detected)
    }

    pub fn estimated_cost(&self) -> f64 {
        self.result
            .as_ref()
            .map_or(0.0, |r| r.cost_estimation.total_cost)
    }
}

/// History filter for [`AnalysisStore::list_for_user`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryFilter {
    /// Every record, failed ones included.
    #[default]
    All,
    Damaged,
    Undamaged,
}

impl HistoryFilter {
    pub fn matches(self, record: &AnalysisRecord) -> bool {
        match self {
            HistoryFilter::All => true,
            HistoryFilter::Damaged => record.is_damaged(),
            HistoryFilter::Undamaged => record.is_undamaged(),
        }
    }
}

impl std::str::FromStr for HistoryFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(HistoryFilter::All),
            "damaged" => Ok(HistoryFilter::Damaged),
            "undamaged" | "no-damage" | "no_damage" => Ok(HistoryFilter::Undamaged),
            other => Err(format!(
                "unknown filter '{other}' (expected all, damaged or undamaged)"
            )),
        }
    }
}

/// Per-user aggregate over stored analyses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserSummary {
    pub total_analyses: u64,
    pub completed: u64,
    pub failed: u64,
    pub damaged: u64,
    pub undamaged: u64,
    pub total_estimated_cost: f64,
    pub last_analysis_at: Option<DateTime<Utc>>,
}

impl UserSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AnalysisRecord>) -> Self {
        records
            .into_iter()
            .fold(UserSummary::default(), |mut summary, record| {
                summary.total_analyses += 1;
                match record.status {
                    RecordStatus::Completed => summary.completed += 1,
                    RecordStatus::Failed => summary.failed += 1,
                }
                if record.is_damaged() {
                    summary.damaged += 1;
                } else if record.is_undamaged() {
                    summary.undamaged += 1;
                }
                summary.total_estimated_cost += record.estimated_cost();
                summary.last_analysis_at = summary.last_analysis_at.max(Some(record.created_at));
                summary
            })
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Persistence for analysis records.
///
/// Records are scoped to their owner: reading or deleting another user's
/// record reports `NotFound`. There is no update.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn create(&self, record: NewAnalysisRecord) -> StorageResult<AnalysisRecord>;

    async fn get(&self, user: &UserId, id: &AnalysisId) -> StorageResult<AnalysisRecord>;

    /// Newest first.
    async fn list_for_user(
        &self,
        user: &UserId,
        filter: HistoryFilter,
        limit: Option<usize>,
    ) -> StorageResult<Vec<AnalysisRecord>>;

    async fn summary(&self, user: &UserId) -> StorageResult<UserSummary>;

    /// Remove and return the record.
    async fn delete(&self, user: &UserId, id: &AnalysisId) -> StorageResult<AnalysisRecord>;
}

/// Storage for uploaded image bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn save(
        &self,
        user: &UserId,
        file_name: &str,
        bytes: &[u8],
    ) -> StorageResult<ImageLocator>;

    async fn load(&self, locator: &ImageLocator) -> StorageResult<Vec<u8>>;

    async fn delete(&self, locator: &ImageLocator) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use damage_core::{AnalysisPipeline, FixedClassifier};
    use std::sync::Arc;

    fn result(confidence: f64) -> AnalysisResult {
        AnalysisPipeline::new(Arc::new(FixedClassifier::new(0.0)))
            .unwrap()
            .postprocess(confidence)
            .unwrap()
    }

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn locator() -> ImageLocator {
        ImageLocator("user-1/img.jpg".to_string())
    }

    #[test]
    fn user_id_validation() {
        assert!(UserId::new("alice").is_ok());
        assert!(UserId::new("42").is_ok());
        assert!(UserId::new("").is_err());
        assert!(UserId::new("   ").is_err());
        assert!(UserId::new("bad\nid").is_err());
        assert!(UserId::new("x".repeat(300)).is_err());
    }

    #[test]
    fn user_id_deserialization_validates() {
        let ok: UserId = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(ok.as_str(), "bob");
        assert!(serde_json::from_str::<UserId>("\"\"").is_err());
    }

    #[test]
    fn record_status_follows_outcome() {
        let done = AnalysisRecord::from_new(NewAnalysisRecord::completed(
            user(),
            locator(),
            "img.jpg",
            result(0.9),
        ));
        assert_eq!(done.status, RecordStatus::Completed);
        assert!(done.result.is_some() && done.failure.is_none());
        assert!(done.is_damaged());
        assert_eq!(done.estimated_cost(), 1500.0);

        let failed = AnalysisRecord::from_new(NewAnalysisRecord::failed(
            user(),
            locator(),
            "img.jpg",
            FailureInfo::from(&AnalysisError::Decode("bad".into())),
        ));
        assert_eq!(failed.status, RecordStatus::Failed);
        assert!(!failed.is_damaged() && !failed.is_undamaged());
        assert_eq!(failed.failure.unwrap().kind, AnalysisErrorKind::Decode);
    }

    #[test]
    fn filters_match_expected_records() {
        let damaged = AnalysisRecord::from_new(NewAnalysisRecord::completed(
            user(),
            locator(),
            "a.jpg",
            result(0.7),
        ));
        let clean = AnalysisRecord::from_new(NewAnalysisRecord::completed(
            user(),
            locator(),
            "b.jpg",
            result(0.2),
        ));
        assert!(HistoryFilter::Damaged.matches(&damaged));
        assert!(!HistoryFilter::Damaged.matches(&clean));
        assert!(HistoryFilter::Undamaged.matches(&clean));
        assert!(HistoryFilter::All.matches(&damaged));

        assert_eq!("no-damage".parse::<HistoryFilter>(), Ok(HistoryFilter::Undamaged));
        assert!("broken".parse::<HistoryFilter>().is_err());
    }

    #[test]
    fn summary_aggregates() {
        let records = [
            AnalysisRecord::from_new(NewAnalysisRecord::completed(
                user(),
                locator(),
                "a",
                result(0.9),
            )),
            AnalysisRecord::from_new(NewAnalysisRecord::completed(
                user(),
                locator(),
                "b",
                result(0.6),
            )),
            AnalysisRecord::from_new(NewAnalysisRecord::completed(
                user(),
                locator(),
                "c",
                result(0.1),
            )),
            AnalysisRecord::from_new(NewAnalysisRecord::failed(
                user(),
                locator(),
                "d",
                FailureInfo {
                    kind: AnalysisErrorKind::ModelUnavailable,
                    message: "no weights".into(),
                },
            )),
        ];
        let summary = UserSummary::from_records(&records);
        assert_eq!(summary.total_analyses, 4);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.damaged, 2);
        assert_eq!(summary.undamaged, 1);
        assert_eq!(summary.total_estimated_cost, 2300.0);
        assert!(summary.last_analysis_at.is_some());
    }
}
