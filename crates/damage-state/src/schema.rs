//! Row types for the SurrealDB `analyses` table

use chrono::{DateTime, Utc};
use damage_core::{AnalysisErrorKind, AnalysisResult};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{
    AnalysisId, AnalysisRecord, FailureInfo, ImageLocator, RecordStatus, StorageResult, UserId,
};

/// Serialize chrono timestamps as native SurrealDB datetimes
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde::Serialize::serialize(&SurrealDatetime::from(*date), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// One row of `analyses`.
///
/// `damage_detected` and `total_cost` duplicate fields of `result` so history
/// filters can run in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub analysis_id: String,
    pub user_id: String,
    pub image: String,
    pub file_name: String,
    /// "completed" | "failed". Records are only written once analysis has
    /// finished, so no other status is ever stored.
    pub status: String,
    pub damage_detected: bool,
    pub total_cost: f64,
    pub result: Option<AnalysisResult>,
    pub failure_kind: Option<AnalysisErrorKind>,
    pub failure_message: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl AnalysisRow {
    pub fn from_record(record: &AnalysisRecord) -> Self {
        AnalysisRow {
            id: None,
            analysis_id: record.id.0.clone(),
            user_id: record.user_id.as_str().to_string(),
            image: record.image.0.clone(),
            file_name: record.file_name.clone(),
            status: record.status.as_str().to_string(),
            damage_detected: record.is_damaged(),
            total_cost: record.estimated_cost(),
            result: record.result.clone(),
            failure_kind: record.failure.as_ref().map(|f| f.kind),
            failure_message: record.failure.as_ref().map(|f| f.message.clone()),
            created_at: record.created_at,
        }
    }

    pub fn into_record(self) -> StorageResult<AnalysisRecord> {
        let status = match self.status.as_str() {
            "completed" => RecordStatus::Completed,
            "failed" => RecordStatus::Failed,
            other => {
                return Err(StorageError::Serialization(format!(
                    "unknown analysis status: {other}"
                )))
            }
        };

        let failure = match (self.failure_kind, self.failure_message) {
            (Some(kind), message) => Some(FailureInfo {
                kind,
                message: message.unwrap_or_default(),
            }),
            (None, _) => None,
        };

        let consistent = match status {
            RecordStatus::Completed => self.result.is_some() && failure.is_none(),
            RecordStatus::Failed => self.result.is_none() && failure.is_some(),
        };
        if !consistent {
            return Err(StorageError::Serialization(format!(
                "analysis {} has status {} but inconsistent payload",
                self.analysis_id, self.status
            )));
        }

        Ok(AnalysisRecord {
            id: AnalysisId(self.analysis_id),
            user_id: UserId::new(self.user_id)?,
            image: ImageLocator(self.image),
            file_name: self.file_name,
            status,
            result: self.result,
            failure,
            created_at: self.created_at,
        })
    }
}
