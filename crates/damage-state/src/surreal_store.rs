//! SurrealDB-backed AnalysisStore implementation
//!
//! Uses `schema::AnalysisRow` for persistence, converting to/from
//! `storage_traits` types at the boundary.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::connection;
use crate::error::StorageError;
use crate::schema::AnalysisRow;
use crate::storage_traits::{
    AnalysisId, AnalysisRecord, AnalysisStore, HistoryFilter, NewAnalysisRecord, StorageResult,
    UserId, UserSummary,
};

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// SurrealDB-backed implementation of [`AnalysisStore`].
pub struct SurrealAnalysisStore {
    db: Surreal<Any>,
}

impl SurrealAnalysisStore {
    /// In-memory instance (`mem://`), schema initialized.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = connection::connect_url("mem://").await?;
        info!("SurrealAnalysisStore connected (in-memory)");
        Ok(Self::from_connection(db))
    }

    pub async fn connect(url: &str) -> crate::Result<Self> {
        Ok(Self::from_connection(connection::connect_url(url).await?))
    }

    /// Connect using the `SURREALDB_*` environment chain.
    pub async fn from_env() -> crate::Result<Self> {
        Ok(Self::from_connection(connection::connect_from_env().await?))
    }

    /// Wrap an existing connection. The schema must already be initialized.
    pub fn from_connection(db: Surreal<Any>) -> Self {
        Self { db }
    }

    async fn fetch(&self, user: &UserId, id: &AnalysisId) -> StorageResult<AnalysisRow> {
        let mut res = self
            .db
            .query("SELECT * FROM analyses WHERE analysis_id = $aid AND user_id = $uid")
            .bind(("aid", id.0.clone()))
            .bind(("uid", user.as_str().to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<AnalysisRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })
    }

    async fn rows_for_user(
        &self,
        user: &UserId,
        filter: HistoryFilter,
        limit: Option<usize>,
    ) -> StorageResult<Vec<AnalysisRow>> {
        let condition = match filter {
            HistoryFilter::All => "",
            HistoryFilter::Damaged => " AND status = 'completed' AND damage_detected = true",
            HistoryFilter::Undamaged => " AND status = 'completed' AND damage_detected = false",
        };
        let limit = limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
        let sql = format!(
            "SELECT * FROM analyses WHERE user_id = $uid{condition} ORDER BY created_at DESC{limit}"
        );

        let mut res = self
            .db
            .query(sql)
            .bind(("uid", user.as_str().to_string()))
            .await
            .map_err(backend)?;
        res.take(0).map_err(backend)
    }
}

#[async_trait]
impl AnalysisStore for SurrealAnalysisStore {
    async fn create(&self, record: NewAnalysisRecord) -> StorageResult<AnalysisRecord> {
        let record = AnalysisRecord::from_new(record);
        debug!(analysis_id = %record.id, user_id = %record.user_id, "creating analysis record");

        let _created: Option<AnalysisRow> = self
            .db
            .create("analyses")
            .content(AnalysisRow::from_record(&record))
            .await
            .map_err(backend)?;

        Ok(record)
    }

    async fn get(&self, user: &UserId, id: &AnalysisId) -> StorageResult<AnalysisRecord> {
        self.fetch(user, id).await?.into_record()
    }

    async fn list_for_user(
        &self,
        user: &UserId,
        filter: HistoryFilter,
        limit: Option<usize>,
    ) -> StorageResult<Vec<AnalysisRecord>> {
        self.rows_for_user(user, filter, limit)
            .await?
            .into_iter()
            .map(AnalysisRow::into_record)
            .collect()
    }

    async fn summary(&self, user: &UserId) -> StorageResult<UserSummary> {
        let records = self.list_for_user(user, HistoryFilter::All, None).await?;
        Ok(UserSummary::from_records(&records))
    }

    async fn delete(&self, user: &UserId, id: &AnalysisId) -> StorageResult<AnalysisRecord> {
        let record = self.fetch(user, id).await?.into_record()?;

        self.db
            .query("DELETE analyses WHERE analysis_id = $aid AND user_id = $uid")
            .bind(("aid", id.0.clone()))
            .bind(("uid", user.as_str().to_string()))
            .await
            .and_then(|response| response.check())
            .map_err(backend)?;

        debug!(analysis_id = %id, user_id = %user, "deleted analysis record");
        Ok(record)
    }
}
