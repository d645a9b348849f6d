//! Submission orchestration: store the upload, analyze it, record the outcome.

use std::sync::Arc;
use std::time::Instant;

use damage_core::{obs, AnalysisError, AnalysisPipeline, AnalysisResult, AnalysisSpan, METRICS};
use damage_state::{
    AnalysisId, AnalysisRecord, AnalysisStore, BlobStore, FailureInfo, HistoryFilter,
    NewAnalysisRecord, UserId, UserSummary,
};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::error::ServiceError;

/// One uploaded image.
#[derive(Debug, Clone)]
pub struct Submission {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Submission {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// Ties the pipeline to its collaborators.
///
/// Every submission that reaches the pipeline leaves exactly one record:
/// `Completed` with the result, or `Failed` with the error kind.
#[derive(Clone)]
pub struct AnalysisService {
    pipeline: Arc<AnalysisPipeline>,
    store: Arc<dyn AnalysisStore>,
    blobs: Arc<dyn BlobStore>,
}

impl AnalysisService {
    pub fn new(
        pipeline: Arc<AnalysisPipeline>,
        store: Arc<dyn AnalysisStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            pipeline,
            store,
            blobs,
        }
    }

    pub fn pipeline(&self) -> &AnalysisPipeline {
        &self.pipeline
    }

    /// Save, analyze and record one image.
    ///
    /// A pipeline failure is recorded before it is returned, so the error
    /// carries the id of the `Failed` record.
    pub async fn submit(
        &self,
        user: &UserId,
        submission: Submission,
    ) -> Result<AnalysisRecord, ServiceError> {
        let start = Instant::now();
        let Submission { file_name, bytes } = submission;

        let image = self.blobs.save(user, &file_name, &bytes).await?;

        let outcome = self.run_pipeline(user, &file_name, bytes).await;

        let new_record = match &outcome {
            Ok(result) => {
                NewAnalysisRecord::completed(user.clone(), image.clone(), &file_name, result.clone())
            }
            Err(e) => NewAnalysisRecord::failed(
                user.clone(),
                image.clone(),
                &file_name,
                FailureInfo::from(e),
            ),
        };

        let record = match self.store.create(new_record).await {
            Ok(record) => record,
            Err(e) => {
                obs::emit_persist_error(user.as_str(), &e);
                if let Err(cleanup) = self.blobs.delete(&image).await {
                    warn!(locator = %image, error = %cleanup, "failed to remove orphaned image");
                }
                return Err(e.into());
            }
        };

        info!(
            analysis_id = %record.id,
            user_id = %user,
            status = record.status.as_str(),
            duration_ms = start.elapsed().as_millis() as u64,
            "analysis recorded"
        );

        match outcome {
            Ok(_) => Ok(record),
            Err(source) => Err(ServiceError::Analysis {
                record_id: record.id,
                source,
            }),
        }
    }

    /// Submit several images for one user, at most `concurrency` at a time.
    /// Outcomes come back in input order.
    pub async fn submit_batch(
        &self,
        user: &UserId,
        submissions: Vec<Submission>,
        concurrency: usize,
    ) -> Vec<Result<AnalysisRecord, ServiceError>> {
        stream::iter(submissions)
            .map(|submission| self.submit(user, submission))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// Run the CPU-bound pipeline on the blocking pool.
    ///
    /// A panicked or cancelled task becomes an `Inference` failure, so it is
    /// recorded like any other.
    async fn run_pipeline(
        &self,
        user: &UserId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let start = Instant::now();
        let pipeline = Arc::clone(&self.pipeline);
        let span_user = user.as_str().to_string();
        let span_image = file_name.to_string();

        match tokio::task::spawn_blocking(move || {
            let _span = AnalysisSpan::enter(&span_user, &span_image);
            pipeline.analyze(&bytes)
        })
        .await
        {
            Ok(outcome) => outcome,
            Err(join) => {
                let err = AnalysisError::Inference(format!("analysis task aborted: {join}"));
                obs::emit_analysis_failed(
                    err.kind(),
                    &err,
                    start.elapsed().as_millis() as u64,
                );
                METRICS.record_failed(err.kind());
                Err(err)
            }
        }
    }

    /// The user's analyses, newest first.
    pub async fn history(
        &self,
        user: &UserId,
        filter: HistoryFilter,
        limit: Option<usize>,
    ) -> Result<Vec<AnalysisRecord>, ServiceError> {
        Ok(self.store.list_for_user(user, filter, limit).await?)
    }

    pub async fn get(&self, user: &UserId, id: &AnalysisId) -> Result<AnalysisRecord, ServiceError> {
        Ok(self.store.get(user, id).await?)
    }

    pub async fn summary(&self, user: &UserId) -> Result<UserSummary, ServiceError> {
        Ok(self.store.summary(user).await?)
    }

    /// Delete the record, then its image. A leftover image is logged, not
    /// reported: the record is already gone.
    pub async fn delete(
        &self,
        user: &UserId,
        id: &AnalysisId,
    ) -> Result<AnalysisRecord, ServiceError> {
        let record = self.store.delete(user, id).await?;
        if let Err(e) = self.blobs.delete(&record.image).await {
            warn!(analysis_id = %id, locator = %record.image, error = %e, "failed to remove image");
        }
        Ok(record)
    }

    /// Load the stored image bytes behind a record.
    pub async fn image(&self, user: &UserId, id: &AnalysisId) -> Result<Vec<u8>, ServiceError> {
        let record = self.store.get(user, id).await?;
        Ok(self.blobs.load(&record.image).await?)
    }
}

impl std::fmt::Debug for AnalysisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisService")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
