//! Errors surfaced by [`AnalysisService`](crate::AnalysisService).

use damage_core::{AnalysisError, AnalysisErrorKind};
use damage_state::{AnalysisId, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The pipeline failed. A `Failed` record was written under `record_id`.
    #[error("analysis {record_id} failed: {source}")]
    Analysis {
        record_id: AnalysisId,
        #[source]
        source: AnalysisError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ServiceError {
    pub fn analysis_kind(&self) -> Option<AnalysisErrorKind> {
        match self {
            ServiceError::Analysis { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// Whether the submitted input, not the system, is to blame.
    pub fn is_client_fault(&self) -> bool {
        self.analysis_kind()
            .is_some_and(AnalysisErrorKind::is_client_fault)
    }
}
