//! Damage intake: the submission service behind the `damage` CLI.
//!
//! - Saves each upload through a [`BlobStore`](damage_state::BlobStore)
//! - Runs the [`AnalysisPipeline`](damage_core::AnalysisPipeline) on the
//!   blocking pool
//! - Records the outcome in an [`AnalysisStore`](damage_state::AnalysisStore)

pub mod error;
pub mod service;

pub use error::ServiceError;
pub use service::{AnalysisService, Submission};
