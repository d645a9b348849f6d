//! Damage-State: persistence for vehicle damage analyses
//!
//! ## Key Components
//!
//! - `AnalysisStore`: immutable, per-user analysis records
//! - `BlobStore`: uploaded image bytes
//! - `SurrealAnalysisStore`: SurrealDB backend (`mem://`, `surrealkv://`, remote)
//! - `FsBlobStore`: atomic filesystem blob storage
//! - `fakes`: in-memory implementations of both traits

mod connection;
mod error;
pub mod fakes;
pub mod fs_blob;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use connection::{connect_cloud, connect_from_env, connect_url, CloudConfig};
pub use error::{StateError, StorageError};
pub use fs_blob::FsBlobStore;
pub use storage_traits::{
    AnalysisId, AnalysisOutcome, AnalysisRecord, AnalysisStore, BlobStore, FailureInfo,
    HistoryFilter, ImageLocator, NewAnalysisRecord, RecordStatus, StorageResult, UserId,
    UserSummary,
};
pub use surreal_store::SurrealAnalysisStore;

/// Result type for damage-state setup operations
pub type Result<T> = std::result::Result<T, StateError>;
