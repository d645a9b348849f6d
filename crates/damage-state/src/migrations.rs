//! SurrealDB schema initialization
//!
//! Safe to run on every connection: every definition is `IF NOT EXISTS`.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StateError;
use crate::Result;

pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing damage analysis schema");
    init_analyses_table(db).await?;
    Ok(())
}

/// `analyses` table
///
/// ```text
/// TABLE analyses {
///   analysis_id:      STRING (unique)
///   user_id:          STRING (indexed)
///   image:            STRING (blob locator)
///   file_name:        STRING
///   status:           STRING (completed | failed)
///   damage_detected:  BOOL
///   total_cost:       FLOAT
///   result:           OBJECT?
///   failure_kind:     STRING?
///   failure_message:  STRING?
///   created_at:       DATETIME
/// }
/// ```
///
/// Rows are never updated; the application only creates, reads and deletes.
async fn init_analyses_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing analyses table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS analyses SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS idx_analysis_id ON TABLE analyses COLUMNS analysis_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_user_id ON TABLE analyses COLUMNS user_id;
        DEFINE INDEX IF NOT EXISTS idx_user_created_at ON TABLE analyses COLUMNS user_id, created_at;
        DEFINE INDEX IF NOT EXISTS idx_user_damage ON TABLE analyses COLUMNS user_id, status, damage_detected;
    "#;

    db.query(sql)
        .await
        .and_then(|response| response.check())
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    info!("analyses table initialized");
    Ok(())
}
