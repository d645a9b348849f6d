//! SurrealDB connection setup
//!
//! Resolution order for [`connect_from_env`]:
//! 1. `SURREALDB_ENDPOINT` + credentials (cloud / remote server)
//! 2. `SURREALDB_URL` (any engine URL, no auth)
//! 3. local persistence under `.damage/db`

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::info;

use crate::error::StateError;
use crate::migrations;
use crate::Result;

pub const DEFAULT_NAMESPACE: &str = "damage";
pub const DEFAULT_DATABASE: &str = "analyses";
pub const DEFAULT_LOCAL_PATH: &str = ".damage/db";

/// Credentials for an authenticated SurrealDB server
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g. "wss://xxx.surrealdb.cloud")
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    /// Root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    /// Override the namespace (default `damage`).
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Override the database (default `analyses`).
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Sign in as a root user instead of a database user.
    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Reads `SURREALDB_ENDPOINT`, `SURREALDB_USERNAME`, `SURREALDB_PASSWORD`
    /// (required) and `SURREALDB_NAMESPACE`, `SURREALDB_DATABASE`,
    /// `SURREALDB_ROOT` (optional).
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;

        let mut config = Self::new(endpoint, username, password).with_root(
            std::env::var("SURREALDB_ROOT")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        );
        if let Ok(ns) = std::env::var("SURREALDB_NAMESPACE") {
            config = config.with_namespace(ns);
        }
        if let Ok(db) = std::env::var("SURREALDB_DATABASE") {
            config = config.with_database(db);
        }
        Ok(config)
    }
}

async fn select_and_migrate(db: Surreal<Any>, namespace: &str, database: &str) -> Result<Surreal<Any>> {
    db.use_ns(namespace)
        .use_db(database)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;
    migrations::init_schema(&db).await?;
    Ok(db)
}

/// Connect to `url` (`mem://`, `surrealkv://path`, `ws://host:port`, ...)
/// with the default namespace and database.
pub async fn connect_url(url: &str) -> Result<Surreal<Any>> {
    if let Some(path) = url.strip_prefix("surrealkv://") {
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!("Failed to create database directory {path}: {e}"))
        })?;
    }
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;
    let db = select_and_migrate(db, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await?;
    info!(url = %url, "connected to SurrealDB");
    Ok(db)
}

pub async fn connect_cloud(config: &CloudConfig) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    if config.is_root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
    }

    let db = select_and_migrate(db, &config.namespace, &config.database).await?;
    info!(endpoint = %config.endpoint, "connected to SurrealDB (authenticated)");
    Ok(db)
}

/// Connect using the environment chain described in the module docs.
pub async fn connect_from_env() -> Result<Surreal<Any>> {
    if let Ok(config) = CloudConfig::from_env() {
        return connect_cloud(&config).await;
    }
    if let Ok(url) = std::env::var("SURREALDB_URL") {
        return connect_url(&url).await;
    }
    info!(
        path = DEFAULT_LOCAL_PATH,
        "no SurrealDB config in environment, using local persistence"
    );
    connect_url(&format!("surrealkv://{DEFAULT_LOCAL_PATH}")).await
}
