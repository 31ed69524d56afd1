use std::sync::Arc;

use rusqlite::Connection;
use serde::Deserialize;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::session::SessionInfo;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub session: SessionInfo,
}

/// Everything one request may touch. `db` is `None` when the store could not be opened;
/// handlers that need it answer `database_unavailable`.
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub db: Option<Connection>,
    /// Whether `export.lectureCsv` may write to a caller-chosen `outPath`.
    /// Only the local stdio transport enables it.
    pub file_export: bool,
}
