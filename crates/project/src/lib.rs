use anyhow::Result;
use std::path::PathBuf;

mod db;
pub use db::*;
mod file_store;
pub use file_store::*;
mod memory;
pub use memory::*;

pub fn app_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("timeline_editor")
}

/// Default location of the project database.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("projects.db")
}

/// Durable storage for serialized project snapshots, keyed by project id.
///
/// Implementations write whole documents atomically: a reader sees either the
/// previous snapshot or the new one, never a partial write. Failures are
/// reported to the caller and never retried here.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, project_id: &str, json: &str) -> Result<()>;
    fn load(&self, project_id: &str) -> Result<Option<String>>;
    fn delete(&self, project_id: &str) -> Result<()>;
}
