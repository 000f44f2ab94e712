use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::SnapshotStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
    pub updated_at: i64,
}

/// One stored revision of a project's timeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVersion {
    pub project_id: String,
    pub version: i64,
    pub description: Option<String>,
    pub is_current: bool,
    /// Epoch milliseconds.
    pub created_at: i64,
    pub size_bytes: usize,
}

/// SQLite-backed project store. Every save becomes a new numbered version and
/// exactly one version per project is current.
pub struct ProjectDb {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    max_versions: Option<usize>,
}

impl ProjectDb {
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening project database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", &"WAL")?;
        conn.pragma_update(None, "synchronous", &"NORMAL")?;
        conn.pragma_update(None, "foreign_keys", &"ON")?;
        apply_migrations(&conn)?;
        debug!(path = %path.display(), "project database ready");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
            max_versions: None,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", &"ON")?;
        apply_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            max_versions: None,
        })
    }

    /// Keep at most `max` versions per project. The current version is never pruned.
    pub fn with_max_versions(mut self, max: Option<usize>) -> Self {
        self.max_versions = max.map(|m| m.max(1));
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn ensure_project(&self, id: &str, name: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.conn.lock().execute(
            "INSERT OR IGNORE INTO projects(id, name, created_at, updated_at) VALUES(?1, ?2, ?3, ?3)",
            params![id, name, now],
        )?;
        Ok(())
    }

    pub fn list_projects(&self) -> Result<Vec<ProjectInfo>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, updated_at FROM projects ORDER BY updated_at DESC, created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ProjectInfo {
                id: row.get(0)?,
                name: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn delete_project(&self, project_id: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM timeline_states WHERE project_id = ?1",
            params![project_id],
        )?;
        tx.execute("DELETE FROM projects WHERE id = ?1", params![project_id])?;
        tx.commit()?;
        info!(project_id, "project deleted");
        Ok(())
    }

    /// Stores `json` as the next version and makes it current.
    pub fn save_version(
        &self,
        project_id: &str,
        json: &str,
        description: Option<&str>,
    ) -> Result<StateVersion> {
        serde_json::from_str::<serde::de::IgnoredAny>(json)
            .context("refusing to store a malformed snapshot")?;
        let now = chrono::Utc::now().timestamp_millis();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO projects(id, name, created_at, updated_at) VALUES(?1, ?1, ?2, ?2)",
            params![project_id, now],
        )?;
        let version: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM timeline_states WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE timeline_states SET is_current = 0 WHERE project_id = ?1 AND is_current = 1",
            params![project_id],
        )?;
        tx.execute(
            "INSERT INTO timeline_states(project_id, version, state_json, description, is_current, created_at)
             VALUES(?1, ?2, ?3, ?4, 1, ?5)",
            params![project_id, version, json, description, now],
        )?;
        tx.execute(
            "UPDATE projects SET updated_at = ?2 WHERE id = ?1",
            params![project_id, now],
        )?;
        if let Some(max) = self.max_versions {
            let pruned = tx.execute(
                "DELETE FROM timeline_states
                 WHERE project_id = ?1 AND is_current = 0 AND version NOT IN (
                     SELECT version FROM timeline_states WHERE project_id = ?1
                     ORDER BY version DESC LIMIT ?2)",
                params![project_id, max as i64],
            )?;
            if pruned > 0 {
                debug!(project_id, pruned, "pruned old timeline versions");
            }
        }
        tx.commit()?;

        debug!(project_id, version, bytes = json.len(), "timeline state saved");
        Ok(StateVersion {
            project_id: project_id.to_string(),
            version,
            description: description.map(str::to_string),
            is_current: true,
            created_at: now,
            size_bytes: json.len(),
        })
    }

    pub fn current(&self, project_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let json = conn
            .query_row(
                "SELECT state_json FROM timeline_states WHERE project_id = ?1 AND is_current = 1 LIMIT 1",
                params![project_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json)
    }

    /// Versions newest first.
    pub fn history(&self, project_id: &str, limit: usize, skip: usize) -> Result<Vec<StateVersion>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT project_id, version, description, is_current, created_at, LENGTH(CAST(state_json AS BLOB))
             FROM timeline_states WHERE project_id = ?1
             ORDER BY version DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![project_id, limit as i64, skip as i64], |row| {
            Ok(StateVersion {
                project_id: row.get(0)?,
                version: row.get(1)?,
                description: row.get(2)?,
                is_current: row.get::<_, i64>(3)? != 0,
                created_at: row.get(4)?,
                size_bytes: row.get::<_, i64>(5)? as usize,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn load_version(&self, project_id: &str, version: i64) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let json = conn
            .query_row(
                "SELECT state_json FROM timeline_states WHERE project_id = ?1 AND version = ?2",
                params![project_id, version],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json)
    }

    /// Re-saves an old version as the new current one. History is kept linear.
    pub fn restore_version(&self, project_id: &str, version: i64) -> Result<StateVersion> {
        let Some(json) = self.load_version(project_id, version)? else {
            bail!("project {} has no version {}", project_id, version);
        };
        let description = format!("Restored from version {}", version);
        let restored = self.save_version(project_id, &json, Some(&description))?;
        info!(project_id, from = version, to = restored.version, "timeline version restored");
        Ok(restored)
    }

    pub fn delete_version(&self, project_id: &str, version: i64) -> Result<()> {
        let conn = self.conn.lock();
        let is_current: Option<i64> = conn
            .query_row(
                "SELECT is_current FROM timeline_states WHERE project_id = ?1 AND version = ?2",
                params![project_id, version],
                |row| row.get(0),
            )
            .optional()?;
        match is_current {
            None => bail!("project {} has no version {}", project_id, version),
            Some(flag) if flag != 0 => {
                bail!("version {} is current and cannot be deleted", version)
            }
            Some(_) => {
                conn.execute(
                    "DELETE FROM timeline_states WHERE project_id = ?1 AND version = ?2",
                    params![project_id, version],
                )?;
                Ok(())
            }
        }
    }
}

impl SnapshotStore for ProjectDb {
    fn save(&self, project_id: &str, json: &str) -> Result<()> {
        self.save_version(project_id, json, None).map(|_| ())
    }

    fn load(&self, project_id: &str) -> Result<Option<String>> {
        self.current(project_id)
    }

    fn delete(&self, project_id: &str) -> Result<()> {
        self.delete_project(project_id)
    }
}

fn apply_migrations(conn: &Connection) -> Result<()> {
    // Simple migration tracking by name
    conn.execute_batch(include_str!("../migrations/V0001__init.sql"))?;
    conn.execute(
        "INSERT OR IGNORE INTO migrations(name, applied_at) VALUES(?1, strftime('%s','now'))",
        params!["V0001__init"],
    )?;
    conn.execute_batch(include_str!("../migrations/V0002__timeline_states.sql"))?;
    conn.execute(
        "INSERT OR IGNORE INTO migrations(name, applied_at) VALUES(?1, strftime('%s','now'))",
        params!["V0002__timeline_states"],
    )?;
    Ok(())
}
