use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use timeline::{CheckpointPolicy, DEFAULT_MAX_CHECKPOINTS, DEFAULT_MAX_HISTORY_SIZE};

use crate::{Result, SessionError};

pub const DEFAULT_MAX_VERSIONS: usize = 50;

/// Session tuning. Every field has a default, so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cap of the action log and the undo stack.
    pub max_history_size: usize,

    /// Shared cap for manual and auto checkpoints.
    pub max_checkpoints: usize,

    /// Separate cap for auto-save checkpoints, if any.
    pub max_auto_saves: Option<usize>,

    /// Period of the auto-save timer.
    pub auto_save_interval_secs: u64,

    /// Quiet window before a debounced snapshot write.
    pub persist_debounce_ms: u64,

    /// Stored snapshot versions kept per project besides the current one.
    /// `null` keeps every version.
    pub max_versions: Option<usize>,

    /// Directory holding the project database. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
            max_checkpoints: DEFAULT_MAX_CHECKPOINTS,
            max_auto_saves: None,
            auto_save_interval_secs: 30,
            persist_debounce_ms: 1000,
            max_versions: Some(DEFAULT_MAX_VERSIONS),
            data_dir: None,
        }
    }
}

impl SessionConfig {
    /// Reads a JSON config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(SessionError::Config(format!(
                    "reading {}: {}",
                    path.display(),
                    err
                )))
            }
        };
        let config: Self = serde_json::from_str(&raw)
            .map_err(|err| SessionError::Config(format!("parsing {}: {}", path.display(), err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_history_size == 0 {
            return Err(SessionError::Config("max_history_size must be at least 1".into()));
        }
        if self.max_checkpoints == 0 {
            return Err(SessionError::Config("max_checkpoints must be at least 1".into()));
        }
        if self.auto_save_interval_secs == 0 {
            return Err(SessionError::Config(
                "auto_save_interval_secs must be at least 1".into(),
            ));
        }
        if self.max_versions == Some(0) {
            return Err(SessionError::Config("max_versions must be at least 1".into()));
        }
        Ok(())
    }

    pub fn checkpoint_policy(&self) -> CheckpointPolicy {
        CheckpointPolicy {
            max_checkpoints: self.max_checkpoints,
            max_auto_saves: self.max_auto_saves,
        }
    }

    pub fn auto_save_interval(&self) -> Duration {
        Duration::from_secs(self.auto_save_interval_secs)
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    pub fn db_path(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.join("projects.db"),
            None => project::default_db_path(),
        }
    }
}
