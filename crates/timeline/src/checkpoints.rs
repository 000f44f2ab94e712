//! Checkpoints: full snapshots of the timeline document, independent of the
//! undo chain.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{now_millis, Seconds, Timeline, TimelineError};

string_id!(
    /// Identifier of a checkpoint.
    CheckpointId
);

/// Version written into checkpoint metadata and export bundles.
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

pub const DEFAULT_MAX_CHECKPOINTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMetadata {
    pub version: u32,
    pub action_count: usize,
    pub layer_count: usize,
    pub clip_count: usize,
    pub duration: Seconds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub project_id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub description: String,
    pub full_state: Timeline,
    pub is_auto_save: bool,
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    pub fn capture(
        project_id: impl Into<String>,
        description: impl Into<String>,
        is_auto_save: bool,
        timeline: &Timeline,
        action_count: usize,
    ) -> Self {
        Self {
            id: CheckpointId::new(),
            project_id: project_id.into(),
            timestamp: now_millis(),
            description: description.into(),
            full_state: timeline.clone(),
            is_auto_save,
            metadata: CheckpointMetadata {
                version: CHECKPOINT_FORMAT_VERSION,
                action_count,
                layer_count: timeline.layers.len(),
                clip_count: timeline.clip_count(),
                duration: timeline.playback_duration(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointPolicy {
    /// Shared cap for manual and auto checkpoints.
    pub max_checkpoints: usize,
    /// Optional tighter cap applied to auto-saves only.
    #[serde(default)]
    pub max_auto_saves: Option<usize>,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            max_checkpoints: DEFAULT_MAX_CHECKPOINTS,
            max_auto_saves: None,
        }
    }
}

/// Transport format for exporting and importing a checkpoint set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointBundle {
    pub version: u32,
    pub project_id: String,
    pub exported_at: i64,
    pub checkpoints: Vec<Checkpoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Add imported checkpoints, skipping ids already present.
    Merge,
    /// Drop the current set first.
    Replace,
}

/// Capped checkpoint list, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointManager {
    checkpoints: Vec<Checkpoint>,
    policy: CheckpointPolicy,
}

impl CheckpointManager {
    pub fn new(policy: CheckpointPolicy) -> Self {
        Self {
            checkpoints: Vec::new(),
            policy,
        }
    }

    pub fn from_checkpoints(checkpoints: Vec<Checkpoint>, policy: CheckpointPolicy) -> Self {
        let mut manager = Self::new(policy);
        manager.checkpoints = checkpoints;
        manager.sort_and_evict();
        manager
    }

    pub fn policy(&self) -> CheckpointPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: CheckpointPolicy) {
        self.policy = policy;
        self.sort_and_evict();
    }

    /// Adds a checkpoint and evicts the oldest ones past the cap.
    pub fn insert(&mut self, checkpoint: Checkpoint) -> CheckpointId {
        info!(
            id = %checkpoint.id,
            auto = checkpoint.is_auto_save,
            description = %checkpoint.description,
            "checkpoint saved"
        );
        let id = checkpoint.id.clone();
        self.checkpoints.insert(0, checkpoint);
        self.sort_and_evict();
        id
    }

    pub fn get(&self, id: &CheckpointId) -> Result<&Checkpoint, TimelineError> {
        self.checkpoints
            .iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| TimelineError::CheckpointNotFound(id.clone()))
    }

    /// Newest first.
    pub fn list(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn latest(&self) -> Option<&Checkpoint> {
        self.checkpoints.first()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn delete(&mut self, id: &CheckpointId) -> Result<Checkpoint, TimelineError> {
        let idx = self
            .checkpoints
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| TimelineError::CheckpointNotFound(id.clone()))?;
        Ok(self.checkpoints.remove(idx))
    }

    /// Removes every auto-save and returns how many were dropped.
    pub fn clear_auto_saves(&mut self) -> usize {
        let before = self.checkpoints.len();
        self.checkpoints.retain(|c| !c.is_auto_save);
        before - self.checkpoints.len()
    }

    /// Case-insensitive substring match on the description.
    pub fn search(&self, query: &str) -> Vec<&Checkpoint> {
        let query = query.to_lowercase();
        self.checkpoints
            .iter()
            .filter(|c| c.description.to_lowercase().contains(&query))
            .collect()
    }

    pub fn export(&self, project_id: &str) -> Result<String, TimelineError> {
        let bundle = CheckpointBundle {
            version: CHECKPOINT_FORMAT_VERSION,
            project_id: project_id.to_string(),
            exported_at: now_millis(),
            checkpoints: self.checkpoints.clone(),
        };
        Ok(serde_json::to_string_pretty(&bundle)?)
    }

    /// Imports a bundle produced by [`CheckpointManager::export`]. Returns the
    /// number of checkpoints added.
    pub fn import(&mut self, json: &str, mode: ImportMode) -> Result<usize, TimelineError> {
        let bundle: CheckpointBundle = serde_json::from_str(json)?;
        if bundle.version > CHECKPOINT_FORMAT_VERSION {
            return Err(TimelineError::Serialization(format!(
                "checkpoint bundle version {} is newer than supported version {}",
                bundle.version, CHECKPOINT_FORMAT_VERSION
            )));
        }
        for checkpoint in &bundle.checkpoints {
            checkpoint.full_state.validate()?;
        }

        if mode == ImportMode::Replace {
            self.checkpoints.clear();
        }
        let mut added = 0;
        for checkpoint in bundle.checkpoints {
            if self.checkpoints.iter().any(|c| c.id == checkpoint.id) {
                debug!(id = %checkpoint.id, "skipping checkpoint already present");
                continue;
            }
            self.checkpoints.push(checkpoint);
            added += 1;
        }
        self.sort_and_evict();
        info!(added, ?mode, "checkpoints imported");
        Ok(added)
    }

    fn sort_and_evict(&mut self) {
        // Stable: for equal timestamps the earlier position counts as newer.
        self.checkpoints
            .sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(max_auto) = self.policy.max_auto_saves {
            let mut autos = 0;
            self.checkpoints.retain(|c| {
                if !c.is_auto_save {
                    return true;
                }
                autos += 1;
                autos <= max_auto
            });
        }
        if self.checkpoints.len() > self.policy.max_checkpoints {
            for evicted in self.checkpoints.drain(self.policy.max_checkpoints..) {
                debug!(id = %evicted.id, "checkpoint evicted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(description: &str, timestamp: i64, auto: bool) -> Checkpoint {
        let mut checkpoint =
            Checkpoint::capture("project", description, auto, &Timeline::default(), 0);
        checkpoint.timestamp = timestamp;
        checkpoint
    }

    #[test]
    fn evicts_oldest_when_over_cap() {
        let mut manager = CheckpointManager::new(CheckpointPolicy {
            max_checkpoints: 3,
            max_auto_saves: None,
        });
        for i in 0..5 {
            manager.insert(checkpoint(&format!("cp{}", i), i, i % 2 == 0));
        }
        let names: Vec<_> = manager.list().iter().map(|c| c.description.as_str()).collect();
        assert_eq!(names, vec!["cp4", "cp3", "cp2"]);
    }

    #[test]
    fn auto_save_cap_only_touches_auto_saves() {
        let mut manager = CheckpointManager::new(CheckpointPolicy {
            max_checkpoints: 10,
            max_auto_saves: Some(1),
        });
        manager.insert(checkpoint("manual", 1, false));
        manager.insert(checkpoint("auto 1", 2, true));
        manager.insert(checkpoint("auto 2", 3, true));
        let names: Vec<_> = manager.list().iter().map(|c| c.description.as_str()).collect();
        assert_eq!(names, vec!["auto 2", "manual"]);
    }

    #[test]
    fn same_millisecond_keeps_newest_first() {
        let mut manager = CheckpointManager::default();
        manager.set_policy(CheckpointPolicy::default());
        manager.insert(checkpoint("first", 7, false));
        manager.insert(checkpoint("second", 7, false));
        assert_eq!(manager.latest().unwrap().description, "second");
    }

    #[test]
    fn delete_search_and_clear_auto_saves() {
        let mut manager = CheckpointManager::new(CheckpointPolicy::default());
        let keep = manager.insert(checkpoint("Before color grade", 1, false));
        manager.insert(checkpoint("Auto-save", 2, true));
        manager.insert(checkpoint("Auto-save", 3, true));

        assert_eq!(manager.search("COLOR").len(), 1);
        assert_eq!(manager.clear_auto_saves(), 2);
        assert_eq!(manager.len(), 1);
        manager.delete(&keep).unwrap();
        assert_eq!(
            manager.delete(&keep),
            Err(TimelineError::CheckpointNotFound(keep))
        );
    }

    #[test]
    fn export_import_round_trips() {
        let mut source = CheckpointManager::new(CheckpointPolicy::default());
        source.insert(checkpoint("a", 1, false));
        source.insert(checkpoint("b", 2, true));
        let json = source.export("project").unwrap();

        let mut merged = CheckpointManager::new(CheckpointPolicy::default());
        assert_eq!(merged.import(&json, ImportMode::Merge).unwrap(), 2);
        assert_eq!(merged.list(), source.list());
        // Importing again adds nothing.
        assert_eq!(merged.import(&json, ImportMode::Merge).unwrap(), 0);

        let mut replaced = CheckpointManager::new(CheckpointPolicy::default());
        replaced.insert(checkpoint("local", 9, false));
        assert_eq!(replaced.import(&json, ImportMode::Replace).unwrap(), 2);
        assert_eq!(replaced.list(), source.list());
    }

    #[test]
    fn import_rejects_garbage() {
        let mut manager = CheckpointManager::default();
        let err = manager.import("{not json", ImportMode::Merge).unwrap_err();
        assert!(matches!(err, TimelineError::Serialization(_)));
    }
}
