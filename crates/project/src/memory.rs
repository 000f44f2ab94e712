use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::SnapshotStore;

/// Process-local store, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
    }
}

impl SnapshotStore for MemoryStore {
    fn save(&self, project_id: &str, json: &str) -> Result<()> {
        self.snapshots
            .lock()
            .insert(project_id.to_string(), json.to_string());
        Ok(())
    }

    fn load(&self, project_id: &str) -> Result<Option<String>> {
        Ok(self.snapshots.lock().get(project_id).cloned())
    }

    fn delete(&self, project_id: &str) -> Result<()> {
        self.snapshots.lock().remove(project_id);
        Ok(())
    }
}
