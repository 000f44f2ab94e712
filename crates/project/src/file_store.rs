use anyhow::{bail, Context, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::SnapshotStore;

/// One JSON document per project inside a directory.
///
/// Writes go to a temporary sibling file which is then renamed over the
/// target, so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating snapshot directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, project_id: &str) -> Result<PathBuf> {
        let valid = !project_id.is_empty()
            && project_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            bail!("project id {:?} cannot be used as a file name", project_id);
        }
        Ok(self.dir.join(format!("{}.json", project_id)))
    }
}

impl SnapshotStore for JsonFileStore {
    fn save(&self, project_id: &str, json: &str) -> Result<()> {
        let target = self.file_for(project_id)?;
        let tmp = target.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)
            .with_context(|| format!("replacing {}", target.display()))?;
        debug!(project_id, path = %target.display(), "snapshot written");
        Ok(())
    }

    fn load(&self, project_id: &str) -> Result<Option<String>> {
        let path = self.file_for(project_id)?;
        match fs::read_to_string(&path) {
            Ok(json) => Ok(Some(json)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn delete(&self, project_id: &str) -> Result<()> {
        let path = self.file_for(project_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("removing {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("snapshots")).unwrap();

        assert_eq!(store.load("p-1").unwrap(), None);
        store.save("p-1", r#"{"a":1}"#).unwrap();
        store.save("p-1", r#"{"a":2}"#).unwrap();
        assert_eq!(store.load("p-1").unwrap().as_deref(), Some(r#"{"a":2}"#));
        assert!(!store.dir().join("p-1.json.tmp").exists());

        store.delete("p-1").unwrap();
        store.delete("p-1").unwrap();
        assert_eq!(store.load("p-1").unwrap(), None);
    }

    #[test]
    fn path_like_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        assert!(store.save("../escape", "{}").is_err());
        assert!(store.load("").is_err());
    }
}
