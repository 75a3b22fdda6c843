use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WebautoError};

/// Durable record of one browser session. Everything needed for a later
/// host invocation to reattach: the sidecar pid and its loopback port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub id: String,
    pub browser_type: String,
    pub headless: bool,
    pub pid: u32,
    pub port: u16,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// On-disk store of session descriptors: one pretty-printed JSON file per
/// session under the sessions directory.
#[derive(Debug, Clone)]
pub struct DescriptorStore {
    dir: PathBuf,
}

impl DescriptorStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn descriptor_file(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub fn save(&self, descriptor: &SessionDescriptor) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(descriptor)?;
        fs::write(self.descriptor_file(&descriptor.id), json)?;
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<SessionDescriptor> {
        let path = self.descriptor_file(id);
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WebautoError::SessionNotFound(id.to_string())
            } else {
                e.into()
            }
        })?;
        let descriptor = serde_json::from_str(&content)?;
        Ok(descriptor)
    }

    /// Idempotent: deleting an absent descriptor succeeds.
    pub fn delete(&self, id: &str) -> Result<()> {
        match fs::remove_file(self.descriptor_file(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerate every valid descriptor on disk. Corrupt or unreadable
    /// files are skipped with a warning, never a failure.
    pub fn scan(&self) -> Vec<SessionDescriptor> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut descriptors = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(WebautoError::from)
                .and_then(|content| Ok(serde_json::from_str::<SessionDescriptor>(&content)?))
            {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => {
                    tracing::warn!("skipping invalid session file {}: {e}", path.display());
                }
            }
        }
        descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> SessionDescriptor {
        let now = Utc::now();
        SessionDescriptor {
            id: id.to_string(),
            browser_type: "chromium".to_string(),
            headless: true,
            pid: 4242,
            port: 38001,
            created_at: now,
            last_used_at: now,
        }
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(dir.path().to_path_buf());

        let descriptor = sample("ses_0a1b2c3d");
        store.save(&descriptor).unwrap();

        let loaded = store.load("ses_0a1b2c3d").unwrap();
        assert_eq!(loaded, descriptor);
    }

    #[test]
    fn timestamps_persist_as_rfc3339() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(dir.path().to_path_buf());
        store.save(&sample("ses_11223344")).unwrap();

        let raw = fs::read_to_string(store.descriptor_file("ses_11223344")).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let created = v["created_at"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(created).is_ok());
    }

    #[test]
    fn load_missing_is_session_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(dir.path().to_path_buf());

        let err = store.load("ses_deadbeef").unwrap_err();
        assert!(matches!(err, WebautoError::SessionNotFound(_)));
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(dir.path().to_path_buf());

        store.save(&sample("ses_55667788")).unwrap();
        store.delete("ses_55667788").unwrap();
        assert!(!store.descriptor_file("ses_55667788").exists());

        // Second delete of the same id still succeeds
        store.delete("ses_55667788").unwrap();
        // As does deleting something that never existed
        store.delete("ses_never").unwrap();
    }

    #[test]
    fn scan_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(dir.path().to_path_buf());

        store.save(&sample("ses_aaaa0001")).unwrap();
        store.save(&sample("ses_aaaa0002")).unwrap();
        fs::write(dir.path().join("ses_broken.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let mut ids: Vec<String> = store.scan().into_iter().map(|d| d.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["ses_aaaa0001", "ses_aaaa0002"]);
    }

    #[test]
    fn scan_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(dir.path().join("does-not-exist"));
        assert!(store.scan().is_empty());
    }
}
