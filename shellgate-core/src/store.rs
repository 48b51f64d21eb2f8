use std::io::ErrorKind;
use std::path::PathBuf;

use shellgate_common::{ShellgateConfig, Target};
use tracing::*;

/// Read-only view of the target inventory. The inventory API owns writes and
/// replaces the file atomically (temp file + rename), so each read observes
/// one consistent generation of the list.
#[derive(Debug, Clone)]
pub struct TargetStore {
    path: PathBuf,
}

impl TargetStore {
    pub fn new(config: &ShellgateConfig) -> Self {
        Self {
            path: config.targets_path(),
        }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Takes a fresh snapshot. A missing, unreadable or non-JSON file
    /// degrades to an empty list; sessions opened against it will fail
    /// with "unknown target" rather than bringing the service down.
    pub async fn snapshot(&self) -> TargetSnapshot {
        let targets = match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(targets) => targets,
                Err(error) => {
                    warn!(path=%self.path.display(), %error, "Target store is not valid JSON, treating as empty");
                    vec![]
                }
            },
            Err(error) if error.kind() == ErrorKind::NotFound => vec![],
            Err(error) => {
                warn!(path=%self.path.display(), %error, "Failed to read the target store, treating as empty");
                vec![]
            }
        };
        TargetSnapshot { targets }
    }
}

pub struct TargetSnapshot {
    targets: Vec<Target>,
}

impl TargetSnapshot {
    pub fn lookup(&self, id: &str) -> Option<&Target> {
        self.targets.iter().find(|target| target.id == id)
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn into_targets(self) -> Vec<Target> {
        self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_content(content: &[u8]) -> (tempfile::TempDir, TargetStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(&path, content).unwrap();
        (dir, TargetStore::with_path(path))
    }

    #[tokio::test]
    async fn test_lookup_hit_and_miss() {
        let (_dir, store) = store_with_content(
            br#"[{"id":"t1","host":"10.0.0.2","port":22,"username":"ada"}]"#,
        );
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.lookup("t1").unwrap().host, "10.0.0.2");
        assert!(snapshot.lookup("missing").is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = TargetStore::with_path(dir.path().join("servers.json"));
        assert!(store.snapshot().await.targets().is_empty());
    }

    #[tokio::test]
    async fn test_garbage_file_is_an_empty_list() {
        let (_dir, store) = store_with_content(b"not json at all");
        assert!(store.snapshot().await.targets().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_later_writes() {
        let (dir, store) = store_with_content(
            br#"[{"id":"t1","host":"10.0.0.2","username":"ada"}]"#,
        );
        let snapshot = store.snapshot().await;

        // Simulate the inventory API replacing the file via rename-over.
        let replacement = dir.path().join("servers.json.tmp");
        std::fs::write(&replacement, b"[]").unwrap();
        std::fs::rename(&replacement, dir.path().join("servers.json")).unwrap();

        assert!(snapshot.lookup("t1").is_some());
        assert!(store.snapshot().await.lookup("t1").is_none());
    }
}
