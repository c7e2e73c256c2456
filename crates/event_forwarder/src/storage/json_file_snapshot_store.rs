use async_trait::async_trait;
use common::domain::{ForwarderSnapshot, PersistenceResult, SnapshotStore};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Forwarder snapshot kept in a single JSON file
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn load(&self) -> PersistenceResult<Option<ForwarderSnapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let snapshot: ForwarderSnapshot = serde_json::from_slice(&bytes)?;
        debug!(path = %self.path.display(), pending = snapshot.pending_events.len(), "loaded snapshot");
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &ForwarderSnapshot) -> PersistenceResult<()> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let payload = serde_json::to_vec_pretty(snapshot)?;
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, payload).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        debug!(path = %self.path.display(), "saved snapshot");
        Ok(())
    }
}
