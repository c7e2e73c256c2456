use async_trait::async_trait;
use common::domain::{DirectoryResult, RegistrySnapshot, ZoneDirectory};
use std::path::PathBuf;

/// Registry export read from a JSON file on every snapshot
#[derive(Debug, Clone)]
pub struct JsonFileZoneDirectory {
    path: PathBuf,
}

impl JsonFileZoneDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ZoneDirectory for JsonFileZoneDirectory {
    async fn snapshot(&self) -> DirectoryResult<RegistrySnapshot> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::DirectoryError;

    #[tokio::test]
    async fn test_reads_registry_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(
            &path,
            r#"{
                "entities": [{"entity_id": "light.kitchen", "device_id": "d1"}],
                "devices": [{"id": "d1", "area_id": "kitchen"}]
            }"#,
        )
        .unwrap();

        let snapshot = JsonFileZoneDirectory::new(path).snapshot().await.unwrap();

        assert_eq!(snapshot.entities.len(), 1);
        assert_eq!(snapshot.entities[0].area_id, None);
        assert_eq!(snapshot.devices[0].area_id.as_deref(), Some("kitchen"));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();

        let result = JsonFileZoneDirectory::new(dir.path().join("absent.json"))
            .snapshot()
            .await;

        assert!(matches!(result, Err(DirectoryError::Io(_))));
    }
}
