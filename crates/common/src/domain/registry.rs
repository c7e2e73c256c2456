use crate::domain::result::DirectoryResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Entity registry row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityEntry {
    pub entity_id: String,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Device registry row; its area is inherited by entities without their own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,
    #[serde(default)]
    pub area_id: Option<String>,
}

/// Bulk copy of the host registries, taken once per resolver build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub entities: Vec<EntityEntry>,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// Source of registry snapshots used to build the zone resolver
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ZoneDirectory: Send + Sync {
    async fn snapshot(&self) -> DirectoryResult<RegistrySnapshot>;
}
