//! Container data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::new_etag;

/// User-defined container metadata.
///
/// Writing a `MetadataSet` to a container replaces whatever was there before.
pub type MetadataSet = BTreeMap<String, String>;

/// System properties of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerProperties {
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

impl Default for ContainerProperties {
    fn default() -> Self {
        Self {
            etag: new_etag(),
            last_modified: Utc::now(),
        }
    }
}

impl ContainerProperties {
    /// Updates the ETag and last modified time.
    pub fn update_etag(&mut self) {
        self.etag = new_etag();
        self.last_modified = Utc::now();
    }
}

/// A container as held by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerModel {
    /// Container name.
    pub name: String,
    /// Container properties.
    pub properties: ContainerProperties,
    /// User-defined metadata.
    pub metadata: MetadataSet,
}

impl ContainerModel {
    /// Creates a new container model with empty metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: ContainerProperties::default(),
            metadata: MetadataSet::new(),
        }
    }
}
