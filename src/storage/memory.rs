//! In-process backend holding containers and blobs in memory.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use dashmap::DashMap;
use md5::{Digest, Md5};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ErrorCode, ServiceError, ServiceResult};
use crate::models::{
    BlobModel, BlobPage, BlobProperties, ContainerModel, ContainerProperties, MetadataSet,
    UploadReceipt,
};

use super::{BlobBackend, DEFAULT_LIST_PAGE_SIZE};

/// Key type for blobs - uses Arc<str> to avoid allocations.
type BlobKey = (Arc<str>, Arc<str>);

/// In-memory implementation of [`BlobBackend`].
///
/// Behaves like the service for everything the lifecycle touches: names are
/// unique, missing resources are reported with the service's error codes and
/// listings are ordered by name and paged with a continuation marker.
pub struct MemoryBackend {
    /// Containers indexed by name.
    containers: DashMap<Arc<str>, ContainerModel>,

    /// Blobs indexed by (container, name).
    blobs: DashMap<BlobKey, BlobModel>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            containers: DashMap::new(),
            blobs: DashMap::new(),
        }
    }

    /// Names of all containers, sorted.
    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.containers.iter().map(|c| c.key().to_string()).collect();
        names.sort();
        names
    }

    #[inline]
    fn blob_key(container: &str, name: &str) -> BlobKey {
        (Arc::from(container), Arc::from(name))
    }

    fn ensure_container(&self, name: &str) -> ServiceResult<()> {
        if self.containers.contains_key(name) {
            Ok(())
        } else {
            Err(ServiceError::new(ErrorCode::ContainerNotFound))
        }
    }
}

/// Checks metadata names the way the service does.
///
/// Names must be C# identifiers and are compared without regard to case, so
/// two names that differ only in case are a duplicate.
fn validate_metadata(metadata: &MetadataSet) -> ServiceResult<()> {
    let mut seen = std::collections::HashSet::new();
    for name in metadata.keys() {
        let mut chars = name.chars();
        let valid = chars
            .next()
            .is_some_and(|c| c == '_' || c.is_alphabetic())
            && chars.all(|c| c == '_' || c.is_alphanumeric());
        if !valid {
            return Err(ServiceError::with_message(
                ErrorCode::InvalidMetadata,
                format!("Metadata name '{}' is not a valid identifier", name),
            ));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(ServiceError::with_message(
                ErrorCode::InvalidMetadata,
                format!("Metadata name '{}' is given more than once", name),
            ));
        }
    }
    Ok(())
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn probe(&self) -> ServiceResult<()> {
        Ok(())
    }

    async fn create_container(&self, name: &str) -> ServiceResult<ContainerProperties> {
        let key: Arc<str> = Arc::from(name);
        match self.containers.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(ServiceError::new(ErrorCode::ContainerAlreadyExists))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let container = ContainerModel::new(name);
                let properties = container.properties.clone();
                slot.insert(container);
                Ok(properties)
            }
        }
    }

    async fn delete_container(&self, name: &str) -> ServiceResult<()> {
        self.containers
            .remove(name)
            .ok_or_else(|| ServiceError::new(ErrorCode::ContainerNotFound))?;

        // Blobs go with their container
        self.blobs.retain(|(container, _), _| &**container != name);
        debug!(container = name, "memory backend dropped container");
        Ok(())
    }

    async fn get_container(&self, name: &str) -> ServiceResult<ContainerModel> {
        self.containers
            .get(name)
            .map(|c| c.value().clone())
            .ok_or_else(|| ServiceError::new(ErrorCode::ContainerNotFound))
    }

    async fn set_container_metadata(
        &self,
        name: &str,
        metadata: &MetadataSet,
    ) -> ServiceResult<ContainerProperties> {
        validate_metadata(metadata)?;
        let mut container = self
            .containers
            .get_mut(name)
            .ok_or_else(|| ServiceError::new(ErrorCode::ContainerNotFound))?;

        container.metadata = metadata.clone();
        container.properties.update_etag();
        Ok(container.properties.clone())
    }

    async fn list_blobs(
        &self,
        container: &str,
        marker: Option<&str>,
        maxresults: Option<u32>,
    ) -> ServiceResult<BlobPage> {
        self.ensure_container(container)?;
        let maxresults = match maxresults.unwrap_or(DEFAULT_LIST_PAGE_SIZE) {
            0 => {
                return Err(ServiceError::with_message(
                    ErrorCode::InvalidQueryParameterValue,
                    "maxresults must be greater than zero",
                ))
            }
            n => n as usize,
        };

        // Collect matching names first (minimal lock time)
        let mut matching_names: Vec<Arc<str>> = self
            .blobs
            .iter()
            .filter_map(|entry| {
                let (c, name) = entry.key();
                if &**c != container {
                    return None;
                }
                if let Some(m) = marker {
                    if &**name <= m {
                        return None;
                    }
                }
                Some(name.clone())
            })
            .collect();

        matching_names.sort();

        // One extra tells us whether there is another page
        matching_names.truncate(maxresults + 1);
        let has_more = matching_names.len() > maxresults;
        if has_more {
            matching_names.pop();
        }

        let container_arc: Arc<str> = Arc::from(container);
        let mut blobs = Vec::with_capacity(matching_names.len());
        for name in &matching_names {
            let key = (container_arc.clone(), name.clone());
            if let Some(b) = self.blobs.get(&key) {
                blobs.push(b.value().summary());
            }
        }

        let next_marker = if has_more {
            matching_names.last().map(|n| n.to_string())
        } else {
            None
        };

        Ok(BlobPage { blobs, next_marker })
    }

    async fn put_blob(
        &self,
        container: &str,
        name: &str,
        content: Bytes,
        content_md5: Option<&str>,
    ) -> ServiceResult<UploadReceipt> {
        self.ensure_container(container)?;

        let computed_md5 = BASE64.encode(Md5::digest(&content));
        if let Some(expected) = content_md5 {
            if expected != computed_md5 {
                return Err(ServiceError::new(ErrorCode::Md5Mismatch));
            }
        }

        let key = Self::blob_key(container, name);
        let properties = match self.blobs.get(&key) {
            Some(existing) => existing.properties.overwritten(content.len() as u64),
            None => BlobProperties::new(content.len() as u64),
        };

        let mut blob = BlobModel::new(container.to_string(), name.to_string(), content);
        blob.properties = BlobProperties {
            content_md5: Some(computed_md5),
            ..properties
        };

        let receipt = UploadReceipt {
            etag: blob.properties.etag.clone(),
            last_modified: blob.properties.last_modified,
            content_md5: blob.properties.content_md5.clone(),
        };
        self.blobs.insert(key, blob);
        Ok(receipt)
    }

    async fn get_blob(&self, container: &str, name: &str) -> ServiceResult<(BlobProperties, Bytes)> {
        self.ensure_container(container)?;
        self.blobs
            .get(&Self::blob_key(container, name))
            .map(|b| (b.properties.clone(), b.content.clone()))
            .ok_or_else(|| ServiceError::new(ErrorCode::BlobNotFound))
    }

    async fn get_blob_properties(&self, container: &str, name: &str) -> ServiceResult<BlobProperties> {
        self.ensure_container(container)?;
        self.blobs
            .get(&Self::blob_key(container, name))
            .map(|b| b.properties.clone())
            .ok_or_else(|| ServiceError::new(ErrorCode::BlobNotFound))
    }

    async fn delete_blob(&self, container: &str, name: &str) -> ServiceResult<()> {
        self.ensure_container(container)?;
        self.blobs
            .remove(&Self::blob_key(container, name))
            .map(|_| ())
            .ok_or_else(|| ServiceError::new(ErrorCode::BlobNotFound))
    }
}
