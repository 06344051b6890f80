//! Containers: creation, deletion, metadata and blob listing.

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::connection::StorageConnection;
use crate::error::{ErrorCode, LifecycleError, LifecycleResult, ServiceError};
use crate::models::{BlobSummary, MetadataSet};

/// Checks `name` against the service's container naming rules.
pub fn validate_container_name(name: &str) -> LifecycleResult<()> {
    let invalid = |reason: &str| {
        Err(LifecycleError::Backend(ServiceError::with_message(
            ErrorCode::InvalidResourceName,
            format!("Container name '{}' {}", name, reason),
        )))
    };

    if name.len() < 3 || name.len() > 63 {
        return invalid("must be 3 to 63 characters long");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return invalid("may only contain lowercase letters, digits and hyphens");
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric())
        || !name.ends_with(|c: char| c.is_ascii_alphanumeric())
    {
        return invalid("must start and end with a letter or digit");
    }
    if name.contains("--") {
        return invalid("must not contain consecutive hyphens");
    }
    Ok(())
}

/// A container that existed when this handle was made.
#[derive(Debug, Clone)]
pub struct Container {
    name: String,
    connection: StorageConnection,
}

impl Container {
    /// Creates the container `name` on the service.
    pub async fn create(connection: &StorageConnection, name: &str) -> LifecycleResult<Self> {
        validate_container_name(name)?;
        connection
            .backend()
            .create_container(name)
            .await
            .map_err(|e| LifecycleError::from_container_op(name, e))?;

        info!(container = %name, "Created container");
        Ok(Self {
            name: name.to_string(),
            connection: connection.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> &StorageConnection {
        &self.connection
    }

    /// Deletes the container and every blob in it.
    pub async fn delete(&self) -> LifecycleResult<()> {
        self.connection
            .backend()
            .delete_container(&self.name)
            .await
            .map_err(|e| LifecycleError::from_container_op(&self.name, e))?;
        info!(container = %self.name, "Deleted container");
        Ok(())
    }

    /// Returns the container's metadata; empty if never set.
    pub async fn get_metadata(&self) -> LifecycleResult<MetadataSet> {
        let model = self
            .connection
            .backend()
            .get_container(&self.name)
            .await
            .map_err(|e| LifecycleError::from_container_op(&self.name, e))?;
        Ok(model.metadata)
    }

    /// Replaces the container's metadata with `metadata`.
    pub async fn set_metadata(&self, metadata: &MetadataSet) -> LifecycleResult<()> {
        self.connection
            .backend()
            .set_container_metadata(&self.name, metadata)
            .await
            .map_err(|e| LifecycleError::from_container_op(&self.name, e))?;
        debug!(container = %self.name, entries = metadata.len(), "Replaced container metadata");
        Ok(())
    }

    /// Lists every blob in the container, fetching pages as the stream is polled.
    ///
    /// The stream ends after the page that carries no continuation marker.
    pub fn list_blobs(&self, page_size: Option<u32>) -> BoxStream<'static, LifecycleResult<BlobSummary>> {
        let connection = self.connection.clone();
        let name = self.name.clone();

        // State: Some(marker) while pages remain, None once the last page was read
        stream::try_unfold(Some(None::<String>), move |state| {
            let connection = connection.clone();
            let name = name.clone();
            async move {
                let Some(marker) = state else {
                    return Ok::<_, LifecycleError>(None);
                };
                let page = connection
                    .backend()
                    .list_blobs(&name, marker.as_deref(), page_size)
                    .await
                    .map_err(|e| LifecycleError::from_container_op(&name, e))?;
                debug!(
                    container = %name,
                    blobs = page.blobs.len(),
                    more = page.next_marker.is_some(),
                    "Fetched blob page"
                );

                let next_state = page.next_marker.map(Some);
                let blobs = stream::iter(page.blobs.into_iter().map(Ok::<_, LifecycleError>));
                Ok(Some((blobs, next_state)))
            }
        })
        .try_flatten()
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_validate_container_name() {
        for ok in ["vicunha3f9a", "abc", "a-b-c", "123"] {
            assert!(validate_container_name(ok).is_ok(), "{}", ok);
        }
        let too_long = "a".repeat(64);
        for bad in ["ab", "ViCunha", "-abc", "abc-", "a--b", "a_b", too_long.as_str()] {
            let err = validate_container_name(bad).unwrap_err();
            assert!(
                matches!(err, LifecycleError::Backend(ref e) if e.code == ErrorCode::InvalidResourceName),
                "{}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let connection = StorageConnection::in_memory();
        Container::create(&connection, "vicunha3f9a").await.unwrap();
        let err = Container::create(&connection, "vicunha3f9a").await.unwrap_err();
        assert!(matches!(err, LifecycleError::ContainerAlreadyExists(ref n) if n == "vicunha3f9a"));
    }

    #[tokio::test]
    async fn test_metadata_empty_then_replaced() {
        let connection = StorageConnection::in_memory();
        let container = Container::create(&connection, "meta").await.unwrap();
        assert!(container.get_metadata().await.unwrap().is_empty());

        let m1: MetadataSet = [("key1", "a"), ("key2", "b")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let m2: MetadataSet = [("key3".to_string(), "c".to_string())].into_iter().collect();
        container.set_metadata(&m1).await.unwrap();
        container.set_metadata(&m2).await.unwrap();
        assert_eq!(container.get_metadata().await.unwrap(), m2);
    }

    #[tokio::test]
    async fn test_list_blobs_follows_markers() {
        let connection = StorageConnection::in_memory();
        let container = Container::create(&connection, "paged").await.unwrap();
        for i in 0..7 {
            connection
                .backend()
                .put_blob("paged", &format!("blob{}", i), Bytes::from("x"), None)
                .await
                .unwrap();
        }

        let names: Vec<String> = container
            .list_blobs(Some(3))
            .map_ok(|b| b.name)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(names, (0..7).map(|i| format!("blob{}", i)).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_deleted_container_is_not_found() {
        let connection = StorageConnection::in_memory();
        let container = Container::create(&connection, "gone").await.unwrap();
        container.delete().await.unwrap();

        assert_eq!(container.delete().await.unwrap_err().kind(), "ContainerNotFound");
        assert_eq!(container.get_metadata().await.unwrap_err().kind(), "ContainerNotFound");

        let listed: Vec<_> = container.list_blobs(None).collect().await;
        assert_eq!(listed.len(), 1);
        assert!(matches!(listed[0], Err(LifecycleError::ContainerNotFound(_))));
    }
}
