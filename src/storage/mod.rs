//! Storage backends the lifecycle components talk to.

mod http;
mod memory;

pub use http::*;
pub use memory::*;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ServiceResult;
use crate::models::{
    BlobPage, BlobProperties, ContainerModel, ContainerProperties, MetadataSet, UploadReceipt,
};

/// Default page size for blob listings, matching the service maximum.
pub const DEFAULT_LIST_PAGE_SIZE: u32 = 5000;

/// Operations a blob storage service must support.
///
/// Errors are reported as the service reports them; classifying them per
/// operation is the caller's job.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Human-readable location of the backend, for logs.
    fn describe(&self) -> String;

    /// Cheap authenticated round-trip used to validate a connection.
    async fn probe(&self) -> ServiceResult<()>;

    // Container operations
    async fn create_container(&self, name: &str) -> ServiceResult<ContainerProperties>;
    async fn delete_container(&self, name: &str) -> ServiceResult<()>;
    /// Returns the container's properties and its full metadata.
    async fn get_container(&self, name: &str) -> ServiceResult<ContainerModel>;
    /// Replaces the container's metadata with `metadata`.
    async fn set_container_metadata(
        &self,
        name: &str,
        metadata: &MetadataSet,
    ) -> ServiceResult<ContainerProperties>;
    async fn list_blobs(
        &self,
        container: &str,
        marker: Option<&str>,
        maxresults: Option<u32>,
    ) -> ServiceResult<BlobPage>;

    // Blob operations
    /// Writes the whole blob in one request. `content_md5` is verified by the service.
    async fn put_blob(
        &self,
        container: &str,
        name: &str,
        content: Bytes,
        content_md5: Option<&str>,
    ) -> ServiceResult<UploadReceipt>;
    async fn get_blob(&self, container: &str, name: &str) -> ServiceResult<(BlobProperties, Bytes)>;
    async fn get_blob_properties(&self, container: &str, name: &str) -> ServiceResult<BlobProperties>;
    async fn delete_blob(&self, container: &str, name: &str) -> ServiceResult<()>;
}
