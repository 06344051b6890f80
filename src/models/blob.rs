//! Blob data models.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::new_etag;

/// Server-assigned blob properties. Only exist once an upload has landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobProperties {
    pub created_on: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
    pub content_length: u64,
    pub content_type: Option<String>,
    /// Base64 MD5 of the content, when the service knows it.
    pub content_md5: Option<String>,
}

impl BlobProperties {
    /// Creates properties for content written just now.
    pub fn new(content_length: u64) -> Self {
        let now = Utc::now();
        Self {
            created_on: now,
            last_modified: now,
            etag: new_etag(),
            content_length,
            content_type: Some("application/octet-stream".to_string()),
            content_md5: None,
        }
    }

    /// Records an overwrite: creation time is kept, the rest moves on.
    pub fn overwritten(&self, content_length: u64) -> Self {
        Self {
            created_on: self.created_on,
            ..Self::new(content_length)
        }
    }
}

/// One entry of a blob listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobSummary {
    pub name: String,
    pub properties: BlobProperties,
}

impl BlobSummary {
    pub fn created_on(&self) -> DateTime<Utc> {
        self.properties.created_on
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.properties.last_modified
    }
}

/// One page of a blob listing plus the continuation marker, if any.
#[derive(Debug, Clone, Default)]
pub struct BlobPage {
    pub blobs: Vec<BlobSummary>,
    pub next_marker: Option<String>,
}

/// A blob as held by the in-memory backend.
#[derive(Debug, Clone)]
pub struct BlobModel {
    /// Container name.
    pub container: String,
    /// Blob name (full path).
    pub name: String,
    /// Blob properties.
    pub properties: BlobProperties,
    /// Blob content.
    pub content: Bytes,
}

impl BlobModel {
    pub fn new(container: String, name: String, content: Bytes) -> Self {
        Self {
            container,
            name,
            properties: BlobProperties::new(content.len() as u64),
            content,
        }
    }

    pub fn summary(&self) -> BlobSummary {
        BlobSummary {
            name: self.name.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// What the service reports back after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub content_md5: Option<String>,
}
