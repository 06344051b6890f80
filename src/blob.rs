//! Blobs before and after upload.
//!
//! [`Blob`] is a name bound to a container; nothing exists remotely yet, so it
//! only offers [`Blob::upload`]. The [`UploadedBlob`] it returns is the only
//! handle with properties, download and delete.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::container::Container;
use crate::error::{LifecycleError, LifecycleResult};
use crate::models::{BlobProperties, UploadReceipt};
use crate::staging::{self, LocalFile};

/// How a blob name is derived from a local path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobNaming {
    /// The final path component.
    #[default]
    FileName,
    /// The whole path, with `/` separators and no leading `./`.
    FullPath,
}

impl BlobNaming {
    pub fn blob_name(&self, path: &Path) -> String {
        let full = path.to_string_lossy().replace('\\', "/");
        match self {
            BlobNaming::FileName => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(full),
            BlobNaming::FullPath => {
                let mut name = full.as_str();
                while let Some(rest) = name.strip_prefix("./") {
                    name = rest;
                }
                name.to_string()
            }
        }
    }
}

/// Base64 MD5 digest, as carried in `Content-MD5`.
pub fn content_md5(content: &[u8]) -> String {
    BASE64.encode(Md5::digest(content))
}

/// A blob name bound to a container, not yet uploaded.
#[derive(Debug, Clone)]
pub struct Blob {
    container: Container,
    name: String,
}

impl Blob {
    /// Binds the blob named after `path` to `container`. Performs no I/O.
    pub fn bind(container: &Container, path: &Path, naming: BlobNaming) -> Self {
        Self {
            container: container.clone(),
            name: naming.blob_name(path),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Uploads `content` as the whole blob in a single request.
    ///
    /// The service checks the content against its MD5, so on success the blob
    /// holds exactly `content`.
    pub async fn upload(&self, content: Bytes) -> LifecycleResult<UploadedBlob> {
        let md5 = content_md5(&content);
        let length = content.len();
        let receipt = self
            .container
            .connection()
            .backend()
            .put_blob(self.container.name(), &self.name, content, Some(&md5))
            .await
            .map_err(|source| LifecycleError::Upload {
                blob: self.name.clone(),
                source,
            })?;

        info!(container = %self.container.name(), blob = %self.name, bytes = length, "Uploaded blob");
        Ok(UploadedBlob {
            container: self.container.clone(),
            name: self.name.clone(),
            receipt,
        })
    }

    /// Uploads the staged file as it is on disk now.
    pub async fn upload_file(&self, file: &LocalFile) -> LifecycleResult<UploadedBlob> {
        let content = staging::read_back(&file.path).await?;
        self.upload(content).await
    }
}

/// A blob that was uploaded by this process.
#[derive(Debug, Clone)]
pub struct UploadedBlob {
    container: Container,
    name: String,
    receipt: UploadReceipt,
}

impl UploadedBlob {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// What the service acknowledged at upload time.
    pub fn receipt(&self) -> &UploadReceipt {
        &self.receipt
    }

    /// Fetches the blob's current system properties.
    pub async fn properties(&self) -> LifecycleResult<BlobProperties> {
        self.container
            .connection()
            .backend()
            .get_blob_properties(self.container.name(), &self.name)
            .await
            .map_err(|e| LifecycleError::from_blob_op(&self.name, e))
    }

    /// Downloads the blob's content, checked against its stored MD5.
    pub async fn download(&self) -> LifecycleResult<Bytes> {
        let download_error = |reason: String| LifecycleError::Download {
            blob: self.name.clone(),
            reason,
        };

        let (properties, content) = self
            .container
            .connection()
            .backend()
            .get_blob(self.container.name(), &self.name)
            .await
            .map_err(|e| download_error(e.to_string()))?;

        if let Some(expected) = properties.content_md5.as_deref() {
            let actual = content_md5(&content);
            if actual != expected {
                return Err(download_error(format!(
                    "content MD5 {} does not match stored {}",
                    actual, expected
                )));
            }
        }
        debug!(blob = %self.name, bytes = content.len(), "Downloaded blob");
        Ok(content)
    }

    /// Downloads the blob into `path`, replacing any file already there.
    pub async fn download_to(&self, path: &Path) -> LifecycleResult<LocalFile> {
        let content = self.download().await?;
        staging::overwrite_file(path, &content).await?;
        info!(blob = %self.name, path = %path.display(), "Downloaded blob to file");
        Ok(LocalFile {
            path: path.to_path_buf(),
            content,
        })
    }

    /// Deletes the blob.
    pub async fn delete(&self) -> LifecycleResult<()> {
        self.container
            .connection()
            .backend()
            .delete_blob(self.container.name(), &self.name)
            .await
            .map_err(|e| LifecycleError::from_blob_op(&self.name, e))?;
        info!(container = %self.container.name(), blob = %self.name, "Deleted blob");
        Ok(())
    }
}
