//! Local files staged for upload and written back after download.

use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{LifecycleError, LifecycleResult};

/// Marker inserted into the name of the file written by a download.
pub const DOWNLOAD_SUFFIX: &str = "DOWNLOADED";

/// A file on the local filesystem and its content as last read or written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub content: Bytes,
}

impl LocalFile {
    /// Final path component, or the whole path if it has none.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

/// Returns `prefix` followed by a fresh UUID, lower-cased, with no hyphens.
///
/// The result is a valid container name for any short alphanumeric prefix.
pub fn unique_name(prefix: &str) -> String {
    format!("{}{}", prefix, uuid::Uuid::new_v4())
        .to_lowercase()
        .replace('-', "")
}

/// Writes `content` to `directory/name`, appending if the file already exists.
///
/// The directory is not created; a missing directory is an error. The
/// returned content is the whole file as read back after the write.
pub async fn create_file(directory: &Path, name: &str, content: &[u8]) -> LifecycleResult<LocalFile> {
    let path = directory.join(name);
    write_file(&path, content).await?;
    let content = read_back(&path).await?;
    debug!(path = %path.display(), bytes = content.len(), "Staged local file");

    Ok(LocalFile { path, content })
}

/// Writes `content` to `path`, appending if the file already exists.
pub async fn write_file(path: &Path, content: &[u8]) -> LifecycleResult<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| LifecycleError::filesystem(path, e))?;
    file.write_all(content)
        .await
        .map_err(|e| LifecycleError::filesystem(path, e))?;
    file.flush()
        .await
        .map_err(|e| LifecycleError::filesystem(path, e))?;
    Ok(())
}

/// Writes `content` to `path`, replacing any previous content.
pub async fn overwrite_file(path: &Path, content: &[u8]) -> LifecycleResult<()> {
    fs::write(path, content)
        .await
        .map_err(|e| LifecycleError::filesystem(path, e))
}

/// Reads the whole file at `path`.
pub async fn read_back(path: &Path) -> LifecycleResult<Bytes> {
    fs::read(path)
        .await
        .map(Bytes::from)
        .map_err(|e| LifecycleError::filesystem(path, e))
}

/// Deletes the file at `path`.
pub async fn remove(path: &Path) -> LifecycleResult<()> {
    fs::remove_file(path)
        .await
        .map_err(|e| LifecycleError::filesystem(path, e))?;
    debug!(path = %path.display(), "Removed local file");
    Ok(())
}

/// Path the downloaded copy of `staged` is written to.
///
/// `DOWNLOADED` goes before the extension, or at the end when there is none,
/// so the result never equals `staged`.
pub fn download_target_path(staged: &Path) -> PathBuf {
    let stem = staged
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match staged.extension() {
        Some(ext) => format!("{}{}.{}", stem, DOWNLOAD_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, DOWNLOAD_SUFFIX),
    };
    staged.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_name_shape() {
        let name = unique_name("ViCunha");
        assert!(name.starts_with("vicunha"));
        assert_eq!(name.len(), "vicunha".len() + 32);
        assert!(!name.contains('-'));
        assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(name, unique_name("ViCunha"));
    }

    #[test]
    fn test_download_target_path() {
        assert_eq!(
            download_target_path(Path::new("./data/vicunha77b0")),
            PathBuf::from("./data/vicunha77b0DOWNLOADED")
        );
        assert_eq!(
            download_target_path(Path::new("/tmp/report.txt")),
            PathBuf::from("/tmp/reportDOWNLOADED.txt")
        );
    }

    #[tokio::test]
    async fn test_create_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let file = create_file(dir.path(), "vicunha77b0", b"Hello Ana Paula!").await.unwrap();
        assert_eq!(file.file_name(), "vicunha77b0");
        assert_eq!(read_back(&file.path).await.unwrap(), Bytes::from("Hello Ana Paula!"));

        remove(&file.path).await.unwrap();
        let err = read_back(&file.path).await.unwrap_err();
        assert_eq!(err.kind(), "FilesystemError");
    }

    #[tokio::test]
    async fn test_create_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        create_file(dir.path(), "f", b"one").await.unwrap();
        let second = create_file(dir.path(), "f", b"two").await.unwrap();
        assert_eq!(second.content, Bytes::from("onetwo"));
        assert_eq!(read_back(&second.path).await.unwrap(), second.content);
    }

    #[tokio::test]
    async fn test_missing_directory_is_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = create_file(&missing, "f", b"x").await.unwrap_err();
        assert!(matches!(err, LifecycleError::Filesystem { ref path, .. } if path == &missing.join("f")));

        let err = remove(&missing.join("f")).await.unwrap_err();
        assert_eq!(err.kind(), "FilesystemError");
    }
}
