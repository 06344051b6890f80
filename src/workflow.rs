//! The lifecycle run: one fixed sequence of steps from connect to cleanup.
//!
//! The run is a linear state machine. Each step makes one component call and
//! moves to the next [`WorkflowState`]. A failing step aborts the run in the
//! state it was in, and nothing created so far is removed; only a run that
//! reaches cleanup deletes its resources.

use futures::TryStreamExt;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::blob::{Blob, UploadedBlob};
use crate::config::Config;
use crate::connection::{StorageConnection, StorageServiceConnector};
use crate::container::Container;
use crate::error::{LifecycleError, LifecycleResult, WorkflowError};
use crate::models::{BlobProperties, BlobSummary, MetadataSet};
use crate::staging::{self, LocalFile};

/// Where a run is. States only ever advance, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkflowState {
    Disconnected,
    Connected,
    ContainerCreated,
    FileStaged,
    BlobBound,
    Uploaded,
    Listed,
    /// Properties read for the first or second time.
    PropertiesInspected(u8),
    /// Metadata read for the first or second time.
    MetadataInspected(u8),
    MetadataSet,
    Downloaded,
    CleanedUp,
}

impl WorkflowState {
    /// Position of the state in the run, starting at 0.
    pub fn step(&self) -> u8 {
        match self {
            WorkflowState::Disconnected => 0,
            WorkflowState::Connected => 1,
            WorkflowState::ContainerCreated => 2,
            WorkflowState::FileStaged => 3,
            WorkflowState::BlobBound => 4,
            WorkflowState::Uploaded => 5,
            WorkflowState::Listed => 6,
            WorkflowState::PropertiesInspected(1) => 7,
            WorkflowState::MetadataInspected(1) => 8,
            WorkflowState::MetadataSet => 9,
            WorkflowState::PropertiesInspected(_) => 10,
            WorkflowState::MetadataInspected(_) => 11,
            WorkflowState::Downloaded => 12,
            WorkflowState::CleanedUp => 13,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::PropertiesInspected(pass) => write!(f, "PropertiesInspected({})", pass),
            WorkflowState::MetadataInspected(pass) => write!(f, "MetadataInspected({})", pass),
            other => write!(f, "{:?}", other),
        }
    }
}

/// What a completed run did, in the order it did it.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub final_state: WorkflowState,
    pub account: String,
    pub container: String,
    pub blob: String,
    pub staged_file: PathBuf,
    pub downloaded_file: PathBuf,
    pub listed_blobs: Vec<BlobSummary>,
    pub properties_before: BlobProperties,
    pub properties_after: BlobProperties,
    pub metadata_before: MetadataSet,
    pub metadata_after: MetadataSet,
    /// Cleanup steps that failed; the run still completes.
    pub cleanup_errors: Vec<String>,
}

impl WorkflowReport {
    pub fn is_clean(&self) -> bool {
        self.cleanup_errors.is_empty()
    }
}

enum ConnectionSource {
    ConnectionString(String),
    InMemory,
    Existing(StorageConnection),
}

/// Runs the lifecycle once.
pub struct Workflow {
    config: Config,
    source: ConnectionSource,
    state: WorkflowState,
    /// Where interactive pauses wait for Enter; stdin unless replaced.
    input: Box<dyn AsyncBufRead + Send + Unpin>,
}

impl Workflow {
    /// Creates a run that connects the way `config` says.
    pub fn new(config: Config) -> Self {
        let source = if config.in_memory {
            ConnectionSource::InMemory
        } else {
            ConnectionSource::ConnectionString(config.connection_string.clone())
        };
        Self {
            config,
            source,
            state: WorkflowState::Disconnected,
            input: Box::new(BufReader::new(tokio::io::stdin())),
        }
    }

    /// Creates a run over an already established connection.
    pub fn with_connection(config: Config, connection: StorageConnection) -> Self {
        Self {
            config,
            source: ConnectionSource::Existing(connection),
            state: WorkflowState::Disconnected,
            input: Box::new(BufReader::new(tokio::io::stdin())),
        }
    }

    /// Reads interactive confirmations from `input` instead of stdin.
    pub fn with_prompt_input(mut self, input: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        self.input = Box::new(input);
        self
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    fn fail(&self, source: LifecycleError) -> WorkflowError {
        error!(state = %self.state, kind = source.kind(), error = %source, "Workflow aborted");
        WorkflowError {
            state: self.state,
            source,
        }
    }

    async fn advance(&mut self, next: WorkflowState) {
        info!(step = next.step(), state = %next, "Workflow step complete");
        self.state = next;
        if self.config.interactive {
            self.pause().await;
        }
    }

    /// Blocks until the operator presses Enter.
    async fn pause(&mut self) {
        println!("Press Enter to continue...");
        let mut line = String::new();
        if let Err(e) = self.input.read_line(&mut line).await {
            warn!(error = %e, "Could not read the confirmation; continuing");
        }
    }

    async fn connect(&mut self) -> LifecycleResult<StorageConnection> {
        match std::mem::replace(&mut self.source, ConnectionSource::InMemory) {
            ConnectionSource::ConnectionString(cs) => StorageServiceConnector::connect(&cs).await,
            ConnectionSource::InMemory => Ok(StorageConnection::in_memory()),
            ConnectionSource::Existing(connection) => Ok(connection),
        }
    }

    /// Runs every step in order.
    ///
    /// On error the returned [`WorkflowError`] names the state the run stopped
    /// in; resources created before that point are left in place.
    pub async fn run(mut self) -> Result<WorkflowReport, WorkflowError> {
        let connection = self.connect().await.map_err(|e| self.fail(e))?;
        self.advance(WorkflowState::Connected).await;

        let container_name = staging::unique_name(&self.config.name_prefix);
        let container = Container::create(&connection, &container_name)
            .await
            .map_err(|e| self.fail(e))?;
        self.advance(WorkflowState::ContainerCreated).await;

        let file_name = staging::unique_name(&self.config.name_prefix);
        let staged = staging::create_file(
            &self.config.local_dir,
            &file_name,
            self.config.content.as_bytes(),
        )
        .await
        .map_err(|e| self.fail(e))?;
        info!(path = %staged.path.display(), "Staged local file");
        self.advance(WorkflowState::FileStaged).await;

        let blob = Blob::bind(&container, &staged.path, self.config.blob_naming);
        info!(container = %container.name(), blob = %blob.name(), "Bound blob");
        self.advance(WorkflowState::BlobBound).await;

        let uploaded = blob.upload_file(&staged).await.map_err(|e| self.fail(e))?;
        self.advance(WorkflowState::Uploaded).await;

        let listed: Vec<BlobSummary> = container
            .list_blobs(self.config.page_size)
            .try_collect()
            .await
            .map_err(|e| self.fail(e))?;
        for summary in &listed {
            info!(
                blob = %summary.name,
                created_on = %summary.created_on(),
                last_modified = %summary.last_modified(),
                "Listed blob"
            );
        }
        self.advance(WorkflowState::Listed).await;

        let properties_before = self.inspect_properties(&uploaded).await?;
        self.advance(WorkflowState::PropertiesInspected(1)).await;

        let metadata_before = self.inspect_metadata(&container).await?;
        self.advance(WorkflowState::MetadataInspected(1)).await;

        container
            .set_metadata(&self.config.metadata)
            .await
            .map_err(|e| self.fail(e))?;
        self.advance(WorkflowState::MetadataSet).await;

        let properties_after = self.inspect_properties(&uploaded).await?;
        self.advance(WorkflowState::PropertiesInspected(2)).await;

        let metadata_after = self.inspect_metadata(&container).await?;
        self.advance(WorkflowState::MetadataInspected(2)).await;

        let downloaded = self
            .download(&uploaded, &staged)
            .await
            .map_err(|e| self.fail(e))?;
        self.advance(WorkflowState::Downloaded).await;

        let cleanup_errors = cleanup(&downloaded, &staged, &uploaded, &container).await;
        self.advance(WorkflowState::CleanedUp).await;

        Ok(WorkflowReport {
            final_state: self.state,
            account: connection.account().to_string(),
            container: container_name,
            blob: uploaded.name().to_string(),
            staged_file: staged.path,
            downloaded_file: downloaded.path,
            listed_blobs: listed,
            properties_before,
            properties_after,
            metadata_before,
            metadata_after,
            cleanup_errors,
        })
    }

    async fn inspect_properties(&self, blob: &UploadedBlob) -> Result<BlobProperties, WorkflowError> {
        let properties = blob.properties().await.map_err(|e| self.fail(e))?;
        info!(
            blob = %blob.name(),
            created_on = %properties.created_on,
            last_modified = %properties.last_modified,
            "Blob properties"
        );
        Ok(properties)
    }

    async fn inspect_metadata(&self, container: &Container) -> Result<MetadataSet, WorkflowError> {
        let metadata = container.get_metadata().await.map_err(|e| self.fail(e))?;
        if metadata.is_empty() {
            info!(container = %container.name(), "Container has no metadata");
        }
        for (key, value) in &metadata {
            info!(container = %container.name(), key = %key, value = %value, "Container metadata");
        }
        Ok(metadata)
    }

    /// Downloads next to the staged file and checks the copy on disk.
    async fn download(&self, blob: &UploadedBlob, staged: &LocalFile) -> LifecycleResult<LocalFile> {
        let target = staging::download_target_path(&staged.path);
        let downloaded = blob.download_to(&target).await?;

        let on_disk = staging::read_back(&downloaded.path).await?;
        if on_disk != staged.content {
            return Err(LifecycleError::Download {
                blob: blob.name().to_string(),
                reason: format!(
                    "{} holds {} bytes that differ from the {} bytes uploaded",
                    target.display(),
                    on_disk.len(),
                    staged.content.len()
                ),
            });
        }
        Ok(downloaded)
    }
}

/// Deletes everything the run created. Every step runs even if an earlier
/// one failed; failures are returned rather than raised.
async fn cleanup(
    downloaded: &LocalFile,
    staged: &LocalFile,
    blob: &UploadedBlob,
    container: &Container,
) -> Vec<String> {
    let results = [
        staging::remove(&downloaded.path).await,
        staging::remove(&staged.path).await,
        blob.delete().await,
        container.delete().await,
    ];

    results
        .into_iter()
        .filter_map(Result::err)
        .map(|e| {
            warn!(kind = e.kind(), error = %e, "Cleanup step failed");
            e.to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_advance_in_order() {
        let states = [
            WorkflowState::Disconnected,
            WorkflowState::Connected,
            WorkflowState::ContainerCreated,
            WorkflowState::FileStaged,
            WorkflowState::BlobBound,
            WorkflowState::Uploaded,
            WorkflowState::Listed,
            WorkflowState::PropertiesInspected(1),
            WorkflowState::MetadataInspected(1),
            WorkflowState::MetadataSet,
            WorkflowState::PropertiesInspected(2),
            WorkflowState::MetadataInspected(2),
            WorkflowState::Downloaded,
            WorkflowState::CleanedUp,
        ];
        for (i, state) in states.iter().enumerate() {
            assert_eq!(state.step() as usize, i, "{}", state);
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(WorkflowState::Uploaded.to_string(), "Uploaded");
        assert_eq!(WorkflowState::MetadataInspected(2).to_string(), "MetadataInspected(2)");
    }

    fn config(dir: &std::path::Path) -> Config {
        Config {
            in_memory: true,
            local_dir: dir.to_path_buf(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_in_memory_run_completes() {
        let dir = tempfile::tempdir().unwrap();
        let report = Workflow::new(config(dir.path())).run().await.unwrap();

        assert_eq!(report.final_state, WorkflowState::CleanedUp);
        assert!(report.is_clean(), "{:?}", report.cleanup_errors);
        assert!(report.container.starts_with("vicunha"));
        assert_eq!(report.listed_blobs.len(), 1);
        assert_eq!(report.listed_blobs[0].name, report.blob);
        assert!(report.metadata_before.is_empty());
        assert_eq!(report.metadata_after, Config::default().metadata);
        assert_eq!(report.properties_before.content_length, 16);
        assert!(!report.staged_file.exists());
        assert!(!report.downloaded_file.exists());
    }

    #[tokio::test]
    async fn test_missing_directory_aborts_after_container() {
        let dir = tempfile::tempdir().unwrap();
        let memory = std::sync::Arc::new(crate::storage::MemoryBackend::new());
        let connection = StorageConnection::from_backend(memory.clone(), "memory");
        let workflow = Workflow::with_connection(config(&dir.path().join("missing")), connection);

        let err = workflow.run().await.unwrap_err();
        assert_eq!(err.state, WorkflowState::ContainerCreated);
        assert_eq!(err.source.kind(), "FilesystemError");

        // No rollback: the container is still there
        let containers = memory.container_names();
        assert_eq!(containers.len(), 1);
        assert!(containers[0].starts_with("vicunha"));
    }

    #[tokio::test]
    async fn test_interactive_run_pauses_after_every_step() {
        use std::time::Duration;
        use tokio::io::AsyncWriteExt;

        let dir = tempfile::tempdir().unwrap();
        let memory = std::sync::Arc::new(crate::storage::MemoryBackend::new());
        let connection = StorageConnection::from_backend(memory.clone(), "memory");
        let (input, mut operator) = tokio::io::duplex(64);
        let config = Config {
            interactive: true,
            ..config(dir.path())
        };
        let workflow = Workflow::with_connection(config, connection)
            .with_prompt_input(BufReader::new(input));

        // One Enter for each step up to and including the download
        operator.write_all(&[b'\n'; 12]).await.unwrap();
        let run = workflow.run();
        tokio::pin!(run);

        // Cleanup is done, and the run still waits for the last Enter
        assert!(tokio::time::timeout(Duration::from_secs(1), &mut run).await.is_err());
        assert!(memory.container_names().is_empty());

        operator.write_all(b"\n").await.unwrap();
        let report = run.await.unwrap();
        assert_eq!(report.final_state, WorkflowState::CleanedUp);
    }
}
