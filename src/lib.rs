//! blob-lifecycle: walk one blob through its whole life on Azure Blob Storage.
//!
//! A run connects to a storage account, creates a container, stages a local
//! file, uploads it, lists and inspects it, replaces the container metadata,
//! downloads the blob back and deletes everything it created.
//!
//! # Example
//!
//! ```no_run
//! use blob_lifecycle::{Config, Workflow};
//!
//! #[tokio::main]
//! async fn main() {
//!     let report = Workflow::new(Config::default()).run().await.unwrap();
//!     println!("cleaned up container {}", report.container);
//! }
//! ```

pub mod auth;
pub mod blob;
pub mod config;
pub mod connection;
pub mod container;
pub mod error;
pub mod models;
pub mod staging;
pub mod storage;
pub mod workflow;
pub mod xml;

// Re-exports for convenience
pub use blob::{Blob, BlobNaming, UploadedBlob};
pub use config::{Args, Config, DEVELOPMENT_CONNECTION_STRING};
pub use connection::{ConnectionDescriptor, StorageConnection, StorageServiceConnector};
pub use container::Container;
pub use error::{
    ErrorCode, LifecycleError, LifecycleResult, ServiceError, ServiceResult, WorkflowError,
};
pub use staging::LocalFile;
pub use storage::{BlobBackend, HttpBackend, MemoryBackend};
pub use workflow::{Workflow, WorkflowReport, WorkflowState};
