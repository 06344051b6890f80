//! Error types for the storage service and the lifecycle workflow.
//!
//! Two layers live here. [`ServiceError`] is what a backend reports: the
//! service error code, the HTTP status and the message. [`LifecycleError`] is
//! what the components surface to the workflow, classified by the operation
//! that failed.

use http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

use crate::workflow::WorkflowState;

/// Azure Storage error codes understood by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // General errors
    AuthenticationFailed,
    AuthorizationFailure,
    AuthorizationPermissionMismatch,
    InternalError,
    InvalidAuthenticationInfo,
    InvalidHeaderValue,
    InvalidInput,
    InvalidMd5,
    InvalidMetadata,
    InvalidQueryParameterValue,
    InvalidResourceName,
    InvalidUri,
    InvalidXmlDocument,
    Md5Mismatch,
    MissingRequiredHeader,
    OperationTimedOut,
    ResourceNotFound,
    ServerBusy,
    UnsupportedHttpVerb,

    // Container and blob errors
    BlobNotFound,
    ContainerAlreadyExists,
    ContainerBeingDeleted,
    ContainerNotFound,

    // Client-side failures with no service counterpart
    TransportFailure,
    /// A code the service returned that this crate does not model.
    Unrecognized,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationFailed => "AuthenticationFailed",
            ErrorCode::AuthorizationFailure => "AuthorizationFailure",
            ErrorCode::AuthorizationPermissionMismatch => "AuthorizationPermissionMismatch",
            ErrorCode::InternalError => "InternalError",
            ErrorCode::InvalidAuthenticationInfo => "InvalidAuthenticationInfo",
            ErrorCode::InvalidHeaderValue => "InvalidHeaderValue",
            ErrorCode::InvalidInput => "InvalidInput",
            ErrorCode::InvalidMd5 => "InvalidMd5",
            ErrorCode::InvalidMetadata => "InvalidMetadata",
            ErrorCode::InvalidQueryParameterValue => "InvalidQueryParameterValue",
            ErrorCode::InvalidResourceName => "InvalidResourceName",
            ErrorCode::InvalidUri => "InvalidUri",
            ErrorCode::InvalidXmlDocument => "InvalidXmlDocument",
            ErrorCode::Md5Mismatch => "Md5Mismatch",
            ErrorCode::MissingRequiredHeader => "MissingRequiredHeader",
            ErrorCode::OperationTimedOut => "OperationTimedOut",
            ErrorCode::ResourceNotFound => "ResourceNotFound",
            ErrorCode::ServerBusy => "ServerBusy",
            ErrorCode::UnsupportedHttpVerb => "UnsupportedHttpVerb",
            ErrorCode::BlobNotFound => "BlobNotFound",
            ErrorCode::ContainerAlreadyExists => "ContainerAlreadyExists",
            ErrorCode::ContainerBeingDeleted => "ContainerBeingDeleted",
            ErrorCode::ContainerNotFound => "ContainerNotFound",
            ErrorCode::TransportFailure => "TransportFailure",
            ErrorCode::Unrecognized => "Unrecognized",
        }
    }

    /// Parses a service error code, as found in `x-ms-error-code` or `<Code>`.
    pub fn from_str(s: &str) -> Self {
        match s {
            "AuthenticationFailed" => ErrorCode::AuthenticationFailed,
            "AuthorizationFailure" => ErrorCode::AuthorizationFailure,
            "AuthorizationPermissionMismatch" => ErrorCode::AuthorizationPermissionMismatch,
            "InternalError" => ErrorCode::InternalError,
            "InvalidAuthenticationInfo" => ErrorCode::InvalidAuthenticationInfo,
            "InvalidHeaderValue" => ErrorCode::InvalidHeaderValue,
            "InvalidInput" => ErrorCode::InvalidInput,
            "InvalidMd5" => ErrorCode::InvalidMd5,
            "InvalidMetadata" => ErrorCode::InvalidMetadata,
            "InvalidQueryParameterValue" => ErrorCode::InvalidQueryParameterValue,
            "InvalidResourceName" => ErrorCode::InvalidResourceName,
            "InvalidUri" => ErrorCode::InvalidUri,
            "InvalidXmlDocument" => ErrorCode::InvalidXmlDocument,
            "Md5Mismatch" => ErrorCode::Md5Mismatch,
            "MissingRequiredHeader" => ErrorCode::MissingRequiredHeader,
            "OperationTimedOut" => ErrorCode::OperationTimedOut,
            "ResourceNotFound" => ErrorCode::ResourceNotFound,
            "ServerBusy" => ErrorCode::ServerBusy,
            "UnsupportedHttpVerb" => ErrorCode::UnsupportedHttpVerb,
            "BlobNotFound" => ErrorCode::BlobNotFound,
            "ContainerAlreadyExists" => ErrorCode::ContainerAlreadyExists,
            "ContainerBeingDeleted" => ErrorCode::ContainerBeingDeleted,
            "ContainerNotFound" => ErrorCode::ContainerNotFound,
            _ => ErrorCode::Unrecognized,
        }
    }

    /// Returns the HTTP status code the service uses for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidHeaderValue
            | ErrorCode::InvalidInput
            | ErrorCode::InvalidMd5
            | ErrorCode::InvalidMetadata
            | ErrorCode::InvalidQueryParameterValue
            | ErrorCode::InvalidResourceName
            | ErrorCode::InvalidUri
            | ErrorCode::InvalidXmlDocument
            | ErrorCode::Md5Mismatch
            | ErrorCode::MissingRequiredHeader
            | ErrorCode::UnsupportedHttpVerb => StatusCode::BAD_REQUEST,

            ErrorCode::AuthenticationFailed
            | ErrorCode::InvalidAuthenticationInfo
            | ErrorCode::AuthorizationFailure
            | ErrorCode::AuthorizationPermissionMismatch => StatusCode::FORBIDDEN,

            ErrorCode::BlobNotFound | ErrorCode::ContainerNotFound | ErrorCode::ResourceNotFound => {
                StatusCode::NOT_FOUND
            }

            ErrorCode::ContainerAlreadyExists | ErrorCode::ContainerBeingDeleted => {
                StatusCode::CONFLICT
            }

            ErrorCode::InternalError | ErrorCode::OperationTimedOut | ErrorCode::Unrecognized => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            ErrorCode::ServerBusy => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::TransportFailure => StatusCode::BAD_GATEWAY,
        }
    }

    /// Best guess at the code when the service sent a status but no code.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorCode::AuthenticationFailed,
            StatusCode::NOT_FOUND => ErrorCode::ResourceNotFound,
            StatusCode::SERVICE_UNAVAILABLE => ErrorCode::ServerBusy,
            StatusCode::INTERNAL_SERVER_ERROR => ErrorCode::InternalError,
            _ => ErrorCode::Unrecognized,
        }
    }

    /// Returns the default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationFailed => {
                "Server failed to authenticate the request. Make sure the value of the \
                 Authorization header is formed correctly including the signature."
            }
            ErrorCode::AuthorizationFailure => {
                "This request is not authorized to perform this operation."
            }
            ErrorCode::BlobNotFound => "The specified blob does not exist.",
            ErrorCode::ContainerAlreadyExists => "The specified container already exists.",
            ErrorCode::ContainerNotFound => "The specified container does not exist.",
            ErrorCode::InvalidResourceName => "The specified resource name contains invalid characters.",
            ErrorCode::InvalidXmlDocument => "The XML response body is invalid.",
            ErrorCode::Md5Mismatch => {
                "The MD5 value specified in the request did not match the MD5 value calculated by the server."
            }
            ErrorCode::ResourceNotFound => "The specified resource does not exist.",
            ErrorCode::InternalError => "The server encountered an internal error.",
            ErrorCode::TransportFailure => "The request could not be delivered to the service.",
            _ => "An error occurred while processing the request.",
        }
    }

    /// Returns true for the codes the service uses when credentials are rejected.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ErrorCode::AuthenticationFailed
                | ErrorCode::AuthorizationFailure
                | ErrorCode::AuthorizationPermissionMismatch
                | ErrorCode::InvalidAuthenticationInfo
        )
    }
}

/// Error reported by a storage backend.
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", code.as_str())]
pub struct ServiceError {
    pub code: ErrorCode,
    pub status: StatusCode,
    pub message: String,
    pub request_id: Option<String>,
}

impl ServiceError {
    /// Creates a new service error with the given code and default message.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            status: code.status_code(),
            message: code.default_message().to_string(),
            code,
            request_id: None,
        }
    }

    /// Creates a new service error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
            request_id: None,
        }
    }

    /// Overrides the HTTP status with the one actually received.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Sets the request ID for this error.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Wraps a transport-level failure (DNS, refused connection, reset).
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::with_message(ErrorCode::TransportFailure, err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }
}

/// Result type alias for backend operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by the lifecycle components.
///
/// Every variant is fatal to the workflow; none is retried.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("container '{0}' already exists")]
    ContainerAlreadyExists(String),

    #[error("container '{0}' not found")]
    ContainerNotFound(String),

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload of '{blob}' failed: {source}")]
    Upload {
        blob: String,
        #[source]
        source: ServiceError,
    },

    #[error("download of '{blob}' failed: {reason}")]
    Download { blob: String, reason: String },

    #[error("blob '{0}' not found")]
    BlobNotFound(String),

    #[error("backend error: {0}")]
    Backend(#[from] ServiceError),
}

impl LifecycleError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LifecycleError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Classifies a failure of a container-scoped operation.
    pub fn from_container_op(container: &str, err: ServiceError) -> Self {
        match err.code {
            ErrorCode::ContainerNotFound => LifecycleError::ContainerNotFound(container.to_string()),
            ErrorCode::ContainerAlreadyExists => {
                LifecycleError::ContainerAlreadyExists(container.to_string())
            }
            _ if err.is_not_found() => LifecycleError::ContainerNotFound(container.to_string()),
            _ => LifecycleError::Backend(err),
        }
    }

    /// Classifies a failure of a blob-scoped read or delete.
    ///
    /// A blob in a missing container does not exist either, so every
    /// not-found outcome is reported as [`LifecycleError::BlobNotFound`].
    pub fn from_blob_op(blob: &str, err: ServiceError) -> Self {
        if err.is_not_found() {
            LifecycleError::BlobNotFound(blob.to_string())
        } else {
            LifecycleError::Backend(err)
        }
    }

    /// Short name of the error kind, used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::Connection(_) => "ConnectionError",
            LifecycleError::ContainerAlreadyExists(_) => "ContainerAlreadyExists",
            LifecycleError::ContainerNotFound(_) => "ContainerNotFound",
            LifecycleError::Filesystem { .. } => "FilesystemError",
            LifecycleError::Upload { .. } => "UploadError",
            LifecycleError::Download { .. } => "DownloadError",
            LifecycleError::BlobNotFound(_) => "BlobNotFound",
            LifecycleError::Backend(_) => "BackendError",
        }
    }
}

/// Result type alias for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// A workflow run that stopped before cleanup.
///
/// Resources created before `state` are left in place.
#[derive(Debug, Error)]
#[error("workflow aborted in state {state}: {source}")]
pub struct WorkflowError {
    pub state: WorkflowState,
    #[source]
    pub source: LifecycleError,
}
