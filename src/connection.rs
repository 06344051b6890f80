//! Connection strings and authenticated connections to the Blob service.

use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::auth::{Credential, SharedKeyCredential};
use crate::config::{DEVELOPMENT_ACCOUNT, DEVELOPMENT_ACCOUNT_KEY, DEVELOPMENT_BLOB_ENDPOINT};
use crate::error::{LifecycleError, LifecycleResult};
use crate::storage::{BlobBackend, HttpBackend, MemoryBackend};

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
const DEFAULT_PROTOCOL: &str = "https";

/// A parsed Azure Storage connection string.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    pub account: String,
    pub blob_endpoint: Url,
    pub credential: Credential,
}

fn malformed(reason: impl std::fmt::Display) -> LifecycleError {
    LifecycleError::Connection(format!("malformed connection string: {}", reason))
}

impl ConnectionDescriptor {
    /// Parses a `Key=Value;Key=Value` connection string.
    pub fn parse(connection_string: &str) -> LifecycleResult<Self> {
        let mut use_development_storage = false;
        let mut protocol = None;
        let mut account = None;
        let mut account_key = None;
        let mut blob_endpoint = None;
        let mut endpoint_suffix = None;
        let mut sas = None;

        for part in connection_string.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            // Account keys are base64 and may themselves end in '='
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| malformed(format!("segment '{}' has no '='", part)))?;

            match key.trim().to_ascii_lowercase().as_str() {
                "usedevelopmentstorage" => use_development_storage = value.eq_ignore_ascii_case("true"),
                "defaultendpointsprotocol" => protocol = Some(value.to_string()),
                "accountname" => account = Some(value.to_string()),
                "accountkey" => account_key = Some(value.to_string()),
                "blobendpoint" => blob_endpoint = Some(value.to_string()),
                "endpointsuffix" => endpoint_suffix = Some(value.to_string()),
                "sharedaccesssignature" => sas = Some(value.to_string()),
                other => debug!(key = other, "Ignoring connection string key"),
            }
        }

        if use_development_storage {
            account = account.or_else(|| Some(DEVELOPMENT_ACCOUNT.to_string()));
            account_key = account_key.or_else(|| Some(DEVELOPMENT_ACCOUNT_KEY.to_string()));
            blob_endpoint = blob_endpoint.or_else(|| Some(DEVELOPMENT_BLOB_ENDPOINT.to_string()));
        }

        let blob_endpoint = match (blob_endpoint, account.as_deref()) {
            (Some(endpoint), _) => endpoint,
            (None, Some(name)) => format!(
                "{}://{}.blob.{}",
                protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL),
                name,
                endpoint_suffix.as_deref().unwrap_or(DEFAULT_ENDPOINT_SUFFIX)
            ),
            (None, None) => return Err(malformed("neither AccountName nor BlobEndpoint given")),
        };
        let blob_endpoint = Url::parse(&blob_endpoint).map_err(malformed)?;

        let credential = match (account_key, sas) {
            (Some(key), _) => {
                let name = account
                    .as_deref()
                    .ok_or_else(|| malformed("AccountKey given without AccountName"))?;
                Credential::SharedKey(
                    SharedKeyCredential::new(name, &key).map_err(|e| malformed(e.message))?,
                )
            }
            (None, Some(token)) => Credential::SasToken(token),
            (None, None) => return Err(malformed("no AccountKey or SharedAccessSignature")),
        };

        let account = account
            .or_else(|| blob_endpoint.host_str().map(str::to_string))
            .unwrap_or_default();

        Ok(Self {
            account,
            blob_endpoint,
            credential,
        })
    }
}

/// An authenticated handle to a storage backend, shared by the components.
#[derive(Clone)]
pub struct StorageConnection {
    backend: Arc<dyn BlobBackend>,
    account: String,
}

impl std::fmt::Debug for StorageConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConnection")
            .field("account", &self.account)
            .field("backend", &self.backend.describe())
            .finish()
    }
}

impl StorageConnection {
    /// Connection to a fresh in-process store.
    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(MemoryBackend::new()), "memory")
    }

    pub fn from_backend(backend: Arc<dyn BlobBackend>, account: impl Into<String>) -> Self {
        Self {
            backend,
            account: account.into(),
        }
    }

    pub fn backend(&self) -> &dyn BlobBackend {
        self.backend.as_ref()
    }

    pub fn account(&self) -> &str {
        &self.account
    }
}

/// Opens connections to the Blob service.
pub struct StorageServiceConnector;

impl StorageServiceConnector {
    /// Parses `connection_string`, then proves the credentials with one request.
    pub async fn connect(connection_string: &str) -> LifecycleResult<StorageConnection> {
        let descriptor = ConnectionDescriptor::parse(connection_string)?;
        Self::connect_descriptor(descriptor).await
    }

    pub async fn connect_descriptor(
        descriptor: ConnectionDescriptor,
    ) -> LifecycleResult<StorageConnection> {
        let ConnectionDescriptor {
            account,
            blob_endpoint,
            credential,
        } = descriptor;

        let backend = HttpBackend::new(blob_endpoint, credential)
            .map_err(|e| LifecycleError::Connection(e.to_string()))?;

        backend.probe().await.map_err(|e| {
            let reason = if e.code.is_auth_failure() {
                format!("credentials rejected by {}: {}", backend.describe(), e)
            } else {
                format!("{} is not reachable: {}", backend.describe(), e)
            };
            LifecycleError::Connection(reason)
        })?;

        info!(account = %account, endpoint = %backend.describe(), "Connected to storage account");
        Ok(StorageConnection::from_backend(Arc::new(backend), account))
    }
}
