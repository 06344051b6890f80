//! Common test utilities.
//!
//! [`TestServer`] speaks the subset of the Blob REST API the lifecycle uses,
//! backed by a [`MemoryBackend`], and checks every SharedKey signature.

#![allow(dead_code)]

mod xml;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, Response, StatusCode, Uri},
    routing::any,
    Router,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

use blob_lifecycle::auth::SharedKeyCredential;
use blob_lifecycle::config::{DEVELOPMENT_ACCOUNT, DEVELOPMENT_ACCOUNT_KEY};
use blob_lifecycle::models::{format_http_date, BlobProperties, MetadataSet};
use blob_lifecycle::{BlobBackend, ErrorCode, MemoryBackend, ServiceError, ServiceResult};
use xml::{serialize_blob_list, serialize_error};

/// State shared between handlers.
#[derive(Clone)]
struct AppState {
    backend: Arc<MemoryBackend>,
    credential: SharedKeyCredential,
    requests: Arc<Mutex<Vec<String>>>,
    fail_next: Arc<Mutex<Option<ErrorCode>>>,
}

/// Test server wrapper.
pub struct TestServer {
    pub base_url: String,
    pub account: String,
    pub key: String,
    pub backend: Arc<MemoryBackend>,
    requests: Arc<Mutex<Vec<String>>>,
    fail_next: Arc<Mutex<Option<ErrorCode>>>,
}

impl TestServer {
    /// Creates and starts a test server on a random port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let backend = Arc::new(MemoryBackend::new());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let fail_next = Arc::new(Mutex::new(None));
        let state = AppState {
            backend: backend.clone(),
            credential: SharedKeyCredential::new(DEVELOPMENT_ACCOUNT, DEVELOPMENT_ACCOUNT_KEY).unwrap(),
            requests: requests.clone(),
            fail_next: fail_next.clone(),
        };

        let app = Router::new()
            .route("/:account", any(service_handler))
            .route("/:account/", any(service_handler))
            .route("/:account/:container", any(container_handler))
            .route("/:account/:container/*blob", any(blob_handler))
            .with_state(state);

        // Start server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            account: DEVELOPMENT_ACCOUNT.to_string(),
            key: DEVELOPMENT_ACCOUNT_KEY.to_string(),
            backend,
            requests,
            fail_next,
        }
    }

    /// Connection string pointing at this server.
    pub fn connection_string(&self) -> String {
        self.connection_string_with_key(&self.key)
    }

    pub fn connection_string_with_key(&self, key: &str) -> String {
        format!(
            "DefaultEndpointsProtocol=http;AccountName={};AccountKey={};BlobEndpoint={}/{};",
            self.account, key, self.base_url, self.account
        )
    }

    /// Every request received so far, as `METHOD path?query`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Makes the next request fail with `code`.
    pub fn fail_next(&self, code: ErrorCode) {
        *self.fail_next.lock() = Some(code);
    }
}

fn error_response(method: &Method, error: ServiceError) -> Response<Body> {
    let body = if *method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(serialize_error(&error))
    };
    Response::builder()
        .status(error.status)
        .header("x-ms-error-code", error.code.as_str())
        .header("content-type", "application/xml")
        .body(body)
        .unwrap()
}

/// Records the request, applies injected failures and checks the signature.
fn admit(state: &AppState, method: &Method, uri: &Uri, headers: &HeaderMap) -> ServiceResult<()> {
    state.requests.lock().push(format!("{} {}", method, uri));

    if let Some(code) = state.fail_next.lock().take() {
        return Err(ServiceError::new(code));
    }

    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::new(ErrorCode::AuthenticationFailed))?;

    let signed_headers: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect();
    let content_length = signed_headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let url = Url::parse(&format!("http://localhost{}", uri)).unwrap();

    let expected = state
        .credential
        .authorization(method.as_str(), &url, &signed_headers, content_length)?;
    if presented != expected {
        return Err(ServiceError::new(ErrorCode::AuthenticationFailed));
    }
    Ok(())
}

fn metadata_from(headers: &HeaderMap) -> MetadataSet {
    headers
        .iter()
        .filter_map(|(k, v)| {
            let key = k.as_str().strip_prefix("x-ms-meta-")?;
            Some((key.to_string(), v.to_str().ok()?.to_string()))
        })
        .collect()
}

fn blob_headers(
    builder: axum::http::response::Builder,
    props: &BlobProperties,
) -> axum::http::response::Builder {
    let mut builder = builder
        .header("etag", props.etag.as_str())
        .header("last-modified", format_http_date(&props.last_modified))
        .header("x-ms-creation-time", format_http_date(&props.created_on))
        .header("x-ms-blob-type", "BlockBlob");
    if let Some(ref md5) = props.content_md5 {
        builder = builder.header("content-md5", md5.as_str());
    }
    if let Some(ref ct) = props.content_type {
        builder = builder.header("content-type", ct.as_str());
    }
    builder
}

async fn service_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response<Body> {
    if let Err(e) = admit(&state, &method, &uri, &headers) {
        return error_response(&method, e);
    }
    match (method.clone(), query.get("comp").map(String::as_str)) {
        (Method::GET, Some("list")) => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "application/xml")
            .body(Body::from(
                r#"<?xml version="1.0" encoding="utf-8"?><EnumerationResults><Containers /><NextMarker /></EnumerationResults>"#,
            ))
            .unwrap(),
        _ => error_response(&method, ServiceError::new(ErrorCode::UnsupportedHttpVerb)),
    }
}

async fn container_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path((account, container)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Response<Body> {
    if let Err(e) = admit(&state, &method, &uri, &headers) {
        return error_response(&method, e);
    }
    match route_container(&state, &method, &headers, &account, &container, &query).await {
        Ok(response) => response,
        Err(e) => error_response(&method, e),
    }
}

async fn route_container(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    account: &str,
    container: &str,
    query: &HashMap<String, String>,
) -> ServiceResult<Response<Body>> {
    if query.get("restype").map(String::as_str) != Some("container") {
        return Err(ServiceError::new(ErrorCode::InvalidQueryParameterValue));
    }
    let backend = &state.backend;

    let response = match (method.clone(), query.get("comp").map(String::as_str)) {
        (Method::PUT, None) => {
            let props = backend.create_container(container).await?;
            Response::builder()
                .status(StatusCode::CREATED)
                .header("etag", props.etag.as_str())
                .header("last-modified", format_http_date(&props.last_modified))
                .body(Body::empty())
        }
        (Method::PUT, Some("metadata")) => {
            let props = backend.set_container_metadata(container, &metadata_from(headers)).await?;
            Response::builder()
                .status(StatusCode::OK)
                .header("etag", props.etag.as_str())
                .header("last-modified", format_http_date(&props.last_modified))
                .body(Body::empty())
        }
        (Method::DELETE, None) => {
            backend.delete_container(container).await?;
            Response::builder().status(StatusCode::ACCEPTED).body(Body::empty())
        }
        (Method::HEAD, None) | (Method::GET, None) => {
            let model = backend.get_container(container).await?;
            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header("etag", model.properties.etag.as_str())
                .header("last-modified", format_http_date(&model.properties.last_modified));
            for (key, value) in &model.metadata {
                builder = builder.header(format!("x-ms-meta-{}", key), value.as_str());
            }
            builder.body(Body::empty())
        }
        (Method::GET, Some("list")) => {
            let maxresults = query
                .get("maxresults")
                .and_then(|m| m.parse().ok())
                .unwrap_or(5000);
            let marker = query.get("marker").map(String::as_str);
            let page = backend.list_blobs(container, marker, Some(maxresults)).await?;
            let endpoint = format!("http://127.0.0.1/{}/", account);
            Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "application/xml")
                .body(Body::from(serialize_blob_list(
                    &page, marker, maxresults, &endpoint, container,
                )))
        }
        _ => return Err(ServiceError::new(ErrorCode::UnsupportedHttpVerb)),
    };
    Ok(response.unwrap())
}

async fn blob_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path((_account, container, blob)): Path<(String, String, String)>,
    body: Bytes,
) -> Response<Body> {
    if let Err(e) = admit(&state, &method, &uri, &headers) {
        return error_response(&method, e);
    }
    let blob = blob.trim_start_matches('/').to_string();
    match route_blob(&state, &method, &headers, &container, &blob, body).await {
        Ok(response) => response,
        Err(e) => error_response(&method, e),
    }
}

async fn route_blob(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    container: &str,
    blob: &str,
    body: Bytes,
) -> ServiceResult<Response<Body>> {
    let backend = &state.backend;

    let response = match method.clone() {
        Method::PUT => {
            if headers.get("x-ms-blob-type").is_none() {
                return Err(ServiceError::new(ErrorCode::MissingRequiredHeader));
            }
            let md5 = headers.get("content-md5").and_then(|v| v.to_str().ok());
            let receipt = backend.put_blob(container, blob, body, md5).await?;
            let mut builder = Response::builder()
                .status(StatusCode::CREATED)
                .header("etag", receipt.etag.as_str())
                .header("last-modified", format_http_date(&receipt.last_modified));
            if let Some(ref md5) = receipt.content_md5 {
                builder = builder.header("content-md5", md5.as_str());
            }
            builder.body(Body::empty())
        }
        Method::GET => {
            let (props, content) = backend.get_blob(container, blob).await?;
            blob_headers(Response::builder().status(StatusCode::OK), &props).body(Body::from(content))
        }
        Method::HEAD => {
            let props = backend.get_blob_properties(container, blob).await?;
            blob_headers(Response::builder().status(StatusCode::OK), &props)
                .header("content-length", props.content_length)
                .body(Body::empty())
        }
        Method::DELETE => {
            backend.delete_blob(container, blob).await?;
            Response::builder().status(StatusCode::ACCEPTED).body(Body::empty())
        }
        _ => return Err(ServiceError::new(ErrorCode::UnsupportedHttpVerb)),
    };
    Ok(response.unwrap())
}
