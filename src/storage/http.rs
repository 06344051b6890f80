//! Backend speaking the Azure Blob Storage REST API over HTTP.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use http::StatusCode;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::auth::Credential;
use crate::config::DEFAULT_API_VERSION;
use crate::error::{ErrorCode, ServiceError, ServiceResult};
use crate::models::{
    format_http_date, parse_http_date, BlobPage, BlobProperties, ContainerModel,
    ContainerProperties, MetadataSet, UploadReceipt,
};
use crate::xml::{parse_blob_list, parse_error_body};

use super::BlobBackend;

/// Prefix of user metadata headers.
const METADATA_HEADER_PREFIX: &str = "x-ms-meta-";

/// Blob names keep unreserved characters and '/' as-is.
const BLOB_NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// A request ready to be signed and sent.
struct Request {
    method: Method,
    url: Url,
    headers: BTreeMap<String, String>,
    body: Option<Bytes>,
}

impl Request {
    fn new(method: Method, url: Url) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("x-ms-date".to_string(), format_http_date(&Utc::now()));
        headers.insert("x-ms-version".to_string(), DEFAULT_API_VERSION.to_string());
        headers.insert(
            "x-ms-client-request-id".to_string(),
            uuid::Uuid::new_v4().to_string(),
        );
        Self {
            method,
            url,
            headers,
            body: None,
        }
    }

    /// Adds a header. Names are stored lower-cased, as they are signed and sent.
    fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    fn query(mut self, key: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(key, value);
        self
    }

    fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    fn content_length(&self) -> u64 {
        self.body.as_ref().map_or(0, |b| b.len() as u64)
    }
}

/// Blob service reached over HTTP(S), e.g. Azure or a local emulator.
pub struct HttpBackend {
    client: reqwest::Client,
    /// Base URL up to, and excluding, the container segment.
    endpoint: Url,
    credential: Credential,
    /// Metadata names last written per container, as spelled by the caller.
    ///
    /// Header names arrive lower-cased, while the service keeps the case a
    /// name was written with; reads restore that spelling from here.
    metadata_names: DashMap<String, Vec<String>>,
}

impl HttpBackend {
    /// Creates a backend for `endpoint`.
    pub fn new(endpoint: Url, credential: Credential) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(ServiceError::transport)?;

        Ok(Self {
            client,
            endpoint,
            credential,
            metadata_names: DashMap::new(),
        })
    }

    /// Gives metadata names read from headers the case they were written with.
    fn restore_metadata_case(&self, container: &str, metadata: MetadataSet) -> MetadataSet {
        let Some(written) = self.metadata_names.get(container) else {
            return metadata;
        };
        metadata
            .into_iter()
            .map(|(name, value)| {
                let spelled = written
                    .iter()
                    .find(|w| w.eq_ignore_ascii_case(&name))
                    .cloned()
                    .unwrap_or(name);
                (spelled, value)
            })
            .collect()
    }

    fn base(&self) -> &str {
        self.endpoint.as_str().trim_end_matches('/')
    }

    fn parse_url(raw: &str) -> ServiceResult<Url> {
        Url::parse(raw).map_err(|e| ServiceError::with_message(ErrorCode::InvalidUri, e.to_string()))
    }

    fn service_url(&self) -> ServiceResult<Url> {
        Self::parse_url(&format!("{}/", self.base()))
    }

    fn container_url(&self, container: &str) -> ServiceResult<Url> {
        Self::parse_url(&format!("{}/{}", self.base(), container))
    }

    fn blob_url(&self, container: &str, blob: &str) -> ServiceResult<Url> {
        let encoded_blob = utf8_percent_encode(blob, BLOB_NAME_ENCODE_SET).to_string();
        Self::parse_url(&format!("{}/{}/{}", self.base(), container, encoded_blob))
    }

    /// Signs, sends, and turns any non-success status into a [`ServiceError`].
    async fn send(&self, request: Request) -> ServiceResult<reqwest::Response> {
        let content_length = request.content_length();
        let Request {
            method,
            mut url,
            headers,
            body,
        } = request;

        let authorization = match &self.credential {
            Credential::SharedKey(key) => {
                Some(key.authorization(method.as_str(), &url, &headers, content_length)?)
            }
            Credential::SasToken(token) => {
                let token = token.trim_start_matches('?');
                let query = match url.query() {
                    Some(q) if !q.is_empty() => format!("{}&{}", q, token),
                    _ => token.to_string(),
                };
                url.set_query(Some(&query));
                None
            }
            Credential::Anonymous => None,
        };

        debug!(method = %method, url = %url.path(), "Sending request");

        let mut builder = self.client.request(method, url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(auth) = authorization {
            builder = builder.header("authorization", auth);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(ServiceError::transport)?;
        let status = convert_status(response.status());
        trace!(status = %status, "Received response");

        if status.is_success() {
            return Ok(response);
        }
        Err(error_from_response(status, response).await)
    }

    /// Starts a container-level request (`restype=container`).
    fn container_request(&self, method: Method, container: &str) -> ServiceResult<Request> {
        Ok(Request::new(method, self.container_url(container)?).query("restype", "container"))
    }
}

fn convert_status(status: reqwest::StatusCode) -> StatusCode {
    StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Builds the error for a failed response from `x-ms-error-code` or the body.
async fn error_from_response(status: StatusCode, response: reqwest::Response) -> ServiceError {
    let request_id = header_str(response.headers(), "x-ms-request-id").map(str::to_string);
    let header_code = header_str(response.headers(), "x-ms-error-code").map(str::to_string);
    let body = response.text().await.unwrap_or_default();
    let parsed = parse_error_body(&body);

    let code = header_code
        .as_deref()
        .or(parsed.as_ref().map(|(c, _)| c.as_str()))
        .map(ErrorCode::from_str)
        .unwrap_or_else(|| ErrorCode::from_status(status));

    let mut error = match parsed {
        Some((_, message)) if !message.is_empty() => ServiceError::with_message(code, message),
        _ => ServiceError::new(code),
    }
    .with_status(status);

    if let Some(id) = request_id {
        error = error.with_request_id(id);
    }
    debug!(code = error.code.as_str(), status = %status, "Service returned error");
    error
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn invalid_header(name: &str) -> ServiceError {
    ServiceError::with_message(
        ErrorCode::InvalidHeaderValue,
        format!("Response header '{}' is missing or invalid", name),
    )
}

fn container_properties_from_headers(headers: &HeaderMap) -> ServiceResult<ContainerProperties> {
    let last_modified = header_str(headers, "last-modified")
        .and_then(parse_http_date)
        .ok_or_else(|| invalid_header("Last-Modified"))?;
    Ok(ContainerProperties {
        etag: header_str(headers, "etag").unwrap_or_default().to_string(),
        last_modified,
    })
}

fn metadata_from_headers(headers: &HeaderMap) -> MetadataSet {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(METADATA_HEADER_PREFIX)?;
            Some((key.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect()
}

fn blob_properties_from_headers(headers: &HeaderMap) -> ServiceResult<BlobProperties> {
    let last_modified = header_str(headers, "last-modified")
        .and_then(parse_http_date)
        .ok_or_else(|| invalid_header("Last-Modified"))?;
    // Older emulators omit the creation time
    let created_on = header_str(headers, "x-ms-creation-time")
        .and_then(parse_http_date)
        .unwrap_or(last_modified);
    let content_length = header_str(headers, "content-length")
        .map(|v| v.parse::<u64>().map_err(|_| invalid_header("Content-Length")))
        .transpose()?
        .unwrap_or(0);

    Ok(BlobProperties {
        created_on,
        last_modified,
        etag: header_str(headers, "etag").unwrap_or_default().to_string(),
        content_length,
        content_type: header_str(headers, "content-type").map(str::to_string),
        content_md5: header_str(headers, "content-md5").map(str::to_string),
    })
}

#[async_trait]
impl BlobBackend for HttpBackend {
    fn describe(&self) -> String {
        self.endpoint.to_string()
    }

    async fn probe(&self) -> ServiceResult<()> {
        let request = Request::new(Method::GET, self.service_url()?)
            .query("comp", "list")
            .query("maxresults", "1");
        self.send(request).await?;
        Ok(())
    }

    async fn create_container(&self, name: &str) -> ServiceResult<ContainerProperties> {
        let request = self
            .container_request(Method::PUT, name)?
            .body(Bytes::new());
        let response = self.send(request).await?;
        container_properties_from_headers(response.headers())
    }

    async fn delete_container(&self, name: &str) -> ServiceResult<()> {
        let request = self.container_request(Method::DELETE, name)?;
        self.send(request).await?;
        self.metadata_names.remove(name);
        Ok(())
    }

    async fn get_container(&self, name: &str) -> ServiceResult<ContainerModel> {
        let request = self.container_request(Method::HEAD, name)?;
        let response = self.send(request).await?;
        let headers = response.headers();
        Ok(ContainerModel {
            name: name.to_string(),
            properties: container_properties_from_headers(headers)?,
            metadata: self.restore_metadata_case(name, metadata_from_headers(headers)),
        })
    }

    async fn set_container_metadata(
        &self,
        name: &str,
        metadata: &MetadataSet,
    ) -> ServiceResult<ContainerProperties> {
        let mut request = self
            .container_request(Method::PUT, name)?
            .query("comp", "metadata")
            .body(Bytes::new());
        for (key, value) in metadata {
            request = request.header(&format!("{}{}", METADATA_HEADER_PREFIX, key), value.as_str());
        }
        let response = self.send(request).await?;
        self.metadata_names
            .insert(name.to_string(), metadata.keys().cloned().collect());
        container_properties_from_headers(response.headers())
    }

    async fn list_blobs(
        &self,
        container: &str,
        marker: Option<&str>,
        maxresults: Option<u32>,
    ) -> ServiceResult<BlobPage> {
        let mut request = self
            .container_request(Method::GET, container)?
            .query("comp", "list");
        if let Some(marker) = marker {
            request = request.query("marker", marker);
        }
        if let Some(max) = maxresults {
            request = request.query("maxresults", &max.to_string());
        }

        let response = self.send(request).await?;
        let body = response.text().await.map_err(ServiceError::transport)?;
        parse_blob_list(&body)
    }

    async fn put_blob(
        &self,
        container: &str,
        name: &str,
        content: Bytes,
        content_md5: Option<&str>,
    ) -> ServiceResult<UploadReceipt> {
        let mut request = Request::new(Method::PUT, self.blob_url(container, name)?)
            .header("x-ms-blob-type", "BlockBlob")
            .header("content-type", "application/octet-stream")
            .body(content);
        if let Some(md5) = content_md5 {
            request = request.header("content-md5", md5);
        }
        trace!(content_length = request.content_length(), "Uploading blob");

        let response = self.send(request).await?;
        let headers = response.headers();
        Ok(UploadReceipt {
            etag: header_str(headers, "etag").unwrap_or_default().to_string(),
            last_modified: header_str(headers, "last-modified")
                .and_then(parse_http_date)
                .ok_or_else(|| invalid_header("Last-Modified"))?,
            content_md5: header_str(headers, "content-md5").map(str::to_string),
        })
    }

    async fn get_blob(&self, container: &str, name: &str) -> ServiceResult<(BlobProperties, Bytes)> {
        let request = Request::new(Method::GET, self.blob_url(container, name)?);
        let response = self.send(request).await?;
        let properties = blob_properties_from_headers(response.headers())?;
        let content = response.bytes().await.map_err(ServiceError::transport)?;
        Ok((properties, content))
    }

    async fn get_blob_properties(&self, container: &str, name: &str) -> ServiceResult<BlobProperties> {
        let request = Request::new(Method::HEAD, self.blob_url(container, name)?);
        let response = self.send(request).await?;
        blob_properties_from_headers(response.headers())
    }

    async fn delete_blob(&self, container: &str, name: &str) -> ServiceResult<()> {
        let request = Request::new(Method::DELETE, self.blob_url(container, name)?);
        self.send(request).await?;
        Ok(())
    }
}
