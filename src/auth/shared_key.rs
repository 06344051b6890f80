//! SharedKey request signing.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;
use url::Url;

use crate::error::{ErrorCode, ServiceError, ServiceResult};

type HmacSha256 = Hmac<Sha256>;

/// Standard headers that take part in the string-to-sign, in order.
/// Content-Length is handled separately.
const SIGNED_CONTENT_HEADERS: [&str; 2] = ["content-encoding", "content-language"];
const SIGNED_TRAILING_HEADERS: [&str; 8] = [
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

/// Account name plus decoded account key.
#[derive(Clone)]
pub struct SharedKeyCredential {
    account: String,
    key: Vec<u8>,
}

impl SharedKeyCredential {
    /// Creates a credential from the base64 account key found in connection strings.
    pub fn new(account: impl Into<String>, account_key: &str) -> ServiceResult<Self> {
        let key = BASE64.decode(account_key.trim()).map_err(|_| {
            ServiceError::with_message(
                ErrorCode::InvalidAuthenticationInfo,
                "Account key is not valid base64",
            )
        })?;
        Ok(Self {
            account: account.into(),
            key,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Returns the `Authorization` header value for a request.
    ///
    /// `headers` must hold every header that will be sent, keyed by lowercase
    /// name, including `x-ms-date` and `x-ms-version`.
    pub fn authorization(
        &self,
        method: &str,
        url: &Url,
        headers: &BTreeMap<String, String>,
        content_length: u64,
    ) -> ServiceResult<String> {
        let string_to_sign = build_string_to_sign(&self.account, method, url, headers, content_length);
        let signature = compute_signature(&string_to_sign, &self.key)?;
        tracing::trace!(string_to_sign = ?string_to_sign, "signed request");
        Ok(format!("SharedKey {}:{}", self.account, signature))
    }
}

/// Builds the string-to-sign for SharedKey authentication.
pub fn build_string_to_sign(
    account: &str,
    method: &str,
    url: &Url,
    headers: &BTreeMap<String, String>,
    content_length: u64,
) -> String {
    let header = |name: &str| headers.get(name).map(String::as_str).unwrap_or("");

    let mut parts = Vec::with_capacity(12);
    parts.push(method.to_uppercase());
    for name in SIGNED_CONTENT_HEADERS {
        parts.push(header(name).to_string());
    }
    // Content-Length is empty when zero
    parts.push(if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    });
    for name in SIGNED_TRAILING_HEADERS {
        // x-ms-date supersedes Date
        if name == "date" && headers.contains_key("x-ms-date") {
            parts.push(String::new());
        } else {
            parts.push(header(name).to_string());
        }
    }

    format!(
        "{}\n{}{}",
        parts.join("\n"),
        canonicalized_headers(headers),
        canonicalized_resource(account, url)
    )
}

/// Each `x-ms-*` header as `name:value\n`, sorted by name.
fn canonicalized_headers(headers: &BTreeMap<String, String>) -> String {
    let mut result = String::new();
    for (name, value) in headers.iter().filter(|(k, _)| k.starts_with("x-ms-")) {
        let normalized_value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        result.push_str(name);
        result.push(':');
        result.push_str(&normalized_value);
        result.push('\n');
    }
    result
}

/// `/{account}{path}` followed by `\nname:value` per query parameter.
fn canonicalized_resource(account: &str, url: &Url) -> String {
    let mut resource = format!("/{}{}", account, url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url.query_pairs() {
        params
            .entry(key.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }

    for (key, mut values) in params {
        values.sort();
        resource.push('\n');
        resource.push_str(&key);
        resource.push(':');
        resource.push_str(&values.join(","));
    }

    resource
}

/// Computes HMAC-SHA256 signature.
pub fn compute_signature(string_to_sign: &str, key: &[u8]) -> ServiceResult<String> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| {
        ServiceError::with_message(ErrorCode::InvalidAuthenticationInfo, "Failed to create HMAC")
    })?;

    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
