//! XML response parsing for the Azure Blob Storage API.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{ErrorCode, ServiceError, ServiceResult};
use crate::models::{parse_http_date, BlobPage, BlobProperties, BlobSummary};

fn invalid_xml(detail: impl Into<String>) -> ServiceError {
    ServiceError::with_message(ErrorCode::InvalidXmlDocument, detail)
}

/// Properties of one `<Blob>` element, collected before validation.
#[derive(Debug, Default)]
struct PartialBlob {
    name: Option<String>,
    created_on: Option<String>,
    last_modified: Option<String>,
    etag: Option<String>,
    content_length: Option<String>,
    content_type: Option<String>,
    content_md5: Option<String>,
}

impl PartialBlob {
    fn set(&mut self, element: &str, value: String) {
        match element {
            "Name" => self.name = Some(value),
            "Creation-Time" => self.created_on = Some(value),
            "Last-Modified" => self.last_modified = Some(value),
            "Etag" => self.etag = Some(value),
            "Content-Length" => self.content_length = Some(value),
            "Content-Type" => self.content_type = Some(value),
            "Content-MD5" => self.content_md5 = Some(value),
            _ => {}
        }
    }

    fn finish(self) -> ServiceResult<BlobSummary> {
        let name = self.name.ok_or_else(|| invalid_xml("Blob entry without Name"))?;

        let date = |value: Option<String>, field: &str| {
            value
                .as_deref()
                .and_then(parse_http_date)
                .ok_or_else(|| invalid_xml(format!("Blob '{}' has no valid {}", name, field)))
        };
        let created_on = date(self.created_on, "Creation-Time")?;
        let last_modified = date(self.last_modified, "Last-Modified")?;

        let content_length = match self.content_length {
            Some(len) => len
                .parse()
                .map_err(|_| invalid_xml(format!("Blob '{}' has invalid Content-Length", name)))?,
            None => 0,
        };

        Ok(BlobSummary {
            properties: BlobProperties {
                created_on,
                last_modified,
                etag: self.etag.unwrap_or_default(),
                content_length,
                content_type: self.content_type,
                content_md5: self.content_md5,
            },
            name,
        })
    }
}

/// Parses an `EnumerationResults` body from List Blobs.
pub fn parse_blob_list(xml: &str) -> ServiceResult<BlobPage> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut page = BlobPage::default();
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<PartialBlob> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "Blob" && path.last().map(String::as_str) == Some("Blobs") {
                    current = Some(PartialBlob::default());
                }
                path.push(name);
            }
            Ok(Event::End(_)) => {
                if path.pop().as_deref() == Some("Blob") {
                    if let Some(blob) = current.take() {
                        page.blobs.push(blob.finish()?);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let value = e
                    .unescape()
                    .map_err(|_| invalid_xml("Invalid text in listing"))?
                    .to_string();
                match (path.last().map(String::as_str), current.as_mut()) {
                    (Some("NextMarker"), None) if !value.is_empty() => {
                        page.next_marker = Some(value)
                    }
                    (Some(element), Some(blob)) => blob.set(element, value),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(invalid_xml(format!("Malformed listing: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(page)
}

/// Extracts `(Code, Message)` from an `<Error>` body, if it is one.
pub fn parse_error_body(xml: &str) -> Option<(String, String)> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut current_element: Option<String> = None;
    let mut code = None;
    let mut message = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                current_element = Some(String::from_utf8_lossy(e.name().as_ref()).to_string());
            }
            Ok(Event::End(_)) => current_element = None,
            Ok(Event::Text(e)) => {
                let text = e.unescape().ok()?.to_string();
                match current_element.as_deref() {
                    Some("Code") => code = Some(text),
                    Some("Message") => message = text,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }

    code.map(|c| (c, message))
}
