//! Response bodies the fake service writes, in the shapes Azure returns them.

use blob_lifecycle::models::{format_http_date, BlobPage, BlobSummary};
use blob_lifecycle::ServiceError;

/// Escapes special XML characters.
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Serializes one page of a flat blob listing.
pub fn serialize_blob_list(
    page: &BlobPage,
    marker: Option<&str>,
    maxresults: u32,
    service_endpoint: &str,
    container: &str,
) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str(&format!(
        r#"<EnumerationResults ServiceEndpoint="{}" ContainerName="{}">"#,
        xml_escape(service_endpoint),
        xml_escape(container)
    ));

    if let Some(m) = marker {
        xml.push_str(&format!("<Marker>{}</Marker>", xml_escape(m)));
    }
    xml.push_str(&format!("<MaxResults>{}</MaxResults>", maxresults));

    xml.push_str("<Blobs>");
    for blob in &page.blobs {
        xml.push_str(&serialize_blob(blob));
    }
    xml.push_str("</Blobs>");

    match page.next_marker {
        Some(ref nm) => xml.push_str(&format!("<NextMarker>{}</NextMarker>", xml_escape(nm))),
        None => xml.push_str("<NextMarker />"),
    }

    xml.push_str("</EnumerationResults>");
    xml
}

fn serialize_blob(blob: &BlobSummary) -> String {
    let props = &blob.properties;
    let mut xml = String::from("<Blob>");
    xml.push_str(&format!("<Name>{}</Name>", xml_escape(&blob.name)));

    xml.push_str("<Properties>");
    xml.push_str(&format!(
        "<Creation-Time>{}</Creation-Time>",
        format_http_date(&props.created_on)
    ));
    xml.push_str(&format!(
        "<Last-Modified>{}</Last-Modified>",
        format_http_date(&props.last_modified)
    ));
    xml.push_str(&format!("<Etag>{}</Etag>", xml_escape(&props.etag)));
    xml.push_str(&format!(
        "<Content-Length>{}</Content-Length>",
        props.content_length
    ));
    if let Some(ref ct) = props.content_type {
        xml.push_str(&format!("<Content-Type>{}</Content-Type>", xml_escape(ct)));
    }
    if let Some(ref md5) = props.content_md5 {
        xml.push_str(&format!("<Content-MD5>{}</Content-MD5>", xml_escape(md5)));
    }
    xml.push_str("<BlobType>BlockBlob</BlobType>");
    xml.push_str("</Properties>");

    xml.push_str("</Blob>");
    xml
}

/// Serializes an error response body.
pub fn serialize_error(error: &ServiceError) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str("<Error>");
    xml.push_str(&format!("<Code>{}</Code>", error.code.as_str()));
    xml.push_str(&format!("<Message>{}</Message>", xml_escape(&error.message)));
    xml.push_str("</Error>");
    xml
}
