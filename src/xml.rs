//! S3 XML rendering for listings and errors.
//!
//! Listings and failures are rendered as the XML documents S3 returns for
//! the equivalent requests, using `quick-xml`.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Deserialize;
use std::io::Cursor;

use crate::errors::MetadataError;
use crate::metadata::{ListingEntry, ListingResult, MultipartListingRequest};

const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

// ── Error response ──────────────────────────────────────────────────

/// Render an S3 `<Error>` XML document.
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Error>
///   <Code>NoSuchBucket</Code>
///   <Message>no such bucket: mybucket</Message>
///   <Resource>/mybucket</Resource>
/// </Error>
/// ```
pub fn render_error(code: &str, message: &str, resource: &str) -> String {
    let mut writer = new_document();
    write_simple_element_group(
        &mut writer,
        "Error",
        &[("Code", code), ("Message", message), ("Resource", resource)],
    );
    finish_document(writer)
}

/// Render a [`MetadataError`] as an S3 `<Error>` document.
pub fn render_metadata_error(err: &MetadataError) -> String {
    render_error(err.code(), &err.to_string(), &err.resource())
}

// ── ListBucketResult (v1) ───────────────────────────────────────────

/// Render `<ListBucketResult>` for ListObjects (v1).
///
/// Per-object fields come from the descriptor; fields it lacks are left
/// out of the `<Contents>` element.
pub fn render_list_objects_result(bucket: &str, result: &ListingResult) -> String {
    let mut writer = new_document();
    start_root(&mut writer, "ListBucketResult");

    write_text_element(&mut writer, "Name", bucket);
    write_text_element(&mut writer, "Prefix", result.prefix.as_deref().unwrap_or(""));
    write_text_element(&mut writer, "Marker", result.marker.as_deref().unwrap_or(""));
    if let Some(delimiter) = &result.delimiter {
        write_text_element(&mut writer, "Delimiter", delimiter);
    }
    write_text_element(&mut writer, "MaxKeys", &result.max_keys.to_string());
    write_text_element(&mut writer, "IsTruncated", bool_text(result.is_truncated));
    if let Some(nm) = &result.next_marker {
        write_text_element(&mut writer, "NextMarker", nm);
    }

    for entry in &result.contents {
        write_contents(&mut writer, entry);
    }
    write_common_prefixes(&mut writer, &result.common_prefixes);

    end_root(&mut writer, "ListBucketResult");
    finish_document(writer)
}

fn write_contents(writer: &mut Writer<Cursor<Vec<u8>>>, entry: &ListingEntry) {
    let summary = entry.descriptor.summary();
    writer
        .write_event(Event::Start(BytesStart::new("Contents")))
        .expect("start Contents");
    write_text_element(writer, "Key", &entry.key);
    if let Some(lm) = &summary.last_modified {
        write_text_element(writer, "LastModified", lm);
    }
    if let Some(etag) = &summary.etag {
        write_text_element(writer, "ETag", etag);
    }
    if let Some(size) = summary.size {
        write_text_element(writer, "Size", &size.to_string());
    }
    if let Some(sc) = &summary.storage_class {
        write_text_element(writer, "StorageClass", sc);
    }
    writer
        .write_event(Event::End(BytesEnd::new("Contents")))
        .expect("end Contents");
}

// ── ListMultipartUploadsResult ──────────────────────────────────────

/// Upload fields read from an upload entry's descriptor.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UploadFields {
    upload_id: Option<String>,
    initiated: Option<String>,
    storage_class: Option<String>,
}

/// Render `<ListMultipartUploadsResult>` from a delegated upload listing.
///
/// Each entry's key is the object key; its descriptor may carry
/// `uploadId`, `initiated` and `storageClass`.
pub fn render_list_multipart_uploads_result(
    bucket: &str,
    request: &MultipartListingRequest,
    result: &ListingResult,
) -> String {
    let mut writer = new_document();
    start_root(&mut writer, "ListMultipartUploadsResult");

    write_text_element(&mut writer, "Bucket", bucket);
    write_text_element(&mut writer, "KeyMarker", result.marker.as_deref().unwrap_or(""));
    write_text_element(
        &mut writer,
        "UploadIdMarker",
        request.upload_id_marker.as_deref().unwrap_or(""),
    );
    if let Some(nkm) = &result.next_marker {
        write_text_element(&mut writer, "NextKeyMarker", nkm);
    }
    if let Some(prefix) = &result.prefix {
        write_text_element(&mut writer, "Prefix", prefix);
    }
    if let Some(delimiter) = &result.delimiter {
        write_text_element(&mut writer, "Delimiter", delimiter);
    }
    write_text_element(&mut writer, "MaxUploads", &result.max_keys.to_string());
    write_text_element(&mut writer, "IsTruncated", bool_text(result.is_truncated));

    for entry in &result.contents {
        let fields: UploadFields = entry.descriptor.parse().unwrap_or_default();
        writer
            .write_event(Event::Start(BytesStart::new("Upload")))
            .expect("start Upload");
        write_text_element(&mut writer, "Key", &entry.key);
        write_text_element(&mut writer, "UploadId", fields.upload_id.as_deref().unwrap_or(""));
        if let Some(sc) = &fields.storage_class {
            write_text_element(&mut writer, "StorageClass", sc);
        }
        if let Some(initiated) = &fields.initiated {
            write_text_element(&mut writer, "Initiated", initiated);
        }
        writer
            .write_event(Event::End(BytesEnd::new("Upload")))
            .expect("end Upload");
    }
    write_common_prefixes(&mut writer, &result.common_prefixes);

    end_root(&mut writer, "ListMultipartUploadsResult");
    finish_document(writer)
}

// ── Helpers ─────────────────────────────────────────────────────────

fn new_document() -> Writer<Cursor<Vec<u8>>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .expect("xml decl");
    writer
}

fn finish_document(writer: Writer<Cursor<Vec<u8>>>) -> String {
    String::from_utf8(writer.into_inner().into_inner()).expect("valid utf-8")
}

fn start_root(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) {
    let root = BytesStart::new(name).with_attributes([("xmlns", S3_NAMESPACE)]);
    writer.write_event(Event::Start(root)).expect("start root");
}

fn end_root(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .expect("end root");
}

fn bool_text(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn write_common_prefixes(writer: &mut Writer<Cursor<Vec<u8>>>, prefixes: &[String]) {
    for cp in prefixes {
        write_simple_element_group(writer, "CommonPrefixes", &[("Prefix", cp.as_str())]);
    }
}

/// Write `<tag>text</tag>`, escaping the text.
fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str, text: &str) {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .expect("start tag");
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .expect("text");
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .expect("end tag");
}

/// Write a parent element containing a flat list of child text elements.
///
/// ```xml
/// <parent>
///   <child1>value1</child1>
///   <child2>value2</child2>
/// </parent>
/// ```
fn write_simple_element_group(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    parent: &str,
    children: &[(&str, &str)],
) {
    writer
        .write_event(Event::Start(BytesStart::new(parent)))
        .expect("start parent");
    for (tag, value) in children {
        write_text_element(writer, tag, value);
    }
    writer
        .write_event(Event::End(BytesEnd::new(parent)))
        .expect("end parent");
}
