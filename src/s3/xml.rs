//! XML request bodies and response documents
//!
//! Parsing uses byte-slice tag matching on quick-xml events and moves text
//! out of a reusable buffer with `std::mem::take`.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::fmt::Write as FmtWrite;

use crate::s3::error::{Result, S3Error};
use crate::s3::types::{
    Bucket, CompleteMultipartUploadResponse, CompletedPart, InitiateMultipartUploadResponse,
    ListObjectsPage, S3Object,
};

/// `<Error>` document returned by S3
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDocument {
    pub code: String,
    pub message: String,
}

// Text is not trimmed: keys and prefixes may start or end with whitespace.
// Parsers clear their text buffer on every start and end tag, so the
// indentation between elements never reaches a field.
fn reader(xml: &[u8]) -> Reader<&[u8]> {
    Reader::from_reader(xml)
}

fn parse_error(e: quick_xml::Error) -> S3Error {
    S3Error::Xml(format!("XML parse error: {}", e))
}

fn unquote(etag: &str) -> String {
    etag.trim().trim_matches('"').to_string()
}

/// Escape XML special characters into an existing buffer
pub fn xml_escape_into(buf: &mut String, s: &str) {
    for ch in s.chars() {
        match ch {
            '&' => buf.push_str("&amp;"),
            '<' => buf.push_str("&lt;"),
            '>' => buf.push_str("&gt;"),
            '"' => buf.push_str("&quot;"),
            '\'' => buf.push_str("&apos;"),
            _ => buf.push(ch),
        }
    }
}

/// Name of the document's root element
fn root_element(xml: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut reader = reader(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(Some(e.local_name().as_ref().to_vec()))
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
    }
}

/// Text of the first occurrence of each wanted element, for flat documents
fn collect_fields(xml: &[u8], wanted: &[&str]) -> Result<HashMap<String, String>> {
    let mut reader = reader(xml);
    let mut fields = HashMap::new();
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => current_text.clear(),
            Ok(Event::Text(e)) => {
                current_text.push_str(&e.unescape()?);
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if wanted.contains(&name.as_str()) && !fields.contains_key(&name) {
                    fields.insert(name, std::mem::take(&mut current_text));
                }
                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
    }

    Ok(fields)
}

/// `Some` when the body is an S3 `<Error>` document
pub fn parse_error_document(xml: &[u8]) -> Option<ErrorDocument> {
    match root_element(xml) {
        Ok(Some(root)) if root == b"Error" => {}
        _ => return None,
    }
    let mut fields = collect_fields(xml, &["Code", "Message"]).ok()?;
    Some(ErrorDocument {
        code: fields.remove("Code").unwrap_or_default(),
        message: fields.remove("Message").unwrap_or_default(),
    })
}

/// Parse a ListObjects (v1) page.
///
/// The continuation marker is `NextMarker` when present, otherwise the
/// greatest key or common prefix of a truncated page.
pub fn parse_list_objects(xml: &[u8]) -> Result<ListObjectsPage> {
    let mut reader = reader(xml);

    let mut page = ListObjectsPage::new();
    let mut current_object: Option<S3Object> = None;
    let mut current_text = String::with_capacity(256);
    let mut in_common_prefixes = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                current_text.clear();
                match e.local_name().as_ref() {
                    b"Contents" => {
                        current_object = Some(S3Object::new(String::new(), 0));
                    }
                    b"CommonPrefixes" => {
                        in_common_prefixes = true;
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                current_text.push_str(&e.unescape()?);
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"Key" => {
                        if let Some(ref mut obj) = current_object {
                            obj.key = std::mem::take(&mut current_text);
                        }
                    }
                    b"Size" => {
                        if let Some(ref mut obj) = current_object {
                            obj.size = current_text.trim().parse().unwrap_or(0);
                        }
                    }
                    b"LastModified" => {
                        if let Some(ref mut obj) = current_object {
                            obj.last_modified = Some(current_text.trim().to_string());
                        }
                    }
                    b"ETag" => {
                        if let Some(ref mut obj) = current_object {
                            obj.etag = Some(unquote(&current_text));
                        }
                    }
                    b"StorageClass" => {
                        if let Some(ref mut obj) = current_object {
                            obj.storage_class = Some(current_text.trim().to_string());
                        }
                    }
                    b"Contents" => {
                        if let Some(obj) = current_object.take() {
                            page.contents.push(obj);
                        }
                    }
                    b"CommonPrefixes" => {
                        in_common_prefixes = false;
                    }
                    b"Prefix" => {
                        if in_common_prefixes {
                            page.common_prefixes.push(std::mem::take(&mut current_text));
                        } else if !current_text.is_empty() {
                            page.prefix = Some(std::mem::take(&mut current_text));
                        }
                    }
                    b"IsTruncated" => {
                        page.is_truncated = current_text.trim() == "true";
                    }
                    b"NextMarker" => {
                        if !current_text.is_empty() {
                            page.next_marker = Some(std::mem::take(&mut current_text));
                        }
                    }
                    b"MaxKeys" => {
                        page.max_keys = current_text.trim().parse().ok();
                    }
                    _ => {}
                }

                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
    }

    if !page.is_truncated {
        page.next_marker = None;
    } else if page.next_marker.is_none() {
        let last_key = page.contents.last().map(|o| o.key.as_str());
        let last_prefix = page.common_prefixes.last().map(String::as_str);
        page.next_marker = last_key.max(last_prefix).map(str::to_string);
    }

    Ok(page)
}

/// Parse InitiateMultipartUploadResult
pub fn parse_initiate_multipart(xml: &[u8]) -> Result<InitiateMultipartUploadResponse> {
    let mut fields = collect_fields(xml, &["Bucket", "Key", "UploadId"])?;
    let upload_id = fields
        .remove("UploadId")
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| S3Error::Xml("missing UploadId in InitiateMultipartUploadResult".to_string()))?;

    Ok(InitiateMultipartUploadResponse::new(
        fields.remove("Bucket").unwrap_or_default(),
        fields.remove("Key").unwrap_or_default(),
        upload_id,
    ))
}

/// Parse CompleteMultipartUploadResult
pub fn parse_complete_multipart(xml: &[u8]) -> Result<CompleteMultipartUploadResponse> {
    let mut fields = collect_fields(xml, &["Location", "Bucket", "Key", "ETag"])?;
    let etag = fields
        .remove("ETag")
        .map(|etag| unquote(&etag))
        .ok_or_else(|| S3Error::Xml("missing ETag in CompleteMultipartUploadResult".to_string()))?;

    let mut response = CompleteMultipartUploadResponse::new(
        fields.remove("Bucket").unwrap_or_default(),
        fields.remove("Key").unwrap_or_default(),
        etag,
    );
    response.location = fields.remove("Location");
    Ok(response)
}

/// Parse LocationConstraint; an empty constraint means us-east-1
pub fn parse_location(xml: &[u8]) -> Result<String> {
    let location = collect_fields(xml, &["LocationConstraint"])?
        .remove("LocationConstraint")
        .unwrap_or_default();
    Ok(match location.trim() {
        "" => "us-east-1".to_string(),
        // Legacy alias for eu-west-1
        "EU" => "eu-west-1".to_string(),
        other => other.to_string(),
    })
}

/// Parse ListAllMyBucketsResult
pub fn parse_list_buckets(xml: &[u8]) -> Result<Vec<Bucket>> {
    let mut reader = reader(xml);
    let mut buckets = Vec::new();
    let mut current: Option<Bucket> = None;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current_text.clear();
                if e.local_name().as_ref() == b"Bucket" {
                    current = Some(Bucket {
                        name: String::new(),
                        creation_date: None,
                    });
                }
            }
            Ok(Event::Text(e)) => {
                current_text.push_str(&e.unescape()?);
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"Name" => {
                        if let Some(ref mut bucket) = current {
                            bucket.name = current_text.trim().to_string();
                        }
                    }
                    b"CreationDate" => {
                        if let Some(ref mut bucket) = current {
                            bucket.creation_date = Some(current_text.trim().to_string());
                        }
                    }
                    b"Bucket" => {
                        if let Some(bucket) = current.take() {
                            buckets.push(bucket);
                        }
                    }
                    _ => {}
                }
                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
    }

    Ok(buckets)
}

/// Body of CompleteMultipartUpload, parts in the given order
pub fn complete_multipart_body(parts: &[CompletedPart]) -> String {
    let mut xml = String::with_capacity(parts.len() * 100 + 100);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    xml.push_str("<CompleteMultipartUpload>");
    for part in parts {
        xml.push_str("<Part><PartNumber>");
        let _ = write!(xml, "{}", part.part_number);
        xml.push_str("</PartNumber><ETag>\"");
        xml_escape_into(&mut xml, part.etag.trim_matches('"'));
        xml.push_str("\"</ETag></Part>");
    }
    xml.push_str("</CompleteMultipartUpload>");
    xml
}
