use crate::signature::uri_encode;
use bytes::Bytes;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CompletedPart {
    pub part_number: u32,
}

/// Body of the completion request: every issued part number, in order.
#[derive(Debug, Serialize)]
pub struct UploadManifest {
    pub object_parts: Vec<CompletedPart>,
}

impl UploadManifest {
    pub fn for_parts(count: u32) -> Self {
        Self {
            object_parts: (0..count)
                .map(|part_number| CompletedPart { part_number })
                .collect(),
        }
    }

    pub fn to_body(&self) -> Result<Bytes, crate::error::QsError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

/// What the invoker is expected to hand back for a request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseShape {
    /// Body must parse as JSON.
    Json,
    /// No body; the captured response headers are the result.
    Headers,
    /// Body must be empty.
    Empty,
}

#[derive(Debug)]
pub(crate) enum Command<'a> {
    ListBuckets,
    ListObjects {
        prefix: Option<&'a str>,
        marker: Option<&'a str>,
    },
    HeadObject,
    GetData,
    CreateBucket,
    DeleteBucket,
    DeleteObject,
    InitiateMultipartUpload,
    UploadPart {
        part_number: u32,
        upload_id: &'a str,
        content: Bytes,
    },
    CompleteMultipartUpload {
        upload_id: &'a str,
        body: Bytes,
    },
    AbortMultipartUpload {
        upload_id: &'a str,
    },
}

impl<'a> Command<'a> {
    pub(crate) fn http_method(&self) -> http::Method {
        match self {
            Command::ListBuckets | Command::ListObjects { .. } | Command::GetData => {
                http::Method::GET
            }
            Command::HeadObject => http::Method::HEAD,
            Command::CreateBucket | Command::UploadPart { .. } => http::Method::PUT,
            Command::DeleteBucket
            | Command::DeleteObject
            | Command::AbortMultipartUpload { .. } => http::Method::DELETE,
            Command::InitiateMultipartUpload | Command::CompleteMultipartUpload { .. } => {
                http::Method::POST
            }
        }
    }

    /// Participates in the canonical string, so only the kinds the signing
    /// rules name carry one.
    pub(crate) fn content_type(&self) -> Option<&'static str> {
        match self {
            Command::InitiateMultipartUpload | Command::UploadPart { .. } => Some("plain/text"),
            Command::CompleteMultipartUpload { .. } => Some("application/json"),
            _ => None,
        }
    }

    pub(crate) fn body(&self) -> Option<Bytes> {
        match self {
            Command::InitiateMultipartUpload => Some(Bytes::from_static(b"uploads")),
            Command::UploadPart { content, .. } => Some(content.clone()),
            Command::CompleteMultipartUpload { body, .. } => Some(body.clone()),
            _ => None,
        }
    }

    pub(crate) fn content_length(&self) -> u64 {
        self.body().map(|body| body.len() as u64).unwrap_or(0)
    }

    pub(crate) fn query_string(&self) -> String {
        match self {
            Command::ListObjects { prefix, marker } => {
                let mut query = String::new();
                if let Some(marker) = marker {
                    query.push_str("marker=");
                    query.push_str(&uri_encode(marker, true));
                }
                if let Some(prefix) = prefix {
                    if !query.is_empty() {
                        query.push('&');
                    }
                    query.push_str("prefix=");
                    query.push_str(&uri_encode(prefix, true));
                }
                if query.is_empty() {
                    query
                } else {
                    format!("?{query}")
                }
            }
            Command::InitiateMultipartUpload => "?uploads".to_string(),
            Command::UploadPart {
                part_number,
                upload_id,
                ..
            } => format!("?part_number={part_number}&upload_id={upload_id}"),
            Command::CompleteMultipartUpload { upload_id, .. }
            | Command::AbortMultipartUpload { upload_id } => {
                format!("?upload_id={upload_id}")
            }
            _ => String::new(),
        }
    }

    pub(crate) fn response_shape(&self) -> ResponseShape {
        match self {
            Command::ListBuckets | Command::ListObjects { .. } | Command::InitiateMultipartUpload => {
                ResponseShape::Json
            }
            Command::HeadObject => ResponseShape::Headers,
            _ => ResponseShape::Empty,
        }
    }
}
