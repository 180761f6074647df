use crate::error::QsError;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize, Debug, Clone)]
pub struct BucketInfo {
    /// Bucket name, globally unique within a location.
    pub name: String,
    /// Region identifier.
    pub location: String,
    pub url: String,
    /// Creation timestamp, ISO-8601.
    pub created: String,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct ListBucketsPage {
    pub count: u64,
    #[serde(default)]
    pub buckets: Vec<BucketInfo>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// The object's key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ListObjectsPage {
    pub name: String,
    #[serde(default)]
    pub prefix: String,
    pub limit: u64,
    #[serde(default)]
    pub keys: Vec<ObjectInfo>,
}

/// Merged result of a paginated listing, sorted by key.
#[derive(Debug, Default)]
pub struct ListObjectsResult {
    pub name: String,
    pub prefix: String,
    pub limit: u64,
    pub objects: Vec<ObjectInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct HeadObjectResult {
    pub content_type: String,
    pub content_length: u64,
    pub last_modified: String,
    pub etag: String,
}

impl HeadObjectResult {
    /// Build from the parsed header block. `Content-Type`, `Content-Length`
    /// and `Last-Modified` are required; `ETag` may be absent.
    pub(crate) fn from_header_json(value: &Value) -> Result<Self, QsError> {
        let field = |name: &str| {
            value
                .as_object()
                .and_then(|map| map.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)))
                .map(|(_, v)| v)
        };
        let text = |name: &str| -> Option<String> {
            field(name).and_then(Value::as_str).map(str::to_string)
        };

        let content_type = text("Content-Type")
            .ok_or_else(|| QsError::Network("head response is missing Content-Type".into()))?;
        let content_length = field("Content-Length")
            .and_then(Value::as_u64)
            .ok_or_else(|| QsError::Network("head response is missing Content-Length".into()))?;
        let last_modified = text("Last-Modified")
            .ok_or_else(|| QsError::Network("head response is missing Last-Modified".into()))?;
        let etag = text("ETag").unwrap_or_default();

        Ok(Self {
            content_type,
            content_length,
            last_modified,
            etag,
        })
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct InitiateMultipartUploadResponse {
    pub upload_id: String,
    pub key: String,
}

/// Error body the server attaches to failed requests.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn head_result_reads_all_four_fields() {
        let value = json!({
            "Content-Type": "text/plain",
            "Content-Length": 42,
            "Last-Modified": "Mon, 01 Jan 2024 00:00:00 GMT",
            "ETag": "abc",
        });
        let head = HeadObjectResult::from_header_json(&value).unwrap();
        assert_eq!(head.content_type, "text/plain");
        assert_eq!(head.content_length, 42);
        assert_eq!(head.last_modified, "Mon, 01 Jan 2024 00:00:00 GMT");
        assert_eq!(head.etag, "abc");
    }

    #[test]
    fn head_result_accepts_lowercased_header_names() {
        let value = json!({
            "content-type": "application/octet-stream",
            "content-length": 0,
            "last-modified": "Mon, 01 Jan 2024 00:00:00 GMT",
        });
        let head = HeadObjectResult::from_header_json(&value).unwrap();
        assert_eq!(head.content_type, "application/octet-stream");
        assert_eq!(head.content_length, 0);
        assert_eq!(head.etag, "");
    }

    #[test]
    fn head_result_requires_a_length() {
        let value = json!({ "Content-Type": "text/plain" });
        assert!(matches!(
            HeadObjectResult::from_header_json(&value),
            Err(QsError::Network(_))
        ));
    }

    #[test]
    fn list_pages_tolerate_missing_keys() {
        let page: ListObjectsPage =
            serde_json::from_value(json!({ "name": "b", "limit": 200 })).unwrap();
        assert_eq!(page.keys.len(), 0);
        assert_eq!(page.prefix, "");
    }
}
