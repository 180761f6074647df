use crate::command::{Command, ResponseShape};
use crate::credentials::Credentials;
use crate::error::QsError;
use crate::signature;
use http::header::{HeaderMap, HeaderName, HeaderValue, HOST};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, warn};
use url::Url;

/// What a request kind produced: a JSON body, the captured header block
/// (as JSON), or nothing.
#[derive(Debug)]
pub(crate) enum Payload {
    Json(Value),
    Headers(Value),
    Empty,
}

impl Payload {
    pub(crate) fn into_json(self) -> Result<Value, QsError> {
        match self {
            Payload::Json(value) | Payload::Headers(value) => Ok(value),
            Payload::Empty => Err(QsError::Network("HTTP response is empty".into())),
        }
    }
}

/// One-shot request/response with retries. Domain errors coming back from
/// the server are surfaced immediately; everything else is retried up to
/// `connection_retries` times.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    client: reqwest::Client,
    retries: u32,
}

impl Transport {
    pub(crate) fn new(client: reqwest::Client, retries: u32) -> Self {
        Self {
            client,
            retries: retries.max(1),
        }
    }

    pub(crate) async fn invoke(
        &self,
        host: &str,
        url: &Url,
        bucket: Option<&str>,
        location: Option<&str>,
        credentials: &Credentials,
        command: &Command<'_>,
    ) -> Result<Payload, QsError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .invoke_once(host, url, bucket, location, credentials, command)
                .await
            {
                Ok(payload) => return Ok(payload),
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    warn!(%url, attempt, error = %err, "request failed, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn invoke_once(
        &self,
        host: &str,
        url: &Url,
        bucket: Option<&str>,
        location: Option<&str>,
        credentials: &Credentials,
        command: &Command<'_>,
    ) -> Result<Payload, QsError> {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_str(host)?);
        if let Some(location) = location {
            headers.insert(
                HeaderName::from_static("location"),
                HeaderValue::from_str(location)?,
            );
        }

        let target = signature::signing_target(bucket, url);
        signature::sign_headers(
            &mut headers,
            &command.http_method(),
            command.content_type(),
            command.content_length(),
            &target,
            credentials,
            OffsetDateTime::now_utc(),
        )?;

        let mut builder = self
            .client
            .request(command.http_method(), url.clone())
            .headers(headers);
        if let Some(body) = command.body() {
            builder = builder.body(body);
        }
        debug!(method = %command.http_method(), %url, "issuing request");
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(classify_api_error(status.as_u16(), &body, &target));
        }

        match command.response_shape() {
            ResponseShape::Json => {
                let body = response.bytes().await?;
                if body.is_empty() {
                    return Err(QsError::Network("HTTP response is empty".into()));
                }
                let value: Value = serde_json::from_slice(&body).map_err(|err| {
                    QsError::Network(format!("HTTP response could not parse into JSON: {err}"))
                })?;
                Ok(Payload::Json(value))
            }
            ResponseShape::Headers => {
                let block = render_header_block(response.headers());
                let value = parse_header_block(&block)?;
                Ok(Payload::Headers(value))
            }
            ResponseShape::Empty => {
                let body = response.bytes().await?;
                if !body.is_empty() {
                    return Err(QsError::Network(format!(
                        "HTTP response is non-empty: {}",
                        String::from_utf8_lossy(&body)
                    )));
                }
                Ok(Payload::Empty)
            }
        }
    }
}

/// Server error codes that must not be retried.
pub(crate) fn domain_error_from_code(code: &str, detail: &str) -> Option<QsError> {
    match code {
        "permission_denied" => Some(QsError::AccessControl(format!(
            "not enough permission to access {detail}"
        ))),
        "bucket_not_exists" => Some(QsError::BucketNotExists(format!(
            "{detail} does not exist"
        ))),
        "invalid_access_key_id" => Some(QsError::InvalidParameter(format!(
            "the access key id used for {detail} does not exist"
        ))),
        _ => None,
    }
}

fn classify_api_error(status: u16, body: &[u8], detail: &str) -> QsError {
    if let Ok(api_error) = serde_json::from_slice::<crate::types::ApiErrorBody>(body) {
        if let Some(err) = domain_error_from_code(&api_error.code, detail) {
            return err;
        }
        if !api_error.message.is_empty() {
            return QsError::Network(format!("HTTP {status}: {}", api_error.message));
        }
    }
    QsError::Network(format!(
        "HTTP {status}: {}",
        String::from_utf8_lossy(body)
    ))
}

/// The captured response headers rendered back into a wire-shaped block,
/// one `Key: Value` line per header.
fn render_header_block(headers: &HeaderMap) -> String {
    let mut block = String::new();
    for (name, value) in headers {
        block.push_str(name.as_str());
        block.push_str(": ");
        block.push_str(value.to_str().unwrap_or_default());
        block.push_str("\r\n");
    }
    block
}

/// Parse a raw header block into a JSON map. `Content-Length` is emitted
/// as a number and `ETag` unquoted; everything else stays a string. Lines
/// without a colon (such as the status line) are skipped.
pub(crate) fn parse_header_block(block: &str) -> Result<Value, QsError> {
    let mut map = serde_json::Map::new();
    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        let Some(pos) = line.find(':') else {
            continue;
        };
        let key = &line[..pos];
        let value = line[pos + 1..].trim_start();
        let json_value = if key.eq_ignore_ascii_case("Content-Length") {
            let length: u64 = value.parse().map_err(|_| {
                QsError::Network(format!("header block has non-numeric Content-Length: {value}"))
            })?;
            Value::from(length)
        } else if key.eq_ignore_ascii_case("ETag") {
            Value::String(value.trim_matches('"').to_string())
        } else {
            Value::String(value.to_string())
        };
        map.insert(key.to_string(), json_value);
    }
    Ok(Value::Object(map))
}
