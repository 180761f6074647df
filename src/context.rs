use crate::command::Command;
use crate::config::Configuration;
use crate::constants::{MAX_FETCH_BUFFER, TRANSFER_FRAME_SIZE};
use crate::error::QsError;
use crate::fetcher::Fetcher;
use crate::pipeline::DownloadPipeline;
use crate::reader::{plan_chunks, resolve_range, ObjectReader};
use crate::request::{domain_error_from_code, Transport};
use crate::types::{
    BucketInfo, HeadObjectResult, ListBucketsPage, ListObjectsPage, ListObjectsResult,
};
use crate::writer::ObjectWriter;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// The client's entrypoint: owns the configuration, the HTTP client and
/// the root cancellation token, and hands out readers and writers.
pub struct Context {
    config: Configuration,
    client: reqwest::Client,
    transport: Transport,
    cancel: CancellationToken,
}

impl Context {
    pub fn new(config: Configuration) -> Result<Self, QsError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            // one connection per request
            .pool_max_idle_per_host(0)
            .build()?;
        Self::with_http_client(config, client)
    }

    /// Build on a caller-provided client (custom DNS resolution, proxies,
    /// TLS setup).
    pub fn with_http_client(
        config: Configuration,
        client: reqwest::Client,
    ) -> Result<Self, QsError> {
        let config = config.normalized()?;
        let transport = Transport::new(client.clone(), config.connection_retries);
        Ok(Self {
            config,
            client,
            transport,
            cancel: CancellationToken::new(),
        })
    }

    pub fn from_config_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, QsError> {
        Self::new(Configuration::from_file(path)?)
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    /// Cancel every reader and writer created from this context.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn port_suffix(&self) -> String {
        let default = if self.config.protocol == "https" {
            443
        } else {
            80
        };
        if self.config.port == default {
            String::new()
        } else {
            format!(":{}", self.config.port)
        }
    }

    fn base_host(&self) -> String {
        format!("{}{}", self.config.host, self.port_suffix())
    }

    fn bucket_host(&self, bucket: &str, location: Option<&str>) -> String {
        format!(
            "{bucket}.{}.{}",
            location.unwrap_or(&self.config.location),
            self.base_host()
        )
    }

    fn endpoint(&self, host: &str) -> String {
        format!("{}://{host}", self.config.protocol)
    }

    /// All buckets, optionally restricted to one location via the
    /// `Location` header. Issued against the bare service host.
    pub async fn list_buckets(&self, location: Option<&str>) -> Result<Vec<BucketInfo>, QsError> {
        let host = self.base_host();
        let url = Url::parse(&format!("{}/", self.endpoint(&host)))?;
        let payload = self
            .transport
            .invoke(
                &host,
                &url,
                None,
                location,
                &self.config.credentials,
                &Command::ListBuckets,
            )
            .await?;
        let value = payload.into_json()?;
        check_domain_code(&value, "the bucket list")?;
        let page: ListBucketsPage = serde_json::from_value(value).map_err(|err| {
            QsError::Network(format!("could not parse list buckets response: {err}"))
        })?;
        if page.count as usize != page.buckets.len() {
            return Err(QsError::Network(format!(
                "bucket count {} does not match the returned list of {}",
                page.count,
                page.buckets.len()
            )));
        }
        Ok(page.buckets)
    }

    /// List a bucket's keys, following the `marker` pagination until the
    /// server returns a short page. The merged result is sorted by key.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<ListObjectsResult, QsError> {
        require_name(bucket, "bucket")?;
        let host = self.bucket_host(bucket, None);
        let endpoint = self.endpoint(&host);

        let mut result = ListObjectsResult::default();
        let mut marker: Option<String> = None;
        loop {
            let command = Command::ListObjects {
                prefix,
                marker: marker.as_deref(),
            };
            let url = Url::parse(&format!("{endpoint}/{}", command.query_string()))?;
            let payload = self
                .transport
                .invoke(
                    &host,
                    &url,
                    Some(bucket),
                    None,
                    &self.config.credentials,
                    &command,
                )
                .await?;
            let value = payload.into_json()?;
            check_domain_code(&value, &format!("bucket {bucket}"))?;
            let page: ListObjectsPage = serde_json::from_value(value).map_err(|err| {
                QsError::Network(format!("could not parse list objects response: {err}"))
            })?;

            let page_len = page.keys.len() as u64;
            marker = page.keys.last().map(|object| object.key.clone());
            result.name = page.name;
            result.prefix = page.prefix;
            result.limit = page.limit;
            result.objects.extend(page.keys);

            if page_len == 0 || page_len < page.limit {
                break;
            }
        }
        result.objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(result)
    }

    pub async fn head_object(&self, bucket: &str, key: &str) -> Result<HeadObjectResult, QsError> {
        require_name(bucket, "bucket")?;
        require_name(key, "key")?;
        let host = self.bucket_host(bucket, None);
        let url = Url::parse(&format!("{}/{key}", self.endpoint(&host)))?;
        let payload = self
            .transport
            .invoke(
                &host,
                &url,
                Some(bucket),
                None,
                &self.config.credentials,
                &Command::HeadObject,
            )
            .await?;
        HeadObjectResult::from_header_json(&payload.into_json()?)
    }

    pub async fn create_bucket(
        &self,
        location: Option<&str>,
        bucket: &str,
    ) -> Result<(), QsError> {
        self.bucket_admin(location, bucket, Command::CreateBucket)
            .await
    }

    pub async fn delete_bucket(
        &self,
        location: Option<&str>,
        bucket: &str,
    ) -> Result<(), QsError> {
        self.bucket_admin(location, bucket, Command::DeleteBucket)
            .await
    }

    async fn bucket_admin(
        &self,
        location: Option<&str>,
        bucket: &str,
        command: Command<'_>,
    ) -> Result<(), QsError> {
        require_name(bucket, "bucket")?;
        let host = self.bucket_host(bucket, location);
        let url = Url::parse(&format!("{}/", self.endpoint(&host)))?;
        self.transport
            .invoke(
                &host,
                &url,
                Some(bucket),
                None,
                &self.config.credentials,
                &command,
            )
            .await?;
        Ok(())
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), QsError> {
        require_name(bucket, "bucket")?;
        require_name(key, "key")?;
        let host = self.bucket_host(bucket, None);
        let url = Url::parse(&format!("{}/{key}", self.endpoint(&host)))?;
        self.transport
            .invoke(
                &host,
                &url,
                Some(bucket),
                None,
                &self.config.credentials,
                &Command::DeleteObject,
            )
            .await?;
        Ok(())
    }

    /// Open an object for reading. A HEAD resolves the content length,
    /// the requested range is normalized against it, and the range is
    /// split into chunk fetchers feeding one ordered pipeline.
    #[tracing::instrument(level = "debug", skip_all, fields(bucket = bucket, key = key))]
    pub async fn open_reader(
        &self,
        bucket: &str,
        key: &str,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Result<ObjectReader, QsError> {
        require_name(bucket, "bucket")?;
        require_name(key, "key")?;
        let head = self.head_object(bucket, key).await?;
        let size = head.content_length;
        let range = resolve_range(start, end, size)?;

        let host = self.bucket_host(bucket, None);
        let url = Url::parse(&format!("{}/{key}", self.endpoint(&host)))?;
        let connections = self.config.num_connections;
        let buffer_size = if connections > 1 {
            self.config.chunk_size.min(MAX_FETCH_BUFFER)
        } else {
            TRANSFER_FRAME_SIZE
        };

        let mut pipeline = DownloadPipeline::new(
            connections,
            self.config.connection_retries,
            self.cancel.child_token(),
        );
        if let Some((start, end)) = range {
            for chunk in plan_chunks(start, end, size, self.config.chunk_size, connections) {
                pipeline.add(Fetcher::new(
                    self.client.clone(),
                    url.clone(),
                    host.clone(),
                    bucket.to_string(),
                    self.config.credentials.clone(),
                    buffer_size,
                    chunk.offset,
                    chunk.len,
                ));
            }
        }
        debug!(size, ?range, "opened object for read");
        Ok(ObjectReader::new(pipeline, key.to_string(), size, range))
    }

    /// Open an object for writing: begins a server-side multipart session.
    #[tracing::instrument(level = "debug", skip_all, fields(bucket = bucket, key = key))]
    pub async fn open_writer(&self, bucket: &str, key: &str) -> Result<ObjectWriter, QsError> {
        require_name(bucket, "bucket")?;
        require_name(key, "key")?;
        let host = self.bucket_host(bucket, None);
        let endpoint = self.endpoint(&host);
        ObjectWriter::open(
            self.transport.clone(),
            self.config.credentials.clone(),
            host,
            endpoint,
            bucket.to_string(),
            key.to_string(),
            self.config.chunk_size,
            self.cancel.child_token(),
        )
        .await
    }
}

fn require_name(value: &str, what: &str) -> Result<(), QsError> {
    if value.is_empty() {
        return Err(QsError::InvalidParameter(format!(
            "{what} must not be empty"
        )));
    }
    Ok(())
}

fn check_domain_code(value: &Value, detail: &str) -> Result<(), QsError> {
    if let Some(code) = value.get("code").and_then(Value::as_str) {
        if let Some(err) = domain_error_from_code(code, detail) {
            return Err(err);
        }
    }
    Ok(())
}
