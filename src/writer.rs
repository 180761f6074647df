use crate::command::{Command, UploadManifest};
use crate::constants::TRANSFER_FRAME_SIZE;
use crate::credentials::Credentials;
use crate::error::QsError;
use crate::request::{domain_error_from_code, Transport};
use crate::types::InitiateMultipartUploadResponse;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Buffered multipart upload of one object. Caller writes accumulate into
/// a chunk-size buffer; each full buffer goes out as one part PUT, in
/// part-number order starting at 0. `close` uploads the final partial part
/// and sends the completion manifest; `cancel` aborts the server-side
/// session instead.
#[derive(Debug)]
pub struct ObjectWriter {
    transport: Transport,
    credentials: Credentials,
    host: String,
    endpoint: String,
    bucket: String,
    key: String,
    upload_id: String,
    chunk_size: usize,
    buffer: Vec<u8>,
    part_number: u32,
    bytes_written: u64,
    cancel: CancellationToken,
    canceled: bool,
}

impl ObjectWriter {
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn open(
        transport: Transport,
        credentials: Credentials,
        host: String,
        endpoint: String,
        bucket: String,
        key: String,
        chunk_size: u64,
        cancel: CancellationToken,
    ) -> Result<Self, QsError> {
        let command = Command::InitiateMultipartUpload;
        let url = Url::parse(&format!("{endpoint}/{key}{}", command.query_string()))?;
        let payload = transport
            .invoke(&host, &url, Some(&bucket), None, &credentials, &command)
            .await?;

        let value = payload.into_json()?;
        if let Some(code) = value.get("code").and_then(|v| v.as_str()) {
            if let Some(err) = domain_error_from_code(code, &format!("bucket {bucket}")) {
                return Err(err);
            }
        }
        let init: InitiateMultipartUploadResponse =
            serde_json::from_value(value).map_err(|err| {
                QsError::Network(format!("could not init multipart upload: {err}"))
            })?;
        debug!(upload_id = %init.upload_id, key = %init.key, "initiated multipart upload");

        let chunk_size = chunk_size as usize;
        Ok(Self {
            transport,
            credentials,
            host,
            endpoint,
            bucket,
            key: init.key,
            upload_id: init.upload_id,
            chunk_size,
            buffer: Vec::with_capacity(chunk_size),
            part_number: 0,
            bytes_written: 0,
            cancel,
            canceled: false,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Session id assigned by the server; immutable for the writer's life.
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Buffer `data`, issuing a part PUT for every `chunk_size` bytes
    /// accumulated.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, QsError> {
        if self.canceled {
            return Err(QsError::Canceled);
        }
        let mut rest = data;
        while !rest.is_empty() {
            let room = self.chunk_size - self.buffer.len();
            let take = room.min(rest.len());
            self.buffer.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.buffer.len() == self.chunk_size {
                self.send_part().await?;
            }
        }
        self.bytes_written += data.len() as u64;
        Ok(data.len())
    }

    /// Copy a whole `AsyncRead` into the upload; returns the byte count.
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> Result<u64, QsError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; TRANSFER_FRAME_SIZE as usize];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            self.write(&buf[..n]).await?;
            total += n as u64;
        }
    }

    /// Upload the final partial part (or a single empty part for a
    /// zero-byte stream) and send the completion manifest.
    pub async fn close(mut self) -> Result<(), QsError> {
        if self.canceled || self.cancel.is_cancelled() {
            // close after cancel attempts no completion
            return Err(QsError::Canceled);
        }
        if !self.buffer.is_empty() || self.part_number == 0 {
            // a zero-byte stream still uploads one empty part so the
            // session finalizes into an empty object
            self.send_part().await?;
        }

        let manifest = UploadManifest::for_parts(self.part_number);
        let body = manifest.to_body()?;
        let command = Command::CompleteMultipartUpload {
            upload_id: &self.upload_id,
            body,
        };
        let url = Url::parse(&format!(
            "{}/{}{}",
            self.endpoint,
            self.key,
            command.query_string()
        ))?;
        self.transport
            .invoke(
                &self.host,
                &url,
                Some(&self.bucket),
                None,
                &self.credentials,
                &command,
            )
            .await?;
        debug!(
            parts = self.part_number,
            bytes = self.bytes_written,
            "completed multipart upload"
        );
        Ok(())
    }

    /// Abandon the upload and abort the server-side session, leaving no
    /// dangling multipart state behind.
    pub async fn cancel(mut self) -> Result<(), QsError> {
        self.canceled = true;
        self.abort_session().await
    }

    async fn send_part(&mut self) -> Result<(), QsError> {
        if self.cancel.is_cancelled() {
            self.canceled = true;
            if let Err(err) = self.abort_session().await {
                warn!(error = %err, "could not abort multipart upload after cancel");
            }
            return Err(QsError::Canceled);
        }

        let content = Bytes::from(std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(self.chunk_size),
        ));
        let size = content.len();
        let command = Command::UploadPart {
            part_number: self.part_number,
            upload_id: &self.upload_id,
            content,
        };
        let url = Url::parse(&format!(
            "{}/{}{}",
            self.endpoint,
            self.key,
            command.query_string()
        ))?;
        self.transport
            .invoke(
                &self.host,
                &url,
                Some(&self.bucket),
                None,
                &self.credentials,
                &command,
            )
            .await?;
        debug!(part_number = self.part_number, size, "uploaded part");
        self.part_number += 1;
        Ok(())
    }

    async fn abort_session(&self) -> Result<(), QsError> {
        let command = Command::AbortMultipartUpload {
            upload_id: &self.upload_id,
        };
        let url = Url::parse(&format!(
            "{}/{}{}",
            self.endpoint,
            self.key,
            command.query_string()
        ))?;
        self.transport
            .invoke(
                &self.host,
                &url,
                Some(&self.bucket),
                None,
                &self.credentials,
                &command,
            )
            .await?;
        debug!(upload_id = %self.upload_id, "aborted multipart upload");
        Ok(())
    }
}
