use crate::command::Command;
use crate::constants::TRANSFER_FRAME_SIZE;
use crate::credentials::Credentials;
use crate::error::QsError;
use crate::signature;
use bytes::{Buf, Bytes};
use flume::Receiver;
use futures_util::StreamExt;
use http::header::{HeaderMap, HeaderValue, HOST, RANGE};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FetcherState {
    Init,
    Running,
    Failed,
    Done,
}

/// Drives one ranged GET. The transfer task pushes body frames into a
/// bounded channel sized from the buffer budget; a full channel stalls the
/// transfer until the consumer drains it, which is the back-pressure
/// point. A failed fetcher keeps its delivered-byte count so a restart
/// resumes exactly where bytes ran out.
pub(crate) struct Fetcher {
    client: reqwest::Client,
    url: Url,
    host: String,
    bucket: String,
    credentials: Credentials,
    buffer_size: u64,
    offset: u64,
    len: Option<u64>,
    bytes_done: u64,
    state: FetcherState,
    failures: u32,
    last_error: Option<QsError>,
    tail: Bytes,
    rx: Option<Receiver<Bytes>>,
    task: Option<JoinHandle<Result<(), QsError>>>,
}

impl Fetcher {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        client: reqwest::Client,
        url: Url,
        host: String,
        bucket: String,
        credentials: Credentials,
        buffer_size: u64,
        offset: u64,
        len: Option<u64>,
    ) -> Self {
        Self {
            client,
            url,
            host,
            bucket,
            credentials,
            buffer_size: buffer_size.max(TRANSFER_FRAME_SIZE),
            offset,
            len,
            bytes_done: 0,
            state: FetcherState::Init,
            failures: 0,
            last_error: None,
            tail: Bytes::new(),
            rx: None,
            task: None,
        }
    }

    pub(crate) fn state(&self) -> FetcherState {
        self.state
    }

    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }

    pub(crate) fn take_last_error(&mut self) -> QsError {
        self.last_error
            .take()
            .unwrap_or_else(|| QsError::Network("chunk download failed".into()))
    }

    fn resume_offset(&self) -> u64 {
        self.offset + self.bytes_done
    }

    fn remaining(&self) -> Option<u64> {
        self.len.map(|len| len.saturating_sub(self.bytes_done))
    }

    /// All bytes of a known-length chunk have been delivered.
    pub(crate) fn is_exhausted(&self) -> bool {
        matches!(self.remaining(), Some(0))
    }

    fn range_header(&self) -> Option<String> {
        let offset = self.resume_offset();
        match self.remaining() {
            Some(remaining) => Some(format!("bytes={}-{}", offset, offset + remaining - 1)),
            None if offset > 0 => Some(format!("bytes={}-", offset)),
            None => None,
        }
    }

    /// Issue (or re-issue) the GET. The range picks up at
    /// `offset + bytes_done`, so a restart after a failure continues the
    /// byte stream without a seam.
    pub(crate) fn start(&mut self) -> Result<(), QsError> {
        debug_assert!(matches!(
            self.state,
            FetcherState::Init | FetcherState::Failed
        ));

        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_str(&self.host)?);
        if let Some(range) = self.range_header() {
            headers.insert(RANGE, HeaderValue::try_from(range)?);
        }
        let command = Command::GetData;
        let target = signature::signing_target(Some(&self.bucket), &self.url);
        signature::sign_headers(
            &mut headers,
            &command.http_method(),
            command.content_type(),
            command.content_length(),
            &target,
            &self.credentials,
            OffsetDateTime::now_utc(),
        )?;

        let capacity = (self.buffer_size / TRANSFER_FRAME_SIZE).max(1) as usize;
        let (tx, rx) = flume::bounded::<Bytes>(capacity);
        let request = self.client.get(self.url.clone()).headers(headers);
        let url = self.url.clone();
        let task = tokio::spawn(async move {
            let response = request.send().await?;
            let status = response.status().as_u16();
            if status != 200 && status != 206 {
                warn!(%url, status, "received HTTP code {status}");
                return Err(QsError::Network(format!(
                    "ranged fetch returned HTTP {status}"
                )));
            }
            let mut body = response.bytes_stream();
            while let Some(frame) = body.next().await {
                let frame = frame?;
                if tx.send_async(frame).await.is_err() {
                    // consumer is gone
                    break;
                }
            }
            Ok(())
        });

        self.rx = Some(rx);
        self.task = Some(task);
        self.state = FetcherState::Running;
        debug!(
            url = %self.url,
            offset = self.resume_offset(),
            len = ?self.len,
            "starting download"
        );
        Ok(())
    }

    /// Copy already-received bytes into `buf`, never exceeding the chunk
    /// length. Returns 0 when nothing is buffered right now.
    pub(crate) fn copy_buffered(&mut self, buf: &mut [u8]) -> usize {
        loop {
            if self.is_exhausted() {
                self.tail = Bytes::new();
                return 0;
            }
            if !self.tail.is_empty() {
                let mut n = self.tail.len().min(buf.len());
                if let Some(remaining) = self.remaining() {
                    n = n.min(remaining as usize);
                }
                if n == 0 {
                    return 0;
                }
                buf[..n].copy_from_slice(&self.tail[..n]);
                self.tail.advance(n);
                self.bytes_done += n as u64;
                return n;
            }
            match self.rx.as_ref().map(|rx| rx.try_recv()) {
                Some(Ok(frame)) => self.tail = frame,
                _ => return 0,
            }
        }
    }

    /// Wait up to one second for transfer activity: either a new frame
    /// arrives, or the transfer ends and is classified into Done/Failed.
    pub(crate) async fn pump(&mut self) -> Result<(), QsError> {
        let Some(rx) = self.rx.clone() else {
            return self.classify().await;
        };
        match tokio::time::timeout(Duration::from_millis(1000), rx.recv_async()).await {
            Err(_elapsed) => Ok(()),
            Ok(Ok(frame)) => {
                self.tail = frame;
                Ok(())
            }
            Ok(Err(_disconnected)) => self.classify().await,
        }
    }

    /// The transfer ended and its buffered frames are drained; fold the
    /// task result into the state machine.
    async fn classify(&mut self) -> Result<(), QsError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        self.rx = None;
        match task.await {
            Ok(Ok(())) => self.done(),
            Ok(Err(err)) => self.fail(err),
            Err(join) => self.fail(QsError::from(join)),
        }
        Ok(())
    }

    fn done(&mut self) {
        self.state = FetcherState::Done;
        debug!(
            url = %self.url,
            offset = self.offset,
            len = ?self.len,
            "download completed"
        );
    }

    fn fail(&mut self, err: QsError) {
        self.state = FetcherState::Failed;
        self.failures += 1;
        warn!(
            url = %self.url,
            offset = self.offset,
            bytes_done = self.bytes_done,
            error = %err,
            "download failed"
        );
        self.last_error = Some(err);
    }
}

impl Drop for Fetcher {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fetcher(offset: u64, len: Option<u64>) -> Fetcher {
        Fetcher::new(
            reqwest::Client::new(),
            Url::parse("https://b.pek3a.qingstor.com/k").unwrap(),
            "b.pek3a.qingstor.com".to_string(),
            "b".to_string(),
            Credentials::new("AKID", "SECRET"),
            4 * 1024 * 1024,
            offset,
            len,
        )
    }

    #[test]
    fn range_covers_the_chunk_inclusively() {
        let f = fetcher(4 * 1024 * 1024, Some(4 * 1024 * 1024));
        assert_eq!(
            f.range_header().unwrap(),
            "bytes=4194304-8388607" // [4 MiB, 8 MiB - 1]
        );
    }

    #[test]
    fn unbounded_chunk_at_zero_needs_no_range() {
        let f = fetcher(0, None);
        assert!(f.range_header().is_none());

        let f = fetcher(8 * 1024 * 1024, None);
        assert_eq!(f.range_header().unwrap(), "bytes=8388608-");
    }

    #[test]
    fn restart_resumes_after_delivered_bytes() {
        let mut f = fetcher(4 * 1024 * 1024, Some(4 * 1024 * 1024));
        f.bytes_done = 2 * 1024 * 1024;
        assert_eq!(f.range_header().unwrap(), "bytes=6291456-8388607");
        assert_eq!(f.remaining(), Some(2 * 1024 * 1024));

        let mut f = fetcher(1024, None);
        f.bytes_done = 512;
        assert_eq!(f.range_header().unwrap(), "bytes=1536-");
    }

    #[test]
    fn delivered_bytes_never_exceed_the_length() {
        let mut f = fetcher(0, Some(4));
        f.tail = Bytes::from_static(b"abcdefgh");
        let mut buf = [0u8; 8];
        assert_eq!(f.copy_buffered(&mut buf), 4);
        assert_eq!(&buf[..4], b"abcd");
        assert!(f.is_exhausted());
        assert_eq!(f.copy_buffered(&mut buf), 0);
    }

    #[test]
    fn buffered_tail_survives_into_small_reads() {
        let mut f = fetcher(0, None);
        f.tail = Bytes::from_static(b"hello world");
        let mut buf = [0u8; 5];
        assert_eq!(f.copy_buffered(&mut buf), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(f.copy_buffered(&mut buf), 5);
        assert_eq!(&buf, b" worl");
        assert_eq!(f.copy_buffered(&mut buf), 1);
        assert_eq!(buf[0], b'd');
        assert_eq!(f.bytes_done, 11);
    }
}
