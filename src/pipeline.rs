use crate::error::QsError;
use crate::fetcher::{Fetcher, FetcherState};
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Ordered queue of fetchers presenting a single serial byte stream. At
/// most `connections` fetchers run at once; only the head's bytes reach
/// the caller, the rest prefetch into their own buffers. Order holds
/// because fetchers are enqueued in byte-offset order and advanced only by
/// popping the head.
pub(crate) struct DownloadPipeline {
    pending: VecDeque<Fetcher>,
    active: VecDeque<Fetcher>,
    connections: usize,
    max_restarts: u32,
    cancel: CancellationToken,
}

impl DownloadPipeline {
    pub(crate) fn new(connections: u32, max_restarts: u32, cancel: CancellationToken) -> Self {
        Self {
            pending: VecDeque::new(),
            active: VecDeque::new(),
            connections: connections.max(1) as usize,
            max_restarts,
            cancel,
        }
    }

    pub(crate) fn add(&mut self, fetcher: Fetcher) {
        self.pending.push_back(fetcher);
    }

    fn launch(&mut self) -> Result<(), QsError> {
        while self.active.len() < self.connections {
            let Some(mut fetcher) = self.pending.pop_front() else {
                break;
            };
            fetcher.start()?;
            self.active.push_back(fetcher);
        }
        Ok(())
    }

    /// Returns `(0, true)` at end of stream, otherwise `(n, false)` with
    /// `n > 0` bytes copied into `buf`.
    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> Result<(usize, bool), QsError> {
        let cancel = self.cancel.clone();
        loop {
            self.launch()?;

            let Some(head) = self.active.front_mut() else {
                debug!("all downloads completed");
                return Ok((0, true));
            };

            let n = head.copy_buffered(buf);
            if n > 0 {
                return Ok((n, false));
            }

            if head.is_exhausted() {
                self.active.pop_front();
                continue;
            }

            match head.state() {
                FetcherState::Done => {
                    self.active.pop_front();
                }
                FetcherState::Failed => {
                    // restart in place: the fetcher resumes at
                    // offset + bytes_done, so downstream order is intact
                    if head.failures() > self.max_restarts {
                        return Err(head.take_last_error());
                    }
                    debug!("retrying now");
                    head.start()?;
                }
                FetcherState::Init => {
                    head.start()?;
                }
                FetcherState::Running => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(QsError::Canceled),
                        result = head.pump() => result?,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn empty_pipeline_reports_end_of_stream() {
        let mut pipeline = DownloadPipeline::new(3, 3, CancellationToken::new());
        let mut buf = [0u8; 16];
        let (n, eof) = pipeline.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert!(eof);
    }

    #[tokio::test]
    async fn canceled_token_interrupts_the_wait() {
        let token = CancellationToken::new();
        token.cancel();
        let mut pipeline = DownloadPipeline::new(1, 3, token);
        // an unresolvable endpoint keeps the fetcher in Running until the
        // cancellation fires at the wait boundary
        pipeline.add(crate::fetcher::Fetcher::new(
            reqwest::Client::new(),
            url::Url::parse("http://192.0.2.1:9/never").unwrap(),
            "192.0.2.1:9".to_string(),
            "b".to_string(),
            crate::credentials::Credentials::new("AKID", "SECRET"),
            1024,
            0,
            None,
        ));
        let mut buf = [0u8; 16];
        match pipeline.read(&mut buf).await {
            Err(QsError::Canceled) => {}
            other => panic!("expected cancellation, got {other:?}"),
        }
    }
}
