use crate::error::QsError;
use crate::pipeline::DownloadPipeline;

/// Serial read access to one object (or a byte range of it), fed by the
/// download pipeline.
pub struct ObjectReader {
    pipeline: DownloadPipeline,
    key: String,
    size: u64,
    range: Option<(u64, u64)>,
}

impl ObjectReader {
    pub(crate) fn new(
        pipeline: DownloadPipeline,
        key: String,
        size: u64,
        range: Option<(u64, u64)>,
    ) -> Self {
        Self {
            pipeline,
            key,
            size,
            range,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Total object size, from the HEAD issued at open time.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The resolved inclusive byte range, `None` for an empty object.
    pub fn range(&self) -> Option<(u64, u64)> {
        self.range
    }

    /// Read the next bytes of the stream. `Ok(0)` means end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, QsError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let (n, _eof) = self.pipeline.read(buf).await?;
        Ok(n)
    }

    /// Drain the remaining stream into `out`; returns the byte count.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<u64, QsError> {
        let mut buf = vec![0u8; 256 * 1024];
        let mut total = 0u64;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n as u64;
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ChunkPlan {
    pub offset: u64,
    /// `None` reads to the end of the object, so a server-side length
    /// mismatch cannot truncate the stream.
    pub len: Option<u64>,
}

/// Normalize a requested range against the object size: absent bounds
/// default to the whole object, the end is clamped to the last byte.
/// Returns `None` for an empty object.
pub(crate) fn resolve_range(
    start: Option<u64>,
    end: Option<u64>,
    size: u64,
) -> Result<Option<(u64, u64)>, QsError> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(QsError::InvalidParameter(format!(
                "range end {end} is before range start {start}"
            )));
        }
    }
    if size == 0 {
        return Ok(None);
    }
    let start = start.unwrap_or(0);
    let end = end.unwrap_or(size - 1).min(size - 1);
    if start > end {
        return Err(QsError::InvalidParameter(format!(
            "range start {start} is past the last byte {end}"
        )));
    }
    Ok(Some((start, end)))
}

/// Divide `[start, end]` into fetch chunks. A single connection fetches
/// one open-ended chunk; otherwise fixed `chunk_size` segments, with the
/// segment that touches the object end left open-ended.
pub(crate) fn plan_chunks(
    start: u64,
    end: u64,
    size: u64,
    chunk_size: u64,
    connections: u32,
) -> Vec<ChunkPlan> {
    let tail_len = |offset: u64| {
        if end == size - 1 {
            None
        } else {
            Some(end - offset + 1)
        }
    };
    if connections <= 1 {
        return vec![ChunkPlan {
            offset: start,
            len: tail_len(start),
        }];
    }

    let mut chunks = Vec::new();
    let mut offset = start;
    loop {
        if offset + chunk_size > end {
            chunks.push(ChunkPlan {
                offset,
                len: tail_len(offset),
            });
            break;
        }
        chunks.push(ChunkPlan {
            offset,
            len: Some(chunk_size),
        });
        offset += chunk_size;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn ten_mib_over_three_connections_makes_three_chunks() {
        let chunks = plan_chunks(0, 10 * MIB - 1, 10 * MIB, 4 * MIB, 3);
        assert_eq!(
            chunks,
            vec![
                ChunkPlan {
                    offset: 0,
                    len: Some(4 * MIB)
                },
                ChunkPlan {
                    offset: 4 * MIB,
                    len: Some(4 * MIB)
                },
                ChunkPlan {
                    offset: 8 * MIB,
                    len: None
                },
            ]
        );
    }

    #[test]
    fn single_connection_reads_one_open_ended_chunk() {
        let chunks = plan_chunks(0, 10 * MIB - 1, 10 * MIB, 4 * MIB, 1);
        assert_eq!(chunks, vec![ChunkPlan { offset: 0, len: None }]);
    }

    #[test]
    fn exact_multiple_does_not_grow_an_empty_chunk() {
        let chunks = plan_chunks(0, 8 * MIB - 1, 8 * MIB, 4 * MIB, 3);
        assert_eq!(
            chunks,
            vec![
                ChunkPlan {
                    offset: 0,
                    len: Some(4 * MIB)
                },
                ChunkPlan {
                    offset: 4 * MIB,
                    len: None
                },
            ]
        );
    }

    #[test]
    fn interior_range_end_bounds_the_final_chunk() {
        let chunks = plan_chunks(MIB, 6 * MIB - 1, 10 * MIB, 4 * MIB, 3);
        assert_eq!(
            chunks,
            vec![
                ChunkPlan {
                    offset: MIB,
                    len: Some(4 * MIB)
                },
                ChunkPlan {
                    offset: 5 * MIB,
                    len: Some(MIB)
                },
            ]
        );
    }

    #[test]
    fn range_defaults_cover_the_whole_object() {
        assert_eq!(resolve_range(None, None, 100).unwrap(), Some((0, 99)));
        assert_eq!(resolve_range(Some(10), None, 100).unwrap(), Some((10, 99)));
        assert_eq!(
            resolve_range(None, Some(500), 100).unwrap(),
            Some((0, 99)) // end clamps to the last byte
        );
        assert_eq!(resolve_range(None, None, 0).unwrap(), None);
    }

    #[test]
    fn inverted_range_is_invalid() {
        assert!(matches!(
            resolve_range(Some(10), Some(5), 100),
            Err(QsError::InvalidParameter(_))
        ));
        assert!(matches!(
            resolve_range(Some(100), None, 100),
            Err(QsError::InvalidParameter(_))
        ));
    }
}
