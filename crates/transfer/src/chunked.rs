use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{DEFAULT_MAX_SEGMENT_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Number of segments needed for `size` bytes; an empty stream still takes one.
pub fn segment_count(size: u64, max_segment_size: usize) -> u64 {
    let seg = max_segment_size.max(1) as u64;
    size.div_ceil(seg).max(1)
}

// ---------------------------------------------------------------------------
// SegmentReader
// ---------------------------------------------------------------------------

/// Reads a byte stream in bounded segments, hashing everything it yields.
pub struct SegmentReader<R> {
    inner: R,
    max_segment_size: usize,
    hasher: Sha256,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> SegmentReader<R> {
    /// Wraps `inner`.
    ///
    /// If `max_segment_size` is 0, [`DEFAULT_MAX_SEGMENT_SIZE`] is used.
    pub fn new(inner: R, max_segment_size: usize) -> Self {
        let max_segment_size = if max_segment_size == 0 {
            DEFAULT_MAX_SEGMENT_SIZE
        } else {
            max_segment_size
        };
        Self {
            inner,
            max_segment_size,
            hasher: Sha256::new(),
            bytes_read: 0,
        }
    }

    /// Reads the next segment. An empty segment means end of stream.
    ///
    /// Short reads from the source are coalesced, so every segment except
    /// the last is exactly `max_segment_size` bytes.
    pub async fn next_segment(&mut self) -> Result<Vec<u8>, TransferError> {
        let mut buf = Vec::with_capacity(self.max_segment_size);
        (&mut self.inner)
            .take(self.max_segment_size as u64)
            .read_to_end(&mut buf)
            .await?;
        if !buf.is_empty() {
            self.hasher.update(&buf);
            self.bytes_read += buf.len() as u64;
        }
        Ok(buf)
    }

    /// Total bytes yielded so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Hex SHA-256 of everything yielded so far.
    pub fn hexdigest(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }

    pub fn max_segment_size(&self) -> usize {
        self.max_segment_size
    }
}
