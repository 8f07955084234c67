//! Bounded capture of fetcher output.

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;

/// Keeps the last `limit` bytes written to it.
#[derive(Debug, Clone)]
pub struct OutputTail {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl OutputTail {
    /// Creates an empty tail that retains at most `limit` bytes.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Appends bytes, discarding the oldest once over the limit.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > self.limit {
            let excess = self.buf.len() - self.limit;
            self.buf.drain(..excess);
            self.truncated = true;
        }
    }

    /// Returns true if older output was discarded.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Renders the retained bytes as text.
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

/// Drains `reader` into the shared tail until end of stream.
pub(crate) async fn capture<R>(mut reader: R, tail: Arc<Mutex<OutputTail>>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        tail.lock().await.push(&chunk[..n]);
    }
}
