use std::io::{self, ErrorKind};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Shared capture buffer for one output stream.
///
/// The buffer outlives the drain task so partial output survives a timeout.
/// At most `limit` bytes are kept; the rest is dropped so a chatty script
/// cannot grow memory without bound.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<Captured>>,
    limit: usize,
}

impl CaptureBuffer {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Captured::default())),
            limit,
        }
    }

    pub fn append(&self, bytes: &[u8]) {
        let mut captured = self.inner.lock();
        let room = self.limit.saturating_sub(captured.bytes.len());
        if bytes.len() > room {
            captured.truncated = true;
        }
        let kept = bytes.len().min(room);
        captured.bytes.extend_from_slice(&bytes[..kept]);
    }

    /// Copy of everything captured so far.
    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.lock().bytes.clone()
    }

    /// Whether bytes were dropped at the limit.
    pub fn truncated(&self) -> bool {
        self.inner.lock().truncated
    }
}

/// Read `reader` to EOF, appending every chunk to `sink`.
///
/// Reading continues past the sink's limit so the writer never blocks on a
/// full pipe.
pub async fn drain_into<R>(mut reader: R, sink: CaptureBuffer) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8_192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => sink.append(&buf[..n]),
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CaptureBuffer, drain_into};

    #[tokio::test]
    async fn drains_reader_to_eof() -> std::io::Result<()> {
        let sink = CaptureBuffer::with_limit(1024);
        drain_into(&b"first line\nsecond line\n"[..], sink.clone()).await?;
        assert_eq!(sink.snapshot(), b"first line\nsecond line\n".to_vec());
        assert!(!sink.truncated());
        Ok(())
    }

    #[tokio::test]
    async fn appends_across_drains() -> std::io::Result<()> {
        let sink = CaptureBuffer::with_limit(1024);
        drain_into(&b"out"[..], sink.clone()).await?;
        drain_into(&b"err"[..], sink.clone()).await?;
        assert_eq!(sink.snapshot(), b"outerr".to_vec());
        Ok(())
    }

    #[tokio::test]
    async fn keeps_only_the_first_bytes_up_to_the_limit() -> std::io::Result<()> {
        let sink = CaptureBuffer::with_limit(10);
        let data = vec![b'x'; 20_000];
        drain_into(&data[..], sink.clone()).await?;
        assert_eq!(sink.snapshot(), vec![b'x'; 10]);
        assert!(sink.truncated());
        Ok(())
    }
}
