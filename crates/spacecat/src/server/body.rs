//! [`TitanBody`]: the bounded body stream of a Titan upload.
//!
//! The body is the connection tail after the request line: first the bytes
//! that arrived in the same read as the terminator, then whatever the
//! transport delivers next. Exactly `size` bytes are ever handed out.
//!
//! # Overshoot
//!
//! If the client sends more than it declared, the extra bytes are never
//! delivered: the already-buffered tail is cut at `size` and transport reads
//! are capped at the remaining count.
//!
//! # Backpressure
//!
//! Nothing is read from the transport until a handler polls the body, so a
//! handler that rejects the upload never pulls the payload off the wire.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf, Take};

/// Largest chunk returned by [`TitanBody::chunk`].
const CHUNK_SIZE: usize = 16 * 1024;

type Source = Pin<Box<dyn AsyncRead + Send + Sync>>;

/// Read-exactly-N stream over a Titan upload.
pub struct TitanBody {
    buffered: Bytes,
    source: Take<Source>,
    expected: u64,
    received: u64,
}

impl TitanBody {
    /// Wrap `source` so that, together with `buffered`, exactly `size` bytes are delivered.
    pub fn new<R>(mut buffered: Bytes, source: R, size: u64) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        if buffered.len() as u64 > size {
            buffered.truncate(size as usize);
        }
        let from_source = size - buffered.len() as u64;
        let source: Source = Box::pin(source);
        Self {
            buffered,
            source: source.take(from_source),
            expected: size,
            received: 0,
        }
    }

    /// Declared size.
    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// Bytes delivered so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn remaining(&self) -> u64 {
        self.expected - self.received
    }

    /// `true` once all declared bytes have been delivered.
    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }

    /// Next chunk of the body, or `None` once the declared size has been delivered.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::UnexpectedEof`] if the connection ends early.
    pub async fn chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.is_complete() {
            return Ok(None);
        }
        let capacity = CHUNK_SIZE.min(self.remaining() as usize);
        let mut buf = BytesMut::with_capacity(capacity);
        self.read_buf(&mut buf).await?;
        Ok(Some(buf.freeze()))
    }

    /// Read the whole remaining body into memory.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::UnexpectedEof`] if the connection ends early.
    pub async fn collect(&mut self) -> io::Result<Bytes> {
        let mut out = BytesMut::with_capacity(self.remaining().min(CHUNK_SIZE as u64) as usize);
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    fn early_eof(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "titan body ended after {} of {} bytes",
                self.received, self.expected
            ),
        )
    }
}

impl AsyncRead for TitanBody {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.is_complete() || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if !this.buffered.is_empty() {
            let n = this.buffered.len().min(buf.remaining());
            buf.put_slice(&this.buffered.split_to(n));
            this.received += n as u64;
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.source).poll_read(cx, buf))?;
        let n = buf.filled().len() - before;
        if n == 0 {
            return Poll::Ready(Err(this.early_eof()));
        }
        this.received += n as u64;
        Poll::Ready(Ok(()))
    }
}

impl fmt::Debug for TitanBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TitanBody")
            .field("expected", &self.expected)
            .field("received", &self.received)
            .field("buffered", &self.buffered.len())
            .finish()
    }
}
