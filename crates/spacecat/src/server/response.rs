//! Outgoing responses.
//!
//! A [`Response`] is a finished value: a header plus an optional body. The
//! handler that produces one ends the chain, and the dispatcher consumes it in
//! [`Response::write_to`], so a request can never get a second header.

use std::fmt;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use protocol::{Header, Status, DEFAULT_MIME};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Response payload following the header.
pub enum Body {
    Empty,
    Bytes(Bytes),
    Stream(Pin<Box<dyn AsyncRead + Send>>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A complete response: header and body.
#[derive(Debug)]
pub struct Response {
    header: Header,
    body: Body,
}

impl Response {
    /// `20 text/gemini` with `body`.
    pub fn send(body: impl Into<Bytes>) -> Self {
        Self::send_with_mime(body, DEFAULT_MIME)
    }

    /// `20 <mime>` with `body`.
    pub fn send_with_mime(body: impl Into<Bytes>, mime: impl Into<String>) -> Self {
        Self {
            header: Header::new(Status::Success, mime),
            body: Body::Bytes(body.into()),
        }
    }

    /// `20 <mime>` with a body streamed from `reader` until EOF.
    pub fn stream<R>(reader: R, mime: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            header: Header::new(Status::Success, mime),
            body: Body::Stream(Box::pin(reader)),
        }
    }

    /// A bodiless response with an arbitrary status and meta.
    pub fn status(status: Status, meta: impl Into<String>) -> Self {
        Self {
            header: Header::new(status, meta),
            body: Body::Empty,
        }
    }

    /// `30 <url>`.
    pub fn redirect(url: impl fmt::Display) -> Self {
        Self::status(Status::Redirect, url.to_string())
    }

    /// `10 <prompt>`.
    pub fn request_input(prompt: impl Into<String>) -> Self {
        Self::status(Status::Input, prompt)
    }

    /// `60 Certificate required.`
    pub fn request_cert() -> Self {
        Self::status(Status::CertificateRequired, "Certificate required.")
    }

    /// `51 Not found.`, sent when no handler finalized the request.
    pub fn not_found() -> Self {
        Self::status(Status::NotFound, "Not found.")
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Write the header line, then the body, then flush. Returns bytes written.
    pub async fn write_to<W>(self, writer: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let head = self.header.to_string();
        writer.write_all(head.as_bytes()).await?;
        let mut written = head.len() as u64;

        match self.body {
            Body::Empty => {}
            Body::Bytes(bytes) => {
                writer.write_all(&bytes).await?;
                written += bytes.len() as u64;
            }
            Body::Stream(mut reader) => {
                written += tokio::io::copy(&mut reader, writer).await?;
            }
        }

        writer.flush().await?;
        Ok(written)
    }
}

impl From<&str> for Response {
    fn from(body: &str) -> Self {
        Response::send(Bytes::copy_from_slice(body.as_bytes()))
    }
}

impl From<String> for Response {
    fn from(body: String) -> Self {
        Response::send(body)
    }
}

impl From<Vec<u8>> for Response {
    fn from(body: Vec<u8>) -> Self {
        Response::send(body)
    }
}

impl From<Bytes> for Response {
    fn from(body: Bytes) -> Self {
        Response::send(body)
    }
}
