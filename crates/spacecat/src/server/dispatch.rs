//! Per-connection request dispatch.
//!
//! One connection carries one request:
//! 1. Read the request line (bounded in size and time).
//! 2. Classify it as Gemini or Titan; protocol errors are answered and the
//!    connection closed before any handler runs.
//! 3. Build the [`Request`], collect the matching handler chain and run it
//!    under a deadline that also covers reading the Titan body.
//! 4. Write the single response (or `51 Not found.`) and close.
//!
//! The dispatcher is generic over the stream so it runs the same over TLS and
//! over in-memory pipes.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use protocol::{classify, LineBuffer, Protocol, ProtocolError, RequestLine, TitanTarget};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::body::TitanBody;
use super::handler::run_chain;
use super::request::{ClientCertificate, Request};
use super::response::Response;
use super::router::Router;

/// Default time allowed for a client to send its request line.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed for the handler chain, upload included.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

/// Default largest Titan `size` accepted (16 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

const READ_CHUNK: usize = 2048;

/// Per-connection bounds.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Bytes kept from the request line; anything beyond is dropped.
    pub max_request_bytes: usize,
    /// Time allowed between accept and the request-line terminator.
    pub request_timeout: Duration,
    /// Time allowed for the handler chain, including any Titan body reads.
    pub handler_timeout: Duration,
    /// Largest declared Titan `size`; bigger uploads get `50` before any body byte is read.
    pub max_upload_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_request_bytes: protocol::MAX_REQUEST_BYTES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Serve the single request carried by `stream`.
///
/// A client that disconnects or stalls before finishing its request line gets
/// no response; that is not an error. Neither is a chain that outlives
/// [`Limits::handler_timeout`], typically an upload whose body stopped
/// arriving: the connection is closed without a response.
///
/// # Errors
///
/// Returns an error if reading the request line or writing the response fails.
pub async fn serve_connection<S>(
    mut stream: S,
    cert: Option<ClientCertificate>,
    router: &Router,
    limits: &Limits,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
{
    let read = read_request_line(&mut stream, limits.max_request_bytes);
    let line = match tokio::time::timeout(limits.request_timeout, read).await {
        Err(_) => {
            debug!(timeout = ?limits.request_timeout, "request line timed out");
            return Ok(());
        }
        Ok(read) => match read.context("failed to read request line")? {
            Some(line) => line,
            None => {
                debug!("connection closed before request line");
                return Ok(());
            }
        },
    };

    if line.is_truncated() {
        debug!(
            max_request_bytes = limits.max_request_bytes,
            "request line truncated"
        );
    }

    let (text, leftover) = match line.into_parts() {
        Ok(parts) => parts,
        Err(e) => return reject(&mut stream, e).await,
    };

    let (protocol, url) = match classify(&text) {
        Ok(classified) => classified,
        Err(e) => return reject(&mut stream, e).await,
    };

    let target = match protocol {
        Protocol::Gemini => None,
        Protocol::Titan => match TitanTarget::parse(&text)
            .and_then(|t| t.params.ensure_within(limits.max_upload_bytes).map(|()| t))
        {
            Ok(target) => Some(target),
            Err(e) => return reject(&mut stream, e.into()).await,
        },
    };

    let (reader, mut writer) = tokio::io::split(stream);
    let mut req = match target {
        None => Request::gemini(url, cert),
        Some(target) => {
            let body = TitanBody::new(leftover, reader, target.params.size);
            Request::new_titan(target, cert, body)
        }
    };

    let chain = router.matching(&mut req);
    let run = run_chain(&chain, &mut req);
    let outcome = tokio::time::timeout(limits.handler_timeout, run).await;
    let response = match outcome {
        Ok(response) => response.unwrap_or_else(Response::not_found),
        Err(_) => {
            warn!(
                %protocol,
                url = %req.url(),
                timeout = ?limits.handler_timeout,
                "request timed out in handlers"
            );
            return Ok(());
        }
    };

    info!(
        %protocol,
        url = %req.url(),
        handlers = chain.len(),
        status = response.header().status().code(),
        "request served"
    );

    // An unread upload body is dropped here, never drained.
    drop(req);

    response
        .write_to(&mut writer)
        .await
        .context("failed to write response")?;
    close(&mut writer).await;
    Ok(())
}

/// Read until the first CRLF. `Ok(None)` means EOF came first.
async fn read_request_line<R>(reader: &mut R, max: usize) -> io::Result<Option<RequestLine>>
where
    R: AsyncRead + Unpin,
{
    let mut line = LineBuffer::new(max);
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        if let Some(done) = line.feed(&buf[..n]) {
            return Ok(Some(done));
        }
    }
}

async fn reject<W>(writer: &mut W, err: ProtocolError) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    debug!(error = %err, status = err.status().code(), "rejecting request");
    Response::status(err.status(), err.meta())
        .write_to(writer)
        .await
        .context("failed to write rejection")?;
    close(writer).await;
    Ok(())
}

async fn close<W>(writer: &mut W)
where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "shutdown failed");
    }
}
