//! TCP accept loop with TLS termination.
//!
//! Each accepted connection gets its own task and its own span (connection
//! id + peer address). The loop stops when the cancellation token fires;
//! connections already in flight run to completion.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustls::ServerConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::dispatch::{serve_connection, Limits};
use super::router::Router;
use super::tls::peer_certificate;

/// A Gemini/Titan server: a route table, a TLS identity and per-connection limits.
#[derive(Clone)]
pub struct GeminiServer {
    router: Arc<Router>,
    acceptor: TlsAcceptor,
    limits: Limits,
}

impl GeminiServer {
    pub fn new(tls: Arc<ServerConfig>, router: Router) -> Self {
        Self {
            router: Arc::new(router),
            acceptor: TlsAcceptor::from(tls),
            limits: Limits::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Bind `0.0.0.0:<port>` and serve until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn listen(&self, port: u16, shutdown: CancellationToken) -> Result<()> {
        let addr: SocketAddr = ([0u8, 0, 0, 0], port).into();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let addr = listener
            .local_addr()
            .context("failed to read listener address")?;
        info!(
            addr = %addr,
            routes = self.router.len(),
            max_request_bytes = self.limits.max_request_bytes,
            "spacecat listening"
        );

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    let server = self.clone();
                    let span = info_span!("connection", id = %Uuid::new_v4(), %peer_addr);
                    tokio::spawn(
                        async move {
                            if let Err(e) = server.handle(stream).await {
                                warn!(error = %format!("{e:#}"), "connection error");
                            }
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    error!(error = %e, "accept error");
                }
            }
        }

        info!(addr = %addr, "spacecat stopped accepting connections");
        Ok(())
    }

    async fn handle(&self, stream: TcpStream) -> Result<()> {
        debug!("accepted TCP connection");
        let handshake = self.acceptor.accept(stream);
        let tls = tokio::time::timeout(self.limits.request_timeout, handshake)
            .await
            .context("TLS handshake timed out")?
            .context("TLS handshake failed")?;

        let cert = peer_certificate(tls.get_ref().1);
        if let Some(cert) = &cert {
            debug!(fingerprint = cert.fingerprint256(), "client certificate presented");
        }

        serve_connection(tls, cert, &self.router, &self.limits).await
    }
}
