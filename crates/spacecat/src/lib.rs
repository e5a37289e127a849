//! `spacecat`: a Gemini server with Titan upload support.
//!
//! Applications build a [`Router`] of handler chains, then hand it to a
//! [`GeminiServer`] together with a TLS identity:
//!
//! ```no_run
//! use spacecat::{handler, GeminiServer, Response, Router};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut router = Router::new();
//! router.get("/", handler(|_req| Box::pin(async { Ok(Some(Response::send("# Hi"))) })))?;
//!
//! let tls = spacecat::server::tls::load_server_config("cert.pem".as_ref(), "key.pem".as_ref())?;
//! GeminiServer::new(tls, router)
//!     .listen(1965, CancellationToken::new())
//!     .await
//! # }
//! ```

pub mod capsule;
pub mod config;
pub mod server;
pub mod telemetry;

pub use protocol::{Protocol, Status};
pub use server::{
    handler, Affinity, GeminiServer, Handler, HandlerResult, Limits, Request, Response, Router,
};
