//! Gemini/Titan server: request model, routing, handler chains, TLS and the
//! accept loop.
//!
//! # Responsibilities
//! - Turn one TLS connection into one typed [`Request`] and one [`Response`].
//! - Hold the ordered route table and run matching handler chains.
//! - Bound Titan uploads to their declared size.

pub mod body;
pub mod dispatch;
pub mod handler;
pub mod listener;
pub mod middleware;
pub mod pattern;
pub mod request;
pub mod response;
pub mod router;
pub mod tls;

pub use body::TitanBody;
pub use dispatch::{
    serve_connection, Limits, DEFAULT_HANDLER_TIMEOUT, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_REQUEST_TIMEOUT,
};
pub use handler::{handler, BoxFuture, Handler, HandlerResult, SharedHandler};
pub use listener::GeminiServer;
pub use middleware::{require_cert, require_cert_fingerprint, require_token, titan_only};
pub use pattern::{PathPattern, PatternError};
pub use request::{ClientCertificate, Params, Request, RequestKind, TitanUpload};
pub use response::{Body, Response};
pub use router::{Affinity, Route, Router};
