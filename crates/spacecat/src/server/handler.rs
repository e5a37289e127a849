//! The handler contract and sequential chain execution.
//!
//! A handler receives the request and either passes (`Ok(None)`) or finishes
//! the request with a [`Response`]. Handlers matched for one request run
//! strictly one after another; the first response wins and nothing after it
//! runs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use protocol::Status;
use tracing::error;

use super::request::Request;
use super::response::Response;

/// Boxed, `Send` future borrowed for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler produces: pass, respond, or fail.
pub type HandlerResult = anyhow::Result<Option<Response>>;

/// A unit of request processing registered on a route.
pub trait Handler: Send + Sync + 'static {
    fn handle<'a>(&'a self, req: &'a mut Request) -> BoxFuture<'a, HandlerResult>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Request) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    fn handle<'a>(&'a self, req: &'a mut Request) -> BoxFuture<'a, HandlerResult> {
        self(req)
    }
}

/// Pin down the signature of a closure handler.
///
/// ```ignore
/// router.get("/hello", handler(|_req| Box::pin(async { Ok(Some("# Hi".into())) })))?;
/// ```
pub fn handler<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Request) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    f
}

/// A shared, type-erased handler.
pub type SharedHandler = Arc<dyn Handler>;

/// Run `handlers` in order until one produces a response.
///
/// Returns `None` if every handler passed. A handler error ends the chain with
/// `50 Internal server error.`
pub async fn run_chain(handlers: &[SharedHandler], req: &mut Request) -> Option<Response> {
    for handler in handlers {
        match handler.handle(req).await {
            Ok(Some(response)) => return Some(response),
            Ok(None) => continue,
            Err(e) => {
                error!(error = %format!("{e:#}"), url = %req.url(), "handler failed");
                return Some(Response::status(
                    Status::PermanentFailure,
                    "Internal server error.",
                ));
            }
        }
    }
    None
}
