//! Route registry and matcher.
//!
//! Routes are kept in registration order and that order is the only priority
//! signal: every route that matches a request contributes its handlers to one
//! combined chain, earliest registration first. Nothing is re-sorted by
//! specificity.

use std::fmt;
use std::sync::Arc;

use protocol::Protocol;

use super::handler::{Handler, SharedHandler};
use super::pattern::{PathPattern, PatternError};
use super::request::Request;

/// Which protocols a route serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Gemini,
    Titan,
    Both,
}

impl Affinity {
    pub fn accepts(self, protocol: Protocol) -> bool {
        match (self, protocol) {
            (Affinity::Both, _) => true,
            (Affinity::Gemini, Protocol::Gemini) => true,
            (Affinity::Titan, Protocol::Titan) => true,
            _ => false,
        }
    }
}

/// One registered definition: pattern, affinity and handlers.
#[derive(Clone)]
pub struct Route {
    pattern: PathPattern,
    affinity: Affinity,
    handlers: Vec<SharedHandler>,
}

impl Route {
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn affinity(&self) -> Affinity {
        self.affinity
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern.as_str())
            .field("affinity", &self.affinity)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Ordered route table.
///
/// Built during setup, then shared read-only (behind an `Arc`) by every
/// connection.
#[derive(Clone, Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a definition with several handlers, run in the given order.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] if `path` is not a valid pattern.
    pub fn route(
        &mut self,
        path: &str,
        affinity: Affinity,
        handlers: impl IntoIterator<Item = SharedHandler>,
    ) -> Result<&mut Self, PatternError> {
        let pattern = PathPattern::parse(path)?;
        self.routes.push(Route {
            pattern,
            affinity,
            handlers: handlers.into_iter().collect(),
        });
        Ok(self)
    }

    /// Register `handler` for every request on both protocols.
    pub fn use_all<H: Handler>(&mut self, handler: H) -> &mut Self {
        self.use_all_many([Arc::new(handler) as SharedHandler])
    }

    /// Register several handlers, in order, for every request on both protocols.
    pub fn use_all_many(
        &mut self,
        handlers: impl IntoIterator<Item = SharedHandler>,
    ) -> &mut Self {
        self.routes.push(Route {
            pattern: PathPattern::wildcard(),
            affinity: Affinity::Both,
            handlers: handlers.into_iter().collect(),
        });
        self
    }

    /// Register `handler` at `path` for both protocols.
    pub fn use_at<H: Handler>(&mut self, path: &str, handler: H) -> Result<&mut Self, PatternError> {
        self.route(path, Affinity::Both, [Arc::new(handler) as SharedHandler])
    }

    /// Register a Gemini-only `handler` at `path`.
    pub fn get<H: Handler>(&mut self, path: &str, handler: H) -> Result<&mut Self, PatternError> {
        self.route(path, Affinity::Gemini, [Arc::new(handler) as SharedHandler])
    }

    /// Register a Titan-only `handler` at `path`.
    pub fn put<H: Handler>(&mut self, path: &str, handler: H) -> Result<&mut Self, PatternError> {
        self.route(path, Affinity::Titan, [Arc::new(handler) as SharedHandler])
    }

    /// [`Router::use_at`] with several handlers.
    pub fn use_at_many(
        &mut self,
        path: &str,
        handlers: impl IntoIterator<Item = SharedHandler>,
    ) -> Result<&mut Self, PatternError> {
        self.route(path, Affinity::Both, handlers)
    }

    /// [`Router::get`] with several handlers.
    pub fn get_many(
        &mut self,
        path: &str,
        handlers: impl IntoIterator<Item = SharedHandler>,
    ) -> Result<&mut Self, PatternError> {
        self.route(path, Affinity::Gemini, handlers)
    }

    /// [`Router::put`] with several handlers.
    pub fn put_many(
        &mut self,
        path: &str,
        handlers: impl IntoIterator<Item = SharedHandler>,
    ) -> Result<&mut Self, PatternError> {
        self.route(path, Affinity::Titan, handlers)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Collect the handler chain for `req`.
    ///
    /// Parameters captured by each matching route are merged into the
    /// request; routes that do not match leave it untouched.
    pub fn matching(&self, req: &mut Request) -> Vec<SharedHandler> {
        let protocol = req.protocol();
        let mut chain = Vec::new();
        for route in &self.routes {
            if !route.affinity.accepts(protocol) {
                continue;
            }
            if let Some(captured) = route.pattern.matches(req.path()) {
                req.merge_params(captured);
                chain.extend(route.handlers.iter().cloned());
            }
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::body::TitanBody;
    use crate::server::handler::{handler, run_chain};
    use crate::server::response::Response;
    use bytes::Bytes;
    use protocol::TitanTarget;
    use url::Url;

    fn gemini(url: &str) -> Request {
        Request::gemini(Url::parse(url).unwrap(), None)
    }

    fn titan(url: &str) -> Request {
        let target = TitanTarget::parse(url).unwrap();
        let body = TitanBody::new(Bytes::new(), tokio::io::empty(), target.params.size);
        Request::new_titan(target, None, body)
    }

    fn reply(text: &'static str) -> impl Handler {
        handler(move |_req| Box::pin(async move { Ok(Some(Response::send(text))) }))
    }

    async fn body_of(router: &Router, mut req: Request) -> Option<String> {
        let chain = router.matching(&mut req);
        let res = run_chain(&chain, &mut req).await?;
        let mut out = Vec::new();
        res.write_to(&mut out).await.unwrap();
        Some(String::from_utf8(out).unwrap())
    }

    #[test]
    fn affinity_filter() {
        assert!(Affinity::Both.accepts(Protocol::Gemini));
        assert!(Affinity::Both.accepts(Protocol::Titan));
        assert!(Affinity::Gemini.accepts(Protocol::Gemini));
        assert!(!Affinity::Gemini.accepts(Protocol::Titan));
        assert!(!Affinity::Titan.accepts(Protocol::Gemini));
    }

    #[test]
    fn params_only_from_matching_routes() {
        let mut router = Router::new();
        router.get("/posts/:id", reply("post")).unwrap();
        router.get("/users/:user", reply("user")).unwrap();

        let mut req = gemini("gemini://host/posts/42");
        let chain = router.matching(&mut req);
        assert_eq!(chain.len(), 1);
        assert_eq!(req.param("id"), Some("42"));
        assert_eq!(req.param("user"), None);

        let mut req = gemini("gemini://host/other");
        assert!(router.matching(&mut req).is_empty());
        assert_eq!(req.param("id"), None);
    }

    #[test]
    fn protocol_specific_routes() {
        let mut router = Router::new();
        router.get("/doc", reply("get")).unwrap();
        router.put("/doc", reply("put")).unwrap();
        router.use_at("/doc", reply("both")).unwrap();

        assert_eq!(router.matching(&mut gemini("gemini://host/doc")).len(), 2);
        assert_eq!(router.matching(&mut titan("titan://host/doc;size=1")).len(), 2);
    }

    #[tokio::test]
    async fn registration_order_wins_over_specificity() {
        let mut router = Router::new();
        router.use_all(reply("catch-all"));
        router.get("/exact", reply("exact")).unwrap();

        let body = body_of(&router, gemini("gemini://host/exact")).await.unwrap();
        assert!(body.ends_with("catch-all"));
    }

    #[tokio::test]
    async fn unmatched_request_yields_no_response() {
        let mut router = Router::new();
        router.get("/only", reply("x")).unwrap();
        assert!(body_of(&router, gemini("gemini://host/else")).await.is_none());
    }

    #[test]
    fn multi_handler_route() {
        let mut router = Router::new();
        let a: SharedHandler = Arc::new(reply("a"));
        let b: SharedHandler = Arc::new(reply("b"));
        router.route("/multi", Affinity::Both, vec![a, b]).unwrap();
        assert_eq!(router.routes()[0].handler_count(), 2);
        assert_eq!(router.matching(&mut gemini("gemini://host/multi")).len(), 2);
    }

    #[tokio::test]
    async fn shorthands_take_several_handlers() {
        let pass: SharedHandler = Arc::new(handler(|_req| Box::pin(async { Ok(None) })));
        let mut router = Router::new();
        router.use_all_many([Arc::clone(&pass)]);
        router
            .get_many("/doc", [Arc::clone(&pass), Arc::new(reply("get")) as SharedHandler])
            .unwrap();
        router
            .put_many("/doc", vec![Arc::clone(&pass), Arc::new(reply("put")) as SharedHandler])
            .unwrap();
        router.use_at_many("/doc", [pass]).unwrap();

        let counts: Vec<usize> = router.routes().iter().map(Route::handler_count).collect();
        assert_eq!(counts, [1, 2, 2, 1]);

        let body = body_of(&router, gemini("gemini://host/doc")).await.unwrap();
        assert!(body.ends_with("get"));
        let body = body_of(&router, titan("titan://host/doc;size=1")).await.unwrap();
        assert!(body.ends_with("put"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let mut router = Router::new();
        assert!(router.get("no-slash", reply("x")).is_err());
        assert!(router.is_empty());
    }
}
