//! Built-in middleware.
//!
//! Each item here is an ordinary [`Handler`]: it passes (`Ok(None)`) when the
//! request may continue down the chain and answers with a failure response
//! otherwise. Register them ahead of the handlers they guard.

use std::future::ready;

use protocol::Status;

use super::handler::{BoxFuture, Handler, HandlerResult};
use super::request::{Request, RequestKind};
use super::response::Response;

/// Runs the wrapped handler for Titan requests only.
#[derive(Debug, Clone)]
pub struct TitanOnly<H> {
    inner: H,
}

/// Wrap `inner` so Gemini requests skip it.
pub fn titan_only<H: Handler>(inner: H) -> TitanOnly<H> {
    TitanOnly { inner }
}

impl<H: Handler> Handler for TitanOnly<H> {
    fn handle<'a>(&'a self, req: &'a mut Request) -> BoxFuture<'a, HandlerResult> {
        if req.titan().is_none() {
            return Box::pin(ready(Ok(None)));
        }
        self.inner.handle(req)
    }
}

/// Rejects Titan uploads that do not carry the expected `token` parameter.
#[derive(Clone)]
pub struct RequireToken {
    token: String,
}

/// Require every Titan upload to carry `token`. Gemini requests pass.
pub fn require_token(token: impl Into<String>) -> RequireToken {
    RequireToken {
        token: token.into(),
    }
}

impl RequireToken {
    fn check(&self, req: &Request) -> Option<Response> {
        let RequestKind::Titan(upload) = req.kind() else {
            return None;
        };
        match upload.token() {
            None => Some(Response::status(
                Status::PermanentFailure,
                "Must provide a token.",
            )),
            Some(token) if token != self.token => {
                Some(Response::status(Status::PermanentFailure, "Invalid token."))
            }
            Some(_) => None,
        }
    }
}

// The expected token stays out of logs.
impl std::fmt::Debug for RequireToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequireToken").finish_non_exhaustive()
    }
}

impl Handler for RequireToken {
    fn handle<'a>(&'a self, req: &'a mut Request) -> BoxFuture<'a, HandlerResult> {
        Box::pin(ready(Ok(self.check(req))))
    }
}

/// Rejects requests without a client certificate, optionally pinned to one fingerprint.
#[derive(Debug, Clone, Default)]
pub struct RequireCert {
    fingerprint: Option<String>,
}

/// Require any client certificate.
pub fn require_cert() -> RequireCert {
    RequireCert::default()
}

/// Require the client certificate whose SHA-256 fingerprint is `fingerprint`.
pub fn require_cert_fingerprint(fingerprint: impl Into<String>) -> RequireCert {
    RequireCert {
        fingerprint: Some(fingerprint.into()),
    }
}

impl RequireCert {
    fn check(&self, req: &Request) -> Option<Response> {
        let Some(cert) = req.cert() else {
            return Some(Response::request_cert());
        };
        match &self.fingerprint {
            Some(expected) if !cert.matches_fingerprint(expected) => Some(Response::status(
                Status::CertificateNotAuthorized,
                "Certificate not authorized.",
            )),
            _ => None,
        }
    }
}

impl Handler for RequireCert {
    fn handle<'a>(&'a self, req: &'a mut Request) -> BoxFuture<'a, HandlerResult> {
        Box::pin(ready(Ok(self.check(req))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::body::TitanBody;
    use crate::server::handler::handler;
    use crate::server::request::ClientCertificate;
    use bytes::Bytes;
    use protocol::TitanTarget;
    use rustls::pki_types::CertificateDer;
    use url::Url;

    fn cert() -> ClientCertificate {
        ClientCertificate::from_der(CertificateDer::from(b"not really der".to_vec()))
    }

    fn gemini(cert: Option<ClientCertificate>) -> Request {
        Request::gemini(Url::parse("gemini://host/").unwrap(), cert)
    }

    fn titan(line: &str, cert: Option<ClientCertificate>) -> Request {
        let target = TitanTarget::parse(line).unwrap();
        let body = TitanBody::new(Bytes::new(), tokio::io::empty(), target.params.size);
        Request::new_titan(target, cert, body)
    }

    async fn run<H: Handler>(h: &H, mut req: Request) -> Option<(Status, String)> {
        h.handle(&mut req)
            .await
            .unwrap()
            .map(|res| (res.header().status(), res.header().meta().to_owned()))
    }

    #[tokio::test]
    async fn titan_only_skips_gemini() {
        let inner = handler(|_req| Box::pin(async { Ok(Some(Response::send("titan"))) }));
        let guarded = titan_only(inner);

        assert!(run(&guarded, gemini(None)).await.is_none());
        let (status, _) = run(&guarded, titan("titan://host/a;size=1", None))
            .await
            .unwrap();
        assert_eq!(status, Status::Success);
    }

    #[tokio::test]
    async fn token_missing_wrong_and_right() {
        let mw = require_token("s3cret");

        assert_eq!(
            run(&mw, titan("titan://host/a;size=1", None)).await,
            Some((Status::PermanentFailure, "Must provide a token.".into()))
        );
        assert_eq!(
            run(&mw, titan("titan://host/a;size=1;token=nope", None)).await,
            Some((Status::PermanentFailure, "Invalid token.".into()))
        );
        assert!(run(&mw, titan("titan://host/a;size=1;token=s3cret", None))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn token_is_not_required_for_gemini() {
        assert!(run(&require_token("s3cret"), gemini(None)).await.is_none());
    }

    #[tokio::test]
    async fn cert_required() {
        let mw = require_cert();
        assert_eq!(
            run(&mw, gemini(None)).await,
            Some((Status::CertificateRequired, "Certificate required.".into()))
        );
        assert!(run(&mw, gemini(Some(cert()))).await.is_none());
        assert_eq!(
            run(&mw, titan("titan://host/a;size=5", None)).await,
            Some((Status::CertificateRequired, "Certificate required.".into()))
        );
    }

    #[tokio::test]
    async fn cert_fingerprint_pinning() {
        let presented = cert();
        let pinned = presented.fingerprint256().replace(':', "").to_lowercase();

        let mw = require_cert_fingerprint(pinned);
        assert!(run(&mw, gemini(Some(presented))).await.is_none());

        let other = require_cert_fingerprint("00:11:22");
        assert_eq!(
            run(&other, gemini(Some(cert()))).await,
            Some((
                Status::CertificateNotAuthorized,
                "Certificate not authorized.".into()
            ))
        );
    }

    #[test]
    fn token_debug_is_redacted() {
        assert!(!format!("{:?}", require_token("s3cret")).contains("s3cret"));
    }
}
