//! Incoming requests.
//!
//! Both protocols share one [`Request`] struct; the protocol-specific part
//! lives in [`RequestKind`] and is matched exhaustively wherever behaviour
//! differs.

use std::collections::HashMap;
use std::fmt;

use percent_encoding::percent_decode_str;
use protocol::{Protocol, TitanTarget};
use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};
use url::Url;

use super::body::TitanBody;

/// Route parameters captured from the request path.
pub type Params = HashMap<String, String>;

/// A client certificate presented during the TLS handshake.
///
/// The server accepts any certificate (Gemini clients usually self-sign), so
/// this is an identity token, not a proof of trust.
#[derive(Clone)]
pub struct ClientCertificate {
    der: CertificateDer<'static>,
    fingerprint256: String,
}

impl ClientCertificate {
    pub fn from_der(der: CertificateDer<'static>) -> Self {
        let fingerprint256 = fingerprint(&der);
        Self {
            der,
            fingerprint256,
        }
    }

    /// DER encoding of the end-entity certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// SHA-256 over the DER encoding, uppercase hex, colon separated.
    pub fn fingerprint256(&self) -> &str {
        &self.fingerprint256
    }

    /// Compare against a fingerprint written with or without colons, in either case.
    pub fn matches_fingerprint(&self, expected: &str) -> bool {
        normalize_fingerprint(expected) == normalize_fingerprint(&self.fingerprint256)
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("fingerprint256", &self.fingerprint256)
            .finish()
    }
}

fn fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

fn normalize_fingerprint(s: &str) -> String {
    s.chars()
        .filter(|c| *c != ':')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Upload metadata and body of a Titan request.
#[derive(Debug)]
pub struct TitanUpload {
    size: u64,
    mime: String,
    token: Option<String>,
    body: TitanBody,
}

impl TitanUpload {
    /// Declared body size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn body(&self) -> &TitanBody {
        &self.body
    }

    /// The body stream. Reading it consumes bytes from the connection.
    pub fn body_mut(&mut self) -> &mut TitanBody {
        &mut self.body
    }
}

/// Protocol-specific request data.
#[derive(Debug)]
pub enum RequestKind {
    Gemini,
    Titan(TitanUpload),
}

/// A request on either protocol.
#[derive(Debug)]
pub struct Request {
    url: Url,
    cert: Option<ClientCertificate>,
    query: Option<String>,
    params: Params,
    kind: RequestKind,
}

impl Request {
    /// A Gemini request for `url`.
    pub fn gemini(url: Url, cert: Option<ClientCertificate>) -> Self {
        Self::new(url, cert, RequestKind::Gemini)
    }

    /// A Titan request; `body` must already be bounded to `target.params.size`.
    pub fn new_titan(target: TitanTarget, cert: Option<ClientCertificate>, body: TitanBody) -> Self {
        let TitanTarget { url, params } = target;
        let upload = TitanUpload {
            size: params.size,
            mime: params.mime,
            token: params.token,
            body,
        };
        Self::new(url, cert, RequestKind::Titan(upload))
    }

    fn new(url: Url, cert: Option<ClientCertificate>, kind: RequestKind) -> Self {
        let query = url
            .query()
            .filter(|q| !q.is_empty())
            .map(|q| percent_decode_str(q).decode_utf8_lossy().into_owned());
        Self {
            url,
            cert,
            query,
            params: Params::new(),
            kind,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Path component of the URL; `/` when the URL has none.
    pub fn path(&self) -> &str {
        match self.url.path() {
            "" => "/",
            path => path,
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self.kind {
            RequestKind::Gemini => Protocol::Gemini,
            RequestKind::Titan(_) => Protocol::Titan,
        }
    }

    /// Client certificate, if the client presented one.
    pub fn cert(&self) -> Option<&ClientCertificate> {
        self.cert.as_ref()
    }

    /// Percent-decoded text after `?`; `None` when absent or empty.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Parameters captured by every route pattern that matched this request.
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub(crate) fn merge_params(&mut self, captured: Params) {
        self.params.extend(captured);
    }

    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    pub fn titan(&self) -> Option<&TitanUpload> {
        match &self.kind {
            RequestKind::Titan(upload) => Some(upload),
            RequestKind::Gemini => None,
        }
    }

    pub fn titan_mut(&mut self) -> Option<&mut TitanUpload> {
        match &mut self.kind {
            RequestKind::Titan(upload) => Some(upload),
            RequestKind::Gemini => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn gemini_request_fields() {
        let req = Request::gemini(url("gemini://host/search?hello%20world"), None);
        assert_eq!(req.protocol(), Protocol::Gemini);
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query(), Some("hello world"));
        assert!(req.cert().is_none());
        assert!(req.params().is_empty());
        assert!(req.titan().is_none());
    }

    #[test]
    fn empty_path_and_query() {
        let req = Request::gemini(url("gemini://host"), None);
        assert_eq!(req.path(), "/");
        assert_eq!(req.query(), None);

        let req = Request::gemini(url("gemini://host/?"), None);
        assert_eq!(req.query(), None);
    }

    #[test]
    fn titan_request_fields() {
        let target = TitanTarget::parse("titan://host/up;size=3;mime=text/plain;token=t").unwrap();
        let body = TitanBody::new(Bytes::from_static(b"abc"), tokio::io::empty(), 3);
        let req = Request::new_titan(target, None, body);
        assert_eq!(req.protocol(), Protocol::Titan);
        let upload = req.titan().unwrap();
        assert_eq!(upload.size(), 3);
        assert_eq!(upload.mime(), "text/plain");
        assert_eq!(upload.token(), Some("t"));
        assert_eq!(req.url().as_str(), "titan://host/up");
    }

    #[test]
    fn params_merge() {
        let mut req = Request::gemini(url("gemini://host/posts/42"), None);
        req.merge_params(Params::from([("id".to_owned(), "42".to_owned())]));
        assert_eq!(req.param("id"), Some("42"));
        assert_eq!(req.param("missing"), None);
    }

    #[test]
    fn fingerprint_format_and_comparison() {
        let cert = ClientCertificate::from_der(CertificateDer::from(b"not really der".to_vec()));
        let fp = cert.fingerprint256().to_owned();
        assert_eq!(fp.len(), 32 * 3 - 1);
        assert!(fp.chars().all(|c| c == ':' || c.is_ascii_hexdigit()));
        assert!(cert.matches_fingerprint(&fp));
        assert!(cert.matches_fingerprint(&fp.replace(':', "").to_lowercase()));
        assert!(!cert.matches_fingerprint("00:11"));
        assert!(format!("{cert:?}").contains(&fp));
    }
}
