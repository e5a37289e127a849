//! Response status codes and the single-line response header.

use std::fmt;

const LINE_BREAKS: &[char] = &['\r', '\n'];

/// MIME type assumed for bodies sent without an explicit type.
pub const DEFAULT_MIME: &str = "text/gemini";

/// Status codes this server emits.
///
/// The numeric value is the two-digit code written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// `10`: the client should prompt for input; meta is the prompt.
    Input,
    /// `20`: success; meta is the MIME type of the body.
    Success,
    /// `30`: redirect; meta is the target URL.
    Redirect,
    /// `50`: generic permanent failure.
    PermanentFailure,
    /// `51`: nothing is registered for the requested resource.
    NotFound,
    /// `59`: malformed request or unsupported protocol.
    BadRequest,
    /// `60`: a client certificate is required.
    CertificateRequired,
    /// `61`: the presented client certificate is not authorized.
    CertificateNotAuthorized,
}

impl Status {
    /// Returns the two-digit wire code.
    pub fn code(self) -> u8 {
        match self {
            Status::Input => 10,
            Status::Success => 20,
            Status::Redirect => 30,
            Status::PermanentFailure => 50,
            Status::NotFound => 51,
            Status::BadRequest => 59,
            Status::CertificateRequired => 60,
            Status::CertificateNotAuthorized => 61,
        }
    }

    /// Looks up a status by its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        let status = match code {
            10 => Status::Input,
            20 => Status::Success,
            30 => Status::Redirect,
            50 => Status::PermanentFailure,
            51 => Status::NotFound,
            59 => Status::BadRequest,
            60 => Status::CertificateRequired,
            61 => Status::CertificateNotAuthorized,
            _ => return None,
        };
        Some(status)
    }

    /// Returns `true` for `2x` codes, the only ones followed by a body.
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The `<status> <meta>\r\n` line that precedes any response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    status: Status,
    meta: String,
}

impl Header {
    /// Build a header. Line breaks in `meta` are replaced with spaces so the
    /// header always occupies exactly one line.
    pub fn new(status: Status, meta: impl Into<String>) -> Self {
        let mut meta = meta.into();
        if meta.contains(LINE_BREAKS) {
            meta = meta.replace(LINE_BREAKS, " ");
        }
        Self { status, meta }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn meta(&self) -> &str {
        &self.meta
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}\r\n", self.status.code(), self.meta)
    }
}
