//! Protocol errors that terminate a connection before any handler runs.

use thiserror::Error;

use crate::status::{Header, Status};
use crate::titan::TitanParamError;

/// Errors raised while turning the request line into a typed request.
///
/// Every variant maps to the status line written before the connection is closed:
/// - [`ProtocolError::Malformed`] → 59
/// - [`ProtocolError::UnsupportedScheme`] → 59
/// - [`ProtocolError::Titan`] → 50 for size problems, 59 for an unparseable base URL
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The request line is not valid UTF-8 or not a URL.
    #[error("malformed request line: {0}")]
    Malformed(String),

    /// The URL scheme is neither `gemini` nor `titan`.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// The Titan parameters are missing or invalid.
    #[error(transparent)]
    Titan(#[from] TitanParamError),
}

impl ProtocolError {
    /// Returns the status code that should be sent for this error.
    pub fn status(&self) -> Status {
        match self {
            ProtocolError::Malformed(_) => Status::BadRequest,
            ProtocolError::UnsupportedScheme(_) => Status::BadRequest,
            ProtocolError::Titan(e) => e.status(),
        }
    }

    /// Returns the client-facing meta text for this error.
    pub fn meta(&self) -> &'static str {
        match self {
            ProtocolError::Malformed(_) => "Malformed request.",
            ProtocolError::UnsupportedScheme(_) => "Invalid protocol.",
            ProtocolError::Titan(e) => e.meta(),
        }
    }

    /// The complete header line sent before closing.
    pub fn header(&self) -> Header {
        Header::new(self.status(), self.meta())
    }
}
