//! Wire-level types for the Gemini protocol and its Titan upload extension.
//!
//! Nothing in this crate touches the network: it turns raw request bytes into
//! typed values and typed values into response headers.

pub mod error;
pub mod line;
pub mod status;
pub mod titan;

pub use error::ProtocolError;
pub use line::{classify, LineBuffer, Protocol, RequestLine, MAX_REQUEST_BYTES};
pub use status::{Header, Status, DEFAULT_MIME};
pub use titan::{TitanParamError, TitanParams, TitanTarget};
