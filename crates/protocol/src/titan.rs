//! Titan upload parameters.
//!
//! A Titan request line carries its parameters after the path as
//! semicolon-delimited `key=value` pairs:
//!
//! ```text
//! titan://example.org/notes/today.gmi;size=128;mime=text/plain;token=s3cret
//! ```
//!
//! Parsing is a pure function of the buffered line; it never touches the
//! connection.

use std::fmt;

use thiserror::Error;
use url::Url;

use crate::status::{Status, DEFAULT_MIME};

/// Errors produced by the Titan parameter parser.
#[derive(Debug, Error)]
pub enum TitanParamError {
    /// No `size` parameter was supplied.
    #[error("missing size parameter")]
    MissingSize,

    /// `size` is not a base-10 integer.
    #[error("size is not an integer: {0:?}")]
    InvalidSize(String),

    /// `size` is zero or negative.
    #[error("size must be positive, got {0}")]
    NonPositiveSize(i64),

    /// `size` is above the server's upload limit.
    #[error("size {size} exceeds the upload limit of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    /// The part before the first `;` is not a URL.
    #[error("invalid titan URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl TitanParamError {
    pub fn status(&self) -> Status {
        match self {
            TitanParamError::InvalidUrl(_) => Status::BadRequest,
            _ => Status::PermanentFailure,
        }
    }

    pub fn meta(&self) -> &'static str {
        match self {
            TitanParamError::InvalidUrl(_) => "Malformed request.",
            TitanParamError::TooLarge { .. } => "Upload too large.",
            _ => "Size must be greater than 0 bytes.",
        }
    }
}

/// Upload parameters declared by a Titan request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitanParams {
    /// Exact number of body bytes that follow the request line.
    pub size: u64,
    /// MIME type of the body. Defaults to [`DEFAULT_MIME`].
    pub mime: String,
    /// Optional upload token.
    pub token: Option<String>,
}

impl TitanParams {
    /// Parameters for a body of `size` bytes with the default MIME type and no token.
    pub fn new(size: u64) -> Self {
        Self {
            size,
            mime: DEFAULT_MIME.to_owned(),
            token: None,
        }
    }

    /// Check the declared size against an upload limit of `max` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TitanParamError::TooLarge`] if `size` exceeds `max`.
    pub fn ensure_within(&self, max: u64) -> Result<(), TitanParamError> {
        if self.size > max {
            return Err(TitanParamError::TooLarge {
                size: self.size,
                max,
            });
        }
        Ok(())
    }
}

/// Renders the `;key=value` suffix appended to a Titan URL.
impl fmt::Display for TitanParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ";size={};mime={}", self.size, self.mime)?;
        if let Some(token) = &self.token {
            write!(f, ";token={token}")?;
        }
        Ok(())
    }
}

/// A parsed Titan request line: the base URL and its parameters.
#[derive(Debug, Clone)]
pub struct TitanTarget {
    /// The URL with all parameters removed.
    pub url: Url,
    pub params: TitanParams,
}

impl TitanTarget {
    /// Parse a raw Titan request line.
    ///
    /// The first `;`-separated segment is the base URL; every later segment is
    /// split once on `=`. `size`, `mime` and `token` are recognised, anything
    /// else is ignored. A query string trailing the last parameter
    /// (`…;size=3?q`) is moved back onto the base URL.
    ///
    /// # Errors
    ///
    /// Returns a [`TitanParamError`] if the base URL does not parse or `size`
    /// is missing, not an integer, or not positive.
    pub fn parse(line: &str) -> Result<Self, TitanParamError> {
        let mut segments = line.split(';');
        let base = segments.next().unwrap_or_default();
        let raw_params: Vec<&str> = segments.collect();

        let mut size = None;
        let mut mime = None;
        let mut token = None;
        let mut query = None;

        for (i, segment) in raw_params.iter().enumerate() {
            let mut segment = *segment;
            if i + 1 == raw_params.len() {
                if let Some((param, q)) = segment.split_once('?') {
                    segment = param;
                    query = Some(q);
                }
            }
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            match key {
                "size" => size = Some(value),
                "mime" => mime = Some(value),
                "token" => token = Some(value),
                _ => {}
            }
        }

        let url = match query {
            Some(q) => Url::parse(&format!("{base}?{q}"))?,
            None => Url::parse(base)?,
        };

        let size = parse_size(size)?;
        let mime = mime
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MIME)
            .to_owned();
        let token = token.filter(|t| !t.is_empty()).map(str::to_owned);

        Ok(Self {
            url,
            params: TitanParams { size, mime, token },
        })
    }
}

fn parse_size(raw: Option<&str>) -> Result<u64, TitanParamError> {
    let raw = raw.ok_or(TitanParamError::MissingSize)?;
    let n: i64 = raw
        .parse()
        .map_err(|_| TitanParamError::InvalidSize(raw.to_owned()))?;
    if n <= 0 {
        return Err(TitanParamError::NonPositiveSize(n));
    }
    Ok(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_parameters() {
        let t = TitanTarget::parse("titan://host/path;size=128;mime=text/plain;token=abc").unwrap();
        assert_eq!(t.url.as_str(), "titan://host/path");
        assert_eq!(t.params.size, 128);
        assert_eq!(t.params.mime, "text/plain");
        assert_eq!(t.params.token.as_deref(), Some("abc"));
    }

    #[test]
    fn mime_and_token_defaults() {
        let t = TitanTarget::parse("titan://host/path;size=5").unwrap();
        assert_eq!(t.params.mime, DEFAULT_MIME);
        assert_eq!(t.params.token, None);
    }

    #[test]
    fn unknown_keys_and_bare_segments_are_ignored() {
        let t = TitanTarget::parse("titan://host/p;colour=red;flag;size=7").unwrap();
        assert_eq!(t.params, TitanParams::new(7));
    }

    #[test]
    fn size_failures_are_distinct() {
        assert!(matches!(
            TitanTarget::parse("titan://host/p"),
            Err(TitanParamError::MissingSize)
        ));
        assert!(matches!(
            TitanTarget::parse("titan://host/p;size=lots"),
            Err(TitanParamError::InvalidSize(s)) if s == "lots"
        ));
        assert!(matches!(
            TitanTarget::parse("titan://host/p;size=0"),
            Err(TitanParamError::NonPositiveSize(0))
        ));
        assert!(matches!(
            TitanTarget::parse("titan://host/p;size=-4"),
            Err(TitanParamError::NonPositiveSize(-4))
        ));
    }

    #[test]
    fn upload_limit() {
        let t = TitanTarget::parse("titan://host/p;size=9223372036854775807").unwrap();
        let err = t.params.ensure_within(1024).unwrap_err();
        assert!(matches!(
            err,
            TitanParamError::TooLarge {
                size: 9223372036854775807,
                max: 1024
            }
        ));
        assert_eq!(err.status(), Status::PermanentFailure);
        assert_eq!(err.meta(), "Upload too large.");

        assert!(TitanParams::new(1024).ensure_within(1024).is_ok());
        assert!(TitanParams::new(1025).ensure_within(1024).is_err());
    }

    #[test]
    fn query_after_parameters_returns_to_url() {
        let t = TitanTarget::parse("titan://host/new;size=3?notes.gmi").unwrap();
        assert_eq!(t.url.query(), Some("notes.gmi"));
        assert_eq!(t.url.path(), "/new");
        assert_eq!(t.params.size, 3);
    }

    #[test]
    fn query_before_parameters_stays_on_url() {
        let t = TitanTarget::parse("titan://host/new?notes.gmi;size=3").unwrap();
        assert_eq!(t.url.query(), Some("notes.gmi"));
        assert_eq!(t.params.size, 3);
    }

    #[test]
    fn value_is_split_once() {
        let t = TitanTarget::parse("titan://host/p;size=1;token=a=b").unwrap();
        assert_eq!(t.params.token.as_deref(), Some("a=b"));
    }

    #[test]
    fn display_round_trips() {
        let cases = [
            TitanParams::new(1),
            TitanParams {
                size: 4096,
                mime: "image/png".into(),
                token: Some("hunter2".into()),
            },
        ];
        for params in cases {
            let line = format!("titan://host/upload{params}");
            let parsed = TitanTarget::parse(&line).unwrap();
            assert_eq!(parsed.params, params);
        }
    }

    #[test]
    fn bad_base_url() {
        let err = TitanTarget::parse("not a url;size=3").unwrap_err();
        assert_eq!(err.status(), Status::BadRequest);
    }
}
