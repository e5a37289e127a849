//! Request-line accumulation, truncation and scheme classification.
//!
//! A request is a single URL terminated by CRLF. Bytes can arrive split across
//! any number of reads, so [`LineBuffer`] is fed chunk by chunk and yields a
//! [`RequestLine`] once the terminator has been seen. The line never grows past
//! its byte budget: excess bytes are dropped while the buffer keeps scanning
//! for the terminator.

use std::fmt;

use bytes::Bytes;
use url::Url;

use crate::error::ProtocolError;

/// Default byte budget for a request line, terminator excluded.
pub const MAX_REQUEST_BYTES: usize = 1024;

/// The two protocols served on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Gemini,
    Titan,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Gemini => "gemini",
            Protocol::Titan => "titan",
        })
    }
}

/// A complete request line plus whatever followed it in the same read.
#[derive(Debug, Clone)]
pub struct RequestLine {
    raw: Vec<u8>,
    truncated: bool,
    leftover: Bytes,
}

impl RequestLine {
    /// The line as text.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if the bytes are not UTF-8.
    pub fn text(&self) -> Result<&str, ProtocolError> {
        std::str::from_utf8(&self.raw)
            .map_err(|_| ProtocolError::Malformed("request line is not valid UTF-8".into()))
    }

    /// Raw bytes of the (possibly truncated) line.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// `true` if bytes were dropped to fit the budget.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Bytes received after the terminator. For Titan this is the start of the body.
    pub fn leftover(&self) -> &Bytes {
        &self.leftover
    }

    /// Split into the line text and the leftover bytes.
    pub fn into_parts(self) -> Result<(String, Bytes), ProtocolError> {
        let text = String::from_utf8(self.raw)
            .map_err(|_| ProtocolError::Malformed("request line is not valid UTF-8".into()))?;
        Ok((text, self.leftover))
    }
}

/// Incremental CRLF scanner with a fixed byte budget.
#[derive(Debug)]
pub struct LineBuffer {
    line: Vec<u8>,
    max: usize,
    dropped: usize,
    pending_cr: bool,
}

impl LineBuffer {
    /// Create a buffer that keeps at most `max` bytes of the line.
    pub fn new(max: usize) -> Self {
        Self {
            line: Vec::with_capacity(max.min(MAX_REQUEST_BYTES)),
            max,
            dropped: 0,
            pending_cr: false,
        }
    }

    /// Number of bytes currently held for the line.
    pub fn len(&self) -> usize {
        self.line.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }

    /// Feed the next chunk read from the connection.
    ///
    /// Returns the finished line once a CRLF has been seen; bytes after the
    /// terminator are returned as [`RequestLine::leftover`]. Returns `None`
    /// while the terminator is still outstanding.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<RequestLine> {
        for (i, &byte) in chunk.iter().enumerate() {
            if self.pending_cr {
                if byte == b'\n' {
                    return Some(self.finish(&chunk[i + 1..]));
                }
                self.pending_cr = false;
                self.push(b'\r');
            }
            if byte == b'\r' {
                self.pending_cr = true;
            } else {
                self.push(byte);
            }
        }
        None
    }

    fn push(&mut self, byte: u8) {
        if self.line.len() < self.max {
            self.line.push(byte);
        } else {
            self.dropped += 1;
        }
    }

    fn finish(&mut self, rest: &[u8]) -> RequestLine {
        let mut raw = std::mem::take(&mut self.line);
        let truncated = self.dropped > 0;

        // A cut at the budget may land inside a multi-byte character; back off
        // to the last complete one.
        if truncated {
            if let Err(e) = std::str::from_utf8(&raw) {
                if e.error_len().is_none() {
                    raw.truncate(e.valid_up_to());
                }
            }
        }

        self.dropped = 0;
        self.pending_cr = false;

        RequestLine {
            raw,
            truncated,
            leftover: Bytes::copy_from_slice(rest),
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(MAX_REQUEST_BYTES)
    }
}

/// Parse the request line as a URL and decide which protocol it speaks.
///
/// # Errors
///
/// - [`ProtocolError::Malformed`] if the line is not a URL.
/// - [`ProtocolError::UnsupportedScheme`] for anything but `gemini` or `titan`.
pub fn classify(line: &str) -> Result<(Protocol, Url), ProtocolError> {
    let url = Url::parse(line).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let protocol = match url.scheme() {
        "gemini" => Protocol::Gemini,
        "titan" => Protocol::Titan,
        other => return Err(ProtocolError::UnsupportedScheme(other.to_owned())),
    };
    Ok((protocol, url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_line() {
        let mut buf = LineBuffer::default();
        let line = buf.feed(b"gemini://host/\r\n").unwrap();
        assert_eq!(line.text().unwrap(), "gemini://host/");
        assert!(line.leftover().is_empty());
        assert!(!line.is_truncated());
    }

    #[test]
    fn line_split_across_reads() {
        let mut buf = LineBuffer::default();
        assert!(buf.feed(b"gemini://ho").is_none());
        assert!(buf.feed(b"st/path\r").is_none());
        let line = buf.feed(b"\n").unwrap();
        assert_eq!(line.text().unwrap(), "gemini://host/path");
    }

    #[test]
    fn bytes_after_terminator_are_kept() {
        let mut buf = LineBuffer::default();
        let line = buf.feed(b"titan://host/up;size=5\r\nhello").unwrap();
        assert_eq!(line.text().unwrap(), "titan://host/up;size=5");
        assert_eq!(&line.leftover()[..], b"hello");
    }

    #[test]
    fn lone_carriage_return_is_part_of_the_line() {
        let mut buf = LineBuffer::default();
        let line = buf.feed(b"a\rb\r\n").unwrap();
        assert_eq!(line.as_bytes(), b"a\rb");
    }

    #[test]
    fn long_line_is_truncated_to_budget() {
        let mut buf = LineBuffer::new(16);
        let mut input = vec![b'x'; 100];
        input.extend_from_slice(b"\r\n");
        let line = buf.feed(&input).unwrap();
        assert_eq!(line.as_bytes().len(), 16);
        assert!(line.is_truncated());
    }

    #[test]
    fn buffer_never_exceeds_budget_without_terminator() {
        let mut buf = LineBuffer::new(32);
        for _ in 0..100 {
            assert!(buf.feed(&[b'y'; 64]).is_none());
        }
        assert_eq!(buf.len(), 32);
    }

    #[test]
    fn truncation_backs_off_to_char_boundary() {
        // "é" is two bytes; a budget of 4 would cut the second "é" in half.
        let mut buf = LineBuffer::new(4);
        let line = buf.feed("aéé\r\n".as_bytes()).unwrap();
        assert_eq!(line.text().unwrap(), "aé");
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let mut buf = LineBuffer::default();
        let line = buf.feed(b"gemini://\xff/\r\n").unwrap();
        assert!(matches!(line.text(), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn classify_schemes() {
        let (p, url) = classify("gemini://host/a").unwrap();
        assert_eq!(p, Protocol::Gemini);
        assert_eq!(url.path(), "/a");

        let (p, _) = classify("titan://host/a;size=3").unwrap();
        assert_eq!(p, Protocol::Titan);

        assert!(matches!(
            classify("https://host/"),
            Err(ProtocolError::UnsupportedScheme(s)) if s == "https"
        ));
        assert!(matches!(classify("not a url"), Err(ProtocolError::Malformed(_))));
    }
}
