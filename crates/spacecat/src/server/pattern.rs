//! Route path patterns.
//!
//! Supported syntax, segment by segment:
//!
//! | segment  | matches                                   |
//! |----------|-------------------------------------------|
//! | `posts`  | the literal segment, case-insensitive     |
//! | `:id`    | exactly one non-empty segment             |
//! | `:id?`   | zero or one segment                       |
//! | `:rest*` | zero or more segments, joined with `/`    |
//! | `:rest+` | one or more segments, joined with `/`     |
//! | `(.*)`   | the rest of the path, captured as `0`, `1`… |
//!
//! The pattern `(.*)` on its own is the wildcard: it matches every path and
//! captures nothing. A single trailing slash on the path is ignored.
//! Matching walks segments with backtracking; no regular expressions.

use percent_encoding::percent_decode_str;
use thiserror::Error;

use super::request::Params;

/// The pattern that matches every request.
pub const WILDCARD: &str = "(.*)";

/// Errors from compiling a route pattern.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern must start with '/': {0:?}")]
    MissingLeadingSlash(String),

    #[error("parameter without a name in {0:?}")]
    EmptyName(String),

    #[error("unsupported segment {segment:?} in {pattern:?}")]
    Unsupported { pattern: String, segment: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repeat {
    One,
    Optional,
    ZeroOrMore,
    OneOrMore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Param { name: String, repeat: Repeat },
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    tokens: Vec<Token>,
    wildcard: bool,
}

impl PathPattern {
    /// Compile `source`.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] for patterns without a leading `/`, nameless
    /// parameters, or segments mixing literals with parameters or groups.
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        if source == WILDCARD {
            return Ok(Self::wildcard());
        }

        let Some(rest) = source.strip_prefix('/') else {
            return Err(PatternError::MissingLeadingSlash(source.to_owned()));
        };

        let mut tokens = Vec::new();
        let mut groups = 0usize;
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            let token = if segment == WILDCARD {
                let name = groups.to_string();
                groups += 1;
                Token::Param {
                    name,
                    repeat: Repeat::ZeroOrMore,
                }
            } else if let Some(spec) = segment.strip_prefix(':') {
                parse_param(source, segment, spec)?
            } else if segment.contains(['(', ')', ':', '*'].as_slice()) {
                return Err(PatternError::Unsupported {
                    pattern: source.to_owned(),
                    segment: segment.to_owned(),
                });
            } else {
                Token::Literal(segment.to_owned())
            };
            tokens.push(token);
        }

        Ok(Self {
            source: source.to_owned(),
            tokens,
            wildcard: false,
        })
    }

    /// The pattern that matches every path.
    pub fn wildcard() -> Self {
        Self {
            source: WILDCARD.to_owned(),
            tokens: Vec::new(),
            wildcard: true,
        }
    }

    /// The pattern text as registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Match `path`, returning the captured parameters on success.
    pub fn matches(&self, path: &str) -> Option<Params> {
        if self.wildcard {
            return Some(Params::new());
        }

        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        let segments: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };

        let mut captured = Vec::new();
        if match_tokens(&self.tokens, &segments, &mut captured) {
            Some(captured.into_iter().collect())
        } else {
            None
        }
    }
}

fn parse_param(source: &str, segment: &str, spec: &str) -> Result<Token, PatternError> {
    let (name, repeat) = match spec.as_bytes().last() {
        Some(b'?') => (&spec[..spec.len() - 1], Repeat::Optional),
        Some(b'*') => (&spec[..spec.len() - 1], Repeat::ZeroOrMore),
        Some(b'+') => (&spec[..spec.len() - 1], Repeat::OneOrMore),
        _ => (spec, Repeat::One),
    };
    if name.is_empty() {
        return Err(PatternError::EmptyName(source.to_owned()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(PatternError::Unsupported {
            pattern: source.to_owned(),
            segment: segment.to_owned(),
        });
    }
    Ok(Token::Param {
        name: name.to_owned(),
        repeat,
    })
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

fn join_decoded(segments: &[&str]) -> String {
    segments.iter().map(|s| decode(s)).collect::<Vec<_>>().join("/")
}

fn match_tokens(tokens: &[Token], segments: &[&str], out: &mut Vec<(String, String)>) -> bool {
    let Some((token, rest)) = tokens.split_first() else {
        return segments.is_empty();
    };

    match token {
        Token::Literal(literal) => match segments.split_first() {
            Some((first, tail)) if decode(first).eq_ignore_ascii_case(literal) => {
                match_tokens(rest, tail, out)
            }
            _ => false,
        },
        Token::Param { name, repeat } => {
            let (min, max) = match repeat {
                Repeat::One => (1, 1),
                Repeat::Optional => (0, 1),
                Repeat::ZeroOrMore => (0, segments.len()),
                Repeat::OneOrMore => (1, segments.len()),
            };
            let max = max.min(segments.len());
            // Greedy: try the longest capture first.
            for take in (min..=max).rev() {
                let taken = &segments[..take];
                if taken.iter().any(|s| s.is_empty()) {
                    continue;
                }
                let mark = out.len();
                if take > 0 {
                    out.push((name.clone(), join_decoded(taken)));
                }
                if match_tokens(rest, &segments[take..], out) {
                    return true;
                }
                out.truncate(mark);
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(pattern: &str, path: &str) -> Option<Params> {
        PathPattern::parse(pattern).unwrap().matches(path)
    }

    #[test]
    fn named_parameter() {
        let params = capture("/posts/:id", "/posts/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(capture("/posts/:id", "/users/42").is_none());
        assert!(capture("/posts/:id", "/posts").is_none());
        assert!(capture("/posts/:id", "/posts/42/comments").is_none());
    }

    #[test]
    fn literals_are_case_insensitive_and_trailing_slash_optional() {
        assert!(capture("/About", "/about/").is_some());
        assert!(capture("/", "/").is_some());
        assert!(capture("/", "").is_some());
        assert!(capture("/", "/x").is_none());
    }

    #[test]
    fn optional_parameter() {
        assert!(capture("/feed/:page?", "/feed").unwrap().is_empty());
        let params = capture("/feed/:page?", "/feed/3").unwrap();
        assert_eq!(params["page"], "3");
    }

    #[test]
    fn repeated_parameters() {
        let params = capture("/files/:path*", "/files/a/b/c.gmi").unwrap();
        assert_eq!(params["path"], "a/b/c.gmi");
        assert!(capture("/files/:path*", "/files").is_some());
        assert!(capture("/files/:path+", "/files").is_none());
    }

    #[test]
    fn backtracking_leaves_room_for_later_tokens() {
        let params = capture("/:dir*/:file", "/a/b/c").unwrap();
        assert_eq!(params["dir"], "a/b");
        assert_eq!(params["file"], "c");
    }

    #[test]
    fn unnamed_group_captures_positionally() {
        let params = capture("/static/(.*)", "/static/css/site.css").unwrap();
        assert_eq!(params["0"], "css/site.css");
    }

    #[test]
    fn captures_are_percent_decoded() {
        let params = capture("/tags/:tag", "/tags/rust%20lang").unwrap();
        assert_eq!(params["tag"], "rust lang");
    }

    #[test]
    fn wildcard_matches_everything_without_captures() {
        let pattern = PathPattern::parse(WILDCARD).unwrap();
        assert!(pattern.is_wildcard());
        assert!(pattern.matches("/anything/at/all").unwrap().is_empty());
        assert!(pattern.matches("").unwrap().is_empty());
    }

    #[test]
    fn invalid_patterns() {
        assert!(matches!(
            PathPattern::parse("posts"),
            Err(PatternError::MissingLeadingSlash(_))
        ));
        assert!(matches!(
            PathPattern::parse("/posts/:"),
            Err(PatternError::EmptyName(_))
        ));
        assert!(matches!(
            PathPattern::parse("/posts/id-:id"),
            Err(PatternError::Unsupported { .. })
        ));
    }
}
