//! Store path parser and formatter.

use std::fmt::Write as _;

use crate::types::Segment;
use crate::{PathError, MAX_PATH_LENGTH};

/// Parse a store path into segments.
///
/// The empty string parses to an empty vec (the root).
///
/// # Example
///
/// ```
/// use json_store_path::{parse_path, Segment};
///
/// assert_eq!(parse_path("").unwrap(), vec![]);
/// assert_eq!(
///     parse_path("list[id=7].tags[0]").unwrap(),
///     vec![
///         Segment::key("list"),
///         Segment::select("id", "7"),
///         Segment::key("tags"),
///         Segment::Index(0),
///     ]
/// );
/// assert!(parse_path("a..b").is_err());
/// assert!(parse_path("a[b").is_err());
/// ```
pub fn parse_path(path: &str) -> Result<Vec<Segment>, PathError> {
    PathParser::parse(path)
}

/// Validate path syntax without keeping the segments.
pub fn validate_path(path: &str) -> Result<(), PathError> {
    parse_path(path).map(|_| ())
}

/// Format segments back into a path string.
///
/// `format_path(&parse_path(p)?) == p` for every valid `p`.
///
/// # Example
///
/// ```
/// use json_store_path::{format_path, Segment};
///
/// assert_eq!(format_path(&[]), "");
/// assert_eq!(format_path(&[Segment::Index(2), Segment::key("name")]), "[2].name");
/// ```
pub fn format_path(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        if !segment.is_bracket() && !out.is_empty() {
            out.push('.');
        }
        let _ = write!(out, "{segment}");
    }
    out
}

struct PathParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> PathParser<'a> {
    fn parse(input: &'a str) -> Result<Vec<Segment>, PathError> {
        if input.len() > MAX_PATH_LENGTH {
            return Err(PathError::PathTooLong);
        }
        let mut parser = Self { input, pos: 0 };
        parser.parse_segments()
    }

    fn parse_segments(&mut self) -> Result<Vec<Segment>, PathError> {
        let mut segments = Vec::new();
        if self.is_at_end() {
            return Ok(segments);
        }

        if self.peek() == Some('[') {
            segments.push(self.parse_bracket()?);
        } else {
            segments.push(Segment::Key(self.parse_key()?));
        }

        while let Some(c) = self.peek() {
            match c {
                '.' => {
                    self.advance();
                    segments.push(Segment::Key(self.parse_key()?));
                }
                '[' => segments.push(self.parse_bracket()?),
                ch => return Err(PathError::UnexpectedChar { pos: self.pos, ch }),
            }
        }

        Ok(segments)
    }

    fn parse_key(&mut self) -> Result<String, PathError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '.' | '[' | ']') {
                break;
            }
            self.advance();
        }
        if self.pos == start {
            return match self.peek() {
                None => Err(PathError::UnexpectedEnd),
                Some(']') => Err(PathError::UnexpectedChar {
                    pos: self.pos,
                    ch: ']',
                }),
                Some(_) => Err(PathError::EmptySegment(self.pos)),
            };
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_bracket(&mut self) -> Result<Segment, PathError> {
        self.expect('[')?;
        let start = self.pos;
        loop {
            match self.peek() {
                None => return Err(PathError::UnexpectedEnd),
                Some(']') => break,
                Some('[') => {
                    return Err(PathError::UnexpectedChar {
                        pos: self.pos,
                        ch: '[',
                    })
                }
                Some(_) => self.advance(),
            }
        }
        let content = &self.input[start..self.pos];
        self.expect(']')?;

        if is_valid_index(content) {
            return content
                .parse()
                .map(Segment::Index)
                .map_err(|_| PathError::InvalidIndex(content.to_string()));
        }
        match content.split_once('=') {
            Some((prop, value)) if !prop.is_empty() => Ok(Segment::select(prop, value)),
            Some(_) => Err(PathError::InvalidSelector(content.to_string())),
            None => Err(PathError::InvalidIndex(content.to_string())),
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn expect(&mut self, expected: char) -> Result<(), PathError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(PathError::UnexpectedChar { pos: self.pos, ch }),
            None => Err(PathError::UnexpectedEnd),
        }
    }
}

/// Check if a string is a canonical non-negative integer (no leading zeros).
fn is_valid_index(index: &str) -> bool {
    if index.is_empty() {
        return false;
    }
    let bytes = index.as_bytes();
    if bytes.len() > 1 && bytes[0] == b'0' {
        return false;
    }
    bytes.iter().all(|b| b.is_ascii_digit())
}
