//! Span-array JSON tokenizer
//!
//! Single pass over the payload bytes, writing one [`JsonToken`] per value into
//! a pool whose capacity is fixed when the [`JsonTokenizer`] is created. No
//! value is copied or unescaped: every token is a `start..end` span into the
//! caller's buffer. Objects and arrays carry a child count (`size`), and every
//! token links to its parent, which is how closing brackets find the
//! container they terminate.
//!
//! Object keys are string tokens whose single child is the value; an object's
//! `size` is therefore its number of keys.

use super::navigator::JsonDocument;
use std::fmt;
use thiserror::Error;

/// Kind of value a token spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Object,
    Array,
    /// Span excludes the surrounding quotes
    String,
    /// Number, `true`, `false` or `null`
    Primitive,
}

impl TokenKind {
    fn is_container(self) -> bool {
        matches!(self, TokenKind::Object | TokenKind::Array)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenKind::Object => "object",
            TokenKind::Array => "array",
            TokenKind::String => "string",
            TokenKind::Primitive => "primitive",
        })
    }
}

/// A parsed span locating one JSON value within the unmodified source buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonToken {
    pub kind: TokenKind,
    /// Byte offset of the first byte of the value
    pub start: usize,
    /// Byte offset one past the last byte of the value
    pub end: usize,
    /// Number of direct children (keys for objects, elements for arrays,
    /// 1 for a key that has a value)
    pub size: usize,
    pub parent: Option<usize>,
    open: bool,
}

impl JsonToken {
    fn opened(kind: TokenKind, start: usize, parent: Option<usize>) -> Self {
        Self {
            kind,
            start,
            end: start,
            size: 0,
            parent,
            open: true,
        }
    }

    fn closed(kind: TokenKind, start: usize, end: usize, parent: Option<usize>) -> Self {
        Self {
            kind,
            start,
            end,
            size: 0,
            parent,
            open: false,
        }
    }

    /// Length of the span in bytes
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Bytes of this token within `source`, `None` if the span is out of range
    pub fn bytes<'a>(&self, source: &'a [u8]) -> Option<&'a [u8]> {
        source.get(self.start..self.end)
    }
}

/// Tokenizer failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenizeError {
    /// More tokens than the pool can hold
    #[error("token pool exhausted (capacity {capacity})")]
    NoMemory { capacity: usize },
    /// Invalid character or structure
    #[error("invalid JSON at byte {position}")]
    Invalid { position: usize },
    /// Input ended inside a value
    #[error("incomplete JSON document")]
    Partial,
}

/// Caller-owned, fixed-capacity token pool reused for every payload
///
/// The pool allocates once, at construction. [`JsonTokenizer::parse`] borrows
/// the pool for as long as the returned [`JsonDocument`] lives, so tokens
/// cannot outlive the payload they describe or leak into the next message.
#[derive(Debug)]
pub struct JsonTokenizer {
    tokens: Vec<JsonToken>,
    capacity: usize,
}

impl JsonTokenizer {
    pub fn new(capacity: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokenize `source` into the pool
    ///
    /// On failure the pool is left empty, never half-filled.
    pub fn parse<'a>(&'a mut self, source: &'a [u8]) -> Result<JsonDocument<'a>, TokenizeError> {
        self.tokens.clear();
        if let Err(e) = tokenize(source, &mut self.tokens, self.capacity) {
            self.tokens.clear();
            return Err(e);
        }
        Ok(JsonDocument::new(source, &self.tokens))
    }
}

fn push(
    tokens: &mut Vec<JsonToken>,
    capacity: usize,
    token: JsonToken,
) -> Result<usize, TokenizeError> {
    if tokens.len() >= capacity {
        return Err(TokenizeError::NoMemory { capacity });
    }
    tokens.push(token);
    Ok(tokens.len() - 1)
}

fn tokenize(
    source: &[u8],
    tokens: &mut Vec<JsonToken>,
    capacity: usize,
) -> Result<(), TokenizeError> {
    // Token the next value attaches to
    let mut parent: Option<usize> = None;
    let mut pos = 0;

    while pos < source.len() {
        match source[pos] {
            c @ (b'{' | b'[') => {
                check_attach(tokens, parent, false, pos)?;
                if let Some(p) = parent {
                    tokens[p].size += 1;
                }
                let kind = if c == b'{' {
                    TokenKind::Object
                } else {
                    TokenKind::Array
                };
                let index = push(tokens, capacity, JsonToken::opened(kind, pos, parent))?;
                parent = Some(index);
            }
            c @ (b'}' | b']') => {
                let kind = if c == b'}' {
                    TokenKind::Object
                } else {
                    TokenKind::Array
                };
                let mut index = tokens
                    .len()
                    .checked_sub(1)
                    .ok_or(TokenizeError::Invalid { position: pos })?;
                loop {
                    if tokens[index].open {
                        if tokens[index].kind != kind
                            || (kind == TokenKind::Object && has_dangling_key(tokens, index))
                        {
                            return Err(TokenizeError::Invalid { position: pos });
                        }
                        let token = &mut tokens[index];
                        token.end = pos + 1;
                        token.open = false;
                        parent = token.parent;
                        break;
                    }
                    index = tokens[index]
                        .parent
                        .ok_or(TokenizeError::Invalid { position: pos })?;
                }
            }
            b'"' => {
                check_attach(tokens, parent, true, pos)?;
                let close = scan_string(source, pos)?;
                push(
                    tokens,
                    capacity,
                    JsonToken::closed(TokenKind::String, pos + 1, close, parent),
                )?;
                if let Some(p) = parent {
                    tokens[p].size += 1;
                }
                pos = close;
            }
            b'\t' | b'\r' | b'\n' | b' ' => {}
            b':' => {
                let last = tokens
                    .len()
                    .checked_sub(1)
                    .ok_or(TokenizeError::Invalid { position: pos })?;
                let key = &tokens[last];
                let in_object = key.parent.map(|p| tokens[p].kind) == Some(TokenKind::Object);
                if key.kind != TokenKind::String || key.size != 0 || !in_object {
                    return Err(TokenizeError::Invalid { position: pos });
                }
                parent = Some(last);
            }
            b',' => {
                if let Some(p) = parent {
                    if !tokens[p].kind.is_container() {
                        parent = tokens[p].parent;
                    }
                }
            }
            b'-' | b'0'..=b'9' | b't' | b'f' | b'n' => {
                check_attach(tokens, parent, false, pos)?;
                let end = scan_primitive(source, pos)?;
                push(
                    tokens,
                    capacity,
                    JsonToken::closed(TokenKind::Primitive, pos, end, parent),
                )?;
                if let Some(p) = parent {
                    tokens[p].size += 1;
                }
                pos = end - 1;
            }
            _ => return Err(TokenizeError::Invalid { position: pos }),
        }
        pos += 1;
    }

    if tokens.iter().any(|t| t.open) {
        return Err(TokenizeError::Partial);
    }
    Ok(())
}

/// Reject a value that cannot attach to `parent`
///
/// Only strings are object keys, a key takes exactly one value, and a new
/// key may not start while the previous one still lacks its value.
fn check_attach(
    tokens: &[JsonToken],
    parent: Option<usize>,
    is_string: bool,
    pos: usize,
) -> Result<(), TokenizeError> {
    let Some(p) = parent else {
        return Ok(());
    };
    let owner = &tokens[p];
    let valid = match owner.kind {
        TokenKind::Object => is_string && !has_dangling_key(tokens, p),
        TokenKind::String => owner.size == 0,
        TokenKind::Array => true,
        TokenKind::Primitive => false,
    };
    if valid {
        Ok(())
    } else {
        Err(TokenizeError::Invalid { position: pos })
    }
}

/// The most recent key of `object` has no value yet
fn has_dangling_key(tokens: &[JsonToken], object: usize) -> bool {
    (object + 1..tokens.len())
        .rev()
        .find(|&i| tokens[i].parent == Some(object))
        .is_some_and(|key| tokens[key].size == 0)
}

/// Returns the offset of the closing quote of the string opening at `open`
fn scan_string(source: &[u8], open: usize) -> Result<usize, TokenizeError> {
    let mut pos = open + 1;
    while pos < source.len() {
        match source[pos] {
            b'"' => return Ok(pos),
            b'\\' => {
                pos += 1;
                match source.get(pos) {
                    None => return Err(TokenizeError::Partial),
                    Some(b'"' | b'/' | b'\\' | b'b' | b'f' | b'r' | b'n' | b't') => {}
                    Some(b'u') => {
                        for offset in 1..=4 {
                            match source.get(pos + offset) {
                                None => return Err(TokenizeError::Partial),
                                Some(h) if h.is_ascii_hexdigit() => {}
                                Some(_) => {
                                    return Err(TokenizeError::Invalid {
                                        position: pos + offset,
                                    })
                                }
                            }
                        }
                        pos += 4;
                    }
                    Some(_) => return Err(TokenizeError::Invalid { position: pos }),
                }
            }
            _ => {}
        }
        pos += 1;
    }
    Err(TokenizeError::Partial)
}

/// Returns the offset one past the primitive starting at `start`
///
/// A primitive must be terminated by a delimiter; running off the end of the
/// input is reported as `Partial`.
fn scan_primitive(source: &[u8], start: usize) -> Result<usize, TokenizeError> {
    let mut pos = start;
    while pos < source.len() {
        match source[pos] {
            b':' | b'\t' | b'\r' | b'\n' | b' ' | b',' | b']' | b'}' => {
                check_literal(source, start, pos)?;
                return Ok(pos);
            }
            c if !(32..127).contains(&c) => return Err(TokenizeError::Invalid { position: pos }),
            _ => {}
        }
        pos += 1;
    }
    Err(TokenizeError::Partial)
}

fn check_literal(source: &[u8], start: usize, end: usize) -> Result<(), TokenizeError> {
    let text = &source[start..end];
    let expected: &[u8] = match text[0] {
        b't' => b"true",
        b'f' => b"false",
        b'n' => b"null",
        _ => return Ok(()),
    };
    if text == expected {
        Ok(())
    } else {
        Err(TokenizeError::Invalid { position: start })
    }
}
