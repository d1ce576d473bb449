//! Field lookup and scalar extraction over a tokenized payload
//!
//! Lookups are scoped: [`find_token`] only walks the direct keys of one
//! object, skipping nested values wholesale, so a field of the same name at a
//! deeper level is never returned. When a key appears more than once in the
//! same object the first occurrence wins.

use super::tokenizer::{JsonToken, TokenKind};
use crate::error::{JobsError, JobsResult};

/// Index of a token within the pool it was parsed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenId(usize);

impl TokenId {
    pub const ROOT: TokenId = TokenId(0);

    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Find the value of key `name` among the direct children of `scope`
///
/// Without a scope the root token is searched. Returns `None` if the scope is
/// not an object, is empty, or has no such key.
pub fn find_token(
    name: &str,
    source: &[u8],
    tokens: &[JsonToken],
    scope: Option<TokenId>,
) -> Option<TokenId> {
    let scope_index = scope.unwrap_or(TokenId::ROOT).index();
    let object = tokens.get(scope_index)?;
    if object.kind != TokenKind::Object {
        return None;
    }

    let mut cursor = scope_index + 1;
    for _ in 0..object.size {
        let key = tokens.get(cursor)?;
        let value_index = cursor + 1;
        let value = tokens.get(value_index)?;

        if key.kind == TokenKind::String && key.bytes(source) == Some(name.as_bytes()) {
            return Some(TokenId(value_index));
        }

        // Skip everything nested inside the value
        cursor = value_index + 1;
        while cursor < tokens.len() && tokens[cursor].start < value.end {
            cursor += 1;
        }
    }
    None
}

/// Copy the bytes of `token` into `dest` followed by a NUL terminator
///
/// All-or-nothing: `dest` is untouched unless the whole value plus the
/// terminator fits. Returns the length of the value without the terminator.
pub fn extract_string(dest: &mut [u8], source: &[u8], token: &JsonToken) -> JobsResult<usize> {
    match token.kind {
        TokenKind::String | TokenKind::Primitive => {}
        found => {
            return Err(JobsError::WrongTokenType {
                expected: "string or primitive",
                found,
            })
        }
    }

    let bytes = token
        .bytes(source)
        .ok_or_else(|| JobsError::unexpected_shape("token span lies outside the payload"))?;
    let needed = bytes.len() + 1;
    if needed > dest.len() {
        return Err(JobsError::BufferTooSmall {
            needed,
            capacity: dest.len(),
        });
    }

    dest[..bytes.len()].copy_from_slice(bytes);
    dest[bytes.len()] = 0;
    Ok(bytes.len())
}

/// A payload together with the tokens describing it
///
/// Borrowed from a [`super::JsonTokenizer`]; valid only until the next payload
/// is parsed into the same pool.
#[derive(Debug, Clone, Copy)]
pub struct JsonDocument<'a> {
    source: &'a [u8],
    tokens: &'a [JsonToken],
}

impl<'a> JsonDocument<'a> {
    pub fn new(source: &'a [u8], tokens: &'a [JsonToken]) -> Self {
        Self { source, tokens }
    }

    pub fn source(&self) -> &'a [u8] {
        self.source
    }

    pub fn tokens(&self) -> &'a [JsonToken] {
        self.tokens
    }

    /// First top-level token, if any
    pub fn root(&self) -> Option<TokenId> {
        if self.tokens.is_empty() {
            None
        } else {
            Some(TokenId::ROOT)
        }
    }

    pub fn token(&self, id: TokenId) -> Option<&'a JsonToken> {
        self.tokens.get(id.index())
    }

    pub fn kind(&self, id: TokenId) -> Option<TokenKind> {
        self.token(id).map(|t| t.kind)
    }

    pub fn find(&self, name: &str, scope: Option<TokenId>) -> Option<TokenId> {
        find_token(name, self.source, self.tokens, scope)
    }

    /// Raw text of a token, exactly as it appears in the payload
    pub fn raw(&self, id: TokenId) -> Option<&'a str> {
        let bytes = self.token(id)?.bytes(self.source)?;
        std::str::from_utf8(bytes).ok()
    }

    pub fn is_null(&self, id: TokenId) -> bool {
        self.kind(id) == Some(TokenKind::Primitive) && self.raw(id) == Some("null")
    }

    /// String value of a token, escapes left as they are on the wire
    pub fn str_value(&self, id: TokenId) -> JobsResult<&'a str> {
        let token = self.expect(id, TokenKind::String, "string")?;
        let bytes = token
            .bytes(self.source)
            .ok_or_else(|| JobsError::unexpected_shape("token span lies outside the payload"))?;
        std::str::from_utf8(bytes)
            .map_err(|_| JobsError::unexpected_shape("string value is not valid UTF-8"))
    }

    pub fn i64_value(&self, id: TokenId) -> JobsResult<i64> {
        self.expect(id, TokenKind::Primitive, "integer")?;
        let text = self.raw(id).unwrap_or_default();
        text.parse::<i64>()
            .map_err(|_| JobsError::unexpected_shape(format!("'{text}' is not an integer")))
    }

    /// Copy a string or primitive value into a caller-supplied buffer
    pub fn extract_string(&self, id: TokenId, dest: &mut [u8]) -> JobsResult<usize> {
        let token = self
            .token(id)
            .ok_or_else(|| JobsError::unexpected_shape("token index out of range"))?;
        extract_string(dest, self.source, token)
    }

    /// Optional string field; a `null` value reads as absent
    pub fn find_str(&self, name: &str, scope: Option<TokenId>) -> JobsResult<Option<&'a str>> {
        match self.find(name, scope) {
            Some(id) if !self.is_null(id) => self.str_value(id).map(Some),
            _ => Ok(None),
        }
    }

    /// Optional integer field; a `null` value reads as absent
    pub fn find_i64(&self, name: &str, scope: Option<TokenId>) -> JobsResult<Option<i64>> {
        match self.find(name, scope) {
            Some(id) if !self.is_null(id) => self.i64_value(id).map(Some),
            _ => Ok(None),
        }
    }

    fn expect(
        &self,
        id: TokenId,
        kind: TokenKind,
        expected: &'static str,
    ) -> JobsResult<&'a JsonToken> {
        let token = self
            .token(id)
            .ok_or_else(|| JobsError::unexpected_shape("token index out of range"))?;
        if token.kind != kind {
            return Err(JobsError::WrongTokenType {
                expected,
                found: token.kind,
            });
        }
        Ok(token)
    }
}
