//! Caller-owned scratch memory for one driver
//!
//! Holds the JSON token pool and the buffer outbound request bodies are
//! rendered into. Both are sized once and reused for every message, so a
//! driver's memory use does not grow with the traffic it sees.

use crate::config::JobsSection;
use crate::error::JobsResult;
use crate::json::{JsonDocument, JsonTokenizer};

pub const DEFAULT_MAX_JSON_TOKENS: usize = 128;
pub const DEFAULT_MESSAGE_BUFFER_BYTES: usize = 256;

#[derive(Debug)]
pub struct JobsArena {
    tokenizer: JsonTokenizer,
    message_buffer: Vec<u8>,
}

impl JobsArena {
    pub fn new(max_json_tokens: usize, message_buffer_bytes: usize) -> Self {
        Self {
            tokenizer: JsonTokenizer::new(max_json_tokens),
            message_buffer: vec![0; message_buffer_bytes],
        }
    }

    pub fn from_config(config: &JobsSection) -> Self {
        Self::new(config.max_json_tokens, config.message_buffer_bytes)
    }

    pub fn token_capacity(&self) -> usize {
        self.tokenizer.capacity()
    }

    pub fn message_capacity(&self) -> usize {
        self.message_buffer.len()
    }

    /// Tokenize `payload` into the pool, replacing whatever it held
    pub fn parse<'a>(&'a mut self, payload: &'a [u8]) -> JobsResult<JsonDocument<'a>> {
        Ok(self.tokenizer.parse(payload)?)
    }

    /// Render a request body with `encode` and return the bytes written
    pub fn encode<F>(&mut self, encode: F) -> JobsResult<&[u8]>
    where
        F: FnOnce(&mut [u8]) -> JobsResult<usize>,
    {
        let len = encode(&mut self.message_buffer)?;
        Ok(&self.message_buffer[..len])
    }
}

impl Default for JobsArena {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_JSON_TOKENS, DEFAULT_MESSAGE_BUFFER_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobsError;
    use crate::protocol::requests::{encode_query, QueryRequest};

    #[test]
    fn test_default_sizes() {
        let arena = JobsArena::default();
        assert_eq!(arena.token_capacity(), 128);
        assert_eq!(arena.message_capacity(), 256);
    }

    #[test]
    fn test_parse_reuses_pool_after_failure() {
        let mut arena = JobsArena::new(4, 64);

        let oversized = br#"{"a":1,"b":2,"c":3}"#;
        assert!(matches!(arena.parse(oversized), Err(JobsError::Parse(_))));

        let doc = arena.parse(br#"{"a":1}"#).unwrap();
        assert_eq!(doc.find_i64("a", None).unwrap(), Some(1));
    }

    #[test]
    fn test_encode_into_message_buffer() {
        let mut arena = JobsArena::new(8, 64);
        let body = arena
            .encode(|buf| encode_query(&QueryRequest { client_token: Some("t") }, buf))
            .unwrap();
        assert_eq!(body, br#"{"clientToken":"t"}"#);
    }

    #[test]
    fn test_encode_overflow_is_reported() {
        let mut arena = JobsArena::new(8, 4);
        let result = arena.encode(|buf| encode_query(&QueryRequest { client_token: Some("abc") }, buf));
        assert!(matches!(result, Err(JobsError::BufferTooSmall { capacity: 4, .. })));
    }
}
