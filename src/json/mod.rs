//! Allocation-free JSON navigation for Jobs payloads
//!
//! Payloads are never materialized into a tree. The [`tokenizer`] records
//! byte spans into a fixed pool, and the [`navigator`] answers the handful of
//! field lookups the Jobs protocol needs against those spans.

pub mod navigator;
pub mod tokenizer;

pub use navigator::{extract_string, find_token, JsonDocument, TokenId};
pub use tokenizer::{JsonToken, JsonTokenizer, TokenKind, TokenizeError};
