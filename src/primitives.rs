//! Shared type aliases used across the crate's public interface.

/// Identifier of a state in the token-level automaton (the [`crate::index::Index`]).
pub type StateId = u32;

/// Identifier of a vocabulary token, as assigned by the tokenizer.
pub type TokenId = u32;

/// Raw byte spelling of a vocabulary token.
///
/// Tokens are stored as bytes rather than `String` so that a [`crate::vocabulary::Vocabulary`]
/// can hold tokenizer entries that are not valid UTF-8 (e.g. byte-fallback tokens).
pub type Token = Vec<u8>;
