//! The crate's single error type.

use thiserror::Error;

/// Convenience alias used throughout the crate's public API.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    // --- Vocabulary construction/mutation ---
    #[error("Expected a dict with keys of type str or bytes and values of type list[int], got {0}")]
    BadTokenType(String),
    #[error("EOS token id {0} should not be present among a vocabulary's token ids")]
    EOSInValues(u32),
    #[error("EOS token should not be inserted into Vocabulary")]
    EOSInsert,

    // --- Loading a vocabulary from a pretrained tokenizer ---
    #[error("Unable to create tokenizer for {model}")]
    UnableToCreateTokenizer { model: String },
    #[error("Unsupported tokenizer for {model}: {reason}")]
    UnsupportedTokenizer { model: String, reason: String },
    #[error("Tokenizer error: {0}")]
    TokenizersError(#[from] tokenizers::Error),

    // --- Index build ---
    #[error("Failed to build DFA for regex: {0}")]
    UnsupportedRegex(#[from] Box<regex_automata::dfa::dense::BuildError>),
    #[error("The DFA does not have a universal start state")]
    DfaHasNoStartState,
    #[error(
        "The vocabulary does not allow generating any string matching the regex {regex} \
         from state {error_state}; missing one of: {missing_tokens:?}"
    )]
    IncompatibleVocabulary {
        regex: String,
        error_state: u32,
        missing_tokens: Vec<String>,
    },
    #[error("Index is empty: the regex admits no vocabulary-expressible string")]
    EmptyLanguage,

    // --- Guide ---
    #[error("No transition found for token id {token_id} from state {state}")]
    NoTransition { state: u32, token_id: u32 },
    #[error("Cannot roll back {requested} states, only {available} are recorded")]
    RollbackOverflow { requested: usize, available: usize },

    // --- Bitmask emission ---
    #[error("Invalid buffer size: n_elements must be at least 1, got {0}")]
    InvalidBufferSize(usize),
    #[error("Invalid element size: expected 4 (32-bit words), got {0}")]
    InvalidElementSize(usize),
    #[error("Invalid data pointer: pointer is null")]
    InvalidDataPointer,
    #[error("Invalid data pointer alignment: pointer must be 4-byte aligned")]
    InvalidDataPointerAlignment,

    // --- Serialization ---
    #[error("Serialization failed: {0}")]
    SerializationError(String),
    #[error("Deserialization failed: {0}")]
    DeserializationError(String),
}
