//! Converts a tokenizer's visible token spellings back into the raw bytes a
//! vocabulary must index against.
//!
//! Most Hugging Face tokenizers don't store tokens as raw bytes: byte-level
//! (GPT-2 style) tokenizers map each byte to a printable unicode character, and
//! byte-fallback (SentencePiece style) tokenizers spell out-of-vocabulary bytes
//! as `<0xNN>` literals and use `▁` for the space character. This module undoes
//! both so the rest of the crate can work with raw token bytes uniformly.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap as HashMap;
use tokenizers::decoders::DecoderWrapper;
use tokenizers::pre_tokenizers::PreTokenizerWrapper;
use tokenizers::Tokenizer;

use crate::primitives::Token;

/// GPT-2's byte <-> printable-unicode-char mapping, used by byte-level tokenizers
/// so that every byte value has a printable, whitespace-free representation.
static BYTE_TO_CHAR: Lazy<HashMap<u8, char>> = Lazy::new(|| {
    let mut bytes: Vec<u8> = (b'!'..=b'~').chain(0xA1..=0xAC).chain(0xAE..=0xFF).collect();
    let mut codepoints: Vec<u32> = bytes.iter().map(|&b| b as u32).collect();

    let mut next = 0u32;
    for b in 0..=255u8 {
        if !bytes.contains(&b) {
            bytes.push(b);
            codepoints.push(256 + next);
            next += 1;
        }
    }

    bytes
        .into_iter()
        .zip(codepoints.into_iter().map(|c| char::from_u32(c).unwrap()))
        .collect()
});

static CHAR_TO_BYTE: Lazy<HashMap<char, u8>> =
    Lazy::new(|| BYTE_TO_CHAR.iter().map(|(&b, &c)| (c, b)).collect());

/// A tokenizer's token-spelling convention, detected once from its pre-tokenizer
/// and decoder, then applied to every vocabulary entry.
enum Level {
    /// GPT-2 style: each character of the token maps back to one raw byte.
    Byte,
    /// SentencePiece style: `▁` is a literal space, `<0xNN>` spells a raw byte.
    ByteFallback,
}

pub struct TokenProcessor {
    level: Level,
}

impl TokenProcessor {
    /// Detects the token-spelling convention used by `tokenizer`.
    ///
    /// Fails if neither a byte-level pre-tokenizer nor a byte-fallback decoder is
    /// present: such a tokenizer's tokens can't be reliably mapped back to bytes.
    pub fn new(tokenizer: &Tokenizer) -> Result<Self, ()> {
        if let Some(PreTokenizerWrapper::ByteLevel(_)) = tokenizer.get_pre_tokenizer() {
            return Ok(Self { level: Level::Byte });
        }
        if let Some(DecoderWrapper::ByteFallback(_)) = tokenizer.get_decoder() {
            return Ok(Self {
                level: Level::ByteFallback,
            });
        }
        Err(())
    }

    /// Converts one tokenizer-visible token spelling into its raw bytes.
    pub fn process(&self, token: String) -> crate::Result<Token> {
        match self.level {
            Level::Byte => Ok(token
                .chars()
                .map(|c| *CHAR_TO_BYTE.get(&c).unwrap_or(&0))
                .collect()),
            Level::ByteFallback => Ok(Self::decode_byte_fallback(&token)),
        }
    }

    fn decode_byte_fallback(token: &str) -> Token {
        if let Some(hex) = token
            .strip_prefix("<0x")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                return vec![byte];
            }
        }
        token.replace('▁', " ").into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_table_round_trips() {
        for b in 0..=255u8 {
            let c = BYTE_TO_CHAR[&b];
            assert_eq!(CHAR_TO_BYTE[&c], b);
        }
    }

    #[test]
    fn byte_fallback_decodes_hex_literal() {
        assert_eq!(TokenProcessor::decode_byte_fallback("<0x0A>"), vec![0x0A]);
    }

    #[test]
    fn byte_fallback_decodes_meta_space() {
        assert_eq!(
            TokenProcessor::decode_byte_fallback("▁al"),
            b" al".to_vec()
        );
    }
}
