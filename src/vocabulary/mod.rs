use bincode::{Decode, Encode};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use tokenizers::normalizers::Sequence;
use tokenizers::{FromPretrainedParameters, NormalizerWrapper, Tokenizer};

use crate::primitives::{Token, TokenId};
use crate::{Error, Result};

use locator::{HFLocator, Locator};
use processor::TokenProcessor;

mod locator;
mod processor;

/// Vocabulary of an LLM: a multi-valued map from a token's byte spelling to the
/// token ids that share that spelling, plus a reserved end-of-sequence id.
///
/// ## Examples
///
/// ### Create a vocabulary from a pretrained model.
/// ```rust
/// # use regex_guide_core::prelude::*;
/// #
/// let vocabulary = Vocabulary::from_pretrained("openai-community/gpt2", None);
/// ```
///
/// ### Create an empty vocabulary and fill it in.
/// ```rust
/// # use regex_guide_core::prelude::*;
/// #
/// let mut vocabulary = Vocabulary::new(1);
/// vocabulary.insert("token", 0).unwrap();
/// ```
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct Vocabulary {
    eos_token_id: TokenId,
    tokens: HashMap<Token, Vec<TokenId>>,
}

impl Vocabulary {
    /// Creates an empty vocabulary with the given EOS token id.
    pub fn new(eos_token_id: TokenId) -> Self {
        Self {
            eos_token_id,
            tokens: HashMap::default(),
        }
    }

    /// Creates a vocabulary from an EOS token id and a map of token spellings to ids,
    /// validating that `eos_token_id` is not present among the values.
    pub fn from_map(eos_token_id: TokenId, tokens: HashMap<Token, Vec<TokenId>>) -> Result<Self> {
        for ids in tokens.values() {
            if ids.contains(&eos_token_id) {
                return Err(Error::EOSInValues(eos_token_id));
            }
        }
        Ok(Self {
            eos_token_id,
            tokens,
        })
    }

    /// Inserts a token into the vocabulary with the specified identifier.
    ///
    /// Fails with [`Error::EOSInsert`] if `id` is the vocabulary's EOS token id.
    pub fn insert(&mut self, token: impl Into<Token>, id: TokenId) -> Result<()> {
        if id == self.eos_token_id {
            return Err(Error::EOSInsert);
        }
        self.tokens.entry(token.into()).or_default().push(id);
        Ok(())
    }

    /// Removes every id registered under `token`, if any. Idempotent.
    pub fn remove(&mut self, token: impl AsRef<[u8]>) {
        self.tokens.remove(token.as_ref());
    }

    /// Creates the vocabulary of a pre-trained model from the Hugging Face Hub.
    pub fn from_pretrained(
        model: &str,
        parameters: Option<FromPretrainedParameters>,
    ) -> Result<Self> {
        Self::from_pretrained_with_locator::<HFLocator>(model, parameters)
    }

    #[doc(hidden)]
    #[inline(always)]
    fn from_pretrained_with_locator<L: Locator>(
        model: &str,
        parameters: Option<FromPretrainedParameters>,
    ) -> Result<Self> {
        let mut tokenizer =
            Tokenizer::from_pretrained(model, parameters.clone()).map_err(|e| {
                Error::UnableToCreateTokenizer {
                    model: format!("{model}: {e}"),
                }
            })?;
        Self::filter_prepend_normalizers(&mut tokenizer);

        // Locate eos_token_id in defined locations.
        let eos_token_id = L::locate_eos_token_id(model, &tokenizer, &parameters);
        let Some(eos_token_id) = eos_token_id else {
            return Err(Error::UnsupportedTokenizer {
                model: model.to_string(),
                reason: "EOS token id".to_string(),
            });
        };

        // Start building the vocabulary from eos_token_id and added tokens.
        let mut vocabulary = Vocabulary::new(eos_token_id);
        for (id, added_token) in tokenizer.get_added_tokens_decoder().iter() {
            if !added_token.special {
                // Added tokens are trusted not to collide with the EOS id.
                let _ = vocabulary.insert(added_token.content.clone(), *id);
            }
        }

        // Process each vocabulary token according to the tokenizer's level.
        let Ok(processor) = TokenProcessor::new(&tokenizer) else {
            return Err(Error::UnsupportedTokenizer {
                model: model.to_string(),
                reason: "Token processor".to_string(),
            });
        };
        for (token, token_id) in tokenizer.get_vocab(false) {
            if token_id == eos_token_id {
                continue;
            }
            let processed_token = processor.process(token)?;
            let _ = vocabulary.insert(processed_token, token_id);
        }

        Ok(vocabulary)
    }

    /// Returns all tokens with their token ids in the vocabulary.
    pub fn tokens(&self) -> &HashMap<Token, Vec<TokenId>> {
        &self.tokens
    }

    /// Per provided token returns the vector of `TokenId`s registered for it, if any.
    pub fn get(&self, token: impl AsRef<[u8]>) -> Option<&Vec<TokenId>> {
        self.tokens.get(token.as_ref())
    }

    /// Gets the identifier of the special end-of-sequence token.
    pub fn eos_token_id(&self) -> TokenId {
        self.eos_token_id
    }

    /// Number of unique token ids in the vocabulary, plus one for the EOS id.
    pub fn len(&self) -> usize {
        let unique: HashSet<TokenId> = self.tokens.values().flatten().copied().collect();
        unique.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Filters out `Prepend` kind of tokenizer's normalizers.
    fn filter_prepend_normalizers(tokenizer: &mut Tokenizer) {
        // Main concern is prepend normalizers, for example https://github.com/google/sentencepiece
        // In `sentencepiece` tokenizer, `▁` is used to denote spaces in the source text,
        // e.g. `Hello World.` could be tokenized as: [Hello] [▁Wor] [ld] [.]
        //
        // We don't want to deal with the special characters, so we remove `Prepend` normalizers.
        if let Some(normalizer) = tokenizer.get_normalizer() {
            match normalizer {
                NormalizerWrapper::Sequence(normalization_sequence) => {
                    let new_sequence = Sequence::new(
                        normalization_sequence
                            .get_normalizers()
                            .iter()
                            .filter_map(|normalizer| match normalizer {
                                NormalizerWrapper::Prepend(_) => None,
                                _ => Some(normalizer.clone()),
                            })
                            .collect(),
                    );
                    tokenizer.with_normalizer(new_sequence.into());
                }
                NormalizerWrapper::Prepend(_) => {
                    tokenizer.with_normalizer(None::<NormalizerWrapper>);
                }
                _ => {}
            }
        }
    }
}

impl std::fmt::Display for Vocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "[eos_token_id={:?}]", self.eos_token_id)?;
        for (token, token_ids) in self.tokens.iter() {
            writeln!(f, "{:?} -> {:?}", token, token_ids)?;
        }
        Ok(())
    }
}

impl TryFrom<(TokenId, HashMap<Token, Vec<TokenId>>)> for Vocabulary {
    type Error = Error;

    fn try_from(values: (TokenId, HashMap<Token, Vec<TokenId>>)) -> Result<Vocabulary> {
        let (eos_token_id, tokens) = values;
        Vocabulary::from_map(eos_token_id, tokens)
    }
}

impl TryFrom<(TokenId, HashMap<String, Vec<TokenId>>)> for Vocabulary {
    type Error = Error;

    fn try_from(values: (TokenId, HashMap<String, Vec<TokenId>>)) -> Result<Vocabulary> {
        let (eos_token_id, tokens) = values;
        let tokens = tokens
            .into_iter()
            .map(|(k, v)| (k.into_bytes(), v))
            .collect::<HashMap<Token, Vec<TokenId>>>();
        Vocabulary::from_map(eos_token_id, tokens)
    }
}
