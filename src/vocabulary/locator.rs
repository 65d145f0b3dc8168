//! Locates a pretrained tokenizer's end-of-sequence token id.

use hf_hub::api::sync::{Api, ApiError};
use hf_hub::{Repo, RepoType};
use once_cell::sync::Lazy;
use serde::Deserialize;
use tokenizers::{FromPretrainedParameters, Tokenizer};

use crate::primitives::TokenId;

/// Names commonly used by tokenizer configs to name the EOS token's content,
/// tried in order against the tokenizer's vocabulary when no config field is found.
static COMMON_EOS_SPELLINGS: Lazy<[&str; 4]> =
    Lazy::new(|| ["<|endoftext|>", "</s>", "<eos>", "<|end_of_text|>"]);

#[derive(Deserialize, Default)]
struct HubConfig {
    eos_token_id: Option<EosTokenIdField>,
}

#[derive(Deserialize, Default)]
struct GenerationConfig {
    eos_token_id: Option<EosTokenIdField>,
}

/// `eos_token_id` is sometimes a single id, sometimes a list of ids (some models
/// allow several EOS spellings); the first is taken as the canonical one.
#[derive(Deserialize)]
#[serde(untagged)]
enum EosTokenIdField {
    Single(TokenId),
    Many(Vec<TokenId>),
}

impl EosTokenIdField {
    fn first(&self) -> Option<TokenId> {
        match self {
            EosTokenIdField::Single(id) => Some(*id),
            EosTokenIdField::Many(ids) => ids.first().copied(),
        }
    }
}

pub trait Locator {
    fn locate_eos_token_id(
        model: &str,
        tokenizer: &Tokenizer,
        parameters: &Option<FromPretrainedParameters>,
    ) -> Option<TokenId>;
}

/// Locates the EOS token id of a model hosted on the Hugging Face Hub.
///
/// Tries, in order: `generation_config.json`'s `eos_token_id`, `config.json`'s
/// `eos_token_id`, then a handful of conventional EOS spellings looked up directly
/// in the tokenizer's vocabulary.
pub struct HFLocator;

impl Locator for HFLocator {
    fn locate_eos_token_id(
        model: &str,
        tokenizer: &Tokenizer,
        parameters: &Option<FromPretrainedParameters>,
    ) -> Option<TokenId> {
        if let Some(id) = Self::from_hub_file(model, parameters, "generation_config.json") {
            return Some(id);
        }
        if let Some(id) = Self::from_hub_file(model, parameters, "config.json") {
            return Some(id);
        }
        COMMON_EOS_SPELLINGS
            .iter()
            .find_map(|spelling| tokenizer.token_to_id(spelling))
    }
}

impl HFLocator {
    fn from_hub_file(
        model: &str,
        parameters: &Option<FromPretrainedParameters>,
        filename: &str,
    ) -> Option<TokenId> {
        let path = Self::download(model, parameters, filename).ok()?;
        let contents = std::fs::read_to_string(path).ok()?;
        serde_json::from_str::<GenerationConfig>(&contents)
            .ok()
            .and_then(|c| c.eos_token_id)
            .or_else(|| {
                serde_json::from_str::<HubConfig>(&contents)
                    .ok()
                    .and_then(|c| c.eos_token_id)
            })
            .and_then(|field| field.first())
    }

    fn download(
        model: &str,
        parameters: &Option<FromPretrainedParameters>,
        filename: &str,
    ) -> Result<std::path::PathBuf, ApiError> {
        let revision = parameters
            .as_ref()
            .map(|p| p.revision.clone())
            .unwrap_or_else(|| "main".to_string());
        let repo = Repo::with_revision(model.to_string(), RepoType::Model, revision);
        Api::new()?.repo(repo).get(filename)
    }
}
