//! Library's interface essentials.

pub use bincode::{config, decode_from_slice, encode_to_vec, Decode, Encode};
pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
pub use tokenizers::FromPretrainedParameters;

pub use super::{
    error::{Error, Result},
    guide::Guide,
    index::Index,
    primitives::{StateId, Token, TokenId},
    vocabulary::Vocabulary,
};
