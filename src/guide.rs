//! A stateful cursor over an [`Index`], with bounded rollback and bitmask emission.

use std::collections::VecDeque;
use std::sync::Arc;

use bincode::{Decode, Encode};

use crate::index::Index;
use crate::primitives::{StateId, TokenId};
use crate::{Error, Result};

/// Walks an [`Index`] one token at a time, tracking the current automaton state and a
/// bounded history of prior states so that forward progress can be undone.
///
/// `is_finished` is true only once the *last* advance consumed the EOS id, not merely
/// when the current state happens to accept it: a model is still free to choose between
/// emitting EOS and continuing, for as long as the regex allows a longer match.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct Guide {
    state: StateId,
    index: Arc<Index>,
    max_rollback: usize,
    history: VecDeque<StateId>,
    last_was_eos: bool,
}

impl Guide {
    /// Creates a `Guide` positioned at `index`'s initial state, keeping up to
    /// `max_rollback` prior states for [`Guide::rollback_state`].
    pub fn new(index: Arc<Index>, max_rollback: usize) -> Self {
        let state = index.initial_state();
        Guide {
            state,
            index,
            max_rollback,
            history: VecDeque::with_capacity(max_rollback),
            last_was_eos: false,
        }
    }

    /// Returns the current automaton state.
    pub fn get_state(&self) -> StateId {
        self.state
    }

    /// Returns the token ids that keep the automaton alive from the current state.
    pub fn get_tokens(&self) -> Vec<TokenId> {
        self.index.allowed_tokens(&self.state).unwrap_or_default()
    }

    /// Advances past `token_id`, returning the new set of allowed tokens.
    ///
    /// Fails with [`Error::NoTransition`] if `token_id` is not allowed from the current
    /// state; the state is left unchanged on failure and no rollback slot is consumed.
    pub fn advance(&mut self, token_id: TokenId) -> Result<Vec<TokenId>> {
        let eos_token_id = self.index.eos_token_id();
        let next_state = if token_id == eos_token_id {
            // `Index::next_state` deliberately refuses to treat EOS as a generative
            // transition; the Guide applies the final state's EOS self-loop itself.
            self.index
                .is_final_state(&self.state)
                .then_some(self.state)
        } else {
            self.index.next_state(&self.state, &token_id)
        };

        let Some(next_state) = next_state else {
            return Err(Error::NoTransition {
                state: self.state,
                token_id,
            });
        };

        if self.max_rollback > 0 {
            if self.history.len() == self.max_rollback {
                self.history.pop_front();
            }
            self.history.push_back(self.state);
        }
        self.state = next_state;
        self.last_was_eos = token_id == eos_token_id;
        Ok(self.get_tokens())
    }

    /// Undoes the last `n` advances, restoring the state from `n` steps ago.
    ///
    /// Fails with [`Error::RollbackOverflow`] if `n` exceeds the recorded history; the
    /// state is left unchanged on failure. A successful rollback always leaves a
    /// non-terminal step: it undoes at least one forward transition, and a final
    /// state is only ever entered by consuming a non-EOS token first.
    pub fn rollback_state(&mut self, n: usize) -> Result<()> {
        if n > self.history.len() {
            return Err(Error::RollbackOverflow {
                requested: n,
                available: self.history.len(),
            });
        }
        if n == 0 {
            return Ok(());
        }
        let mut restored = self.state;
        for _ in 0..n {
            restored = self.history.pop_back().expect("n <= history.len()");
        }
        self.state = restored;
        self.last_was_eos = false;
        Ok(())
    }

    /// Returns whether `token_ids` could be advanced through in sequence from the
    /// current state, without mutating it. Mirrors [`Guide::advance`]'s handling of
    /// the EOS id as the self-loop out of a final state, rather than delegating
    /// that case to [`Index::next_state`], which always refuses EOS as an input.
    pub fn accepts_tokens(&self, token_ids: &[TokenId]) -> bool {
        let eos_token_id = self.index.eos_token_id();
        let mut state = self.state;
        for &token_id in token_ids {
            let next = if token_id == eos_token_id {
                self.index.is_final_state(&state).then_some(state)
            } else {
                self.index.next_state(&state, &token_id)
            };
            match next {
                Some(next) => state = next,
                None => return false,
            }
        }
        true
    }

    /// True once the last advance consumed the EOS id.
    pub fn is_finished(&self) -> bool {
        self.last_was_eos
    }

    /// Writes a little-endian, 32-bit-word-packed bitmask of the currently allowed
    /// token ids into the `n_elements`-word buffer at `data`. Word `w`, bit `b` (LSB
    /// first) marks token id `32 * w + b`.
    ///
    /// # Safety
    /// `data` must point to at least `n_elements * element_size` writable, initialized
    /// bytes, with `element_size == 4` and 4-byte alignment.
    pub unsafe fn write_mask_into(
        &self,
        data: *mut u32,
        n_elements: usize,
        element_size: usize,
    ) -> Result<()> {
        if n_elements < 1 {
            return Err(Error::InvalidBufferSize(n_elements));
        }
        if element_size != std::mem::size_of::<u32>() {
            return Err(Error::InvalidElementSize(element_size));
        }
        if data.is_null() {
            return Err(Error::InvalidDataPointer);
        }
        if (data as usize) % std::mem::align_of::<u32>() != 0 {
            return Err(Error::InvalidDataPointerAlignment);
        }

        let words = std::slice::from_raw_parts_mut(data, n_elements);
        words.fill(0);
        for token_id in self.get_tokens() {
            let word = (token_id / 32) as usize;
            if word < n_elements {
                words[word] |= 1 << (token_id % 32);
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Guide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Guide object with the state={} and {}", self.state, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::Vocabulary;

    fn guide_for(regex: &str, eos_token_id: TokenId, tokens: &[(&str, TokenId)]) -> Guide {
        let mut vocabulary = Vocabulary::new(eos_token_id);
        for (token, id) in tokens {
            vocabulary.insert(*token, *id).expect("Insert failed");
        }
        let index = Index::new(regex, &vocabulary).expect("Index failed");
        Guide::new(Arc::new(index), 0)
    }

    #[test]
    fn basic_interface() {
        let eos_token_id = 3;
        let mut guide = guide_for("[1-9]", eos_token_id, &[("1", 1), ("a", 2)]);

        assert_eq!(guide.get_state(), guide.index.initial_state());
        assert_eq!(guide.get_tokens(), vec![1]);

        assert_eq!(guide.advance(1).unwrap(), vec![eos_token_id]);
        assert!(!guide.is_finished());

        assert_eq!(guide.advance(eos_token_id).unwrap(), vec![eos_token_id]);
        assert!(guide.is_finished());

        assert!(matches!(
            guide.advance(eos_token_id + 1),
            Err(Error::NoTransition { .. })
        ));
    }

    #[test]
    fn regex_final_state_walk() {
        let eos_token_id = 104;
        let mut guide = guide_for(
            r"`\n(\.\n)?`\n",
            eos_token_id,
            &[("\n", 103), (".", 102), ("`", 101)],
        );

        assert_eq!(guide.get_tokens(), vec![101]);
        assert_eq!(guide.advance(101).unwrap(), vec![103]);
        let mut allowed = guide.advance(103).unwrap();
        allowed.sort();
        assert_eq!(allowed, vec![101, 102]);
        assert_eq!(guide.advance(101).unwrap(), vec![103]);
        assert_eq!(guide.advance(103).unwrap(), vec![eos_token_id]);
        assert!(guide.is_finished());
    }

    #[test]
    fn rollback_restores_prior_state() {
        let mut guide = guide_for("[1-9]", 3, &[("1", 1), ("a", 2)]);
        let index = guide.index.clone();
        guide.max_rollback = 3;

        let first_state = guide.get_state();
        guide.advance(1).unwrap();
        guide.rollback_state(1).unwrap();

        assert!(!guide.is_finished());
        assert_eq!(guide.get_state(), first_state);
        assert_eq!(guide.index, index);
    }

    #[test]
    fn rollback_overflow_leaves_state_unchanged() {
        let mut guide = guide_for("[1-9]", 3, &[("1", 1), ("a", 2)]);
        guide.max_rollback = 3;
        let state = guide.get_state();

        assert!(matches!(
            guide.rollback_state(5),
            Err(Error::RollbackOverflow {
                requested: 5,
                available: 0
            })
        ));
        assert_eq!(guide.get_state(), state);
    }

    #[test]
    fn accepts_tokens_correctness() {
        let guide = guide_for("[1-9]", 3, &[("1", 1), ("2", 2)]);

        assert!(guide.accepts_tokens(&[1]));
        assert!(guide.accepts_tokens(&[2]));
        assert!(!guide.accepts_tokens(&[1, 1]));
        assert!(!guide.accepts_tokens(&[2, 3]));
    }

    #[test]
    fn accepts_tokens_through_eos() {
        let eos_token_id = 3;
        let guide = guide_for("[1-9]", eos_token_id, &[("1", 1), ("2", 2)]);

        // A sequence ending in EOS is accepted once the prefix reaches a final state.
        assert!(guide.accepts_tokens(&[1, eos_token_id]));
        // EOS is not a valid continuation before a final state is reached.
        assert!(!guide.accepts_tokens(&[eos_token_id]));
        // Nothing may follow EOS.
        assert!(!guide.accepts_tokens(&[1, eos_token_id, 1]));
    }

    #[test]
    fn equality_tracks_state_not_identity() {
        let mut guide1 = guide_for("[1-9]", 3, &[("1", 1), ("2", 2)]);
        let index2 = (*guide1.index).clone();
        let mut guide2 = Guide::new(Arc::new(index2), 0);
        assert_eq!(guide1, guide2);

        guide1.advance(1).unwrap();
        assert_ne!(guide1, guide2);
        guide2.advance(1).unwrap();
        assert_eq!(guide1, guide2);
    }

    #[test]
    fn write_mask_into_matches_allowed_tokens() {
        let guide = guide_for("[1-9]", 3, &[("1", 1), ("2", 2)]);
        let mut word: u32 = u32::MAX;

        unsafe {
            guide
                .write_mask_into(&mut word as *mut u32, 1, std::mem::size_of::<u32>())
                .unwrap();
        }

        let mut expected = 0u32;
        for token_id in guide.get_tokens() {
            expected |= 1 << (token_id % 32);
        }
        assert_eq!(word, expected);
    }

    #[test]
    fn write_mask_into_validates_inputs() {
        let guide = guide_for("[1-9]", 3, &[("1", 1)]);
        let mut word: u32 = 0;
        let ptr = &mut word as *mut u32;

        unsafe {
            assert!(matches!(
                guide.write_mask_into(ptr, 0, 4),
                Err(Error::InvalidBufferSize(0))
            ));
            assert!(matches!(
                guide.write_mask_into(ptr, 1, 5),
                Err(Error::InvalidElementSize(5))
            ));
            assert!(matches!(
                guide.write_mask_into(std::ptr::null_mut(), 1, 4),
                Err(Error::InvalidDataPointer)
            ));
            assert!(matches!(
                guide.write_mask_into(5 as *mut u32, 1, 4),
                Err(Error::InvalidDataPointerAlignment)
            ));
        }
    }
}
