//! A byte-trie over vocabulary token spellings.
//!
//! The index builder needs, for every reachable automaton state, the set of
//! tokens that keep the automaton alive. Tokens routinely share byte prefixes
//! (e.g. every token starting with a space), so walking the vocabulary through
//! a trie lets the automaton simulation for a shared prefix happen once per
//! state instead of once per token. The trie itself is built once, independent
//! of the automaton; only the DFS in [`Trie::live_tokens_from`] touches the DFA.

use regex_automata::dfa::dense::DFA;
use regex_automata::dfa::Automaton;
use regex_automata::util::primitives::StateID as AutomataStateId;
use rustc_hash::FxHashMap as HashMap;

use crate::primitives::TokenId;

#[derive(Default)]
struct TrieNode {
    children: HashMap<u8, usize>,
    /// Token ids spelled by the byte path from the root to this node, if any.
    token_ids: Vec<TokenId>,
}

/// A trie over token byte-spellings, indexed by node position in `nodes` (node
/// `0` is the root, the empty spelling).
pub struct Trie {
    nodes: Vec<TrieNode>,
}

impl Trie {
    pub fn new() -> Self {
        Trie {
            nodes: vec![TrieNode::default()],
        }
    }

    /// Registers a token spelling with the ids that share it.
    pub fn insert(&mut self, bytes: &[u8], ids: &[TokenId]) {
        let mut current = 0usize;
        for &byte in bytes {
            current = match self.nodes[current].children.get(&byte) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[current].children.insert(byte, next);
                    next
                }
            };
        }
        self.nodes[current].token_ids.extend_from_slice(ids);
    }

    /// Walks the trie from the root, following only bytes that keep `dfa` alive
    /// from `start`, and returns every token reached along with the automaton
    /// state its full spelling lands on.
    pub fn live_tokens_from<'a>(
        &'a self,
        dfa: &DFA<Vec<u32>>,
        start: AutomataStateId,
    ) -> Vec<(&'a [TokenId], AutomataStateId)> {
        let mut results = Vec::new();
        let mut stack = vec![(0usize, start)];

        while let Some((node_idx, state)) = stack.pop() {
            let node = &self.nodes[node_idx];
            if !node.token_ids.is_empty() {
                results.push((node.token_ids.as_slice(), state));
            }
            for (&byte, &child_idx) in node.children.iter() {
                let next = dfa.next_state(state, byte);
                if dfa.is_dead_state(next) || dfa.is_quit_state(next) {
                    continue;
                }
                stack.push((child_idx, next));
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_common_prefixes() {
        let mut trie = Trie::new();
        trie.insert(b"ab", &[1]);
        trie.insert(b"ac", &[2]);
        trie.insert(b"a", &[3]);

        // root -> 'a' -> {'b' -> leaf(1), 'c' -> leaf(2)}, and 'a' itself is a leaf too.
        assert_eq!(trie.nodes.len(), 4);
    }
}
