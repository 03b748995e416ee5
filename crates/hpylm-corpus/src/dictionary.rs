//! String <-> token id interning, with the reserved sentence-boundary ids
//! pre-populated.

use std::collections::HashMap;

use hpylm_core::TokenId;
use serde::{Deserialize, Serialize};

/// Reserved word id for beginning-of-sentence.
pub const BOS: TokenId = 0;
/// Reserved word id for end-of-sentence.
pub const EOS: TokenId = 1;

/// Bidirectional string/id mapping for words, assigning each new word the
/// next free id during corpus loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dictionary {
    word_to_id: HashMap<String, TokenId>,
    id_to_word: Vec<String>,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Dictionary {
    /// A fresh dictionary with only the reserved `<bos>`/`<eos>` entries.
    #[must_use]
    pub fn new() -> Self {
        let mut dict = Self { word_to_id: HashMap::new(), id_to_word: Vec::new() };
        dict.intern_as("<bos>", BOS);
        dict.intern_as("<eos>", EOS);
        dict
    }

    fn intern_as(&mut self, word: &str, id: TokenId) {
        debug_assert_eq!(self.id_to_word.len() as TokenId, id);
        self.word_to_id.insert(word.to_string(), id);
        self.id_to_word.push(word.to_string());
    }

    /// Look up `word`'s id, assigning a new one if this is the first time
    /// it has been seen.
    pub fn intern(&mut self, word: &str) -> TokenId {
        if let Some(&id) = self.word_to_id.get(word) {
            return id;
        }
        let id = self.id_to_word.len() as TokenId;
        self.word_to_id.insert(word.to_string(), id);
        self.id_to_word.push(word.to_string());
        id
    }

    /// Look up `word`'s id without creating a new entry.
    #[must_use]
    pub fn id_of(&self, word: &str) -> Option<TokenId> {
        self.word_to_id.get(word).copied()
    }

    /// Look up the surface form for `id`, if known.
    #[must_use]
    pub fn word_of(&self, id: TokenId) -> Option<&str> {
        self.id_to_word.get(id as usize).map(String::as_str)
    }

    /// Number of distinct words interned, including the reserved entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.id_to_word.len()
    }

    /// True if only the reserved entries are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_to_word.len() <= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_ids_are_stable() {
        let dict = Dictionary::new();
        assert_eq!(dict.id_of("<bos>"), Some(BOS));
        assert_eq!(dict.id_of("<eos>"), Some(EOS));
    }

    #[test]
    fn intern_is_idempotent() {
        let mut dict = Dictionary::new();
        let a = dict.intern("dog");
        let b = dict.intern("dog");
        let c = dict.intern("cat");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(dict.word_of(a), Some("dog"));
    }
}
