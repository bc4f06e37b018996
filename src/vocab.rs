//! Vocabulary contract consumed by the grammar engine.
//!
//! The engine never tokenizes; it only needs the byte piece behind a token
//! id and an end-of-generation predicate. The vocabulary is read-only and
//! shared across sessions.

/// Index into the model vocabulary.
pub type TokenId = u32;

/// One entry of the logit array [`crate::GrammarSession::apply`] rewrites.
/// A logit of negative infinity means the token is forbidden.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenData {
    pub id: TokenId,
    pub logit: f32,
}

impl TokenData {
    /// A full-vocabulary logit array with every logit at zero. Handy for
    /// tests and tools that only care about the mask.
    pub fn zeroed(n_tokens: usize) -> Vec<TokenData> {
        (0..n_tokens)
            .map(|id| TokenData {
                id: id as TokenId,
                logit: 0.0,
            })
            .collect()
    }
}

/// Token-to-bytes lookup plus the end-of-generation predicate.
pub trait Vocabulary: Send + Sync {
    fn n_tokens(&self) -> usize;

    /// Byte piece the token decodes to. Out-of-range ids map to an empty
    /// piece, which the engine always masks.
    fn piece(&self, token: TokenId) -> &[u8];

    fn is_eog(&self, token: TokenId) -> bool;
}

/// Vocabulary backed by a plain array of pieces, with a single
/// end-of-generation token.
#[derive(Debug, Clone)]
pub struct ArrayVocabulary {
    pieces: Vec<Vec<u8>>,
    eog: TokenId,
}

impl ArrayVocabulary {
    pub fn new(pieces: Vec<Vec<u8>>, eog: TokenId) -> Self {
        Self { pieces, eog }
    }

    /// Convenience constructor for string pieces.
    pub fn from_pieces(pieces: &[&str], eog: TokenId) -> Self {
        Self::new(pieces.iter().map(|p| p.as_bytes().to_vec()).collect(), eog)
    }
}

impl Vocabulary for ArrayVocabulary {
    fn n_tokens(&self) -> usize {
        self.pieces.len()
    }

    fn piece(&self, token: TokenId) -> &[u8] {
        self.pieces
            .get(token as usize)
            .map(Vec::as_slice)
            .unwrap_or(b"")
    }

    fn is_eog(&self, token: TokenId) -> bool {
        token == self.eog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_vocabulary_lookup() {
        let vocab = ArrayVocabulary::from_pieces(&["a", "bc"], 2);
        assert_eq!(vocab.n_tokens(), 2);
        assert_eq!(vocab.piece(1), b"bc");
        assert_eq!(vocab.piece(99), b"");
        assert!(vocab.is_eog(2));
        assert!(!vocab.is_eog(0));
    }

    #[test]
    fn test_zeroed_token_data() {
        let data = TokenData::zeroed(3);
        assert_eq!(data.len(), 3);
        assert_eq!(data[2].id, 2);
        assert_eq!(data[2].logit, 0.0);
    }
}
