//! Lazy-grammar trigger handling.
//!
//! A lazy session stays dormant until either an exact trigger token is
//! accepted or a trigger pattern matches the bytes buffered so far. Until
//! then every token is allowed and the grammar sees nothing. Patterns match
//! the whole buffer, not a substring; a pattern that wants to skip a prefix
//! says so explicitly (e.g. `.*BEGIN:(.*)`).

use crate::grammar::GrammarError;
use crate::vocab::TokenId;
use regex::bytes::Regex;

/// A compiled trigger pattern. The source text is kept for diagnostics.
#[derive(Debug, Clone)]
pub struct TriggerPattern {
    pattern: String,
    regex: Regex,
}

impl TriggerPattern {
    /// Compile `pattern` with whole-buffer semantics.
    pub fn new(pattern: &str) -> Result<Self, GrammarError> {
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|err| {
            GrammarError::BadRegex {
                pattern: pattern.to_string(),
                message: err.to_string(),
            }
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Gate that keeps a grammar dormant until a trigger fires.
#[derive(Debug, Clone)]
pub struct LazyTrigger {
    awaiting: bool,
    buffer: Vec<u8>,
    tokens: Vec<TokenId>,
    patterns: Vec<TriggerPattern>,
}

impl LazyTrigger {
    /// A trigger that has already fired; the session starts active.
    pub fn eager() -> Self {
        Self {
            awaiting: false,
            buffer: Vec::new(),
            tokens: Vec::new(),
            patterns: Vec::new(),
        }
    }

    /// A dormant trigger waiting on any of `tokens` or `patterns`.
    pub fn new(tokens: Vec<TokenId>, patterns: &[String]) -> Result<Self, GrammarError> {
        let patterns = patterns
            .iter()
            .map(|p| TriggerPattern::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            awaiting: true,
            buffer: Vec::new(),
            tokens,
            patterns,
        })
    }

    pub fn awaiting(&self) -> bool {
        self.awaiting
    }

    /// Feed one accepted token while dormant. Returns the bytes the grammar
    /// should start from when the trigger fires, `None` while still
    /// dormant.
    ///
    /// A trigger token starts the grammar at the token itself. A pattern
    /// match starts it at the first non-empty capture group, or at the
    /// start of the buffer when nothing captured.
    pub fn observe(&mut self, token: TokenId, piece: &[u8]) -> Option<Vec<u8>> {
        debug_assert!(self.awaiting);

        if self.tokens.contains(&token) {
            self.awaiting = false;
            self.buffer.clear();
            return Some(piece.to_vec());
        }

        self.buffer.extend_from_slice(piece);
        for trigger in &self.patterns {
            if let Some(caps) = trigger.regex.captures(&self.buffer) {
                let start = caps
                    .iter()
                    .skip(1)
                    .flatten()
                    .find(|m| !m.as_bytes().is_empty())
                    .map(|m| m.start())
                    .unwrap_or(0);
                let constrained = self.buffer[start..].to_vec();
                self.awaiting = false;
                self.buffer.clear();
                return Some(constrained);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_pattern_is_a_construction_error() {
        let err = LazyTrigger::new(Vec::new(), &["(".to_string()]).unwrap_err();
        assert!(matches!(err, GrammarError::BadRegex { .. }));
    }

    #[test]
    fn test_token_trigger_fires_with_piece() {
        let mut trigger = LazyTrigger::new(vec![7], &[]).unwrap();
        assert!(trigger.observe(3, b"noise").is_none());
        assert_eq!(trigger.observe(7, b"<tool>"), Some(b"<tool>".to_vec()));
        assert!(!trigger.awaiting());
    }

    #[test]
    fn test_pattern_fires_at_first_nonempty_group() {
        let mut trigger = LazyTrigger::new(Vec::new(), &[".*BEGIN:(.*)".to_string()]).unwrap();
        assert!(trigger.observe(0, b"noise ").is_none());
        assert!(trigger.observe(1, b"BEGIN").is_none());
        assert_eq!(trigger.observe(2, b":abc"), Some(b"abc".to_vec()));
    }

    #[test]
    fn test_pattern_without_groups_replays_whole_buffer() {
        let mut trigger = LazyTrigger::new(Vec::new(), &["abc.*".to_string()]).unwrap();
        assert_eq!(trigger.observe(0, b"abcd"), Some(b"abcd".to_vec()));
    }

    #[test]
    fn test_whole_buffer_semantics() {
        // the pattern has no wildcard prefix, so a noisy buffer never
        // matches
        let mut trigger = LazyTrigger::new(Vec::new(), &["BEGIN:(.*)".to_string()]).unwrap();
        assert!(trigger.observe(0, b"x").is_none());
        assert!(trigger.observe(1, b"BEGIN:abc").is_none());
    }

    #[test]
    fn test_eager_trigger_is_not_awaiting() {
        assert!(!LazyTrigger::eager().awaiting());
    }
}
