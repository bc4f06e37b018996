//! Per-generation grammar session.
//!
//! A session owns the compiled rule table, the live stack frontier, the
//! UTF-8 tail carried across tokens, and the trigger state. The host drives
//! it in lockstep with sampling:
//!
//! 1. [`GrammarSession::apply`] masks the logits of every token the grammar
//!    cannot take.
//! 2. The host samples one of the surviving tokens.
//! 3. [`GrammarSession::accept`] consumes it and advances the frontier.
//!
//! Sessions are plain values: cloning forks the generation at the current
//! position, and clones never resynchronize.

use crate::engine::filter::{self, Candidate};
use crate::engine::stacks::{self, StackSet};
use crate::engine::trigger::LazyTrigger;
use crate::grammar::{self, GrammarError, RuleTable};
use crate::utf8::{self, PartialUtf8};
use crate::vocab::{TokenData, TokenId, Vocabulary};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct GrammarSession {
    vocab: Arc<dyn Vocabulary>,
    table: RuleTable,
    stacks: StackSet,
    partial_utf8: PartialUtf8,
    trigger: LazyTrigger,
}

impl GrammarSession {
    /// Compile `text` and start an active session at rule `root`.
    pub fn new(
        vocab: Arc<dyn Vocabulary>,
        text: &str,
        root: &str,
    ) -> Result<Self, GrammarError> {
        Self::with_trigger(vocab, text, root, LazyTrigger::eager())
    }

    /// Compile `text` and start a dormant session that activates on one of
    /// `trigger_tokens` or a whole-buffer match of one of
    /// `trigger_patterns`.
    pub fn new_lazy(
        vocab: Arc<dyn Vocabulary>,
        text: &str,
        root: &str,
        trigger_tokens: Vec<TokenId>,
        trigger_patterns: &[String],
    ) -> Result<Self, GrammarError> {
        let trigger = LazyTrigger::new(trigger_tokens, trigger_patterns)?;
        Self::with_trigger(vocab, text, root, trigger)
    }

    fn with_trigger(
        vocab: Arc<dyn Vocabulary>,
        text: &str,
        root: &str,
        trigger: LazyTrigger,
    ) -> Result<Self, GrammarError> {
        let table = grammar::compile(text, root)?;
        let stacks = stacks::initial(&table);
        Ok(Self {
            vocab,
            table,
            stacks,
            partial_utf8: PartialUtf8::default(),
            trigger,
        })
    }

    /// Mask the logit of every token the grammar cannot currently take.
    ///
    /// While the session awaits its trigger this is a no-op. The
    /// end-of-generation token survives only when some stack is empty. A
    /// dead session (empty frontier after a failed accept) masks
    /// everything.
    pub fn apply(&self, cur: &mut [TokenData]) {
        if self.trigger.awaiting() {
            return;
        }

        if self.stacks.is_empty() {
            for token in cur.iter_mut() {
                token.logit = f32::NEG_INFINITY;
            }
            return;
        }

        let allow_eog = self.stacks.contains_empty();

        let mut decoded: Vec<(usize, Vec<u32>, PartialUtf8)> = Vec::with_capacity(cur.len());
        for (i, token) in cur.iter_mut().enumerate() {
            if self.vocab.is_eog(token.id) {
                if !allow_eog {
                    token.logit = f32::NEG_INFINITY;
                }
                continue;
            }
            let piece = self.vocab.piece(token.id);
            if piece.is_empty() || piece[0] == 0 {
                // nothing to match; such tokens can never make progress
                token.logit = f32::NEG_INFINITY;
                continue;
            }
            let (code_points, partial) = utf8::decode(piece, self.partial_utf8);
            decoded.push((i, code_points, partial));
        }

        let candidates: Vec<Candidate> = decoded
            .iter()
            .map(|(index, code_points, partial)| Candidate {
                index: *index,
                code_points,
                cursor: 0,
                partial: *partial,
            })
            .collect();

        for reject in filter::reject_candidates(&self.table, &self.stacks, candidates) {
            cur[reject.index].logit = f32::NEG_INFINITY;
        }
    }

    /// Consume the token the host sampled.
    ///
    /// Panics if the end-of-generation token is accepted while no stack is
    /// empty; `apply` would have masked it, so that is a host bug.
    pub fn accept(&mut self, token: TokenId) -> Result<(), GrammarError> {
        let piece = self.vocab.piece(token).to_vec();

        if self.trigger.awaiting() {
            match self.trigger.observe(token, &piece) {
                Some(constrained) => {
                    debug!(
                        "grammar triggered on token {} ({:?})",
                        token,
                        String::from_utf8_lossy(&constrained)
                    );
                    self.accept_str(&constrained)?;
                }
                None => {
                    debug!("grammar still awaiting trigger after token {}", token);
                }
            }
            return Ok(());
        }

        if self.vocab.is_eog(token) {
            assert!(
                self.stacks.contains_empty(),
                "end of generation accepted while the grammar expects more input"
            );
            return Ok(());
        }

        self.accept_str(&piece)
    }

    /// Feed raw bytes through the grammar, carrying the UTF-8 tail.
    ///
    /// An empty frontier afterwards means the bytes left the language; the
    /// session is dead and every later `apply` masks everything.
    pub fn accept_str(&mut self, piece: &[u8]) -> Result<(), GrammarError> {
        let (code_points, partial) = utf8::decode(piece, self.partial_utf8);
        for &code_point in &code_points[..code_points.len() - 1] {
            self.stacks = stacks::accept_code_point(&self.table, &self.stacks, code_point);
        }
        self.partial_utf8 = partial;
        if self.stacks.is_empty() {
            return Err(GrammarError::ParseProgress {
                piece: String::from_utf8_lossy(piece).into_owned(),
            });
        }
        Ok(())
    }

    /// True when the grammar can stop here, i.e. some stack is empty.
    pub fn can_finish(&self) -> bool {
        self.stacks.contains_empty()
    }

    pub fn awaiting_trigger(&self) -> bool {
        self.trigger.awaiting()
    }

    /// Compiled rule table, for tests and debuggers.
    pub fn rules(&self) -> &RuleTable {
        &self.table
    }

    /// Live stack frontier, for tests and debuggers.
    pub fn stacks(&self) -> &StackSet {
        &self.stacks
    }

    /// Dump the compiled grammar (synthetic rules expanded) to `sink`.
    pub fn print<W: fmt::Write>(&self, sink: &mut W) -> fmt::Result {
        grammar::print::write_grammar(sink, &self.table)
    }
}

impl fmt::Debug for GrammarSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrammarSession")
            .field("rules", &self.table.rules().len())
            .field("stacks", &self.stacks.len())
            .field("partial_utf8", &self.partial_utf8)
            .field("awaiting_trigger", &self.trigger.awaiting())
            .finish()
    }
}
