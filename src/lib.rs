//! Grammar-constrained generation for LLM token streams.
//!
//! Implements a grammar engine compatible with the GBNF format. Grammars
//! define production rules that constrain token generation to only produce
//! outputs matching the grammar, generalizing JSON mode to arbitrary
//! structured outputs (SQL, XML, function signatures, etc.).
//!
//! GBNF format:
//! ```text
//! root   ::= expr
//! expr   ::= term (("+" | "-") term)*
//! term   ::= [0-9]+
//! ```
//!
//! The engine works by:
//! 1. Compiling GBNF into a flat table of production rules
//! 2. Maintaining a nondeterministic set of pushdown stacks during
//!    generation
//! 3. For each token candidate, checking if its bytes are a prefix of some
//!    string the grammar can still produce, tolerating UTF-8 sequences
//!    split across token boundaries
//! 4. Masking out invalid tokens before sampling
//!
//! A grammar can also start dormant and activate on a trigger token or a
//! trigger pattern, which lets the host constrain only a delimited span of
//! the output (tool calls, fenced code blocks).

pub mod config;
pub mod engine;
pub mod grammar;
pub mod vocab;

mod utf8;

pub use engine::session::GrammarSession;
pub use engine::stacks::StackSet;
pub use engine::trigger::{LazyTrigger, TriggerPattern};
pub use grammar::{GrammarError, RuleTable, JSON_GRAMMAR, LIST_GRAMMAR};
pub use vocab::{ArrayVocabulary, TokenData, TokenId, Vocabulary};
