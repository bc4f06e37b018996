//! GBNF grammar compiler.
//!
//! Turns grammar text into a flat rule table the pushdown evaluator can
//! execute. GBNF format:
//!
//! ```text
//! root   ::= expr
//! expr   ::= term (("+" | "-") term)*
//! term   ::= [0-9]+
//! ```
//!
//! Each rule compiles to a sequence of [`GrammarElement`]s: character
//! classes, rule references, `Alt` separators between alternatives, and a
//! closing `End`. Quantifiers are desugared into synthetic helper rules at
//! parse time, so the evaluator only ever sees plain alternation.

pub mod parser;
pub mod print;
pub mod validate;

use std::fmt;

/// Identifier of a rule in the compiled table.
pub type RuleId = u32;

/// Discriminates the element records a rule is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemKind {
    /// Terminates a rule.
    End,
    /// Separates alternatives within a rule.
    Alt,
    /// Nonterminal reference; `value` is a rule id.
    RuleRef,
    /// Literal code point; also starts a positive character class.
    Char,
    /// Starts a negated character class.
    CharNot,
    /// Inclusive upper bound of a range; follows the range's lower bound.
    CharRngUpper,
    /// Additional code point in the current character class.
    CharAlt,
    /// Wildcard matching any code point.
    CharAny,
}

/// One element of a compiled rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GrammarElement {
    pub kind: ElemKind,
    pub value: u32,
}

impl GrammarElement {
    pub(crate) fn new(kind: ElemKind, value: u32) -> Self {
        Self { kind, value }
    }

    /// Character-class elements, i.e. anything a terminal match consumes.
    pub fn is_char(&self) -> bool {
        matches!(
            self.kind,
            ElemKind::Char
                | ElemKind::CharNot
                | ElemKind::CharRngUpper
                | ElemKind::CharAlt
                | ElemKind::CharAny
        )
    }

    /// True at the end of one alternative of a rule (`End` or `Alt`).
    pub fn ends_sequence(&self) -> bool {
        matches!(self.kind, ElemKind::End | ElemKind::Alt)
    }
}

/// A compiled rule: alternatives separated by `Alt`, closed by `End`.
pub type Rule = Vec<GrammarElement>;

/// Element offsets where each alternative of `rule` begins.
pub(crate) fn alternative_starts(rule: &Rule) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, elem) in rule.iter().enumerate() {
        match elem.kind {
            ElemKind::Alt => starts.push(i + 1),
            ElemKind::End => break,
            _ => {}
        }
    }
    starts
}

/// Immutable rule table produced by [`compile`]. Rule names are retained
/// for diagnostics and the debug printer; the string-to-id lookup used
/// during parsing is discarded.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
    names: Vec<String>,
    root: RuleId,
}

impl RuleTable {
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn root(&self) -> RuleId {
        self.root
    }

    pub fn name(&self, id: RuleId) -> &str {
        self.names
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or("?")
    }

    pub(crate) fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id as usize]
    }
}

/// Errors surfaced while compiling a grammar or driving a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// Malformed grammar text; `offset` is a byte position into the source.
    Syntax { offset: usize, message: String },
    /// The grammar contains a left-recursive rule, which the pushdown
    /// evaluator cannot terminate on.
    LeftRecursion(String),
    /// A rule reference never got a definition.
    UndefinedRule(String),
    /// The requested root rule does not exist.
    MissingRoot(String),
    /// A lazy-trigger pattern failed to compile.
    BadRegex { pattern: String, message: String },
    /// An accepted piece drove the grammar into a dead state.
    ParseProgress { piece: String },
}

impl GrammarError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        GrammarError::Syntax {
            offset,
            message: message.into(),
        }
    }
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::Syntax { offset, message } => {
                write!(f, "grammar syntax error at byte {}: {}", offset, message)
            }
            GrammarError::LeftRecursion(name) => {
                write!(f, "left recursion detected in rule '{}'", name)
            }
            GrammarError::UndefinedRule(name) => {
                write!(f, "undefined rule identifier '{}'", name)
            }
            GrammarError::MissingRoot(name) => {
                write!(f, "grammar does not contain a '{}' rule", name)
            }
            GrammarError::BadRegex { pattern, message } => {
                write!(f, "invalid trigger pattern '{}': {}", pattern, message)
            }
            GrammarError::ParseProgress { piece } => {
                write!(f, "piece {:?} does not match the grammar", piece)
            }
        }
    }
}

impl std::error::Error for GrammarError {}

/// Parse and validate grammar text, returning the rule table rooted at
/// `root`. An empty grammar is rejected (the root cannot exist).
pub fn compile(text: &str, root: &str) -> Result<RuleTable, GrammarError> {
    let parsed = parser::GrammarParser::parse(text)?;
    validate::check_references(&parsed)?;

    let root_id = match parsed.symbol_ids.get(root) {
        Some(&id) => id,
        None => return Err(GrammarError::MissingRoot(root.to_string())),
    };

    validate::check_left_recursion(&parsed)?;

    let mut names = vec![String::new(); parsed.rules.len()];
    for (name, &id) in &parsed.symbol_ids {
        if let Some(slot) = names.get_mut(id as usize) {
            *slot = name.clone();
        }
    }

    Ok(RuleTable {
        rules: parsed.rules,
        names,
        root: root_id,
    })
}

// ─── Common Grammars ────────────────────────────────────────────────

/// Built-in grammar for valid JSON output.
pub const JSON_GRAMMAR: &str = r#"
root        ::= value
value       ::= object | array | string | number | "true" | "false" | "null"
object      ::= "{" ws (pair ("," ws pair)*)? ws "}"
pair        ::= string ws ":" ws value
array       ::= "[" ws (value ("," ws value)*)? ws "]"
string      ::= "\"" char* "\""
char        ::= [^"\\] | "\\" escape
escape      ::= ["\\nrt/] | "u" [0-9a-fA-F] [0-9a-fA-F] [0-9a-fA-F] [0-9a-fA-F]
number      ::= "-"? [0-9]+ ("." [0-9]+)? (("e" | "E") ("+" | "-")? [0-9]+)?
ws          ::= [ \t\n]*
"#;

/// Built-in grammar for a bracketed list of quoted strings.
pub const LIST_GRAMMAR: &str = r#"
root   ::= "[" ws item ("," ws item)* ws "]"
item   ::= string
string ::= "\"" [^"]* "\""
ws     ::= [ \t\n]*
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_simple() {
        let table = compile(r#"root ::= "ab""#, "root").unwrap();
        assert_eq!(table.rules().len(), 1);
        assert_eq!(table.root(), 0);
        assert_eq!(table.name(0), "root");
        assert_eq!(
            table.rules()[0],
            vec![
                GrammarElement::new(ElemKind::Char, 'a' as u32),
                GrammarElement::new(ElemKind::Char, 'b' as u32),
                GrammarElement::new(ElemKind::End, 0),
            ]
        );
    }

    #[test]
    fn test_compile_missing_root() {
        let err = compile(r#"foo ::= "a""#, "root").unwrap_err();
        assert_eq!(err, GrammarError::MissingRoot("root".to_string()));
    }

    #[test]
    fn test_compile_empty_grammar() {
        let err = compile("# just a comment\n", "root").unwrap_err();
        assert_eq!(err, GrammarError::MissingRoot("root".to_string()));
    }

    #[test]
    fn test_compile_json_grammar() {
        let table = compile(JSON_GRAMMAR, "root");
        assert!(table.is_ok(), "JSON grammar should compile: {:?}", table.err());
    }

    #[test]
    fn test_compile_list_grammar() {
        assert!(compile(LIST_GRAMMAR, "root").is_ok());
    }

    #[test]
    fn test_alternative_starts() {
        let table = compile(r#"root ::= "a" | "b" | "c""#, "root").unwrap();
        assert_eq!(alternative_starts(&table.rules()[0]), vec![0, 2, 4]);
    }
}
