//! Post-parse validation: reference resolution and left-recursion
//! detection.
//!
//! The pushdown evaluator expands nonterminals eagerly, so a left-recursive
//! rule would expand forever. Detection walks the leftmost nonterminals of
//! each alternative, continuing past nonterminals that can derive the empty
//! string; a back-edge onto a rule still on the traversal stack is an error.

use super::parser::GrammarParser;
use super::{ElemKind, GrammarError, Rule};

/// Every referenced rule must have a definition. Undefined rules show up as
/// empty slots in the table (their id was minted on first reference).
pub(crate) fn check_references(parsed: &GrammarParser) -> Result<(), GrammarError> {
    for rule in &parsed.rules {
        for elem in rule {
            if elem.kind == ElemKind::RuleRef {
                let target = elem.value as usize;
                if target >= parsed.rules.len() || parsed.rules[target].is_empty() {
                    return Err(GrammarError::UndefinedRule(symbol_name(parsed, elem.value)));
                }
            }
        }
    }
    // ids minted for names that never appeared on a left-hand side
    for (name, &id) in &parsed.symbol_ids {
        let idx = id as usize;
        if idx >= parsed.rules.len() || parsed.rules[idx].is_empty() {
            return Err(GrammarError::UndefinedRule(name.clone()));
        }
    }
    Ok(())
}

/// Reject grammars the evaluator cannot terminate on.
pub(crate) fn check_left_recursion(parsed: &GrammarParser) -> Result<(), GrammarError> {
    let n_rules = parsed.rules.len();
    let mut visited = vec![false; n_rules];
    let mut in_progress = vec![false; n_rules];
    let mut may_be_empty = vec![false; n_rules];

    for i in 0..n_rules {
        if visited[i] {
            continue;
        }
        if detect_left_recursion(
            &parsed.rules,
            i,
            &mut visited,
            &mut in_progress,
            &mut may_be_empty,
        ) {
            return Err(GrammarError::LeftRecursion(symbol_name(parsed, i as u32)));
        }
    }
    Ok(())
}

fn detect_left_recursion(
    rules: &[Rule],
    rule_index: usize,
    visited: &mut [bool],
    in_progress: &mut [bool],
    may_be_empty: &mut [bool],
) -> bool {
    if in_progress[rule_index] {
        return true;
    }
    in_progress[rule_index] = true;

    let rule = &rules[rule_index];

    // First pass: does any alternative start out empty?
    let mut at_rule_start = true;
    for elem in rule {
        if elem.ends_sequence() {
            if at_rule_start {
                may_be_empty[rule_index] = true;
                break;
            }
            at_rule_start = true;
        } else {
            at_rule_start = false;
        }
    }

    // Second pass: recurse into leftmost nonterminals, and keep going right
    // while every nonterminal passed so far may be empty.
    let mut recurse_into_nonterminal = true;
    for elem in rule {
        if elem.kind == ElemKind::RuleRef && recurse_into_nonterminal {
            let target = elem.value as usize;
            if detect_left_recursion(rules, target, visited, in_progress, may_be_empty) {
                return true;
            }
            if !may_be_empty[target] {
                recurse_into_nonterminal = false;
            }
        } else if elem.ends_sequence() {
            recurse_into_nonterminal = true;
        } else {
            recurse_into_nonterminal = false;
        }
    }

    in_progress[rule_index] = false;
    visited[rule_index] = true;
    false
}

fn symbol_name(parsed: &GrammarParser, id: u32) -> String {
    parsed
        .symbol_ids
        .iter()
        .find(|(_, &v)| v == id)
        .map(|(name, _)| name.clone())
        .unwrap_or_else(|| format!("rule{}", id))
}

#[cfg(test)]
mod tests {
    use crate::grammar::{compile, GrammarError};

    #[test]
    fn test_direct_left_recursion_rejected() {
        let err = compile(r#"root ::= root "a" | "a""#, "root").unwrap_err();
        assert_eq!(err, GrammarError::LeftRecursion("root".to_string()));
    }

    #[test]
    fn test_indirect_left_recursion_rejected() {
        let err = compile("root ::= a\na ::= b\nb ::= root\n", "root").unwrap_err();
        assert!(matches!(err, GrammarError::LeftRecursion(_)));
    }

    #[test]
    fn test_left_recursion_through_empty_prefix() {
        // `maybe` can be empty, so `root` is still leftmost-reachable from
        // itself
        let grammar = "root ::= maybe root \"x\" | \"x\"\nmaybe ::= \"y\" |\n";
        let err = compile(grammar, "root").unwrap_err();
        assert!(matches!(err, GrammarError::LeftRecursion(_)));
    }

    #[test]
    fn test_right_recursion_accepted() {
        assert!(compile(r#"root ::= "a" root | "a""#, "root").is_ok());
    }

    #[test]
    fn test_non_left_self_reference_accepted() {
        assert!(compile(r#"root ::= "(" root ")" | """#, "root").is_ok());
    }

    #[test]
    fn test_undefined_rule_named() {
        let err = compile("root ::= missing\n", "root").unwrap_err();
        assert_eq!(err, GrammarError::UndefinedRule("missing".to_string()));
    }

    #[test]
    fn test_forward_reference_accepted() {
        assert!(compile("root ::= later\nlater ::= \"x\"\n", "root").is_ok());
    }
}
