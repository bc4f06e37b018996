//! Vocabulary candidate filtering.
//!
//! Classifies every candidate token against the current frontier in one
//! sweep. The walk is breadth-first over candidates and depth-first over
//! stacks: most candidates die on their first code point, so the hot loop
//! stays on the full candidate batch while a single stack is advanced.
//!
//! A candidate is rejected overall only if every stack in the frontier
//! rejects it.

use crate::engine::stacks::{
    advance_stack, class_end, match_char, match_partial_char, ElemRef, ParseStack, StackSet,
};
use crate::grammar::RuleTable;
use crate::utf8::PartialUtf8;

/// One vocabulary entry measured against the grammar: its position in the
/// logit array, its decoded code points (sentinel-terminated), a cursor into
/// them, and the UTF-8 tail left after decoding.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate<'a> {
    pub index: usize,
    pub code_points: &'a [u32],
    pub cursor: usize,
    pub partial: PartialUtf8,
}

impl Candidate<'_> {
    fn current(&self) -> u32 {
        self.code_points[self.cursor]
    }
}

/// Return the candidates rejected by every stack in the frontier.
///
/// Panics on an empty frontier; the session guards the dead state before
/// calling in.
pub(crate) fn reject_candidates<'a>(
    table: &RuleTable,
    stacks: &StackSet,
    candidates: Vec<Candidate<'a>>,
) -> Vec<Candidate<'a>> {
    assert!(!stacks.is_empty(), "candidate filtering on an empty frontier");
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut rejects = candidates;
    for stack in stacks.iter() {
        rejects = reject_candidates_for_stack(table, stack, rejects);
    }
    rejects
}

fn reject_candidates_for_stack<'a>(
    table: &RuleTable,
    stack: &ParseStack,
    candidates: Vec<Candidate<'a>>,
) -> Vec<Candidate<'a>> {
    let Some(&top) = stack.last() else {
        // an empty stack only accepts candidates that are fully consumed on
        // a clean code point boundary
        return candidates
            .into_iter()
            .filter(|tok| tok.current() != 0 || tok.partial.n_remain != 0)
            .collect();
    };

    let rule = table.rule(top.rule);
    let pos = top.pos as usize;

    let mut rejects = Vec::with_capacity(candidates.len());
    let mut next_candidates = Vec::with_capacity(candidates.len());

    for tok in candidates {
        if tok.current() == 0 {
            // out of full code points; reject only if the trailing partial
            // sequence can no longer satisfy this position
            if tok.partial.n_remain != 0 && !match_partial_char(rule, pos, tok.partial) {
                rejects.push(tok);
            }
        } else if match_char(rule, pos, tok.current()).0 {
            next_candidates.push(Candidate {
                cursor: tok.cursor + 1,
                ..tok
            });
        } else {
            rejects.push(tok);
        }
    }

    // advance this stack past its class and recurse over the survivors
    let after_pos = class_end(rule, pos);
    let mut stack_after: ParseStack = stack[..stack.len() - 1].to_vec();
    if !rule[after_pos].ends_sequence() {
        stack_after.push(ElemRef {
            rule: top.rule,
            pos: after_pos as u32,
        });
    }
    let mut next_stacks = StackSet::default();
    advance_stack(table, stack_after, &mut next_stacks);

    for tok in reject_candidates(table, &next_stacks, next_candidates) {
        rejects.push(Candidate {
            cursor: tok.cursor - 1,
            ..tok
        });
    }
    rejects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stacks;
    use crate::grammar::compile;
    use crate::utf8;

    fn reject_indices(grammar: &str, pieces: &[&str]) -> Vec<usize> {
        let table = compile(grammar, "root").unwrap();
        let frontier = stacks::initial(&table);
        let decoded: Vec<(Vec<u32>, PartialUtf8)> = pieces
            .iter()
            .map(|p| utf8::decode(p.as_bytes(), PartialUtf8::default()))
            .collect();
        let candidates: Vec<Candidate> = decoded
            .iter()
            .enumerate()
            .map(|(i, (cps, partial))| Candidate {
                index: i,
                code_points: cps,
                cursor: 0,
                partial: *partial,
            })
            .collect();
        let mut rejected: Vec<usize> = reject_candidates(&table, &frontier, candidates)
            .into_iter()
            .map(|tok| tok.index)
            .collect();
        rejected.sort_unstable();
        rejected
    }

    #[test]
    fn test_prefixes_survive_literal() {
        let rejected = reject_indices(r#"root ::= "abc""#, &["a", "ab", "abc", "b", "abd", "abcd"]);
        // "b" fails at once, "abd" at the third char, "abcd" runs past the end
        assert_eq!(rejected, vec![3, 4, 5]);
    }

    #[test]
    fn test_rejected_by_every_stack_only() {
        // two alternatives keep different candidates alive
        let rejected = reject_indices(r#"root ::= "ab" | "cd""#, &["a", "c", "x", "ab", "cd"]);
        assert_eq!(rejected, vec![2]);
    }

    #[test]
    fn test_multi_code_point_candidates_walk_the_stack() {
        let rejected = reject_indices("root ::= [0-9] [a-z]", &["1a", "11", "1", "a"]);
        assert_eq!(rejected, vec![1, 3]);
    }

    #[test]
    fn test_partial_tail_checked_against_class() {
        let table = compile("root ::= [a-z]", "root").unwrap();
        let frontier = stacks::initial(&table);
        // lone 0xC3 decodes to no full code point and a pending tail that
        // can only complete to U+00C0.., outside [a-z]
        let decoded = utf8::decode(&[0xC3], PartialUtf8::default());
        let candidates = vec![Candidate {
            index: 0,
            code_points: &decoded.0,
            cursor: 0,
            partial: decoded.1,
        }];
        let rejected = reject_candidates(&table, &frontier, candidates);
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn test_empty_candidate_list() {
        let table = compile(r#"root ::= "a""#, "root").unwrap();
        let frontier = stacks::initial(&table);
        assert!(reject_candidates(&table, &frontier, Vec::new()).is_empty());
    }
}
