//! GBNF source parser.
//!
//! Builds the flat rule table from grammar text. Quantifiers are rewritten
//! into synthetic rules here so the rest of the engine only deals with
//! alternation:
//!
//! ```text
//! S{m,n} --> S S S (m times) S'(n-m)
//!            S'(x)   ::= S S'(x-1) |
//!            (... n-m definitions of these S' rules ...)
//!            S'(1)   ::= S |
//! S{m,}  --> S S S (m times) S'
//!            S'      ::= S S' |
//! S*     --> S{0,}
//! S+     --> S{1,}
//! S?     --> S{0,1}
//! ```
//!
//! Synthetic rules are named `<parent>_<id>` to keep diagnostics legible.

use super::{ElemKind, GrammarElement, GrammarError, Rule};
use std::collections::HashMap;

/// Parser output: the rule table plus the name-to-id map built while
/// parsing. [`super::compile`] consumes both and keeps only the table.
#[derive(Debug, Default)]
pub struct GrammarParser {
    pub symbol_ids: HashMap<String, u32>,
    pub rules: Vec<Rule>,
}

impl GrammarParser {
    /// Parse grammar text into a rule table. Rule slots referenced before
    /// (or without) a definition stay empty; the validator reports those.
    pub fn parse(src: &str) -> Result<GrammarParser, GrammarError> {
        let mut parser = GrammarParser::default();
        let mut pos = parse_space(src.as_bytes(), 0, true);
        while pos < src.len() {
            pos = parser.parse_rule(src, pos)?;
        }
        Ok(parser)
    }

    fn get_symbol_id(&mut self, name: &str) -> u32 {
        let next_id = self.symbol_ids.len() as u32;
        *self.symbol_ids.entry(name.to_string()).or_insert(next_id)
    }

    fn generate_symbol_id(&mut self, base_name: &str) -> u32 {
        let next_id = self.symbol_ids.len() as u32;
        self.symbol_ids.insert(format!("{}_{}", base_name, next_id), next_id);
        next_id
    }

    fn add_rule(&mut self, rule_id: u32, rule: Rule) {
        let idx = rule_id as usize;
        if self.rules.len() <= idx {
            self.rules.resize(idx + 1, Rule::new());
        }
        self.rules[idx] = rule;
    }

    fn parse_rule(&mut self, src: &str, pos: usize) -> Result<usize, GrammarError> {
        let bytes = src.as_bytes();
        let name_end = parse_name(bytes, pos)?;
        let name = &src[pos..name_end];
        let rule_id = self.get_symbol_id(name);

        let mut p = parse_space(bytes, name_end, false);
        if !src[p..].starts_with("::=") {
            return Err(GrammarError::syntax(p, "expecting ::="));
        }
        p = parse_space(bytes, p + 3, true);

        p = self.parse_alternates(src, p, name, rule_id, false)?;

        match bytes.get(p) {
            Some(&b'\r') => p += if bytes.get(p + 1) == Some(&b'\n') { 2 } else { 1 },
            Some(&b'\n') => p += 1,
            Some(_) => return Err(GrammarError::syntax(p, "expecting newline or end")),
            None => {}
        }
        Ok(parse_space(bytes, p, true))
    }

    fn parse_alternates(
        &mut self,
        src: &str,
        pos: usize,
        rule_name: &str,
        rule_id: u32,
        is_nested: bool,
    ) -> Result<usize, GrammarError> {
        let mut rule = Rule::new();
        let mut pos = self.parse_sequence(src, pos, rule_name, &mut rule, is_nested)?;
        while src.as_bytes().get(pos) == Some(&b'|') {
            rule.push(GrammarElement::new(ElemKind::Alt, 0));
            pos = parse_space(src.as_bytes(), pos + 1, true);
            pos = self.parse_sequence(src, pos, rule_name, &mut rule, is_nested)?;
        }
        rule.push(GrammarElement::new(ElemKind::End, 0));
        self.add_rule(rule_id, rule);
        Ok(pos)
    }

    fn parse_sequence(
        &mut self,
        src: &str,
        mut pos: usize,
        rule_name: &str,
        rule: &mut Rule,
        is_nested: bool,
    ) -> Result<usize, GrammarError> {
        let bytes = src.as_bytes();
        // Start of the most recent item, so quantifiers know what to rewrite.
        let mut last_sym_start = rule.len();

        while pos < bytes.len() {
            match bytes[pos] {
                b'"' => {
                    // literal string
                    pos += 1;
                    last_sym_start = rule.len();
                    while bytes.get(pos) != Some(&b'"') {
                        if pos >= bytes.len() {
                            return Err(GrammarError::syntax(pos, "unexpected end of input"));
                        }
                        let (c, next) = parse_char(src, pos)?;
                        pos = next;
                        rule.push(GrammarElement::new(ElemKind::Char, c));
                    }
                    pos = parse_space(bytes, pos + 1, is_nested);
                }
                b'[' => {
                    // char range(s)
                    pos += 1;
                    let mut start_kind = ElemKind::Char;
                    if bytes.get(pos) == Some(&b'^') {
                        pos += 1;
                        start_kind = ElemKind::CharNot;
                    }
                    last_sym_start = rule.len();
                    while bytes.get(pos) != Some(&b']') {
                        if pos >= bytes.len() {
                            return Err(GrammarError::syntax(pos, "unexpected end of input"));
                        }
                        let (c, next) = parse_char(src, pos)?;
                        pos = next;
                        let kind = if rule.len() > last_sym_start {
                            ElemKind::CharAlt
                        } else {
                            start_kind
                        };
                        rule.push(GrammarElement::new(kind, c));

                        if bytes.get(pos) == Some(&b'-') {
                            match bytes.get(pos + 1) {
                                None => {
                                    return Err(GrammarError::syntax(
                                        pos,
                                        "unexpected end of input",
                                    ));
                                }
                                // trailing '-' before ']' is a literal, taken
                                // by the next loop iteration
                                Some(&b']') => {}
                                Some(_) => {
                                    let (upper, next) = parse_char(src, pos + 1)?;
                                    pos = next;
                                    rule.push(GrammarElement::new(ElemKind::CharRngUpper, upper));
                                }
                            }
                        }
                    }
                    pos = parse_space(bytes, pos + 1, is_nested);
                }
                b'(' => {
                    // grouping: parse nested alternates into a synthetic rule
                    pos = parse_space(bytes, pos + 1, true);
                    let sub_rule_id = self.generate_symbol_id(rule_name);
                    pos = self.parse_alternates(src, pos, rule_name, sub_rule_id, true)?;
                    last_sym_start = rule.len();
                    rule.push(GrammarElement::new(ElemKind::RuleRef, sub_rule_id));
                    if bytes.get(pos) != Some(&b')') {
                        return Err(GrammarError::syntax(pos, "expecting ')'"));
                    }
                    pos = parse_space(bytes, pos + 1, is_nested);
                }
                b'.' => {
                    // any char
                    last_sym_start = rule.len();
                    rule.push(GrammarElement::new(ElemKind::CharAny, 0));
                    pos = parse_space(bytes, pos + 1, is_nested);
                }
                b'*' => {
                    pos = parse_space(bytes, pos + 1, is_nested);
                    self.rewrite_repetition(rule, last_sym_start, rule_name, 0, None, pos)?;
                }
                b'+' => {
                    pos = parse_space(bytes, pos + 1, is_nested);
                    self.rewrite_repetition(rule, last_sym_start, rule_name, 1, None, pos)?;
                }
                b'?' => {
                    pos = parse_space(bytes, pos + 1, is_nested);
                    self.rewrite_repetition(rule, last_sym_start, rule_name, 0, Some(1), pos)?;
                }
                b'{' => {
                    pos = parse_space(bytes, pos + 1, is_nested);
                    if !bytes.get(pos).is_some_and(u8::is_ascii_digit) {
                        return Err(GrammarError::syntax(pos, "expecting an int"));
                    }
                    let (min_times, next) = parse_int(src, pos)?;
                    pos = parse_space(bytes, next, is_nested);

                    let max_times;
                    if bytes.get(pos) == Some(&b'}') {
                        max_times = Some(min_times);
                        pos = parse_space(bytes, pos + 1, is_nested);
                    } else if bytes.get(pos) == Some(&b',') {
                        pos = parse_space(bytes, pos + 1, is_nested);
                        if bytes.get(pos).is_some_and(u8::is_ascii_digit) {
                            let (n, next) = parse_int(src, pos)?;
                            max_times = Some(n);
                            pos = parse_space(bytes, next, is_nested);
                        } else {
                            max_times = None;
                        }
                        if bytes.get(pos) != Some(&b'}') {
                            return Err(GrammarError::syntax(pos, "expecting '}'"));
                        }
                        pos = parse_space(bytes, pos + 1, is_nested);
                    } else {
                        return Err(GrammarError::syntax(pos, "expecting ',' or '}'"));
                    }
                    self.rewrite_repetition(rule, last_sym_start, rule_name, min_times, max_times, pos)?;
                }
                b if is_word_char(b) => {
                    // rule reference
                    let name_end = parse_name(bytes, pos)?;
                    let ref_rule_id = self.get_symbol_id(&src[pos..name_end]);
                    pos = parse_space(bytes, name_end, is_nested);
                    last_sym_start = rule.len();
                    rule.push(GrammarElement::new(ElemKind::RuleRef, ref_rule_id));
                }
                _ => break,
            }
        }
        Ok(pos)
    }

    /// Rewrite the item starting at `last_sym_start` according to the
    /// repetition rules in the module docs. `max_times == None` means
    /// unbounded.
    fn rewrite_repetition(
        &mut self,
        rule: &mut Rule,
        last_sym_start: usize,
        rule_name: &str,
        min_times: u32,
        max_times: Option<u32>,
        pos: usize,
    ) -> Result<(), GrammarError> {
        if last_sym_start == rule.len() {
            return Err(GrammarError::syntax(pos, "expecting preceding item to */+/?/{"));
        }

        let prev: Vec<GrammarElement> = rule[last_sym_start..].to_vec();
        if min_times == 0 {
            rule.truncate(last_sym_start);
        } else {
            for _ in 1..min_times {
                rule.extend_from_slice(&prev);
            }
        }

        let n_opt = match max_times {
            None => 1,
            Some(mx) => mx.saturating_sub(min_times),
        };

        let mut last_rec_rule_id = 0;
        let mut rec_rule = prev.clone();
        for i in 0..n_opt {
            rec_rule.truncate(prev.len());
            let rec_rule_id = self.generate_symbol_id(rule_name);
            if i > 0 || max_times.is_none() {
                let target = if max_times.is_none() {
                    rec_rule_id
                } else {
                    last_rec_rule_id
                };
                rec_rule.push(GrammarElement::new(ElemKind::RuleRef, target));
            }
            rec_rule.push(GrammarElement::new(ElemKind::Alt, 0));
            rec_rule.push(GrammarElement::new(ElemKind::End, 0));
            self.add_rule(rec_rule_id, rec_rule.clone());
            last_rec_rule_id = rec_rule_id;
        }
        if n_opt > 0 {
            rule.push(GrammarElement::new(ElemKind::RuleRef, last_rec_rule_id));
        }
        Ok(())
    }
}

// ─── Lexical helpers ────────────────────────────────────────────────

fn is_word_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Skip spaces, tabs and comments; newlines too when `newline_ok`.
fn parse_space(src: &[u8], mut pos: usize, newline_ok: bool) -> usize {
    while pos < src.len() {
        let b = src[pos];
        if b == b' ' || b == b'\t' {
            pos += 1;
        } else if b == b'#' {
            while pos < src.len() && src[pos] != b'\r' && src[pos] != b'\n' {
                pos += 1;
            }
        } else if newline_ok && (b == b'\r' || b == b'\n') {
            pos += 1;
        } else {
            break;
        }
    }
    pos
}

fn parse_name(src: &[u8], pos: usize) -> Result<usize, GrammarError> {
    let mut end = pos;
    while end < src.len() && is_word_char(src[end]) {
        end += 1;
    }
    if end == pos {
        return Err(GrammarError::syntax(pos, "expecting name"));
    }
    Ok(end)
}

fn parse_int(src: &str, pos: usize) -> Result<(u32, usize), GrammarError> {
    let bytes = src.as_bytes();
    let mut end = pos;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == pos {
        return Err(GrammarError::syntax(pos, "expecting integer"));
    }
    let value = src[pos..end]
        .parse()
        .map_err(|_| GrammarError::syntax(pos, "integer out of range"))?;
    Ok((value, end))
}

fn parse_hex(src: &[u8], pos: usize, size: usize) -> Result<(u32, usize), GrammarError> {
    let end = pos + size;
    if end > src.len() {
        return Err(GrammarError::syntax(
            pos,
            format!("expecting {} hex chars", size),
        ));
    }
    let mut value = 0u32;
    for &b in &src[pos..end] {
        let digit = match b {
            b'0'..=b'9' => u32::from(b - b'0'),
            b'a'..=b'f' => u32::from(b - b'a') + 10,
            b'A'..=b'F' => u32::from(b - b'A') + 10,
            _ => {
                return Err(GrammarError::syntax(
                    pos,
                    format!("expecting {} hex chars", size),
                ));
            }
        };
        value = (value << 4) | digit;
    }
    Ok((value, end))
}

/// One code point at `pos`: an escape sequence or a literal UTF-8 char.
fn parse_char(src: &str, pos: usize) -> Result<(u32, usize), GrammarError> {
    let bytes = src.as_bytes();
    match bytes.get(pos) {
        None => Err(GrammarError::syntax(pos, "unexpected end of input")),
        Some(&b'\\') => match bytes.get(pos + 1) {
            Some(&b'x') => parse_hex(bytes, pos + 2, 2),
            Some(&b'u') => parse_hex(bytes, pos + 2, 4),
            Some(&b'U') => parse_hex(bytes, pos + 2, 8),
            Some(&b't') => Ok(('\t' as u32, pos + 2)),
            Some(&b'r') => Ok(('\r' as u32, pos + 2)),
            Some(&b'n') => Ok(('\n' as u32, pos + 2)),
            Some(&(b @ (b'\\' | b'"' | b'[' | b']'))) => Ok((u32::from(b), pos + 2)),
            _ => Err(GrammarError::syntax(pos, "unknown escape")),
        },
        Some(_) => match src[pos..].chars().next() {
            Some(c) => Ok((c as u32, pos + c.len_utf8())),
            None => Err(GrammarError::syntax(pos, "unexpected end of input")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elem(kind: ElemKind, value: u32) -> GrammarElement {
        GrammarElement::new(kind, value)
    }

    fn rule_of(parser: &GrammarParser, name: &str) -> Rule {
        let id = parser.symbol_ids[name] as usize;
        parser.rules[id].clone()
    }

    #[test]
    fn test_parse_literal() {
        let p = GrammarParser::parse(r#"root ::= "ab""#).unwrap();
        assert_eq!(
            rule_of(&p, "root"),
            vec![
                elem(ElemKind::Char, 'a' as u32),
                elem(ElemKind::Char, 'b' as u32),
                elem(ElemKind::End, 0),
            ]
        );
    }

    #[test]
    fn test_parse_alternation() {
        let p = GrammarParser::parse(r#"root ::= "a" | "b""#).unwrap();
        assert_eq!(
            rule_of(&p, "root"),
            vec![
                elem(ElemKind::Char, 'a' as u32),
                elem(ElemKind::Alt, 0),
                elem(ElemKind::Char, 'b' as u32),
                elem(ElemKind::End, 0),
            ]
        );
    }

    #[test]
    fn test_parse_empty_alternative() {
        let p = GrammarParser::parse(r#"root ::= "a" | "#).unwrap();
        assert_eq!(
            rule_of(&p, "root"),
            vec![
                elem(ElemKind::Char, 'a' as u32),
                elem(ElemKind::Alt, 0),
                elem(ElemKind::End, 0),
            ]
        );
    }

    #[test]
    fn test_parse_char_class() {
        let p = GrammarParser::parse("root ::= [a-zA-Z_]").unwrap();
        assert_eq!(
            rule_of(&p, "root"),
            vec![
                elem(ElemKind::Char, 'a' as u32),
                elem(ElemKind::CharRngUpper, 'z' as u32),
                elem(ElemKind::CharAlt, 'A' as u32),
                elem(ElemKind::CharRngUpper, 'Z' as u32),
                elem(ElemKind::CharAlt, '_' as u32),
                elem(ElemKind::End, 0),
            ]
        );
    }

    #[test]
    fn test_parse_negated_class() {
        let p = GrammarParser::parse("root ::= [^0-9]").unwrap();
        assert_eq!(
            rule_of(&p, "root"),
            vec![
                elem(ElemKind::CharNot, '0' as u32),
                elem(ElemKind::CharRngUpper, '9' as u32),
                elem(ElemKind::End, 0),
            ]
        );
    }

    #[test]
    fn test_parse_any_char() {
        let p = GrammarParser::parse("root ::= .").unwrap();
        assert_eq!(
            rule_of(&p, "root"),
            vec![elem(ElemKind::CharAny, 0), elem(ElemKind::End, 0)]
        );
    }

    #[test]
    fn test_parse_group_synthesizes_rule() {
        let p = GrammarParser::parse(r#"root ::= ("a" | "b") "c""#).unwrap();
        let group_id = p.symbol_ids["root_1"];
        assert_eq!(
            rule_of(&p, "root"),
            vec![
                elem(ElemKind::RuleRef, group_id),
                elem(ElemKind::Char, 'c' as u32),
                elem(ElemKind::End, 0),
            ]
        );
        assert_eq!(
            rule_of(&p, "root_1"),
            vec![
                elem(ElemKind::Char, 'a' as u32),
                elem(ElemKind::Alt, 0),
                elem(ElemKind::Char, 'b' as u32),
                elem(ElemKind::End, 0),
            ]
        );
    }

    #[test]
    fn test_parse_star_desugars_to_tail_rule() {
        let p = GrammarParser::parse(r#"root ::= "a"*"#).unwrap();
        let tail_id = p.symbol_ids["root_1"];
        assert_eq!(
            rule_of(&p, "root"),
            vec![elem(ElemKind::RuleRef, tail_id), elem(ElemKind::End, 0)]
        );
        assert_eq!(
            rule_of(&p, "root_1"),
            vec![
                elem(ElemKind::Char, 'a' as u32),
                elem(ElemKind::RuleRef, tail_id),
                elem(ElemKind::Alt, 0),
                elem(ElemKind::End, 0),
            ]
        );
    }

    #[test]
    fn test_parse_plus_keeps_one_copy() {
        let p = GrammarParser::parse(r#"root ::= "a"+"#).unwrap();
        let tail_id = p.symbol_ids["root_1"];
        assert_eq!(
            rule_of(&p, "root"),
            vec![
                elem(ElemKind::Char, 'a' as u32),
                elem(ElemKind::RuleRef, tail_id),
                elem(ElemKind::End, 0),
            ]
        );
    }

    #[test]
    fn test_parse_optional() {
        let p = GrammarParser::parse(r#"root ::= "a"?"#).unwrap();
        let opt_id = p.symbol_ids["root_1"];
        assert_eq!(
            rule_of(&p, "root"),
            vec![elem(ElemKind::RuleRef, opt_id), elem(ElemKind::End, 0)]
        );
        assert_eq!(
            rule_of(&p, "root_1"),
            vec![
                elem(ElemKind::Char, 'a' as u32),
                elem(ElemKind::Alt, 0),
                elem(ElemKind::End, 0),
            ]
        );
    }

    #[test]
    fn test_parse_bounded_repetition() {
        let p = GrammarParser::parse(r#"root ::= "a"{2,4}"#).unwrap();
        // two mandatory copies followed by a chain of two optional rules
        let r = rule_of(&p, "root");
        assert_eq!(r[0], elem(ElemKind::Char, 'a' as u32));
        assert_eq!(r[1], elem(ElemKind::Char, 'a' as u32));
        assert_eq!(r[2].kind, ElemKind::RuleRef);
        assert_eq!(r[3], elem(ElemKind::End, 0));

        let chain_tail = rule_of(&p, "root_2");
        assert_eq!(chain_tail[0], elem(ElemKind::Char, 'a' as u32));
        assert_eq!(chain_tail[1], elem(ElemKind::RuleRef, p.symbol_ids["root_1"]));
    }

    #[test]
    fn test_parse_exact_repetition() {
        let p = GrammarParser::parse(r#"root ::= "a"{3}"#).unwrap();
        assert_eq!(
            rule_of(&p, "root"),
            vec![
                elem(ElemKind::Char, 'a' as u32),
                elem(ElemKind::Char, 'a' as u32),
                elem(ElemKind::Char, 'a' as u32),
                elem(ElemKind::End, 0),
            ]
        );
    }

    #[test]
    fn test_parse_escapes() {
        let p = GrammarParser::parse(r#"root ::= "\x41é\t\n\\""#).unwrap();
        assert_eq!(
            rule_of(&p, "root"),
            vec![
                elem(ElemKind::Char, 0x41),
                elem(ElemKind::Char, 0xE9),
                elem(ElemKind::Char, '\t' as u32),
                elem(ElemKind::Char, '\n' as u32),
                elem(ElemKind::Char, '\\' as u32),
                elem(ElemKind::End, 0),
            ]
        );
    }

    #[test]
    fn test_parse_long_unicode_escape() {
        let p = GrammarParser::parse(r#"root ::= "\U0001F600""#).unwrap();
        assert_eq!(rule_of(&p, "root")[0], elem(ElemKind::Char, 0x1F600));
    }

    #[test]
    fn test_parse_comments_and_blank_lines() {
        let p = GrammarParser::parse(
            "# leading comment\n\nroot ::= digit # trailing comment\ndigit ::= [0-9]\n",
        )
        .unwrap();
        assert_eq!(p.symbol_ids.len(), 2);
        assert_eq!(rule_of(&p, "digit")[0].kind, ElemKind::Char);
    }

    #[test]
    fn test_parse_multiline_group() {
        let p = GrammarParser::parse("root ::= (\n  \"a\" |\n  \"b\"\n)").unwrap();
        assert_eq!(rule_of(&p, "root")[0].kind, ElemKind::RuleRef);
    }

    #[test]
    fn test_error_missing_assign() {
        let err = GrammarParser::parse("root \"a\"").unwrap_err();
        assert!(matches!(err, GrammarError::Syntax { .. }));
        assert!(err.to_string().contains("::="));
    }

    #[test]
    fn test_error_unterminated_literal() {
        let err = GrammarParser::parse("root ::= \"ab").unwrap_err();
        assert!(matches!(err, GrammarError::Syntax { .. }));
    }

    #[test]
    fn test_error_unterminated_class() {
        let err = GrammarParser::parse("root ::= [a-z").unwrap_err();
        assert!(matches!(err, GrammarError::Syntax { .. }));
    }

    #[test]
    fn test_error_dangling_quantifier() {
        let err = GrammarParser::parse("root ::= *").unwrap_err();
        assert!(err.to_string().contains("preceding item"));
    }

    #[test]
    fn test_error_bad_repetition_count() {
        let err = GrammarParser::parse(r#"root ::= "a"{x}"#).unwrap_err();
        assert!(err.to_string().contains("expecting an int"));
    }

    #[test]
    fn test_error_missing_close_brace() {
        let err = GrammarParser::parse(r#"root ::= "a"{1,2"#).unwrap_err();
        assert!(matches!(err, GrammarError::Syntax { .. }));
    }

    #[test]
    fn test_error_offset_points_at_failure() {
        let src = "root ::= @";
        let err = GrammarParser::parse(src).unwrap_err();
        match err {
            // '@' is not a sequence item, so the rule ends there and the
            // statement terminator check fails at its offset
            GrammarError::Syntax { offset, .. } => assert_eq!(offset, 9),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_redefined_rule_keeps_last_body() {
        let p = GrammarParser::parse("root ::= \"a\"\nroot ::= \"b\"\n").unwrap();
        assert_eq!(rule_of(&p, "root")[0], elem(ElemKind::Char, 'b' as u32));
    }
}
