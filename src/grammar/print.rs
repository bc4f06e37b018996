//! Canonical grammar pretty-printer.
//!
//! Emits one line per rule, with synthetic quantifier rules expanded the way
//! the table actually stores them. Literals come out as single-character
//! classes, so printing a compiled grammar and re-parsing the output yields
//! the same table (for printable-ASCII grammars; other code points are
//! rendered as `<U+XXXX>` placeholders).

use super::{ElemKind, Rule, RuleTable};
use std::fmt::{self, Write};

/// Write the whole rule table to `out`, one rule per line, in id order.
pub(crate) fn write_grammar<W: Write>(out: &mut W, table: &RuleTable) -> fmt::Result {
    for (id, rule) in table.rules().iter().enumerate() {
        write_rule(out, table, id as u32, rule)?;
    }
    Ok(())
}

fn write_rule<W: Write>(out: &mut W, table: &RuleTable, id: u32, rule: &Rule) -> fmt::Result {
    write!(out, "{} ::= ", table.name(id))?;
    // the trailing End is structural, not printed
    for i in 0..rule.len().saturating_sub(1) {
        let elem = rule[i];
        match elem.kind {
            ElemKind::End => {}
            ElemKind::Alt => write!(out, "| ")?,
            ElemKind::RuleRef => write!(out, "{} ", table.name(elem.value))?,
            ElemKind::Char => {
                write!(out, "[")?;
                write_grammar_char(out, elem.value)?;
            }
            ElemKind::CharNot => {
                write!(out, "[^")?;
                write_grammar_char(out, elem.value)?;
            }
            ElemKind::CharRngUpper => {
                write!(out, "-")?;
                write_grammar_char(out, elem.value)?;
            }
            ElemKind::CharAlt => write_grammar_char(out, elem.value)?,
            ElemKind::CharAny => write!(out, ". ")?,
        }
        // close the class unless the next element extends it
        if matches!(elem.kind, ElemKind::Char | ElemKind::CharNot | ElemKind::CharAlt | ElemKind::CharRngUpper)
            && !matches!(rule[i + 1].kind, ElemKind::CharAlt | ElemKind::CharRngUpper)
        {
            write!(out, "] ")?;
        }
    }
    writeln!(out)
}

fn write_grammar_char<W: Write>(out: &mut W, c: u32) -> fmt::Result {
    if (0x20..=0x7E).contains(&c) {
        // printable ASCII goes out verbatim
        match char::from_u32(c) {
            Some(ch) => write!(out, "{}", ch),
            None => write!(out, "<U+{:04X}>", c),
        }
    } else {
        write!(out, "<U+{:04X}>", c)
    }
}

#[cfg(test)]
mod tests {
    use crate::grammar::compile;

    fn render(text: &str) -> String {
        let table = compile(text, "root").unwrap();
        let mut out = String::new();
        super::write_grammar(&mut out, &table).unwrap();
        out
    }

    #[test]
    fn test_print_simple_rule() {
        let out = render("root ::= [a-z]");
        assert_eq!(out, "root ::= [a-z] \n");
    }

    #[test]
    fn test_print_expands_synthetic_rules() {
        let out = render(r#"root ::= "x"*"#);
        assert!(out.contains("root ::= root_1 \n"));
        assert!(out.contains("root_1 ::= [x] root_1 | \n"));
    }

    #[test]
    fn test_print_wildcard_and_negation() {
        let out = render("root ::= . [^ab]");
        assert_eq!(out, "root ::= . [^ab] \n");
    }

    #[test]
    fn test_print_roundtrip_fixpoint() {
        // printing, re-parsing, and printing again must reach a fixpoint for
        // printable-ASCII grammars
        let source = "root ::= [a-z]+ [,]? tail | \ntail ::= [(] tail [)] | [x]\n";
        let once = render(source);
        let table = compile(&once, "root").unwrap();
        let mut twice = String::new();
        super::write_grammar(&mut twice, &table).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_print_nonprintable_placeholder() {
        let out = render(r#"root ::= "\t""#);
        assert_eq!(out, "root ::= [<U+0009>] \n");
    }
}
