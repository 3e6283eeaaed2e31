//! Logical expression evaluation
//!
//! Two closely related grammars live here. [`LogicalExpr`] evaluates the
//! conditions found in table-file `if (...)` blocks, with `FLAVOR` and
//! `TYPE`/`BUILD` resolved from a symbol table. [`version_match`] evaluates
//! the `||`-separated relational expressions used to request product
//! versions (`>= 3.450 || == 3.370`), using the version comparator for
//! ordering.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::version;
use crate::{Error, Result};

/// Relational operators accepted in both grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl RelOp {
    fn parse(tok: &str) -> Option<RelOp> {
        match tok {
            "==" => Some(RelOp::Eq),
            "!=" => Some(RelOp::Ne),
            "<" => Some(RelOp::Lt),
            "<=" => Some(RelOp::Le),
            ">" => Some(RelOp::Gt),
            ">=" => Some(RelOp::Ge),
            _ => None,
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            RelOp::Eq => ord == Ordering::Equal,
            RelOp::Ne => ord != Ordering::Equal,
            RelOp::Lt => ord == Ordering::Less,
            RelOp::Le => ord != Ordering::Greater,
            RelOp::Gt => ord == Ordering::Greater,
            RelOp::Ge => ord != Ordering::Less,
        }
    }
}

/// Does `version` satisfy the version expression `expr`?
///
/// `expr` is a `||`-separated list of primaries; each primary is a
/// relational operator followed by a version, or a bare version (implying
/// `==`). `&&` is accepted between primaries for completeness.
pub fn version_match(version: &str, expr: &str) -> Result<bool> {
    let tokens = tokenize(expr);
    if tokens.is_empty() {
        return Ok(true);
    }

    let mut value: Option<bool> = None;
    let mut logop: Option<&str> = None;
    let mut i = 0;
    while i < tokens.len() {
        let tok = tokens[i].as_str();
        match tok {
            "||" | "or" => {
                if value == Some(true) {
                    return Ok(true); // short circuit
                }
                logop = Some("or");
                i += 1;
                continue;
            }
            "&&" | "and" => {
                if value == Some(false) {
                    return Ok(false); // short circuit
                }
                logop = Some("and");
                i += 1;
                continue;
            }
            _ => {}
        }

        let (op, rhs) = match RelOp::parse(tok) {
            Some(op) => {
                i += 1;
                let rhs = tokens.get(i).ok_or_else(|| {
                    Error::usage(
                        format!("Expected a version after \"{tok}\" in \"{expr}\""),
                        "Version expressions look like \">= 1.2 || == 1.0\"",
                    )
                })?;
                (op, rhs.as_str())
            }
            None => (RelOp::Eq, tok),
        };
        i += 1;

        let rhs_value = op.holds(version::compare(version, rhs));
        value = Some(match (logop.take(), value) {
            (Some("and"), Some(prev)) => prev && rhs_value,
            (Some(_), Some(prev)) => prev || rhs_value,
            _ => rhs_value,
        });
    }

    Ok(value.unwrap_or(false))
}

/// Split a version expression into relops, logical operators and words.
fn tokenize(expr: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut word = String::new();
    let mut chars = expr.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => flush(&mut word, &mut out),
            '|' | '&' => {
                flush(&mut word, &mut out);
                if chars.peek() == Some(&c) {
                    chars.next();
                }
                out.push(format!("{c}{c}"));
            }
            '<' | '>' | '=' | '!' => {
                flush(&mut word, &mut out);
                let mut op = String::from(c);
                if chars.peek() == Some(&'=') {
                    chars.next();
                    op.push('=');
                }
                out.push(op);
            }
            _ => word.push(c),
        }
    }
    flush(&mut word, &mut out);
    out
}

fn flush(word: &mut String, out: &mut Vec<String>) {
    if !word.is_empty() {
        out.push(std::mem::take(word));
    }
}

/// A parsed table-file conditional, e.g. `FLAVOR == Linux || FLAVOR == Linux64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalExpr {
    /// A bare word or quoted string
    Atom(String),
    Not(Box<LogicalExpr>),
    Rel(RelOp, Box<LogicalExpr>, Box<LogicalExpr>),
    And(Box<LogicalExpr>, Box<LogicalExpr>),
    Or(Box<LogicalExpr>, Box<LogicalExpr>),
}

impl LogicalExpr {
    /// Parse a conditional expression.
    pub fn parse(text: &str) -> Result<LogicalExpr> {
        let tokens = tokenize_logical(text);
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            text,
        };
        let expr = parser.expr()?;
        if parser.pos != tokens.len() {
            return Err(Error::usage(
                format!(
                    "Trailing tokens after expression in \"{}\": {}",
                    text,
                    tokens[parser.pos..].join(" ")
                ),
                "Check the parenthesization of the if() condition",
            ));
        }
        Ok(expr)
    }

    /// Evaluate against a symbol table. Symbol names are case-insensitive;
    /// unknown words evaluate to themselves as strings.
    pub fn eval(&self, symbols: &HashMap<String, String>) -> bool {
        match self {
            LogicalExpr::Atom(word) => {
                let resolved = resolve(word, symbols);
                resolved == "true" || resolved.parse::<i64>().map(|n| n != 0).unwrap_or(false)
            }
            LogicalExpr::Not(inner) => !inner.eval(symbols),
            LogicalExpr::And(a, b) => a.eval(symbols) && b.eval(symbols),
            LogicalExpr::Or(a, b) => a.eval(symbols) || b.eval(symbols),
            LogicalExpr::Rel(op, lhs, rhs) => {
                let lhs = lhs.atom_value(symbols);
                let rhs = rhs.atom_value(symbols);
                let ord = match (lhs.parse::<i64>(), rhs.parse::<i64>()) {
                    (Ok(a), Ok(b)) => a.cmp(&b),
                    _ => version::compare(&lhs, &rhs),
                };
                op.holds(ord)
            }
        }
    }

    fn atom_value(&self, symbols: &HashMap<String, String>) -> String {
        match self {
            LogicalExpr::Atom(word) => resolve(word, symbols),
            _ => String::new(),
        }
    }
}

fn resolve(word: &str, symbols: &HashMap<String, String>) -> String {
    symbols
        .get(&word.to_lowercase())
        .cloned()
        .unwrap_or_else(|| word.to_string())
}

struct Parser<'a> {
    tokens: &'a [String],
    pos: usize,
    text: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn next(&mut self) -> Option<&'a str> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expr(&mut self) -> Result<LogicalExpr> {
        let mut lhs = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                "||" | "or" => {
                    self.next();
                    lhs = LogicalExpr::Or(Box::new(lhs), Box::new(self.term()?));
                }
                "&&" | "and" => {
                    self.next();
                    lhs = LogicalExpr::And(Box::new(lhs), Box::new(self.term()?));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<LogicalExpr> {
        let lhs = self.prim()?;
        if let Some(op) = self.peek().and_then(RelOp::parse) {
            self.next();
            let rhs = self.prim()?;
            return Ok(LogicalExpr::Rel(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn prim(&mut self) -> Result<LogicalExpr> {
        match self.next() {
            Some("(") => {
                let inner = self.expr()?;
                match self.next() {
                    Some(")") => Ok(inner),
                    other => Err(Error::usage(
                        format!(
                            "Expected \")\" in \"{}\", saw {}",
                            self.text,
                            other.unwrap_or("end of expression")
                        ),
                        "Check the parenthesization of the if() condition",
                    )),
                }
            }
            Some("!") | Some("not") => Ok(LogicalExpr::Not(Box::new(self.prim()?))),
            Some(word) => Ok(LogicalExpr::Atom(word.to_string())),
            None => Err(Error::usage(
                format!("Unexpected end of expression in \"{}\"", self.text),
                "The if() condition is incomplete",
            )),
        }
    }
}

/// Tokenizer for conditionals: adds parens and `!` to the version-expression
/// tokenizer and strips quotes from quoted strings.
fn tokenize_logical(expr: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut word = String::new();
    let mut chars = expr.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => flush(&mut word, &mut out),
            '"' | '\'' => {
                flush(&mut word, &mut out);
                let mut s = String::new();
                for q in chars.by_ref() {
                    if q == c {
                        break;
                    }
                    s.push(q);
                }
                out.push(s);
            }
            '(' | ')' => {
                flush(&mut word, &mut out);
                out.push(c.to_string());
            }
            '|' | '&' => {
                flush(&mut word, &mut out);
                if chars.peek() == Some(&c) {
                    chars.next();
                }
                out.push(format!("{c}{c}"));
            }
            '<' | '>' | '=' => {
                flush(&mut word, &mut out);
                let mut op = String::from(c);
                if chars.peek() == Some(&'=') {
                    chars.next();
                    op.push('=');
                }
                out.push(op);
            }
            '!' => {
                flush(&mut word, &mut out);
                if chars.peek() == Some(&'=') {
                    chars.next();
                    out.push("!=".to_string());
                } else {
                    out.push("!".to_string());
                }
            }
            _ => word.push(c),
        }
    }
    flush(&mut word, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(flavor: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("flavor".to_string(), flavor.to_string());
        map.insert("type".to_string(), "build".to_string());
        map.insert("build".to_string(), "build".to_string());
        map
    }

    #[test]
    fn test_version_match_bare_and_relational() {
        assert!(version_match("3.450", "3.450").unwrap());
        assert!(!version_match("3.450", "3.370").unwrap());
        assert!(version_match("3.450+hack1", ">= 3.450").unwrap());
        assert!(version_match("3.370", "< 3.450").unwrap());
        assert!(!version_match("3.450", "> 3.450").unwrap());
        assert!(version_match("1.0", "!= 1.1").unwrap());
    }

    #[test]
    fn test_version_match_disjunction() {
        assert!(version_match("3.370", "== 3.370 || >= 3.450").unwrap());
        assert!(version_match("3.450+hack1", "== 3.370 || >= 3.450").unwrap());
        assert!(!version_match("3.440", "== 3.370 || >= 3.450").unwrap());
        assert!(version_match("11.1", ">= 11.0 && <= 12.0").unwrap());
        assert!(!version_match("12.1", ">= 11.0 && <= 12.0").unwrap());
    }

    #[test]
    fn test_flavor_conditions() {
        let expr = LogicalExpr::parse("FLAVOR == Linux || FLAVOR == Linux64").unwrap();
        assert!(expr.eval(&symbols("Linux")));
        assert!(expr.eval(&symbols("Linux64")));
        assert!(!expr.eval(&symbols("DarwinX86")));

        let expr = LogicalExpr::parse("(FLAVOR == Linux) && (TYPE == build)").unwrap();
        assert!(expr.eval(&symbols("Linux")));

        let expr = LogicalExpr::parse("!(FLAVOR == Linux)").unwrap();
        assert!(!expr.eval(&symbols("Linux")));
        assert!(expr.eval(&symbols("Darwin")));
    }

    #[test]
    fn test_parse_error_on_unbalanced_parens() {
        assert!(LogicalExpr::parse("(FLAVOR == Linux").is_err());
    }
}
