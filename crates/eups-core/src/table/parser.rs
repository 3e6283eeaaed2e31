//! Table-file parsing
//!
//! The grammar is line-oriented. Two block styles select statements by
//! flavor: the grouped style (`Group:` / `Flavor = X` / `Common:` ... `End:`)
//! and the flat style, where a run of `Flavor = X` lines scopes everything
//! up to the next `Flavor =` or end of file. Inside a payload,
//! `if (expr) { ... } else if ... { ... } else { ... }` blocks gate actions.
//! Everything else is an `Action(args)` line.

use camino::{Utf8Path, Utf8PathBuf};

use crate::expr::LogicalExpr;
use crate::{Error, Result};

/// A parsed table file.
#[derive(Debug, Clone)]
pub struct TableFile {
    /// Path the file was read from (diagnostics only)
    pub path: Utf8PathBuf,
    pub statements: Vec<Statement>,
    /// True if any flavor-selection blocks were present
    pub has_flavor_blocks: bool,
}

/// One statement in a table file.
#[derive(Debug, Clone)]
pub enum Statement {
    Action(ActionLine),
    If(IfBlock),
    /// A grouped or flat flavor block; `ANY`/`NULL` are wildcards
    FlavorBlock {
        flavors: Vec<String>,
        body: Vec<Statement>,
        line: usize,
    },
}

/// An `if`/`else if`/`else` chain.
#[derive(Debug, Clone)]
pub struct IfBlock {
    pub branches: Vec<(LogicalExpr, Vec<Statement>)>,
    pub else_body: Vec<Statement>,
    pub line: usize,
}

/// A raw `Action(args)` line; interpretation happens at evaluation time.
#[derive(Debug, Clone)]
pub struct ActionLine {
    pub line: usize,
    /// Action name, lowercased
    pub name: String,
    pub args: Vec<String>,
}

/// Older synonyms for table-file variables, rewritten before parsing.
const LEGACY_SYNONYMS: &[(&str, &str)] = &[
    ("${PROD_DIR}", "${PRODUCT_DIR}"),
    ("${UPS_PROD_DIR}", "${PRODUCT_DIR}"),
    ("${UPS_PROD_FLAVOR}", "${PRODUCT_FLAVOR}"),
    ("${UPS_PROD_NAME}", "${PRODUCT_NAME}"),
    ("${UPS_PROD_VERSION}", "${PRODUCT_VERSION}"),
    ("${UPS_DB}", "${PRODUCTS}"),
    ("${UPS_UPS_DIR}", "${UPS_DIR}"),
];

impl TableFile {
    /// Parse a table file from disk.
    pub fn parse(path: &Utf8Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| Error::TableMissing { file: path.to_string() })?;
        Self::parse_str(&content, path.to_path_buf())
    }

    /// Parse table-file content from a string.
    pub fn parse_str(content: &str, path: Utf8PathBuf) -> Result<Self> {
        let lines = lex(content, &path)?;
        let mut parser = LineParser {
            lines: &lines,
            pos: 0,
            file: path.as_str(),
        };
        let statements = parser.file()?;
        let has_flavor_blocks = statements
            .iter()
            .any(|s| matches!(s, Statement::FlavorBlock { .. }));
        Ok(TableFile {
            path,
            statements,
            has_flavor_blocks,
        })
    }
}

/// One classified input line.
#[derive(Debug, Clone, PartialEq)]
enum Line {
    Group,
    Common,
    End,
    Flavor(String),
    IfOpen(String),
    ElseIf(String),
    Else,
    Close,
    Action { name: String, args: Vec<String> },
}

/// Classify every significant line, stripping comments and legacy headers.
fn lex(content: &str, path: &Utf8Path) -> Result<Vec<(usize, Line)>> {
    let mut out = Vec::new();
    let mut saw_old_header = false;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let mut line = raw.trim().to_string();
        if let Some(hash) = line.find('#') {
            line.truncate(hash);
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Archaic per-file headers
        if let Some(value) = key_value(line, "file") {
            if !value.eq_ignore_ascii_case("table") {
                return Err(Error::table_parse(
                    path.as_str(),
                    line_no,
                    format!("expected \"File = Table\"; saw \"{line}\""),
                ));
            }
            saw_old_header = true;
            continue;
        }
        if saw_old_header && key_value(line, "product").is_some() {
            continue;
        }
        if let Some(action) = key_value(line, "action") {
            if !action.to_lowercase().contains("setup") {
                return Err(Error::table_parse(
                    path.as_str(),
                    line_no,
                    format!("unsupported action \"{action}\""),
                ));
            }
            continue;
        }
        if let Some(quals) = key_value(line, "qualifiers") {
            let quals = quals.trim_matches('"');
            if !quals.is_empty() {
                tracing::warn!("{path}:{line_no}: ignoring qualifiers \"{quals}\"");
            }
            continue;
        }

        let mut line = line.to_string();
        for (old, new) in LEGACY_SYNONYMS {
            if line.contains(old) {
                line = line.replace(old, new);
            }
        }

        out.push((line_no, classify(&line, path, line_no)?));
    }

    Ok(out)
}

/// `Key = value` with a case-insensitive key, or None.
fn key_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let (head, tail) = line.split_once('=')?;
    head.trim()
        .eq_ignore_ascii_case(key)
        .then(|| tail.trim())
}

fn classify(line: &str, path: &Utf8Path, line_no: usize) -> Result<Line> {
    let lower = line.to_lowercase();
    if lower == "group:" {
        return Ok(Line::Group);
    }
    if lower == "common:" {
        return Ok(Line::Common);
    }
    if lower == "end:" {
        return Ok(Line::End);
    }
    if let Some(flavor) = key_value(line, "flavor") {
        return Ok(Line::Flavor(flavor.trim_matches('"').to_string()));
    }

    // if (...) {   /  } else if (...) {  /  } else {  /  }
    if lower == "}" {
        return Ok(Line::Close);
    }
    if let Some(rest) = lower.strip_prefix("if") {
        if rest.trim_start().starts_with('(') && line.trim_end().ends_with('{') {
            return Ok(Line::IfOpen(condition_of(line, path, line_no)?));
        }
    }
    if lower.starts_with('}') {
        let rest = lower[1..].trim_start();
        if rest.starts_with("else") {
            let after_else = rest["else".len()..].trim_start();
            if after_else.starts_with("if") {
                return Ok(Line::ElseIf(condition_of(line, path, line_no)?));
            }
            if after_else == "{" {
                return Ok(Line::Else);
            }
        }
        return Err(Error::table_parse(
            path.as_str(),
            line_no,
            format!("unparseable block line \"{line}\""),
        ));
    }

    // Action(args)
    if let Some(open) = line.find('(') {
        let close = line.rfind(')').ok_or_else(|| {
            Error::table_parse(path.as_str(), line_no, format!("missing \")\" in \"{line}\""))
        })?;
        let name = line[..open].trim().to_lowercase();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::table_parse(
                path.as_str(),
                line_no,
                format!("unparseable line \"{line}\""),
            ));
        }
        let args = split_args(&line[open + 1..close]);
        return Ok(Line::Action { name, args });
    }

    Err(Error::table_parse(
        path.as_str(),
        line_no,
        format!("unparseable line \"{line}\""),
    ))
}

/// Extract the parenthesized condition from an `if (...) {` style line.
fn condition_of(line: &str, path: &Utf8Path, line_no: usize) -> Result<String> {
    let open = line.find('(');
    let close = line.rfind(')');
    match (open, close) {
        (Some(o), Some(c)) if c > o => Ok(line[o + 1..c].trim().to_string()),
        _ => Err(Error::table_parse(
            path.as_str(),
            line_no,
            format!("malformed condition in \"{line}\""),
        )),
    }
}

/// Split an action argument list on commas and unquoted whitespace.
/// Quoted strings keep their whitespace and commas and lose their quotes.
fn split_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut cur = String::new();
    let mut quoted = false; // the current arg came from a quoted string
    let mut chars = text.chars().peekable();

    let push = |args: &mut Vec<String>, cur: &mut String, quoted: &mut bool| {
        if !cur.is_empty() || *quoted {
            args.push(std::mem::take(cur));
        }
        *quoted = false;
    };

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                quoted = true;
                while let Some(q) = chars.next() {
                    if q == '\\' && chars.peek() == Some(&'"') {
                        cur.push('"');
                        chars.next();
                    } else if q == c {
                        break;
                    } else {
                        cur.push(q);
                    }
                }
            }
            ',' => push(&mut args, &mut cur, &mut quoted),
            c if c.is_whitespace() => push(&mut args, &mut cur, &mut quoted),
            _ => cur.push(c),
        }
    }
    push(&mut args, &mut cur, &mut quoted);
    args
}

struct LineParser<'a> {
    lines: &'a [(usize, Line)],
    pos: usize,
    file: &'a str,
}

impl<'a> LineParser<'a> {
    fn peek(&self) -> Option<&'a (usize, Line)> {
        self.lines.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a (usize, Line)> {
        let item = self.peek();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    /// Top level: grouped blocks, flat flavor blocks, and bare statements.
    fn file(&mut self) -> Result<Vec<Statement>> {
        let mut out = Vec::new();
        while let Some((line_no, line)) = self.peek() {
            match line {
                Line::Group => {
                    self.next();
                    out.push(self.group(*line_no)?);
                }
                Line::Flavor(_) => out.push(self.flat_block()?),
                _ => out.push(self.statement()?),
            }
        }
        Ok(out)
    }

    /// `Group:` Flavor=... `Common:` body `End:`
    fn group(&mut self, group_line: usize) -> Result<Statement> {
        let mut flavors = Vec::new();
        loop {
            match self.next() {
                Some((_, Line::Flavor(flavor))) => flavors.push(flavor.clone()),
                Some((_, Line::Common)) => break,
                Some((line_no, other)) => {
                    return Err(Error::table_parse(
                        self.file,
                        *line_no,
                        format!("expected Flavor = or Common: in group, saw {other:?}"),
                    ));
                }
                None => {
                    return Err(Error::table_parse(
                        self.file,
                        group_line,
                        "unterminated Group: block",
                    ));
                }
            }
        }

        let mut body = Vec::new();
        loop {
            match self.peek() {
                Some((_, Line::End)) => {
                    self.next();
                    break;
                }
                // End is sometimes omitted: a new Group opens the next block
                Some((_, Line::Group)) | None => break,
                _ => body.push(self.statement()?),
            }
        }

        Ok(Statement::FlavorBlock {
            flavors,
            body,
            line: group_line,
        })
    }

    /// A run of `Flavor = X` lines scoping everything until the next
    /// `Flavor =` line or end of file.
    fn flat_block(&mut self) -> Result<Statement> {
        let mut flavors = Vec::new();
        let mut first_line = 0;
        while let Some((line_no, Line::Flavor(flavor))) = self.peek() {
            if flavors.is_empty() {
                first_line = *line_no;
            }
            flavors.push(flavor.clone());
            self.next();
        }

        let mut body = Vec::new();
        while let Some((_, line)) = self.peek() {
            match line {
                Line::Flavor(_) | Line::Group => break,
                Line::End => {
                    self.next(); // stray End: tolerated in flat style
                }
                _ => body.push(self.statement()?),
            }
        }

        Ok(Statement::FlavorBlock {
            flavors,
            body,
            line: first_line,
        })
    }

    /// A single action line or an if-chain.
    fn statement(&mut self) -> Result<Statement> {
        match self.next() {
            Some((line_no, Line::Action { name, args })) => Ok(Statement::Action(ActionLine {
                line: *line_no,
                name: name.clone(),
                args: args.clone(),
            })),
            Some((line_no, Line::IfOpen(cond))) => self.if_chain(cond, *line_no),
            Some((line_no, other)) => Err(Error::table_parse(
                self.file,
                *line_no,
                format!("unexpected {other:?}"),
            )),
            None => Err(Error::table_parse(self.file, 0, "unexpected end of file")),
        }
    }

    fn if_chain(&mut self, cond: &str, line_no: usize) -> Result<Statement> {
        let mut branches = vec![(LogicalExpr::parse(cond)?, self.block_body(line_no)?)];
        let mut else_body = Vec::new();

        loop {
            match self.peek() {
                Some((elif_line, Line::ElseIf(cond))) => {
                    let cond = cond.clone();
                    let elif_line = *elif_line;
                    self.next();
                    branches.push((LogicalExpr::parse(&cond)?, self.block_body(elif_line)?));
                }
                Some((else_line, Line::Else)) => {
                    let else_line = *else_line;
                    self.next();
                    else_body = self.block_body(else_line)?;
                    break;
                }
                _ => break,
            }
        }

        Ok(Statement::If(IfBlock {
            branches,
            else_body,
            line: line_no,
        }))
    }

    /// Statements up to the matching `}`; the `}` that starts an
    /// `} else` line is handled by the caller via peek.
    fn block_body(&mut self, open_line: usize) -> Result<Vec<Statement>> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Some((_, Line::Close)) => {
                    self.next();
                    return Ok(body);
                }
                Some((_, Line::ElseIf(_))) | Some((_, Line::Else)) => return Ok(body),
                Some(_) => body.push(self.statement()?),
                None => {
                    return Err(Error::table_parse(
                        self.file,
                        open_line,
                        "unterminated if block",
                    ));
                }
            }
        }
    }
}
