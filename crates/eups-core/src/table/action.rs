//! Typed table-file actions

use crate::{Error, Result};

/// Default path delimiter for the env* path variants.
pub const DEFAULT_DELIM: &str = ":";

/// Destination stream for a `print()` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrintDest {
    #[default]
    Stdout,
    Stderr,
    Warn,
    Info,
}

impl PrintDest {
    pub fn parse(word: &str) -> Option<PrintDest> {
        match word.to_lowercase().as_str() {
            "stdout" | "stdok" => Some(PrintDest::Stdout),
            "stderr" => Some(PrintDest::Stderr),
            "stdwarn" => Some(PrintDest::Warn),
            "stdinfo" => Some(PrintDest::Info),
            _ => None,
        }
    }
}

/// A dependency request from `setupRequired(...)` / `setupOptional(...)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetupRequest {
    /// Product to set up
    pub product: String,
    /// Concrete version request, if any
    pub version: Option<String>,
    /// Bracketed relational expression, if any (`afw 1.2 [>= 1.1]`)
    pub version_expr: Option<String>,
    /// `-f <flavor>` override
    pub flavor: Option<String>,
    /// `-t <tag>` requests, in order
    pub tags: Vec<String>,
    /// `-r <dir>` local root
    pub product_dir: Option<String>,
    /// `-j`: no recursion into the child's dependencies
    pub no_recursion: bool,
    /// From `setupOptional` rather than `setupRequired`
    pub optional: bool,
}

impl SetupRequest {
    /// Parse the argument words of a setup action. The whole request may
    /// have been written as one quoted string; the caller passes
    /// whitespace-split words either way.
    pub fn parse(words: &[String], optional: bool, file: &str, line: usize) -> Result<SetupRequest> {
        let mut req = SetupRequest {
            optional,
            ..SetupRequest::default()
        };
        let mut positional: Vec<&str> = Vec::new();

        let mut iter = words.iter().map(String::as_str).peekable();
        while let Some(word) = iter.next() {
            match word {
                "-f" | "--flavor" => req.flavor = iter.next().map(str::to_string),
                "-t" | "--tag" => {
                    if let Some(tag) = iter.next() {
                        req.tags.push(tag.to_string());
                    }
                }
                "-r" => req.product_dir = iter.next().map(str::to_string),
                "-j" | "--just" => req.no_recursion = true,
                "-T" => {
                    iter.next(); // build type; accepted and ignored here
                }
                "-v" | "-q" => {}
                flag if flag.starts_with('-') => {
                    tracing::warn!("{file}:{line}: ignoring option {flag} in setup request");
                    // flags known to take an argument
                    if matches!(flag, "-m" | "-z" | "-Z" | "--vro") {
                        iter.next();
                    }
                }
                word => positional.push(word),
            }
        }

        let mut positional = positional.into_iter();
        req.product = positional
            .next()
            .ok_or_else(|| {
                Error::table_parse(file, line, "setup request names no product")
            })?
            .to_string();

        let rest: Vec<&str> = positional.collect();
        if !rest.is_empty() {
            let joined = rest.join(" ");
            // "version [expr]" or bare "[expr]" or a bare version/expression
            if let Some(open) = joined.find('[') {
                let close = joined.rfind(']').ok_or_else(|| {
                    Error::table_parse(file, line, format!("unterminated [expr] in \"{joined}\""))
                })?;
                let ver = joined[..open].trim();
                if !ver.is_empty() {
                    req.version = Some(ver.to_string());
                }
                req.version_expr = Some(joined[open + 1..close].trim().to_string());
            } else if joined.contains(['<', '>', '=']) {
                req.version_expr = Some(joined);
            } else {
                req.version = Some(joined);
            }
        }

        Ok(req)
    }
}

/// One evaluated table-file action, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableAction {
    EnvSet {
        var: String,
        value: String,
    },
    EnvUnset {
        var: String,
    },
    EnvPrepend {
        var: String,
        value: String,
        delim: String,
    },
    EnvAppend {
        var: String,
        value: String,
        delim: String,
    },
    EnvRemove {
        var: String,
        value: String,
        delim: String,
    },
    AddAlias {
        name: String,
        value: String,
    },
    Setup(SetupRequest),
    Print {
        dest: PrintDest,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_parse_plain_request() {
        let req = SetupRequest::parse(&words("daf_base"), false, "t", 1).unwrap();
        assert_eq!(req.product, "daf_base");
        assert_eq!(req.version, None);
        assert!(!req.optional);
    }

    #[test]
    fn test_parse_version_and_expr() {
        let req = SetupRequest::parse(&words("daf_base 11.1 [>= 11.0]"), true, "t", 1).unwrap();
        assert_eq!(req.version.as_deref(), Some("11.1"));
        assert_eq!(req.version_expr.as_deref(), Some(">= 11.0"));
        assert!(req.optional);

        let req = SetupRequest::parse(&words("daf_base >= 11.0"), false, "t", 1).unwrap();
        assert_eq!(req.version, None);
        assert_eq!(req.version_expr.as_deref(), Some(">= 11.0"));
    }

    #[test]
    fn test_parse_flags() {
        let req =
            SetupRequest::parse(&words("cfitsio -f Linux64 -t stable -j 3.450"), false, "t", 1)
                .unwrap();
        assert_eq!(req.flavor.as_deref(), Some("Linux64"));
        assert_eq!(req.tags, vec!["stable"]);
        assert!(req.no_recursion);
        assert_eq!(req.version.as_deref(), Some("3.450"));
    }

    #[test]
    fn test_missing_product_is_an_error() {
        assert!(SetupRequest::parse(&[], false, "t", 3).is_err());
    }
}
