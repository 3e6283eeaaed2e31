//! Version string decomposition and ordering
//!
//! A version string is decomposed into `VVV[-EEE][+FFF]`: a base release
//! name, an optional decrementing annotation (`1.0-rc1` sorts before `1.0`)
//! and an optional incrementing annotation (`1.0+patch1` sorts after `1.0`).
//! [`compare`] defines a total order over version strings and is the single
//! comparator used everywhere a version is ranked.

use std::cmp::Ordering;

/// The three parts of a decomposed version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposed<'a> {
    /// Base release name, e.g. `1.2.3`
    pub base: &'a str,
    /// Decrementing annotation, e.g. the `rc1` of `1.0-rc1`
    pub minus: Option<&'a str>,
    /// Incrementing annotation, e.g. the `patch1` of `1.0+patch1`
    pub plus: Option<&'a str>,
}

/// Break a version string into its base, `-` annotation and `+` annotation.
///
/// A string with more than one hyphen (e.g. `rel-0-8-2`) is treated as a
/// plain base name. The archaic `VVVm#` / `VVVp#` suffixes are recognised as
/// `-#` / `+#` respectively.
pub fn decompose(version: &str) -> Decomposed<'_> {
    if version.is_empty() {
        return Decomposed {
            base: "",
            minus: None,
            plus: None,
        };
    }

    if version.matches('-').count() > 1 {
        // e.g. rel-0-8-2: the hyphens are part of the name
        return Decomposed {
            base: version,
            minus: None,
            plus: None,
        };
    }

    let (base, rest) = match version.find(['-', '+']) {
        Some(idx) => (&version[..idx], &version[idx..]),
        None => (version, ""),
    };

    let mut minus = None;
    let mut plus = None;
    if let Some(stripped) = rest.strip_prefix('-') {
        match stripped.find('+') {
            Some(idx) => {
                minus = Some(&stripped[..idx]);
                plus = Some(&stripped[idx + 1..]);
            }
            None => minus = Some(stripped),
        }
    } else if let Some(stripped) = rest.strip_prefix('+') {
        plus = Some(stripped);
    }

    if minus.is_none() && plus.is_none() {
        // maybe they used VVVm# or VVVp#
        if let Some((head, kind, digits)) = trailing_annotation(version) {
            return match kind {
                'm' => Decomposed {
                    base: head,
                    minus: Some(digits),
                    plus: None,
                },
                _ => Decomposed {
                    base: head,
                    minus: None,
                    plus: Some(digits),
                },
            };
        }
    }

    Decomposed { base, minus, plus }
}

/// Match a trailing `m<digits>` or `p<digits>` suffix.
fn trailing_annotation(version: &str) -> Option<(&str, char, &str)> {
    let digits_start = version
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)?;
    if digits_start >= version.len() {
        return None;
    }
    let kind = version[..digits_start].chars().last()?;
    if kind != 'm' && kind != 'p' {
        return None;
    }
    let head = &version[..digits_start - 1];
    if head.is_empty() {
        return None;
    }
    Some((head, kind, &version[digits_start..]))
}

/// Compare two version strings, returning a total order.
pub fn compare(v1: &str, v2: &str) -> Ordering {
    let d1 = decompose(v1);
    let d2 = decompose(v2);

    if d1.base == d2.base {
        // same primary release component
        match (d1.minus, d2.minus) {
            (Some(m1), Some(m2)) => {
                let ret = compare(m1, m2);
                if ret != Ordering::Equal {
                    return ret;
                }
            }
            // an annotated release sorts before the plain one
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => {}
        }
        return match (d1.plus, d2.plus) {
            (Some(p1), Some(p2)) => compare(p1, p2),
            // a +suffix sorts after its absence
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
    }

    compare_base(d1.base, d2.base)
}

/// Compare two base release names component-wise.
fn compare_base(b1: &str, b2: &str) -> Ordering {
    let c1: Vec<&str> = b1.split(['.', '_']).collect();
    let c2: Vec<&str> = b2.split(['.', '_']).collect();

    // Leading non-numeric prefixes on the first component must agree; the
    // side carrying an unmatched extra prefix sorts low. Prefixes that
    // differ outright fall through to the component loop.
    let p1 = leading_prefix(c1[0]);
    let p2 = leading_prefix(c2[0]);
    if p1 != p2 {
        if p1.len() > p2.len() && p1.starts_with(p2) {
            return Ordering::Less;
        }
        if p2.len() > p1.len() && p2.starts_with(p1) {
            return Ordering::Greater;
        }
    }

    for (e1, e2) in c1.iter().zip(c2.iter()) {
        let ord = compare_component(e1, e2);
        if ord != Ordering::Equal {
            return ord;
        }
    }

    // identical so far; the longer version sorts later
    c1.len().cmp(&c2.len())
}

/// Leading run of non-digit characters in a component.
fn leading_prefix(component: &str) -> &str {
    let end = component
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(component.len());
    &component[..end]
}

/// Compare one `.`/`_`-separated component of a base name.
///
/// Components compare as integers when both parse as integers, including
/// after stripping a shared non-digit prefix (`svn1039` vs `svn1040`);
/// otherwise as strings.
fn compare_component(c1: &str, c2: &str) -> Ordering {
    if let (Ok(n1), Ok(n2)) = (c1.parse::<u64>(), c2.parse::<u64>()) {
        return n1.cmp(&n2);
    }

    let p1 = leading_prefix(c1);
    if !p1.is_empty() && p1.len() < c1.len() && c2.starts_with(p1) {
        let t1 = &c1[p1.len()..];
        let t2 = &c2[p1.len()..];
        if let (Ok(n1), Ok(n2)) = (t1.parse::<u64>(), t2.parse::<u64>()) {
            return n1.cmp(&n2);
        }
    }

    c1.cmp(c2)
}
