//! Product records
//!
//! A [`Product`] is one declared (product, version, flavor) bound to its
//! installation directory and table file. Records are produced by the
//! database from version files, or synthesized for `setup -r` local setups
//! (version `LOCAL:<dir>`).

use camino::{Utf8Path, Utf8PathBuf};

use crate::{Error, Result};

/// Version prefix recording a setup anchored to a directory rather than a
/// database entry.
pub const LOCAL_VERSION_PREFIX: &str = "LOCAL:";

/// The literal used in database files for "explicitly no path".
pub const NONE_PATH: &str = "none";

/// One declared version of a product, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Product name
    pub name: String,

    /// Version string (possibly `LOCAL:<dir>`)
    pub version: String,

    /// Platform flavor this record was declared for
    pub flavor: String,

    /// Installation directory; `None` when declared as `none`
    pub dir: Option<Utf8PathBuf>,

    /// Table file path; `None` when declared as `none`
    pub table_file: Option<Utf8PathBuf>,

    /// Root of the stack this product was found in; `None` for local setups
    pub stack_root: Option<Utf8PathBuf>,

    /// Tags assigned to this version (in stack-path order)
    pub tags: Vec<String>,
}

impl Product {
    /// Create a product anchored to a directory instead of a database entry.
    /// The version records the directory so later commands can recognise it.
    pub fn local(name: &str, dir: &Utf8Path, flavor: &str, table_file: Option<Utf8PathBuf>) -> Product {
        let table_file = table_file.or_else(|| {
            let deduced = dir.join("ups").join(format!("{name}.table"));
            deduced.is_file().then_some(deduced)
        });
        Product {
            name: name.to_string(),
            version: format!("{LOCAL_VERSION_PREFIX}{dir}"),
            flavor: flavor.to_string(),
            dir: Some(dir.to_path_buf()),
            table_file,
            stack_root: None,
            tags: Vec::new(),
        }
    }

    /// True if this product was set up with `-r` rather than from a database.
    pub fn is_local(&self) -> bool {
        self.version.starts_with(LOCAL_VERSION_PREFIX)
    }
}

/// `<PRODUCT>_DIR` for a product name.
pub fn dir_env_name(product: &str) -> String {
    format!("{}_DIR", env_var_stem(product))
}

/// `SETUP_<PRODUCT>` for a product name.
pub fn setup_env_name(product: &str) -> String {
    format!("SETUP_{}", env_var_stem(product))
}

/// Uppercase the product name for use in an environment variable, mapping
/// characters the shell would reject to underscores.
fn env_var_stem(product: &str) -> String {
    product
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Validate a product name: `[A-Za-z0-9_.+-]+`.
pub fn validate_name(name: &str) -> Result<()> {
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-'))
    {
        Ok(())
    } else {
        Err(Error::usage(
            format!("Invalid product name \"{name}\""),
            "Product names may only contain letters, digits, and \"_.+-\"",
        ))
    }
}

/// Resolve the paths stored in a version-file section into absolute paths.
///
/// `prod_dir` may be relative to the stack root and may reference `${VAR}`
/// environment variables. `ups_dir` is relative to the product directory
/// and defaults to `ups`. `table_file` is relative to the ups directory.
/// Any of the three may be the literal `none`.
pub fn resolve_paths(
    stack_root: &Utf8Path,
    prod_dir: Option<&str>,
    ups_dir: Option<&str>,
    table_file: Option<&str>,
) -> (Option<Utf8PathBuf>, Option<Utf8PathBuf>) {
    let prod_dir = prod_dir.filter(|d| *d != NONE_PATH).map(|d| {
        let expanded = expand_env(d);
        let p = Utf8PathBuf::from(expanded);
        if p.is_absolute() {
            p
        } else {
            stack_root.join(p)
        }
    });

    let table_file = match table_file {
        None => None,
        Some(NONE_PATH) => None,
        Some(t) => {
            let t = Utf8PathBuf::from(expand_env(t));
            if t.is_absolute() {
                Some(t)
            } else {
                let ups = match ups_dir {
                    Some(NONE_PATH) => None,
                    Some(u) => Some(Utf8PathBuf::from(u)),
                    None => Some(Utf8PathBuf::from("ups")),
                };
                let base = match (&prod_dir, ups) {
                    (Some(pd), Some(u)) => {
                        if u.is_absolute() {
                            u
                        } else {
                            pd.join(u)
                        }
                    }
                    (Some(pd), None) => pd.clone(),
                    (None, Some(u)) => u,
                    (None, None) => Utf8PathBuf::new(),
                };
                Some(base.join(t))
            }
        }
    };

    (prod_dir, table_file)
}

/// Expand `${VAR}` references against the process environment. Unknown
/// variables are left as-is so the caller can report them in context.
pub fn expand_env(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start..].find('}') {
            Some(end) => {
                let name = &rest[start + 2..start + end];
                match std::env::var(name) {
                    Ok(v) => out.push_str(&v),
                    Err(_) => out.push_str(&rest[start..=start + end]),
                }
                rest = &rest[start + end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
