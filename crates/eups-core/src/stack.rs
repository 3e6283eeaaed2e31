//! Stack path assembly
//!
//! The stack path is the ordered list of stacks (directories containing
//! `ups_db/`) searched for products; earlier entries shadow later ones.
//! It comes from `-Z`, or `EUPS_PATH`, or `EUPS_DIR`, optionally filtered
//! by a `-z` substring. Each stack gets a per-user overlay directory under
//! `~/.eups/ups_db/` for user-scope tags.

use camino::{Utf8Path, Utf8PathBuf};

use crate::db::{Database, UPS_DB};
use crate::{Error, Result};

/// The ordered stacks in use for one invocation.
#[derive(Debug, Clone)]
pub struct StackPath {
    pub stacks: Vec<Utf8PathBuf>,
}

impl StackPath {
    /// Assemble the stack path. `explicit` is a `-Z` override (colon
    /// separated), `select` a `-z` substring filter.
    pub fn discover(explicit: Option<&str>, select: Option<&str>) -> Result<StackPath> {
        let raw = match explicit {
            Some(path) => path.to_string(),
            None => std::env::var("EUPS_PATH")
                .or_else(|_| std::env::var("EUPS_DIR"))
                .map_err(|_| {
                    Error::usage(
                        "No product stacks configured",
                        "set EUPS_PATH (or EUPS_DIR), or pass -Z <stack>",
                    )
                })?,
        };

        let mut stacks = Vec::new();
        for entry in raw.split(':').filter(|s| !s.is_empty()) {
            if let Some(token) = select {
                if !entry.contains(token) {
                    continue;
                }
            }
            let stack = Utf8PathBuf::from(entry);
            if !stack.join(UPS_DB).is_dir() {
                tracing::warn!("{stack} has no {UPS_DB} directory; ignoring");
                continue;
            }
            if !stacks.contains(&stack) {
                stacks.push(stack);
            }
        }

        if stacks.is_empty() {
            return Err(Error::usage(
                format!("No usable product stacks in \"{raw}\""),
                "each stack must contain a ups_db directory",
            ));
        }

        Ok(StackPath { stacks })
    }

    /// Build from known-good directories (tests, `-r` setups).
    pub fn from_dirs(stacks: Vec<Utf8PathBuf>) -> StackPath {
        StackPath { stacks }
    }

    /// Databases in search order, each with its user-tag overlay.
    pub fn databases(&self) -> Vec<Database> {
        self.stacks
            .iter()
            .map(|stack| Database::new(stack, user_tag_root_for(stack)))
            .collect()
    }
}

/// The per-user data directory: `$EUPS_USERDATA` or `~/.eups`.
pub fn user_data_dir() -> Option<Utf8PathBuf> {
    if let Ok(dir) = std::env::var("EUPS_USERDATA") {
        if !dir.is_empty() {
            return Some(Utf8PathBuf::from(dir));
        }
    }
    let home = dirs::home_dir()?;
    Utf8PathBuf::from_path_buf(home.join(".eups")).ok()
}

/// Where user-scope chain files for one stack live:
/// `~/.eups/ups_db/<stack path minus leading slash>`.
pub fn user_tag_root_for(stack: &Utf8Path) -> Option<Utf8PathBuf> {
    let base = user_data_dir()?.join(UPS_DB);
    let id = stack.as_str().trim_start_matches('/');
    Some(base.join(id))
}
