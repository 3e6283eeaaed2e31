//! Flavor detection and matching
//!
//! A flavor classifies the host platform (`Linux64`, `DarwinX86`, ...).
//! Version and chain files are sectioned by flavor; the pseudo-flavors
//! `ANY` and `NULL` match every request.

use std::env;

/// Wildcard flavor written in table and version files.
pub const ANY: &str = "ANY";
/// The other wildcard flavor, used for flavorless products.
pub const NULL: &str = "NULL";

/// Determine the active flavor: `EUPS_FLAVOR` if set, otherwise derived
/// from the host OS and architecture.
pub fn determine_flavor() -> String {
    if let Ok(flavor) = env::var("EUPS_FLAVOR") {
        if !flavor.is_empty() {
            return flavor;
        }
    }
    native_flavor()
}

/// The flavor of the machine we are running on.
pub fn native_flavor() -> String {
    match env::consts::OS {
        "linux" => {
            if env::consts::ARCH.ends_with("64") {
                "Linux64".to_string()
            } else {
                "Linux".to_string()
            }
        }
        "macos" => {
            if env::consts::ARCH == "x86_64" {
                "DarwinX86".to_string()
            } else {
                "Darwin".to_string()
            }
        }
        other => other.to_string(),
    }
}

/// Flavors to try, in order, when looking up a product: the requested
/// flavor first, then the configured fallbacks.
pub fn fallback_flavors(flavor: &str) -> Vec<String> {
    let mut out = vec![flavor.to_string()];
    for fb in ["generic", NULL] {
        if fb != flavor {
            out.push(fb.to_string());
        }
    }
    out
}

/// Does a declared flavor section satisfy a request for `requested`?
pub fn matches(declared: &str, requested: &str) -> bool {
    declared == requested || declared == ANY || declared == NULL
}

/// Rank used when several sections match: exact beats `ANY` beats `NULL`.
pub fn match_rank(declared: &str, requested: &str) -> Option<u8> {
    if declared == requested {
        Some(0)
    } else if declared == ANY {
        Some(1)
    } else if declared == NULL {
        Some(2)
    } else {
        None
    }
}
