//! Configuration file parsing and merging
//!
//! An optional `config.toml` under the user data directory (`~/.eups`)
//! customizes tag preferences and locking behavior. A per-stack
//! `<stack>/site/config.toml` provides site defaults; the user file merges
//! over it.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::stack::user_data_dir;
use crate::Result;

/// Main configuration structure for eups
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tags tried, in order, when no version or tag is requested
    pub preferred_tags: Vec<String>,

    /// Flavor override applied when `EUPS_FLAVOR` is unset
    pub default_flavor: Option<String>,

    /// Database locking settings
    pub locking: LockingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_tags: vec!["current".to_string()],
            default_flavor: None,
            locking: LockingConfig::default(),
        }
    }
}

/// Database locking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockingConfig {
    /// Whether writers take the advisory lock at all
    pub enabled: bool,

    /// Retries before giving up with a lock-busy error
    pub retries: u32,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retries: 5,
        }
    }
}

impl Config {
    /// Load configuration for an invocation: defaults, overlaid by the
    /// first stack's site config, overlaid by the user config.
    pub fn load(first_stack: Option<&Utf8Path>) -> Result<Config> {
        let mut config = Config::default();

        if let Some(stack) = first_stack {
            let site = stack.join("site").join("config.toml");
            if site.is_file() {
                config.merge(toml::from_str(&std::fs::read_to_string(&site)?)?);
            }
        }

        if let Some(user_dir) = user_data_dir() {
            let user = user_dir.join("config.toml");
            if user.is_file() {
                config.merge(toml::from_str(&std::fs::read_to_string(&user)?)?);
            }
        }

        Ok(config)
    }

    /// Overlay `other` onto self. List and option fields replace wholesale
    /// when non-default; scalars always replace.
    fn merge(&mut self, other: Config) {
        if other.preferred_tags != Config::default().preferred_tags {
            self.preferred_tags = other.preferred_tags;
        }
        if other.default_flavor.is_some() {
            self.default_flavor = other.default_flavor;
        }
        self.locking = other.locking;
    }
}
