//! Error types for eups

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for eups operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for eups
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Command-line usage error
    #[error("Usage error: {message}")]
    Usage { message: String, help: String },

    /// Product is not declared in any searched stack
    #[error("Product {product} is not declared")]
    NoSuchProduct {
        product: String,
        #[help]
        help: Option<String>,
    },

    /// Product is declared, but not at the requested version
    #[error("Product {product} has no declared version {version}")]
    NoSuchVersion { product: String, version: String },

    /// Version record exists, but not for the requested flavor
    #[error("Product {product} {version} is not declared for flavor {flavor}")]
    NoMatchingFlavor {
        product: String,
        version: String,
        flavor: String,
    },

    /// No declared version satisfies a version expression
    #[error("No version of {product} matches \"{expr}\"")]
    NoMatchingVersion { product: String, expr: String },

    /// Table file could not be parsed
    #[error("{file}:{line}: {message}")]
    TableParse {
        file: String,
        line: usize,
        message: String,
    },

    /// Table file is missing from disk
    #[error("Table file {file} does not exist")]
    TableMissing { file: String },

    /// Two required constraints on one product cannot both be satisfied
    #[error("Inconsistent version requests for {product}: selected {selected}, but {requested} was required")]
    InconsistentVersions {
        product: String,
        selected: String,
        requested: String,
    },

    /// Dependency cycle on required edges
    #[error("Dependency cycle detected: {}", products.join(" -> "))]
    #[diagnostic(help("Check the setupRequired lines in the table files involved"))]
    Cycle {
        /// Products involved in the cycle
        products: Vec<String>,
    },

    /// Recorded session state disagrees with the current environment
    #[error("Session state mismatch for {product}: {message}")]
    StateMismatch { product: String, message: String },

    /// Could not acquire the database lock
    #[error("Database {db} is locked by another process")]
    #[diagnostic(help("If no other eups process is running, remove the lock directory under _locks/"))]
    LockBusy { db: String },

    /// Database content error
    #[error("Database error: {message}")]
    Database { message: String, help: String },

    /// Internal invariant violated
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a usage error
    pub fn usage(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create a "product not declared" error
    pub fn no_such_product(product: impl Into<String>) -> Self {
        Self::NoSuchProduct {
            product: product.into(),
            help: None,
        }
    }

    /// Create a table parse error carrying the offending line number
    pub fn table_parse(
        file: impl Into<String>,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::TableParse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    /// Create a database content error
    pub fn database(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The process exit code for this error, per the documented convention:
    /// 1 general failure, 2 usage error, 3 resolution failure,
    /// 4 database inconsistency, 9 internal error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage { .. } => 2,
            Error::NoSuchProduct { .. }
            | Error::NoSuchVersion { .. }
            | Error::NoMatchingFlavor { .. }
            | Error::NoMatchingVersion { .. }
            | Error::InconsistentVersions { .. }
            | Error::Cycle { .. }
            | Error::TableMissing { .. } => 3,
            Error::TableParse { .. } | Error::Database { .. } => 4,
            Error::Internal { .. } => 9,
            _ => 1,
        }
    }
}
