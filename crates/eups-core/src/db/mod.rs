//! The on-disk product database
//!
//! A stack is a directory with a `ups_db/` subdirectory; each product owns
//! a subdirectory of `ups_db/` holding `<version>.version` records and
//! `<tag>.chain` tag pointers. The layout is an external contract shared
//! with existing installs, so the readers and writers here are
//! byte-conservative.

pub mod chain_file;
pub mod database;
pub mod lock;
pub mod version_file;

pub use chain_file::ChainFile;
pub use database::Database;
pub use version_file::{FlavorInfo, VersionFile};

use camino::Utf8Path;

use crate::Result;

/// File extension for version records.
pub const VERSION_EXT: &str = "version";
/// File extension for tag pointers.
pub const CHAIN_EXT: &str = "chain";
/// Name of the database directory inside a stack.
pub const UPS_DB: &str = "ups_db";

/// The user declaring/modifying records, for file metadata.
pub(crate) fn who() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Timestamp string written into DECLARED/MODIFIED fields.
pub(crate) fn now_str() -> String {
    chrono::Local::now()
        .format("%a %b %e %H:%M:%S %Y %z")
        .to_string()
}

/// Write `content` to `path` atomically: write a temp file in the same
/// directory, then rename over the target.
pub(crate) fn atomic_write(path: &Utf8Path, content: &str) -> Result<()> {
    use std::io::Write;

    let dir = path.parent().unwrap_or(Utf8Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path.as_std_path())
        .map_err(|e| crate::Error::Io(e.error))?;
    Ok(())
}

/// Read a file, retrying a bounded number of times to tolerate a
/// rename-during-read from a concurrent writer.
pub(crate) fn read_retrying(path: &Utf8Path) -> std::io::Result<String> {
    const ATTEMPTS: usize = 3;
    for _ in 0..ATTEMPTS - 1 {
        match std::fs::read_to_string(path) {
            Ok(content) => return Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(e),
            Err(_) => {}
        }
    }
    std::fs::read_to_string(path)
}
