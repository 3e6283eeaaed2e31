//! Advisory database locking
//!
//! Writers to one stack serialize through a lock directory under
//! `ups_db/_locks/`. Creation of the directory is the atomic primitive;
//! a metadata file inside names the holder for diagnostics. Readers never
//! lock. Locking is best-effort: a stack on read-only media simply cannot
//! be written, and the error surfaces from the write itself.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const LOCKS_DIR: &str = "_locks";
const LOCK_NAME: &str = "exclusive.lock";

/// Metadata written inside the lock directory.
#[derive(Debug, Serialize, Deserialize)]
struct LockMetadata {
    pid: u32,
    command: String,
    started_at_unix: u64,
}

/// An acquired exclusive lock on one stack database. Released on drop.
#[derive(Debug)]
pub struct DbLock {
    lock_dir: Utf8PathBuf,
}

impl DbLock {
    /// Acquire the writer lock for `ups_db`, retrying over a short window
    /// before reporting `LockBusy`.
    pub fn acquire(ups_db: &Utf8Path, retries: u32) -> Result<DbLock> {
        let locks = ups_db.join(LOCKS_DIR);
        std::fs::create_dir_all(&locks)?;
        let lock_dir = locks.join(LOCK_NAME);

        for attempt in 0..=retries {
            match std::fs::create_dir(&lock_dir) {
                Ok(()) => {
                    let meta = LockMetadata {
                        pid: std::process::id(),
                        command: std::env::args().collect::<Vec<_>>().join(" "),
                        started_at_unix: std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .map(|d| d.as_secs())
                            .unwrap_or(0),
                    };
                    let body = toml::to_string(&meta).unwrap_or_default();
                    // metadata is advisory; failure to record it is not fatal
                    let _ = std::fs::write(lock_dir.join("holder"), body);
                    return Ok(DbLock { lock_dir });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt < retries {
                        std::thread::sleep(Duration::from_millis(200));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(holder) = read_holder(&lock_dir) {
            tracing::warn!(
                "lock on {ups_db} held by \"{}\" (pid {})",
                holder.command,
                holder.pid
            );
        }
        Err(Error::LockBusy {
            db: ups_db.to_string(),
        })
    }
}

impl Drop for DbLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(self.lock_dir.join("holder"));
        if let Err(e) = std::fs::remove_dir(&self.lock_dir) {
            tracing::warn!("failed to release lock {}: {e}", self.lock_dir);
        }
    }
}

fn read_holder(lock_dir: &Utf8Path) -> Option<LockMetadata> {
    let body = std::fs::read_to_string(lock_dir.join("holder")).ok()?;
    toml::from_str(&body).ok()
}
