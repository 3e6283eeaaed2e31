//! Verb implementations

pub mod declare;
pub mod expandtable;
pub mod flavor;
pub mod list;
pub mod path;
pub mod setup;
pub mod tags;
pub mod undeclare;
pub mod unsetup;

use eups_core::config::Config;
use eups_core::db::Database;
use eups_core::env::Env;
use eups_core::table::PrintDest;
use eups_core::Result;

use crate::shell::ShellType;

/// Apply the configured locking policy to a database handle.
pub(crate) fn configured(mut db: Database, config: &Config) -> Database {
    db.locking_enabled = config.locking.enabled;
    db.lock_retries = config.locking.retries;
    db
}

/// Serialize a finished environment delta for the calling shell, plus any
/// table-file messages. Stdout-bound messages go through the eval stream
/// as echo commands so they survive the wrapper.
pub(crate) fn emit_delta(env: &Env, messages: &[(PrintDest, String)]) -> Result<()> {
    let shell = ShellType::from_env();

    for (dest, text) in messages {
        match dest {
            PrintDest::Stdout => println!("{}", shell.render_echo(text)),
            PrintDest::Stderr => eprintln!("{text}"),
            PrintDest::Warn => tracing::warn!("{text}"),
            PrintDest::Info => tracing::info!("{text}"),
        }
    }

    for mutation in env.diff() {
        println!("{}", shell.render(&mutation));
    }
    Ok(())
}
