//! The declare verb

use camino::Utf8PathBuf;
use clap::Args;

use eups_core::config::Config;
use eups_core::{Error, Result};

use crate::Context;

use super::configured;

/// Arguments for the declare verb
#[derive(Debug, Args)]
pub struct DeclareArgs {
    /// Product to declare
    pub product: String,

    /// Version to declare
    pub version: String,

    /// Installation directory, or 'none'
    #[arg(short = 'r', long = "root")]
    pub root: Option<String>,

    /// Table file (absolute, relative to the ups dir, or 'none')
    #[arg(short = 'm', long = "table")]
    pub table: Option<String>,

    /// Assign these tags to the declared version (repeatable)
    #[arg(short = 't', long = "tag")]
    pub tags: Vec<String>,
}

/// Run the declare verb. The declaration goes into the first writable
/// stack on the path.
pub fn run(ctx: &Context, args: DeclareArgs) -> Result<()> {
    let stacks = ctx.stack_path()?;
    let config = Config::load(stacks.stacks.first().map(|p| p.as_path()))?;
    let db = stacks
        .databases()
        .into_iter()
        .next()
        .map(|db| configured(db, &config))
        .ok_or_else(|| Error::usage("No stack to declare into", "set EUPS_PATH or pass -Z"))?;

    let root = match args.root.as_deref() {
        None | Some("none") => None,
        Some(dir) => {
            let path = Utf8PathBuf::from(dir);
            if !path.is_dir() {
                return Err(Error::usage(
                    format!("Product directory {path} does not exist"),
                    "declare -r must name an existing directory (or 'none')",
                ));
            }
            // store stack-relative paths when the product lives inside the stack
            let stored = path
                .strip_prefix(&db.stack_root)
                .map(|p| p.to_path_buf())
                .unwrap_or(path);
            Some(stored)
        }
    };

    // default the table file to <ups_dir>/<product>.table when present
    let table = match args.table.as_deref() {
        Some(table) => Some(table.to_string()),
        None => {
            let deduced = root.as_ref().map(|r| {
                let abs = if r.is_absolute() {
                    r.clone()
                } else {
                    db.stack_root.join(r)
                };
                abs.join("ups").join(format!("{}.table", args.product))
            });
            match deduced {
                Some(path) if path.is_file() => Some(format!("{}.table", args.product)),
                _ => None,
            }
        }
    };

    db.declare(
        &args.product,
        &args.version,
        &ctx.flavor,
        root.as_ref().map(|r| r.as_str()),
        None,
        table.as_deref(),
        &args.tags,
    )?;

    tracing::info!(
        "Declared {} {} for flavor {} in {}",
        args.product,
        args.version,
        ctx.flavor,
        db.stack_root
    );
    Ok(())
}
