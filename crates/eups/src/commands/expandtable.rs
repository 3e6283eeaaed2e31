//! The expandtable verb
//!
//! Rewrites a table file with the dependency versions that would be
//! selected right now pinned into the `setupRequired`/`setupOptional`
//! lines. Used when publishing a product so consumers resolve the same
//! dependency set.

use camino::Utf8PathBuf;
use clap::Args;

use eups_core::config::Config;
use eups_core::env::Env;
use eups_core::resolver::{ResolveRequest, Resolver};
use eups_core::table::SetupRequest;
use eups_core::{Error, Result};

use crate::Context;

/// Arguments for the expandtable verb
#[derive(Debug, Args)]
pub struct ExpandtableArgs {
    /// Table file to expand (output goes to stdout)
    pub table: String,
}

/// Run the expandtable verb
pub fn run(ctx: &Context, args: ExpandtableArgs) -> Result<()> {
    let path = Utf8PathBuf::from(&args.table);
    let content = std::fs::read_to_string(&path)
        .map_err(|_| Error::TableMissing { file: path.to_string() })?;

    let stacks = ctx.stack_path()?;
    let databases = stacks.databases();
    let config = Config::load(stacks.stacks.first().map(|p| p.as_path()))?;
    let env = Env::from_process();

    for line in content.lines() {
        match expand_line(line, &databases, &env, &config, ctx) {
            Some(expanded) => println!("{expanded}"),
            None => println!("{line}"),
        }
    }
    Ok(())
}

/// Pin the version into one setup line, or None to pass it through.
fn expand_line(
    line: &str,
    databases: &[eups_core::db::Database],
    env: &Env,
    config: &Config,
    ctx: &Context,
) -> Option<String> {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];

    let lower = trimmed.to_lowercase();
    let name = if lower.starts_with("setuprequired") {
        "setupRequired"
    } else if lower.starts_with("setupoptional") {
        "setupOptional"
    } else {
        return None;
    };

    let open = trimmed.find('(')?;
    let close = trimmed.rfind(')')?;
    let inner = trimmed[open + 1..close].trim().trim_matches('"');

    let words: Vec<String> = inner.split_whitespace().map(str::to_string).collect();
    let request = SetupRequest::parse(&words, name == "setupOptional", "expandtable", 0).ok()?;

    // resolve exactly as setup would, then pin what it chose
    let resolver = Resolver::new(databases, env, config, &ctx.flavor);
    let resolved = resolver
        .resolve_setup(&ResolveRequest {
            product: request.product.clone(),
            version: request.version.clone(),
            version_expr: request.version_expr.clone(),
            tags: request.tags.clone(),
            flavor: ctx.flavor.clone(),
            just_this: true,
            ..ResolveRequest::default()
        })
        .ok()?;
    let marker = resolved.products().first().cloned()?;

    Some(format!(
        "{indent}{name}({} {})",
        request.product, marker.version
    ))
}
