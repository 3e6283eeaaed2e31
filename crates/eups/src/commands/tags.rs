//! The tags verb

use std::collections::BTreeSet;

use clap::Args;
use walkdir::WalkDir;

use eups_core::db::{Database, CHAIN_EXT};
use eups_core::Result;

use crate::Context;

/// Arguments for the tags verb
#[derive(Debug, Args)]
pub struct TagsArgs {
    /// Only show tags assigned to this product
    pub product: Option<String>,
}

/// Run the tags verb: print every tag name known to the stack path as one
/// space-separated line.
pub fn run(ctx: &Context, args: TagsArgs) -> Result<()> {
    let stacks = ctx.stack_path()?;

    let mut tags: BTreeSet<String> = BTreeSet::new();
    for db in stacks.databases() {
        if let Some(product) = &args.product {
            for p in db.list(Some(product))? {
                tags.extend(p.tags);
            }
        } else {
            collect_tags(&db, &mut tags);
        }
    }

    println!("{}", tags.into_iter().collect::<Vec<_>>().join(" "));
    Ok(())
}

/// Gather tag names from every chain file in a database, global scope and
/// user overlay both.
fn collect_tags(db: &Database, tags: &mut BTreeSet<String>) {
    let mut roots = vec![(db.path.clone(), false)];
    if let Some(user) = &db.user_tag_root {
        roots.push((user.clone(), true));
    }

    for (root, user_scope) in roots {
        for entry in WalkDir::new(&root).min_depth(2).max_depth(2) {
            let Ok(entry) = entry else { continue };
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if let Some(tag) = name.strip_suffix(&format!(".{CHAIN_EXT}")) {
                if user_scope {
                    tags.insert(format!("user:{tag}"));
                } else {
                    tags.insert(tag.to_string());
                }
            }
        }
    }
}
