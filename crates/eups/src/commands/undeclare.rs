//! The undeclare verb

use clap::Args;

use eups_core::config::Config;
use eups_core::{Error, Result};

use crate::Context;

use super::configured;

/// Arguments for the undeclare verb
#[derive(Debug, Args)]
pub struct UndeclareArgs {
    /// Product to undeclare
    pub product: String,

    /// Version to undeclare
    pub version: String,

    /// Remove this tag assignment instead of the whole declaration
    #[arg(short = 't', long = "tag")]
    pub tag: Option<String>,
}

/// Run the undeclare verb
pub fn run(ctx: &Context, args: UndeclareArgs) -> Result<()> {
    let stacks = ctx.stack_path()?;
    let config = Config::load(stacks.stacks.first().map(|p| p.as_path()))?;

    if let Some(tag) = &args.tag {
        for db in stacks.databases() {
            let db = configured(db, &config);
            if db.resolve_tag(&args.product, tag, &ctx.flavor).is_some() {
                db.unassign_tag(tag, &args.product, &ctx.flavor)?;
                tracing::info!("Removed tag {tag} from {}", args.product);
                return Ok(());
            }
        }
        return Err(Error::database(
            format!("Product {} is not tagged \"{tag}\"", args.product),
            "eups list shows current tag assignments",
        ));
    }

    for db in stacks.databases() {
        let db = configured(db, &config);
        match db.undeclare(&args.product, &args.version, &ctx.flavor) {
            Ok(()) => {
                tracing::info!(
                    "Undeclared {} {} from {}",
                    args.product,
                    args.version,
                    db.stack_root
                );
                return Ok(());
            }
            Err(Error::NoSuchVersion { .. }) | Err(Error::NoSuchProduct { .. }) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(Error::NoSuchVersion {
        product: args.product.clone(),
        version: args.version.clone(),
    })
}
