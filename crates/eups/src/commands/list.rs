//! The list verb

use clap::Args;

use eups_core::env::Env;
use eups_core::product::{setup_env_name, LOCAL_VERSION_PREFIX};
use eups_core::session::SessionMarker;
use eups_core::Result;

use crate::Context;

/// Arguments for the list verb
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Restrict the listing to one product
    pub product: Option<String>,

    /// Restrict the listing to one version
    pub version: Option<String>,

    /// Only list products that are currently setup
    #[arg(short = 's', long = "setup")]
    pub setup_only: bool,

    /// Only list directories, one per line
    #[arg(short = 'd', long = "directory")]
    pub directories: bool,
}

/// Run the list verb
pub fn run(ctx: &Context, args: ListArgs) -> Result<()> {
    let stacks = ctx.stack_path()?;
    let env = Env::from_process();

    let mut printed_any = false;
    for db in stacks.databases() {
        for product in db.list(args.product.as_deref())? {
            if let Some(version) = &args.version {
                if &product.version != version {
                    continue;
                }
            }

            let is_setup = env
                .get(&setup_env_name(&product.name))
                .and_then(|value| SessionMarker::parse(&product.name, value).ok())
                .map(|marker| marker.version == product.version)
                .unwrap_or(false);
            if args.setup_only && !is_setup {
                continue;
            }

            printed_any = true;
            if args.directories {
                println!("{}", product.dir.as_deref().map(|d| d.as_str()).unwrap_or("none"));
                continue;
            }

            let mut annotations = product.tags.clone();
            if is_setup {
                annotations.push("setup".to_string());
            }
            println!(
                "{:<21} {:<25} {:<10} {}",
                product.name,
                product.version,
                product.flavor,
                annotations.join(" ")
            );
        }
    }

    // products set up with -r live only in the environment
    for (name, value) in env.vars() {
        if !name.starts_with("SETUP_") {
            continue;
        }
        // the marker's first token carries the real product name
        let Some(product) = value.split_whitespace().next() else {
            continue;
        };
        let Ok(marker) = SessionMarker::parse(product, value) else {
            continue;
        };
        if !marker.version.starts_with(LOCAL_VERSION_PREFIX) {
            continue;
        }
        if let Some(filter) = &args.product {
            if !filter.eq_ignore_ascii_case(&marker.product) {
                continue;
            }
        }
        printed_any = true;
        if args.directories {
            println!(
                "{}",
                marker.version.trim_start_matches(LOCAL_VERSION_PREFIX)
            );
        } else {
            println!(
                "{:<21} {:<25} {:<10} setup",
                marker.product,
                marker.version,
                marker.flavor.as_deref().unwrap_or("")
            );
        }
    }

    if !printed_any {
        if let Some(product) = &args.product {
            return Err(eups_core::Error::no_such_product(product.clone()));
        }
        tracing::info!("No products declared in {:?}", stacks.stacks);
    }
    Ok(())
}
