//! The setup verb

use camino::Utf8PathBuf;
use clap::Args;

use eups_core::config::Config;
use eups_core::env::Env;
use eups_core::resolver::{ResolveRequest, Resolver};
use eups_core::stack::StackPath;
use eups_core::{Error, Result};

use crate::Context;

/// Arguments for the setup verb
#[derive(Debug, Args)]
pub struct SetupArgs {
    /// Product to set up
    pub product: String,

    /// Version, or a relational version expression (e.g. '>= 3.450')
    pub version: Option<String>,

    /// Use this tag instead of the configured preferences (repeatable)
    #[arg(short = 't', long = "tag")]
    pub tags: Vec<String>,

    /// Local product root; nothing is read from or written to a database
    #[arg(short = 'r', long = "root")]
    pub root: Option<String>,

    /// Explicit table file, or 'none'
    #[arg(short = 'm', long = "table")]
    pub table: Option<String>,

    /// Just setup the product, no dependencies
    #[arg(short = 'j', long = "just")]
    pub just: bool,

    /// Setup only the dependencies, not the product itself
    #[arg(short = 'D', long = "dependencies")]
    pub only_dependencies: bool,

    /// Force: override existing session state
    #[arg(short = 'F', long = "force")]
    pub force: bool,

    /// Ignore explicit versions in child table files
    #[arg(short = 'i', long = "ignore-versions")]
    pub ignore_versions: bool,

    /// Build type for table-file conditionals (e.g. 'build')
    #[arg(short = 'T', long = "type")]
    pub build_type: Option<String>,
}

/// Run the setup verb
pub fn run(ctx: &Context, args: SetupArgs) -> Result<()> {
    let request = to_request(ctx, &args)?;

    // -r works without any configured stacks; everything else needs them
    let stacks = match ctx.stack_path() {
        Ok(stacks) => stacks,
        Err(_) if request.product_dir.is_some() => StackPath::from_dirs(Vec::new()),
        Err(e) => return Err(e),
    };
    let databases = stacks.databases();
    let config = Config::load(stacks.stacks.first().map(|p| p.as_path()))?;

    let mut env = Env::from_process();
    env.set_force(request.force);

    let resolver = Resolver::new(&databases, &env, &config, &ctx.flavor);
    let plan = resolver.resolve_setup(&request)?;

    for marker in plan.products() {
        tracing::info!(
            "Setting up: {:<30} Flavor: {:<10} Version: {}",
            marker.product,
            marker.flavor.as_deref().unwrap_or("?"),
            marker.version
        );
    }
    if !plan.optional_failures.is_empty() {
        tracing::info!(
            "skipped optional products: {}",
            plan.optional_failures.join(", ")
        );
    }

    let messages = plan.apply(&mut env)?;
    super::emit_delta(&env, &messages)
}

/// Translate the CLI surface into a resolver request, splitting the
/// version argument into its concrete and relational parts.
fn to_request(ctx: &Context, args: &SetupArgs) -> Result<ResolveRequest> {
    let mut request = ResolveRequest {
        product: args.product.clone(),
        tags: args.tags.clone(),
        flavor: ctx.flavor.clone(),
        build_type: args.build_type.clone(),
        product_dir: args.root.as_ref().map(canonical_dir).transpose()?,
        table_file: match args.table.as_deref() {
            None | Some("none") => None,
            Some(table) => Some(Utf8PathBuf::from(table)),
        },
        just_this: args.just,
        only_dependencies: args.only_dependencies,
        ignore_child_versions: args.ignore_versions,
        force: args.force,
        ..ResolveRequest::default()
    };

    if let Some(version) = &args.version {
        let version = version.trim();
        // "concrete [expr]" / "[expr]" / bare expression / bare version
        if let Some(open) = version.find('[') {
            let close = version.rfind(']').ok_or_else(|| {
                Error::usage(
                    format!("Unterminated [expression] in \"{version}\""),
                    "version expressions look like \"1.2 [>= 1.1]\"",
                )
            })?;
            let concrete = version[..open].trim();
            if !concrete.is_empty() {
                request.version = Some(concrete.to_string());
            }
            request.version_expr = Some(version[open + 1..close].trim().to_string());
        } else if version.contains(['<', '>', '=']) {
            request.version_expr = Some(version.to_string());
        } else {
            request.version = Some(version.to_string());
        }
    }

    Ok(request)
}

fn canonical_dir(dir: &String) -> Result<Utf8PathBuf> {
    let path = Utf8PathBuf::from(dir);
    let canon = path
        .canonicalize_utf8()
        .map_err(|e| Error::usage(format!("Bad product root {path}: {e}"), "pass -r an existing directory"))?;
    Ok(canon)
}
