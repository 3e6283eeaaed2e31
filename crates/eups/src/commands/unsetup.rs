//! The unsetup verb

use clap::Args;

use eups_core::config::Config;
use eups_core::env::Env;
use eups_core::resolver::Resolver;
use eups_core::stack::StackPath;
use eups_core::Result;

use crate::Context;

/// Arguments for the unsetup verb
#[derive(Debug, Args)]
pub struct UnsetupArgs {
    /// Product to unsetup
    pub product: String,

    /// Version expected to be setup (checked against the session)
    pub version: Option<String>,

    /// Just unsetup the product, no dependencies
    #[arg(short = 'j', long = "just")]
    pub just: bool,
}

/// Run the unsetup verb
pub fn run(ctx: &Context, args: UnsetupArgs) -> Result<()> {
    // unsetup must keep working even when no database is reachable: the
    // recorded markers carry enough to build a best-effort inverse plan
    let stacks = ctx
        .stack_path()
        .unwrap_or_else(|_| StackPath::from_dirs(Vec::new()));
    let databases = stacks.databases();
    let config = Config::load(stacks.stacks.first().map(|p| p.as_path()))?;

    let mut env = Env::from_process();

    if let (Some(expected), Some(value)) = (
        &args.version,
        env.get(&eups_core::product::setup_env_name(&args.product)),
    ) {
        if let Ok(marker) = eups_core::session::SessionMarker::parse(&args.product, value) {
            if &marker.version != expected {
                tracing::warn!(
                    "You asked to unsetup {} {expected} but version {} is currently setup; \
                     unsetting up {}",
                    args.product,
                    marker.version,
                    marker.version
                );
            }
        }
    }

    let resolver = Resolver::new(&databases, &env, &config, &ctx.flavor);
    let plan = resolver.resolve_unsetup(&args.product, args.just)?;

    for step in &plan.steps {
        if let eups_core::resolver::PlanStep::Unsetup { product } = step {
            tracing::info!("Unsetting up: {product}");
        }
    }

    let messages = plan.apply(&mut env)?;
    super::emit_delta(&env, &messages)
}
