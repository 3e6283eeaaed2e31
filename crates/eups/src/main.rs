//! eups CLI - environment-module and package-versioning tool
//!
//! Env-mutating verbs write shell-evalable commands to stdout (the shell
//! wrapper runs `eval "$(eups setup ...)"`); everything diagnostic goes to
//! stderr.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod shell;

/// eups - manage side-by-side versions of software products
#[derive(Debug, Parser)]
#[command(name = "eups")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Assume this target platform flavor (e.g. 'Linux64')
    #[arg(short = 'f', long = "flavor", global = true)]
    flavor: Option<String>,

    /// Colon-separated list of product stacks to use (default: $EUPS_PATH)
    #[arg(short = 'Z', long = "database", global = true)]
    path: Option<String>,

    /// Only use stacks whose path contains this substring
    #[arg(short = 'z', long = "select-db", global = true)]
    select: Option<String>,

    /// Increase verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress warnings
    #[arg(short = 'q', long = "quiet", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load a product and its dependencies into the environment
    Setup(commands::setup::SetupArgs),

    /// Invert a prior setup
    Unsetup(commands::unsetup::UnsetupArgs),

    /// List declared products
    List(commands::list::ListArgs),

    /// Declare a product version into a stack
    Declare(commands::declare::DeclareArgs),

    /// Remove a product version from a stack
    Undeclare(commands::undeclare::UndeclareArgs),

    /// List known tags
    Tags(commands::tags::TagsArgs),

    /// Print the active flavor
    Flavor,

    /// Rewrite a table file with dependency versions pinned
    Expandtable(commands::expandtable::ExpandtableArgs),

    /// Print the stack path
    Path,
}

/// Shared context assembled from global options and the environment.
pub struct Context {
    pub flavor: String,
    pub path: Option<String>,
    pub select: Option<String>,
    pub verbose: i32,
}

impl Context {
    fn new(cli: &Cli) -> Context {
        // -f beats EUPS_FLAVOR beats the configured default beats the host
        let flavor = cli
            .flavor
            .clone()
            .or_else(|| std::env::var("EUPS_FLAVOR").ok().filter(|f| !f.is_empty()))
            .or_else(|| {
                eups_core::config::Config::load(None)
                    .ok()
                    .and_then(|c| c.default_flavor)
            })
            .unwrap_or_else(eups_core::flavor::native_flavor);
        Context {
            flavor,
            path: cli.path.clone(),
            select: cli.select.clone(),
            verbose: if cli.quiet { -1 } else { cli.verbose as i32 },
        }
    }

    /// The stack path for this invocation.
    pub fn stack_path(&self) -> eups_core::Result<eups_core::stack::StackPath> {
        eups_core::stack::StackPath::discover(self.path.as_deref(), self.select.as_deref())
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout is reserved for shell-evalable output; all logging goes to
    // stderr, with EUPS_DEBUG as the filter floor
    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose > 1 {
        "debug"
    } else if cli.verbose > 0 {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env("EUPS_DEBUG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_target(false),
        )
        .with(filter)
        .init();

    let ctx = Context::new(&cli);

    let result = match cli.command {
        Commands::Setup(args) => commands::setup::run(&ctx, args),
        Commands::Unsetup(args) => commands::unsetup::run(&ctx, args),
        Commands::List(args) => commands::list::run(&ctx, args),
        Commands::Declare(args) => commands::declare::run(&ctx, args),
        Commands::Undeclare(args) => commands::undeclare::run(&ctx, args),
        Commands::Tags(args) => commands::tags::run(&ctx, args),
        Commands::Flavor => commands::flavor::run(&ctx),
        Commands::Expandtable(args) => commands::expandtable::run(&ctx, args),
        Commands::Path => commands::path::run(&ctx),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fatal(e),
    }
}

fn fatal(e: eups_core::Error) -> ExitCode {
    let code = e.exit_code();
    eprintln!("eups: FATAL: {:?}", miette::Report::new(e));
    ExitCode::from(code as u8)
}
