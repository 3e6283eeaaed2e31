//! The path verb

use eups_core::Result;

use crate::Context;

/// Run the path verb: print the stack path, one indexed entry per line.
pub fn run(ctx: &Context) -> Result<()> {
    let stacks = ctx.stack_path()?;
    for (idx, stack) in stacks.stacks.iter().enumerate() {
        println!("{idx:>3}  {stack}");
    }
    Ok(())
}
