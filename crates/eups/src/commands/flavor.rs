//! The flavor verb

use eups_core::Result;

use crate::Context;

/// Run the flavor verb: print the active flavor (after any `-f` override).
pub fn run(ctx: &Context) -> Result<()> {
    println!("{}", ctx.flavor);
    Ok(())
}
