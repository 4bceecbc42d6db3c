//! `conan-utils build-order` command
//!
//! Prints the packages a build order resolves to, one per line.

use anyhow::Result;

use conan_utils::core::build_order::load_build_order;
use conan_utils::GlobalContext;

use crate::cli::BuildOrderArgs;

pub fn execute(ctx: &GlobalContext, args: BuildOrderArgs) -> Result<()> {
    let platform = args.platform.unwrap_or_else(|| ctx.platform().clone());
    let packages = load_build_order(ctx.dirs(), args.build_order.as_deref(), &platform)?;

    for package in packages {
        println!("{}", package);
    }
    Ok(())
}
