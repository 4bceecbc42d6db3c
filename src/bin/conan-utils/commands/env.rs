//! `conan-utils init-env` and `print-env` commands

use anyhow::Result;

use conan_utils::conan::env::{conan_home_path, conan_path, conan_version, create_conan_environment};
use conan_utils::GlobalContext;

use crate::cli::{InitEnvArgs, PrintEnvArgs};

pub fn init(ctx: &GlobalContext, args: InitEnvArgs) -> Result<()> {
    create_conan_environment(ctx.dirs(), args.clean)?;
    eprintln!("{:>12} Conan environment at {}", "Created", ctx.dirs().env_dir().display());
    Ok(())
}

pub fn print(ctx: &GlobalContext, args: PrintEnvArgs) -> Result<()> {
    // No flag prints everything.
    let all = !(args.path || args.home || args.version);

    if args.path || all {
        println!("{}", conan_path(ctx.dirs()).display());
    }
    if args.home || all {
        println!("{}", conan_home_path(ctx.dirs()).display());
    }
    if args.version || all {
        println!("{}", conan_version(ctx.dirs())?);
    }

    Ok(())
}
