//! `conan-utils upload` command

use anyhow::Result;

use conan_utils::conan::Conan;
use conan_utils::core::build_order::load_build_order;
use conan_utils::ops::{upload_all, UploadOptions};
use conan_utils::GlobalContext;

use crate::cli::UploadArgs;

pub fn execute(ctx: &GlobalContext, conan: &Conan, args: UploadArgs) -> Result<()> {
    let packages = load_build_order(ctx.dirs(), args.build_order.as_deref(), ctx.platform())?;
    let opts = UploadOptions {
        recipes_remote: args.recipes_remote,
        binaries_remote: args.binaries_remote,
        upload_build_tools: args.upload_build_tools,
    };

    upload_all(ctx, conan, &opts, &packages)?;
    eprintln!("{:>12} {} packages", "Uploaded", packages.len());
    Ok(())
}
