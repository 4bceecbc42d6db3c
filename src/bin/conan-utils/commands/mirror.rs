//! `conan-utils update-mirror` command

use anyhow::Result;

use conan_utils::ops::update_mirror;
use conan_utils::GlobalContext;

use crate::cli::UpdateMirrorArgs;

pub fn execute(ctx: &GlobalContext, args: UpdateMirrorArgs) -> Result<()> {
    let client = args.remote.mirror_remote().client(ctx)?;
    let updated = update_mirror(ctx, &client, args.all)?;
    eprintln!("{:>12} {} conandata files", "Updated", updated);
    Ok(())
}
