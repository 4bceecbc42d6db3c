//! `conan-utils add-remote` and `remove-remote` commands

use anyhow::Result;

use conan_utils::conan::remotes::{add_remote, remove_remote, RemoteChange};
use conan_utils::conan::Conan;

use crate::cli::{AddRemoteArgs, RemoveRemoteArgs};

pub fn add(conan: &Conan, args: AddRemoteArgs) -> Result<()> {
    let verb = match add_remote(conan, &args.name, &args.url)? {
        RemoteChange::Added => "Added",
        RemoteChange::Updated => "Updated",
        RemoteChange::Unchanged => "Unchanged",
    };
    eprintln!("{:>12} remote {} ({})", verb, args.name, args.url);
    Ok(())
}

pub fn remove(conan: &Conan, args: RemoveRemoteArgs) -> Result<()> {
    remove_remote(conan, &args.name)?;
    eprintln!("{:>12} remote {}", "Removed", args.name);
    Ok(())
}
