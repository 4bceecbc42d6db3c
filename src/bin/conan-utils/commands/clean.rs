//! `conan-utils clean` command

use anyhow::Result;

use conan_utils::conan::cache::clean_all;
use conan_utils::conan::Conan;

pub fn execute(conan: &Conan) -> Result<()> {
    clean_all(conan)?;
    eprintln!("{:>12} all packages from the Conan cache", "Removed");
    Ok(())
}
