//! Installing packages and consumer recipes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::conan::cache::{cache_path, clean_cache, clean_cache_args, CacheFolder, CleanOptions};
use crate::conan::recipe::{parse_graph_nodes, ConanRecipe, GraphNode};
use crate::conan::recipe_store::recipe_for;
use crate::conan::Conan;
use crate::core::package_config::PackageConfig;
use crate::core::package_reference::PackageReference;
use crate::core::profiles::ConanProfiles;
use crate::debug::DebugProcessors;
use crate::ops::build::finish_with_cleanup;
use crate::util::context::GlobalContext;
use crate::util::process::is_process_failure;

/// Options for installing packages.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Remotes to install from; none means `--no-remote`.
    pub remotes: Vec<String>,
    /// Build binaries missing from the remotes.
    pub allow_build: bool,
    pub keep_sources: bool,
}

/// Arguments of `conan install` for a consumer recipe.
pub fn consumer_install_args(
    recipe_path: &Path,
    install_dir: &Path,
    profiles: &ConanProfiles,
    opts: &InstallOptions,
    host_options: &[String],
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "install".into(),
        "-of".into(),
        install_dir.to_string_lossy().into_owned(),
        "-vvv".into(),
        "-pr:h".into(),
        profiles.host().to_string_lossy().into_owned(),
        "-pr:b".into(),
        profiles.build().to_string_lossy().into_owned(),
        "--format".into(),
        "json".into(),
    ];

    if opts.allow_build {
        args.extend(["--build".into(), "missing".into()]);
    }

    if opts.remotes.is_empty() {
        args.push("--no-remote".into());
    } else {
        for remote in &opts.remotes {
            args.extend(["-r".into(), remote.clone()]);
        }
    }

    for option in host_options {
        args.extend(["-o:h".into(), option.clone()]);
    }

    args.push(recipe_path.to_string_lossy().into_owned());
    args
}

/// Install the dependencies of a consumer recipe.
///
/// Every dependency in the resulting graph is handed to the debug
/// processors. The whole Conan cache is cleaned afterwards.
pub fn install_recipe(
    ctx: &GlobalContext,
    conan: &Conan,
    recipe_path: &Path,
    config_path: Option<&Path>,
    profiles: &ConanProfiles,
    opts: &InstallOptions,
    debug: &mut DebugProcessors,
) -> Result<()> {
    let result = (|| {
        let host_options = match config_path {
            Some(path) => {
                tracing::info!("loading options from {}", path.display());
                PackageConfig::load(path)?.host_options()
            }
            None => Vec::new(),
        };

        let args = consumer_install_args(
            recipe_path,
            &ctx.dirs().install_dir(),
            profiles,
            opts,
            &host_options,
        );

        eprintln!("{:>12} {}", "Installing", recipe_path.display());
        let output = conan
            .command(args)
            .capture_stdout()
            .with_context(|| format!("failed to install `{}`", recipe_path.display()))?;

        for node in parse_graph_nodes(&output)? {
            if !node.is_root() {
                process_dependency(ctx, conan, &node, debug);
            }
        }
        Ok(())
    })();

    let clean = if opts.keep_sources {
        CleanOptions::default()
    } else {
        CleanOptions {
            all: true,
            ..Default::default()
        }
    };
    finish_with_cleanup(result, || {
        tracing::info!("cleaning Conan cache");
        conan
            .run(clean_cache_args("*", &clean))
            .context("failed to clean Conan cache")
    })
}

/// `name/version@user/channel#rev` without the revision.
fn strip_revision(reference: &str) -> &str {
    reference.split('#').next().unwrap_or(reference)
}

fn process_dependency(
    ctx: &GlobalContext,
    conan: &Conan,
    node: &GraphNode,
    debug: &mut DebugProcessors,
) {
    let reference: PackageReference = match strip_revision(&node.reference).parse() {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("skipping graph node `{}`: {}", node.reference, e);
            return;
        }
    };
    let Some(package_id) = node.package_id.as_deref() else {
        tracing::debug!("no binary for {}", reference);
        return;
    };

    tracing::info!("collecting directories for {}:{}", reference, package_id);

    let source_dir = cache_path(conan, &reference.to_string(), CacheFolder::Source)
        .map_err(|e| tracing::warn!("no source folder for `{}`: {:#}", reference, e))
        .ok()
        .filter(|p| p.is_dir());

    let build_dir = match cache_path(conan, &format!("{}:{}", reference, package_id), CacheFolder::Build) {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!("no build folder for `{}`: {:#}", reference, e);
            return;
        }
    };

    let is_build_tool = ctx
        .packages()
        .package_config(reference.name())
        .ok()
        .flatten()
        .is_some_and(|c| c.build_tool);

    debug.handle_build_completed(&reference, is_build_tool, source_dir.as_deref(), &[build_dir]);
}

/// Install one package, exporting its recipe and retrying once if Conan fails.
pub fn install_package(
    conan: &Conan,
    recipe: &mut ConanRecipe,
    profiles: &ConanProfiles,
    opts: &InstallOptions,
    debug: &mut DebugProcessors,
) -> Result<()> {
    let result = match recipe.install(conan, profiles, &opts.remotes, opts.allow_build, debug) {
        Err(e) if is_process_failure(&e) => {
            tracing::warn!("{:#}; exporting recipe and retrying", e);
            recipe
                .export(conan)
                .and_then(|()| recipe.install(conan, profiles, &opts.remotes, opts.allow_build, debug))
        }
        other => other,
    };

    let clean = CleanOptions::default().with_sources(!opts.keep_sources);
    finish_with_cleanup(result, || clean_cache(conan, recipe, &clean).map(|_| ()))
}

/// Install every package of a build order.
pub fn install_all(
    ctx: &GlobalContext,
    conan: &Conan,
    packages: &[String],
    profiles: &ConanProfiles,
    opts: &InstallOptions,
    debug: &mut DebugProcessors,
) -> Result<Vec<PathBuf>> {
    let mut build_dirs = Vec::new();
    for name in packages {
        let reference = PackageReference::resolve(ctx.packages(), name, None, None, None)?;
        let mut recipe = recipe_for(ctx, reference)?;
        install_package(conan, &mut recipe, profiles, opts, debug)?;
        build_dirs.extend(recipe.installed_build_dirs().iter().cloned());
    }
    Ok(build_dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RepoFixture;

    #[test]
    fn test_consumer_install_args() {
        let checkout = RepoFixture::new().create();
        let profiles = ConanProfiles::new(&checkout.dirs().profiles_dir(), Some("default"), None).unwrap();
        let opts = InstallOptions {
            remotes: vec!["audacity".into()],
            allow_build: true,
            keep_sources: false,
        };

        let args = consumer_install_args(
            Path::new("app/conanfile.py"),
            Path::new("out/install"),
            &profiles,
            &opts,
            &["shared=True".to_string()],
        );
        let joined = args.join(" ");
        assert!(joined.starts_with("install -of out/install -vvv -pr:h"));
        assert!(joined.contains("--format json --build missing -r audacity -o:h shared=True"));
        assert_eq!(args.last().unwrap(), "app/conanfile.py");

        let args = consumer_install_args(
            Path::new("conanfile.py"),
            Path::new("out"),
            &profiles,
            &InstallOptions::default(),
            &[],
        );
        assert!(args.contains(&"--no-remote".to_string()));
        assert!(!args.contains(&"--build".to_string()));
    }

    #[test]
    fn test_strip_revision() {
        assert_eq!(strip_revision("zlib/1.3@audacity/stable#abc"), "zlib/1.3@audacity/stable");
        assert_eq!(strip_revision("zlib/1.3"), "zlib/1.3");
    }
}

#[cfg(all(test, unix))]
mod fake_conan_tests {
    use super::*;
    use crate::core::platform::Platform;
    use crate::test_support::{CheckoutDir, FakeConan, RepoFixture};

    const GRAPH: &str = r#"{"graph": {"nodes": {
        "0": {"id": "0", "ref": "conanfile", "package_id": null},
        "1": {"id": "1", "ref": "zlib/1.3@audacity/testing#a1", "package_id": "5e9f"},
        "2": {"id": "2", "ref": "not a reference", "package_id": "77"}
    }}}"#;

    fn setup() -> (CheckoutDir, FakeConan, ConanProfiles) {
        let checkout = RepoFixture::new()
            .with_package("zlib", &["1.3"])
            .with_file("app/options.yml", "config:\n  options: \"shared=True\"\n")
            .create();
        let fake = FakeConan::install(checkout.root());
        let profiles =
            ConanProfiles::new(&checkout.dirs().profiles_dir(), Some("default"), None).unwrap();
        (checkout, fake, profiles)
    }

    #[test]
    fn test_install_recipe_collects_dependencies_and_cleans() {
        let (checkout, fake, profiles) = setup();
        fake.respond("install.json", GRAPH);
        let ctx = checkout.context(Platform::Linux);

        install_recipe(
            &ctx,
            &fake.conan(),
            &checkout.root().join("app/conanfile.py"),
            Some(&checkout.root().join("app/options.yml")),
            &profiles,
            &InstallOptions::default(),
            &mut DebugProcessors::default(),
        )
        .unwrap();

        let install = &fake.calls_starting_with("install")[0];
        assert!(install.contains("-o:h shared=True"));
        assert!(install.contains("--no-remote"));

        let paths = fake.calls_starting_with("cache path");
        assert_eq!(
            paths,
            [
                "cache path zlib/1.3@audacity/testing --folder source",
                "cache path zlib/1.3@audacity/testing:5e9f --folder build",
            ]
        );
        assert_eq!(fake.calls().last().unwrap(), "cache clean *");
    }

    #[test]
    fn test_install_recipe_cleans_after_failure() {
        let (checkout, fake, profiles) = setup();
        fake.fail_next("install");
        let ctx = checkout.context(Platform::Linux);
        let opts = InstallOptions {
            keep_sources: true,
            ..Default::default()
        };

        let err = install_recipe(
            &ctx,
            &fake.conan(),
            &checkout.root().join("app/conanfile.py"),
            None,
            &profiles,
            &opts,
            &mut DebugProcessors::default(),
        )
        .unwrap_err();

        assert!(format!("{:#}", err).contains("failed to install"));
        assert_eq!(
            fake.calls().last().unwrap(),
            "cache clean * --build --download --temp"
        );
    }

    #[test]
    fn test_install_package_retries_after_export() {
        let (checkout, fake, profiles) = setup();
        fake.fail_next("install");
        fake.respond("install.json", GRAPH);
        let ctx = checkout.context(Platform::Linux);

        let dirs = install_all(
            &ctx,
            &fake.conan(),
            &["zlib".to_string()],
            &profiles,
            &InstallOptions::default(),
            &mut DebugProcessors::default(),
        )
        .unwrap();

        let commands: Vec<String> = fake
            .calls()
            .iter()
            .filter_map(|c| c.split_whitespace().next().map(str::to_string))
            .collect();
        assert_eq!(&commands[..3], ["install", "export", "install"]);
        assert!(fake.calls_starting_with("cache clean")[0].contains("--source"));
        assert_eq!(dirs, vec![fake.cache_folder("build")]);
    }

    #[test]
    fn test_install_package_does_not_retry_twice() {
        let (checkout, fake, profiles) = setup();
        fake.fail_next("install");
        fake.fail_next("export");
        let ctx = checkout.context(Platform::Linux);

        let result = install_all(
            &ctx,
            &fake.conan(),
            &["zlib".to_string()],
            &profiles,
            &InstallOptions::default(),
            &mut DebugProcessors::default(),
        );

        assert!(result.is_err());
        assert_eq!(fake.calls_starting_with("install").len(), 1);
        assert_eq!(fake.calls_starting_with("cache clean").len(), 1);
    }
}
