//! A single recipe folder and the Conan commands run against it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::conan::cache::{cache_path, CacheFolder};
use crate::conan::Conan;
use crate::core::package_config::PackageConfig;
use crate::core::package_reference::PackageReference;
use crate::core::profiles::ConanProfiles;
use crate::debug::DebugProcessors;
use crate::util::context::Directories;

/// Build folder names a recipe may create next to its conanfile.
const LOCAL_BUILD_FOLDERS: [&str; 5] = [
    "build",
    "build-debug",
    "build-release",
    "build-relwithdebinfo",
    "build-minsizerel",
];

/// Test package folders Conan builds into but never cleans.
const TEST_PACKAGE_FOLDERS: [&str; 2] = ["test_package", "test_v1_package"];

/// Steps of a local build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    /// `conan build`
    Build,
    /// `conan export-pkg`
    ExportPkg,
}

impl BuildStep {
    fn command(&self) -> &'static str {
        match self {
            BuildStep::Build => "build",
            BuildStep::ExportPkg => "export-pkg",
        }
    }
}

/// A recipe folder bound to a package reference.
#[derive(Debug, Clone)]
pub struct ConanRecipe {
    recipe_dir: PathBuf,
    reference: PackageReference,
    config: PackageConfig,
    output_build_dir: PathBuf,
    install_dir: PathBuf,
    installed_build_dirs: Vec<PathBuf>,
}

impl ConanRecipe {
    pub fn new(
        recipe_dir: impl Into<PathBuf>,
        reference: PackageReference,
        config: PackageConfig,
        dirs: &Directories,
    ) -> Self {
        ConanRecipe {
            recipe_dir: recipe_dir.into(),
            reference,
            config,
            output_build_dir: dirs.build_dir(),
            install_dir: dirs.install_dir(),
            installed_build_dirs: Vec::new(),
        }
    }

    pub fn recipe_dir(&self) -> &Path {
        &self.recipe_dir
    }

    pub fn reference(&self) -> &PackageReference {
        &self.reference
    }

    pub fn config(&self) -> &PackageConfig {
        &self.config
    }

    pub fn is_build_tool(&self) -> bool {
        self.config.build_tool
    }

    pub fn is_python_require(&self) -> bool {
        self.config.python_require
    }

    /// Sources fetched into the recipe folder in local mode.
    pub fn local_source_dir(&self) -> PathBuf {
        self.recipe_dir.join("src")
    }

    /// Build folders to remove after building, in lookup order.
    pub fn local_build_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.output_build_dir.clone()];
        dirs.extend(LOCAL_BUILD_FOLDERS.iter().map(|f| self.recipe_dir.join(f)));
        dirs.extend(self.installed_build_dirs.iter().cloned());
        dirs
    }

    /// Test package folders that may contain `build*` directories.
    pub fn test_package_dirs(&self) -> Vec<PathBuf> {
        TEST_PACKAGE_FOLDERS
            .iter()
            .map(|f| self.recipe_dir.join(f))
            .collect()
    }

    /// Build folders recorded by [`ConanRecipe::install`].
    pub fn installed_build_dirs(&self) -> &[PathBuf] {
        &self.installed_build_dirs
    }

    fn path_arg(&self) -> String {
        self.recipe_dir.to_string_lossy().into_owned()
    }

    fn option_args(&self) -> Vec<String> {
        self.config
            .host_options()
            .into_iter()
            .flat_map(|opt| ["-o:h".to_string(), opt])
            .collect()
    }

    fn remote_args(remotes: &[String]) -> Vec<String> {
        if remotes.is_empty() {
            vec!["--no-remote".to_string()]
        } else {
            remotes
                .iter()
                .flat_map(|r| ["-r".to_string(), r.clone()])
                .collect()
        }
    }

    pub fn export_args(&self) -> Vec<String> {
        let mut args = vec!["export".to_string(), self.path_arg()];
        args.extend(self.reference.conan_args());
        args.push("--no-remote".to_string());
        args
    }

    pub fn source_args(&self) -> Vec<String> {
        let mut args = vec!["source".to_string(), self.path_arg()];
        args.extend(self.reference.conan_args());
        args
    }

    /// Arguments of a `build` or `export-pkg` step.
    ///
    /// `force_build_profile` uses the build profile for the host context.
    pub fn build_args(
        &self,
        step: BuildStep,
        profiles: &ConanProfiles,
        remotes: &[String],
        force_build_profile: bool,
    ) -> Vec<String> {
        let mut args = vec![step.command().to_string()];
        args.extend(self.reference.conan_args());
        args.push("-vvv".to_string());
        args.push("-pr:h".to_string());
        args.push(
            profiles
                .profile_for(self.is_build_tool() || force_build_profile)
                .to_string_lossy()
                .into_owned(),
        );
        args.push("-pr:b".to_string());
        args.push(profiles.build().to_string_lossy().into_owned());
        args.push("-of".to_string());
        args.push(self.output_build_dir.to_string_lossy().into_owned());
        args.extend(self.option_args());

        if step == BuildStep::Build && self.config.allow_build_missing {
            args.extend(["--build".to_string(), "missing".to_string()]);
        }

        args.extend(Self::remote_args(remotes));
        args.push(self.path_arg());
        args
    }

    /// Arguments of `conan install` for this package as a requirement.
    pub fn install_args(
        &self,
        profiles: &ConanProfiles,
        remotes: &[String],
        build_missing: bool,
    ) -> Vec<String> {
        let requires = if self.is_build_tool() {
            "--tool-requires"
        } else {
            "--requires"
        };

        let mut args = vec![
            "install".to_string(),
            "-of".to_string(),
            self.install_dir.to_string_lossy().into_owned(),
            requires.to_string(),
            self.reference.to_string(),
            "-vvv".to_string(),
            "-pr:h".to_string(),
            profiles.host().to_string_lossy().into_owned(),
            "-pr:b".to_string(),
            profiles.build().to_string_lossy().into_owned(),
            "--format".to_string(),
            "json".to_string(),
        ];

        if build_missing {
            args.extend(["--build".to_string(), "missing".to_string()]);
        }
        args.extend(Self::remote_args(remotes));
        args.extend(self.option_args());
        args
    }

    pub fn upload_args(&self, remote: &str, with_binaries: bool) -> Vec<String> {
        let mut args = vec![
            "upload".to_string(),
            "--check".to_string(),
            "--confirm".to_string(),
            "-r".to_string(),
            remote.to_string(),
            self.reference.to_string(),
        ];
        if !with_binaries {
            args.push("--only-recipe".to_string());
        }
        args
    }

    /// Export the recipe into the local cache.
    pub fn export(&self, conan: &Conan) -> Result<()> {
        eprintln!("{:>12} {}", "Exporting", self.reference);
        conan
            .run(self.export_args())
            .with_context(|| format!("failed to export `{}`", self.reference))
    }

    /// Fetch sources.
    pub fn source(&self, conan: &Conan) -> Result<()> {
        eprintln!("{:>12} {}", "Sourcing", self.reference);
        conan
            .run(self.source_args())
            .with_context(|| format!("failed to fetch sources of `{}`", self.reference))
    }

    /// Build and package the recipe, then hand the results to debug processors.
    ///
    /// Python requirements are skipped. Packages with `use-both-profiles`
    /// are built and packaged with the build profile first.
    pub fn build(
        &self,
        conan: &Conan,
        profiles: &ConanProfiles,
        remotes: &[String],
        debug: &mut DebugProcessors,
    ) -> Result<()> {
        if self.is_python_require() {
            eprintln!("{:>12} {} (python_require)", "Skipping", self.reference);
            return Ok(());
        }

        if !self.is_build_tool() && self.config.use_both_profiles {
            eprintln!("{:>12} {} with build profile", "Building", self.reference);
            self.run_step(conan, BuildStep::Build, profiles, remotes, true)?;
            self.run_step(conan, BuildStep::ExportPkg, profiles, remotes, true)?;
        }

        eprintln!("{:>12} {}", "Building", self.reference);
        self.run_step(conan, BuildStep::Build, profiles, remotes, false)?;
        self.run_step(conan, BuildStep::ExportPkg, profiles, remotes, false)?;

        debug.handle_build_completed(
            &self.reference,
            self.is_build_tool(),
            Some(&self.local_source_dir()),
            &self.local_build_dirs(),
        );
        Ok(())
    }

    fn run_step(
        &self,
        conan: &Conan,
        step: BuildStep,
        profiles: &ConanProfiles,
        remotes: &[String],
        force_build_profile: bool,
    ) -> Result<()> {
        conan
            .run(self.build_args(step, profiles, remotes, force_build_profile))
            .with_context(|| format!("`conan {}` failed for `{}`", step.command(), self.reference))
    }

    /// Install the package from the cache or remotes.
    ///
    /// The build folder of the installed binary is recorded for cleanup and
    /// handed to debug processors; failures there are only logged.
    pub fn install(
        &mut self,
        conan: &Conan,
        profiles: &ConanProfiles,
        remotes: &[String],
        build_missing: bool,
        debug: &mut DebugProcessors,
    ) -> Result<()> {
        eprintln!("{:>12} {}", "Installing", self.reference);

        let output = conan
            .command(self.install_args(profiles, remotes, build_missing))
            .capture_stdout()
            .with_context(|| format!("failed to install `{}`", self.reference))?;

        let package_id = match package_id_for(&output, &self.reference) {
            Some(id) => id,
            None => {
                tracing::warn!("no package id for `{}` in install graph", self.reference);
                return Ok(());
            }
        };
        tracing::info!("package id of {}: {}", self.reference, package_id);

        let binary_ref = format!("{}:{}", self.reference, package_id);
        let build_dir = match cache_path(conan, &binary_ref, CacheFolder::Build) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!("no build folder for `{}`: {:#}", binary_ref, e);
                return Ok(());
            }
        };
        tracing::info!("build folder: {}", build_dir.display());
        self.installed_build_dirs.push(build_dir.clone());

        let source_dir = cache_path(conan, &self.reference.to_string(), CacheFolder::Source)
            .map_err(|e| tracing::warn!("no source folder for `{}`: {:#}", self.reference, e))
            .ok();

        debug.handle_build_completed(
            &self.reference,
            self.is_build_tool(),
            source_dir.as_deref(),
            &[build_dir],
        );
        Ok(())
    }

    /// Upload the recipe, and its binaries when `with_binaries`.
    pub fn upload(&self, conan: &Conan, remote: &str, with_binaries: bool) -> Result<()> {
        conan
            .run(self.upload_args(remote, with_binaries))
            .with_context(|| format!("failed to upload `{}` to `{}`", self.reference, remote))
    }
}

/// A node of the dependency graph printed by `conan install --format json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    pub reference: String,
    pub package_id: Option<String>,
}

impl GraphNode {
    /// The consumer node (the recipe being installed).
    pub fn is_root(&self) -> bool {
        self.id == "0"
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse the graph nodes of `conan install --format json` output.
///
/// Nodes are an object keyed by id in Conan 2, or an array.
pub fn parse_graph_nodes(install_output: &str) -> Result<Vec<GraphNode>> {
    let doc: Value =
        serde_json::from_str(install_output).context("install output is not valid JSON")?;
    let nodes = doc
        .pointer("/graph/nodes")
        .context("install output has no `graph.nodes`")?;

    let entries: Vec<(Option<String>, &Value)> = match nodes {
        Value::Object(map) => map.iter().map(|(k, v)| (Some(k.clone()), v)).collect(),
        Value::Array(items) => items.iter().map(|v| (None, v)).collect(),
        _ => anyhow::bail!("`graph.nodes` is neither an object nor an array"),
    };

    let mut result = Vec::new();
    for (key, node) in entries {
        let id = node.get("id").and_then(value_to_string).or(key).unwrap_or_default();
        let reference = node
            .get("ref")
            .and_then(value_to_string)
            .unwrap_or_default();
        let package_id = node.get("package_id").and_then(value_to_string);
        result.push(GraphNode {
            id,
            reference,
            package_id,
        });
    }
    Ok(result)
}

/// Package id of the node whose `ref` contains `reference`.
pub fn package_id_for(install_output: &str, reference: &PackageReference) -> Option<String> {
    let needle = reference.to_string();
    parse_graph_nodes(install_output)
        .ok()?
        .into_iter()
        .find(|node| node.reference.contains(&needle))
        .and_then(|node| node.package_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RepoFixture;

    const GRAPH: &str = r#"{
        "graph": {
            "nodes": {
                "0": {"ref": "conanfile", "id": "0", "package_id": null},
                "1": {"ref": "zlib/1.3@audacity/stable#a1b2", "id": "1", "package_id": "5e9f"},
                "2": {"ref": "expat/2.5.0@audacity/testing#c3d4", "id": "2", "package_id": "9a8b"}
            }
        }
    }"#;

    fn fixture() -> (crate::test_support::CheckoutDir, ConanProfiles) {
        let checkout = RepoFixture::new()
            .with_file("config/profiles/build.profile", "[settings]\n")
            .create();
        let profiles = ConanProfiles::new(
            &checkout.dirs().profiles_dir(),
            Some("default"),
            Some("build"),
        )
        .unwrap();
        (checkout, profiles)
    }

    fn recipe(checkout: &crate::test_support::CheckoutDir, config: PackageConfig) -> ConanRecipe {
        let reference = PackageReference::new("zlib", "1.3").with_user_channel("audacity", "stable");
        ConanRecipe::new(
            checkout.root().join("recipes/zlib/all"),
            reference,
            config,
            &checkout.dirs(),
        )
    }

    #[test]
    fn test_export_args() {
        let (checkout, _) = fixture();
        let recipe = recipe(&checkout, PackageConfig::default());
        let args = recipe.export_args();
        assert_eq!(args[0], "export");
        assert_eq!(
            &args[2..],
            ["--version", "1.3", "--user", "audacity", "--channel", "stable", "--no-remote"]
        );
    }

    #[test]
    fn test_build_args_with_options_and_build_missing() {
        let (checkout, profiles) = fixture();
        let config = PackageConfig {
            options: Some("shared=True fPIC=False".into()),
            allow_build_missing: true,
            ..Default::default()
        };
        let recipe = recipe(&checkout, config);

        let build = recipe.build_args(BuildStep::Build, &profiles, &[], false);
        let joined = build.join(" ");
        assert!(joined.starts_with("build --version 1.3"));
        assert!(joined.contains("-o:h shared=True -o:h fPIC=False"));
        assert!(joined.contains("--build missing"));
        assert!(joined.contains("--no-remote"));
        assert!(joined.contains(&format!("-pr:h {}", profiles.host().display())));
        assert_eq!(build.last().unwrap(), &recipe.recipe_dir().to_string_lossy());

        let export_pkg = recipe.build_args(BuildStep::ExportPkg, &profiles, &["center".into()], false);
        let joined = export_pkg.join(" ");
        assert!(joined.starts_with("export-pkg"));
        assert!(!joined.contains("--build missing"));
        assert!(joined.contains("-r center"));
    }

    #[test]
    fn test_build_tool_uses_build_profile() {
        let (checkout, profiles) = fixture();
        let recipe = recipe(
            &checkout,
            PackageConfig {
                build_tool: true,
                ..Default::default()
            },
        );

        let args = recipe.build_args(BuildStep::Build, &profiles, &[], false);
        let joined = args.join(" ");
        assert!(joined.contains(&format!("-pr:h {}", profiles.build().display())));

        let install = recipe.install_args(&profiles, &[], false).join(" ");
        assert!(install.contains("--tool-requires zlib/1.3@audacity/stable"));
    }

    #[test]
    fn test_upload_args() {
        let (checkout, _) = fixture();
        let recipe = recipe(&checkout, PackageConfig::default());
        assert_eq!(
            recipe.upload_args("recipes", false).join(" "),
            "upload --check --confirm -r recipes zlib/1.3@audacity/stable --only-recipe"
        );
        assert!(!recipe
            .upload_args("binaries", true)
            .contains(&"--only-recipe".to_string()));
    }

    #[test]
    fn test_local_build_dirs() {
        let (checkout, _) = fixture();
        let recipe = recipe(&checkout, PackageConfig::default());
        let dirs = recipe.local_build_dirs();
        assert_eq!(dirs[0], checkout.dirs().build_dir());
        assert!(dirs.contains(&checkout.root().join("recipes/zlib/all/build-release")));
        assert_eq!(dirs.len(), 6);
    }

    #[test]
    fn test_parse_graph_nodes() {
        let nodes = parse_graph_nodes(GRAPH).unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(nodes.iter().any(|n| n.is_root()));

        let array = r#"{"graph": {"nodes": [{"id": 0, "ref": ""}, {"id": 1, "ref": "a/1", "package_id": "x"}]}}"#;
        let nodes = parse_graph_nodes(array).unwrap();
        assert!(nodes[0].is_root());
        assert_eq!(nodes[1].package_id.as_deref(), Some("x"));
    }

    #[test]
    fn test_package_id_for() {
        let zlib = PackageReference::new("zlib", "1.3").with_user_channel("audacity", "stable");
        assert_eq!(package_id_for(GRAPH, &zlib).as_deref(), Some("5e9f"));

        let missing = PackageReference::new("qt", "6.5").with_user_channel("audacity", "stable");
        assert_eq!(package_id_for(GRAPH, &missing), None);
        assert_eq!(package_id_for("not json", &zlib), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_install_records_build_folder() {
        let (checkout, profiles) = fixture();
        let fake = crate::test_support::FakeConan::install(checkout.root());
        fake.respond("install.json", GRAPH);
        let mut recipe = recipe(&checkout, PackageConfig::default());
        let mut debug = DebugProcessors::default();

        recipe
            .install(&fake.conan(), &profiles, &[], false, &mut debug)
            .unwrap();

        assert_eq!(recipe.installed_build_dirs(), [fake.cache_folder("build")]);
        assert!(fake
            .calls()
            .iter()
            .any(|c| c == "cache path zlib/1.3@audacity/stable:5e9f --folder build"));
    }
}
