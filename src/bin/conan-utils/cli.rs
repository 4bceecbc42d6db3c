//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use conan_utils::core::platform::Platform;
use conan_utils::debug::ProcessorKind;
use conan_utils::util::archive::Compression;

/// conan-utils - Build, cache and publish Conan recipes for an application's dependencies
#[derive(Parser)]
#[command(name = "conan-utils")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Recipes checkout holding `config/` and `recipes/` (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Directory for the Conan environment and scratch files (defaults to `.conan_utils`)
    #[arg(long, global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the Python environment with Conan installed
    InitEnv(InitEnvArgs),

    /// Print details of the Conan environment
    PrintEnv(PrintEnvArgs),

    /// Export recipes to the local Conan cache
    ExportRecipes(RecipesArgs),

    /// Fetch recipe sources
    UpdateSources(RecipesArgs),

    /// Build packages from source
    Build(BuildArgs),

    /// Install packages or a consumer recipe
    Install(InstallArgs),

    /// Upload recipes and binaries to the Conan remotes
    Upload(UploadArgs),

    /// Bundle the Conan cache and store it in the artifact store
    StoreCache(StoreCacheArgs),

    /// List cache bundles of a group
    ListCache(ListCacheArgs),

    /// Delete cache bundles
    DeleteCache(DeleteCacheArgs),

    /// Upload the packages of every cache bundle in a group
    ProcessConanCache(ProcessConanCacheArgs),

    /// Mirror recipe sources to the artifact store
    UpdateMirror(UpdateMirrorArgs),

    /// Add a Conan remote, or update its URL
    AddRemote(AddRemoteArgs),

    /// Remove a Conan remote
    RemoveRemote(RemoveRemoteArgs),

    /// Remove all packages from the Conan cache
    Clean,

    /// Print the packages of a build order
    BuildOrder(BuildOrderArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct InitEnvArgs {
    /// Remove an existing environment and Conan home first
    #[arg(long)]
    pub clean: bool,
}

#[derive(Args)]
pub struct PrintEnvArgs {
    /// Print the path of the Conan executable
    #[arg(long)]
    pub path: bool,

    /// Print the Conan home directory
    #[arg(long)]
    pub home: bool,

    /// Print the Conan version
    #[arg(long)]
    pub version: bool,
}

#[derive(Args)]
pub struct RecipesArgs {
    /// Process every version of every recipe
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct ProfileArgs {
    /// Host profile, by name or path
    #[arg(long, value_name = "PROFILE")]
    pub profile_host: Option<String>,

    /// Build profile, by name or path (defaults to the host profile)
    #[arg(long, value_name = "PROFILE")]
    pub profile_build: Option<String>,
}

#[derive(Args)]
pub struct DebugArgs {
    /// Debug processor to run on built packages (can be repeated)
    #[arg(long = "debug-processor", value_name = "NAME")]
    pub debug_processors: Vec<ProcessorKind>,

    /// Keep harvested debug data instead of uploading it
    #[arg(long)]
    pub skip_debug_upload: bool,
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub profiles: ProfileArgs,

    /// Build a single package instead of the build order
    #[arg(long)]
    pub package: Option<String>,

    /// Version of the package (defaults to the configured version)
    #[arg(long, requires = "package")]
    pub version: Option<String>,

    /// Export recipes before building
    #[arg(long)]
    pub export_recipes: bool,

    /// Keep downloaded sources
    #[arg(long)]
    pub keep_sources: bool,

    /// Build order name or path
    #[arg(long, value_name = "NAME")]
    pub build_order: Option<PathBuf>,

    #[command(flatten)]
    pub debug: DebugArgs,
}

#[derive(Args)]
pub struct InstallArgs {
    /// Consumer recipe to install the dependencies of
    #[arg(long, value_name = "PATH")]
    pub recipe: Option<PathBuf>,

    /// Package config of the consumer recipe
    #[arg(long, value_name = "PATH", requires = "recipe")]
    pub recipe_config: Option<PathBuf>,

    #[command(flatten)]
    pub profiles: ProfileArgs,

    /// Remote to install from (can be repeated)
    #[arg(long = "remote", value_name = "NAME")]
    pub remotes: Vec<String>,

    /// Build binaries missing from the remotes
    #[arg(long)]
    pub allow_build: bool,

    /// Keep downloaded sources
    #[arg(long)]
    pub keep_sources: bool,

    /// Install a single package instead of the build order
    #[arg(long, conflicts_with = "recipe")]
    pub package: Option<String>,

    /// Version of the package (defaults to the configured version)
    #[arg(long, requires = "package")]
    pub version: Option<String>,

    /// Build order name or path
    #[arg(long, value_name = "NAME", conflicts_with = "recipe")]
    pub build_order: Option<PathBuf>,

    #[command(flatten)]
    pub debug: DebugArgs,
}

#[derive(Args)]
pub struct UploadArgs {
    /// Recipes remote URL
    #[arg(long, value_name = "URL")]
    pub recipes_remote: Option<String>,

    /// Binaries remote URL
    #[arg(long, value_name = "URL")]
    pub binaries_remote: Option<String>,

    /// Upload build tools too
    #[arg(long)]
    pub upload_build_tools: bool,

    /// Build order name or path
    #[arg(long, value_name = "NAME")]
    pub build_order: Option<PathBuf>,
}

#[derive(Args)]
pub struct ArtifactoryArgs {
    /// Repository URL
    #[arg(long = "remote", value_name = "URL")]
    pub url: Option<String>,

    /// User name
    #[arg(long)]
    pub username: Option<String>,

    /// Password
    #[arg(long)]
    pub password: Option<String>,

    /// API key (defaults to ARTIFACTORY_API_KEY)
    #[arg(long)]
    pub key: Option<String>,
}

#[derive(Args)]
pub struct StoreCacheArgs {
    /// Group the bundle belongs to
    #[arg(long)]
    pub group_id: String,

    /// Bundle name within the group
    #[arg(long)]
    pub cache_id: String,

    /// Archive compression: xz, gz, bz2 or none
    #[arg(long)]
    pub compression: Option<Compression>,

    /// Metadata file stored with the bundle
    #[arg(long, value_name = "PATH")]
    pub metadata_file: Option<PathBuf>,

    #[command(flatten)]
    pub remote: ArtifactoryArgs,
}

#[derive(Args)]
pub struct ListCacheArgs {
    /// Group to list
    #[arg(long)]
    pub group_id: String,

    #[command(flatten)]
    pub remote: ArtifactoryArgs,
}

#[derive(Args)]
pub struct DeleteCacheArgs {
    /// Group to delete from
    #[arg(long)]
    pub group_id: String,

    /// Delete only this bundle (defaults to the whole group)
    #[arg(long)]
    pub cache_id: Option<String>,

    /// Compression of the bundle to delete
    #[arg(long, requires = "cache_id")]
    pub compression: Option<Compression>,

    #[command(flatten)]
    pub remote: ArtifactoryArgs,
}

#[derive(Args)]
pub struct ProcessConanCacheArgs {
    /// Group to process
    #[arg(long)]
    pub group_id: String,

    /// Recipes remote URL
    #[arg(long, value_name = "URL")]
    pub recipes_remote: Option<String>,

    /// Binaries remote URL
    #[arg(long, value_name = "URL")]
    pub binaries_remote: Option<String>,

    #[command(flatten)]
    pub remote: ArtifactoryArgs,
}

#[derive(Args)]
pub struct UpdateMirrorArgs {
    /// Mirror every version of every recipe
    #[arg(long)]
    pub all: bool,

    #[command(flatten)]
    pub remote: ArtifactoryArgs,
}

#[derive(Args)]
pub struct AddRemoteArgs {
    /// Remote name
    #[arg(long)]
    pub name: String,

    /// Remote URL
    #[arg(long)]
    pub url: String,
}

#[derive(Args)]
pub struct RemoveRemoteArgs {
    /// Remote name
    #[arg(long)]
    pub name: String,
}

#[derive(Args)]
pub struct BuildOrderArgs {
    /// Build order name or path
    #[arg(long, value_name = "NAME")]
    pub build_order: Option<PathBuf>,

    /// Platform to resolve for (defaults to the host)
    #[arg(long)]
    pub platform: Option<Platform>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
