//! conan-utils CLI - Build, cache and publish Conan recipes

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use conan_utils::conan::{Conan, ConanEnv};
use conan_utils::debug::DebugProcessors;
use conan_utils::GlobalContext;

fn main() {
    let mut debug = DebugProcessors::default();

    let result = run(&mut debug).and_then(|()| debug.finalize());
    if let Err(e) = result {
        debug.discard();
        eprintln!("error: {:?}", e);
        std::process::exit(1);
    }
}

fn run(debug: &mut DebugProcessors) -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("conan_utils=debug")
    } else {
        EnvFilter::new("conan_utils=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let mut ctx = GlobalContext::load(cli.root, cli.output_dir)?;
    ctx.set_verbose(cli.verbose);

    let _env = ConanEnv::enter(ctx.dirs());
    let conan = Conan::from_env();

    // Execute command
    match cli.command {
        Commands::InitEnv(args) => commands::env::init(&ctx, args),
        Commands::PrintEnv(args) => commands::env::print(&ctx, args),
        Commands::ExportRecipes(args) => commands::recipes::export(&ctx, &conan, args),
        Commands::UpdateSources(args) => commands::recipes::update_sources(&ctx, &conan, args),
        Commands::Build(args) => commands::build::execute(&ctx, &conan, args, debug),
        Commands::Install(args) => commands::install::execute(&ctx, &conan, args, debug),
        Commands::Upload(args) => commands::upload::execute(&ctx, &conan, args),
        Commands::StoreCache(args) => commands::cache::store(&ctx, args),
        Commands::ListCache(args) => commands::cache::list(&ctx, args),
        Commands::DeleteCache(args) => commands::cache::delete(&ctx, args),
        Commands::ProcessConanCache(args) => commands::cache::process(&ctx, &conan, args),
        Commands::UpdateMirror(args) => commands::mirror::execute(&ctx, args),
        Commands::AddRemote(args) => commands::remote::add(&conan, args),
        Commands::RemoveRemote(args) => commands::remote::remove(&conan, args),
        Commands::Clean => commands::clean::execute(&conan),
        Commands::BuildOrder(args) => commands::build_order::execute(&ctx, args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
