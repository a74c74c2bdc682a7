mod installer;
mod manifest;
mod report;

use anyhow::{Context as AnyhowContext, Result};
use clap::{Parser, Subcommand};
use pyinfer_core::{infer, Options};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pyinfer")]
#[command(about = "Infer Python project dependencies from source imports", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Skip all network lookups
    #[arg(long, global = true)]
    offline: bool,

    /// Cache directory override
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer dependencies and write pyproject.toml
    Infer {
        /// Project directory (defaults to current)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Print dependencies without modifying files
        #[arg(long)]
        dry_run: bool,
    },

    /// Infer dependencies, update the manifest, and install them
    Install {
        /// Project directory (defaults to current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();

    let cancel = Arc::new(AtomicBool::new(false));
    spawn_ctrl_c_handler(cancel.clone());

    let options = Options {
        verbose: cli.verbose,
        offline: cli.offline,
        cache_dir: cli.cache_dir.clone(),
        cancel: Some(cancel),
        ..Options::default()
    };

    match cli.command.unwrap_or(Commands::Infer {
        path: PathBuf::from("."),
        dry_run: false,
    }) {
        Commands::Infer { path, dry_run } => {
            cmd_infer(&path, dry_run, &options).await?;
        }
        Commands::Install { path } => {
            cmd_install(&path, &options).await?;
        }
    }

    Ok(())
}

fn spawn_ctrl_c_handler(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, aborting lookups");
            cancel.store(true, Ordering::Relaxed);
        }
    });
}

fn resolve_root(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Project path {} does not exist", path.display()))
}

async fn cmd_infer(path: &Path, dry_run: bool, options: &Options) -> Result<()> {
    let root = resolve_root(path)?;
    let inference = infer(&root, options)
        .await
        .context("Dependency inference failed")?;

    report::print_inference(&root, &inference);

    if dry_run {
        println!("Dry run enabled. No files were modified.");
        return Ok(());
    }

    let manifest_path = manifest::write_pyproject(
        &root,
        &inference.dependencies,
        &inference.dev_dependencies,
    )?;
    println!("Updated {}", manifest_path.display());
    Ok(())
}

async fn cmd_install(path: &Path, options: &Options) -> Result<()> {
    let root = resolve_root(path)?;
    let inference = infer(&root, options)
        .await
        .context("Dependency inference failed")?;

    report::print_inference(&root, &inference);

    if inference.dependencies.is_empty() && inference.dev_dependencies.is_empty() {
        println!("No dependencies to install.");
        return Ok(());
    }

    let manifest_path = manifest::write_pyproject(
        &root,
        &inference.dependencies,
        &inference.dev_dependencies,
    )?;
    println!("Updated {}", manifest_path.display());

    let specs: Vec<String> = inference
        .dependencies
        .iter()
        .chain(inference.dev_dependencies.iter())
        .map(ToString::to_string)
        .collect();

    println!();
    println!("Installing {} packages...", specs.len());
    if installer::install_packages(&specs).await? {
        println!("Installation complete.");
    } else {
        anyhow::bail!("Installation failed");
    }
    Ok(())
}
