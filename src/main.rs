use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use asset_combiner::{BundleStatus, CombinerConfig, PrecompileBuilder};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "asset-combiner")]
#[command(about = "Combine asset bundles into content-hashed files")]
struct Cli {
  /// Log debug output
  #[arg(short, long, global = true)]
  verbose: bool,
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Combine every bundle and write the resolved bundle configuration
  Combine {
    /// Output file for the resolved bundle configuration
    config_file: PathBuf,
    /// Project root that relative configuration paths are resolved against
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
    /// Combiner configuration file (defaults to asset-combiner.json in the root)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory holding bundle definitions
    #[arg(long)]
    assets_dir: Option<PathBuf>,
    /// Only scan the top level of the assets directory
    #[arg(long)]
    no_recursive: bool,
    /// Also combine bundles only reachable through dependencies
    #[arg(long)]
    process_dependent: bool,
    /// Combine monolith bundles together with their dependencies
    #[arg(long)]
    precompile_monolith: bool,
  },
}

fn init_logging(verbose: bool) {
  let default = if verbose {
    "asset_combiner=debug"
  } else {
    "asset_combiner=info"
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> anyhow::Result<ExitCode> {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  match cli.command {
    Commands::Combine {
      config_file,
      root,
      config,
      assets_dir,
      no_recursive,
      process_dependent,
      precompile_monolith,
    } => {
      let mut settings = match config {
        Some(path) => CombinerConfig::from_path(&path)
          .with_context(|| format!("failed to load {}", path.display()))?,
        None => CombinerConfig::discover(&root),
      };
      if let Some(dir) = assets_dir {
        settings.assets_dir = dir;
      }
      settings.recursive &= !no_recursive;
      settings.process_dependent |= process_dependent;
      settings.precompile_monolith |= precompile_monolith;
      let settings = settings.rebase(&root);

      let report = PrecompileBuilder::from_config(&settings)?.build(&config_file)?;
      for outcome in &report.bundles {
        let status = match &outcome.status {
          BundleStatus::Created => "OK".to_string(),
          BundleStatus::Unchanged => "unchanged".to_string(),
          BundleStatus::Absorbed(monolith) => format!("included in '{monolith}'"),
          BundleStatus::Failed(reason) => format!("FAIL ({reason})"),
        };
        println!("Creating output bundle '{}': {status}", outcome.name);
      }

      match report.artifact {
        Some(path) => {
          println!("Output bundle configuration created at '{}'.", path.display());
          Ok(ExitCode::SUCCESS)
        }
        None => {
          eprintln!("Errors occurred during generation. Configuration file was not created.");
          Ok(ExitCode::FAILURE)
        }
      }
    }
  }
}
