mod commands;

use clap::{Args, Parser, Subcommand};
use commands::{delete, list, run, state, version};
use corral::{Lifecycle, LocalEngine, RuntimeConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "corral")]
#[command(about = "An OCI container runtime")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Path to a TOML runtime configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding container state (overrides the configuration file)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Log filter such as "debug" or "corral=trace" (defaults to RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

impl GlobalArgs {
    pub fn runtime_config(&self) -> corral::Result<RuntimeConfig> {
        let mut config = match &self.config {
            Some(path) => RuntimeConfig::load(path)?,
            None => RuntimeConfig::default(),
        };
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        Ok(config)
    }

    pub fn lifecycle(&self, config: RuntimeConfig) -> corral::Result<Lifecycle> {
        let engine = Arc::new(LocalEngine::new(&config)?);
        Ok(Lifecycle::new(engine, config))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create and run a container
    Run(run::RunArgs),

    /// Show the state of a container
    State(state::StateArgs),

    /// Delete a container's resources
    Delete(delete::DeleteArgs),

    /// List containers
    List(list::ListArgs),

    /// Show version information
    Version(version::VersionArgs),
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    // Container output owns stdout.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.log_level.as_deref());

    // Exit directly: the stdin relay thread may still be blocked on a read.
    match dispatch(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:?}");
            std::process::exit(exit_code(&e));
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let global = cli.global;
    match cli.command {
        Commands::Run(args) => return run::run(&global, args).await,
        Commands::State(args) => state::run(&global, args).await?,
        Commands::Delete(args) => delete::run(&global, args).await?,
        Commands::List(args) => list::run(&global, args).await?,
        Commands::Version(args) => version::run(&global, args)?,
    }
    Ok(0)
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<corral::Error>()
        .map_or(1, corral::Error::exit_code)
}
