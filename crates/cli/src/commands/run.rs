//! The `run` command - creates and runs a container.

use crate::GlobalArgs;
use clap::Args;
use corral::{ConsoleRequest, ContainerRequest, RunOutcome};
use std::path::PathBuf;

#[derive(Args, Debug)]
#[command(
    long_about = "Creates an instance of a container for a bundle and runs it.\n\n\
                  The bundle is a directory with a specification file named \
                  \"config.json\" and a root filesystem."
)]
pub struct RunArgs {
    /// Your name for the container instance; must be unique on this host
    container_id: Option<String>,

    /// Path to the root of the bundle directory, defaults to the current directory
    #[arg(long, short)]
    bundle: Option<PathBuf>,

    /// Path to a pseudo terminal; /dev/ptmx allocates a new one
    #[arg(long)]
    console: Option<String>,

    /// File to write the container process ID to
    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// Detach from the container's process
    #[arg(long, short)]
    detach: bool,
}

pub async fn run(global: &GlobalArgs, args: RunArgs) -> anyhow::Result<i32> {
    let config = global.runtime_config()?;
    let bundle = match args.bundle.or_else(|| config.default_bundle.clone()) {
        Some(bundle) => bundle,
        None => std::env::current_dir()?,
    };

    let mut request = ContainerRequest::new(args.container_id.unwrap_or_default(), bundle)
        .console(ConsoleRequest::from_path(
            args.console.as_deref().unwrap_or_default(),
        ))
        .detach(args.detach);
    if let Some(pid_file) = args.pid_file {
        request = request.pid_file(pid_file);
    }

    let lifecycle = global.lifecycle(config)?;
    let outcome = lifecycle.run(&request).await?;
    if let RunOutcome::Exited(code) = outcome {
        tracing::debug!(container = %request.container_id, code, "forwarding exit code");
    }
    Ok(outcome.exit_code())
}
