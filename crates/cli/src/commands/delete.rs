//! The `delete` command - removes a container's resources.

use crate::GlobalArgs;
use clap::Args;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    container_id: String,

    /// Kill the container first if it is still running
    #[arg(long, short)]
    force: bool,
}

pub async fn run(global: &GlobalArgs, args: DeleteArgs) -> anyhow::Result<()> {
    let lifecycle = global.lifecycle(global.runtime_config()?)?;
    lifecycle.delete(&args.container_id, args.force).await?;
    Ok(())
}
