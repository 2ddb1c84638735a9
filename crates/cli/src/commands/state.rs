//! The `state` command - prints a container's status as JSON.

use crate::GlobalArgs;
use clap::Args;

#[derive(Args, Debug)]
pub struct StateArgs {
    container_id: String,
}

pub async fn run(global: &GlobalArgs, args: StateArgs) -> anyhow::Result<()> {
    let lifecycle = global.lifecycle(global.runtime_config()?)?;
    let status = lifecycle.state(&args.container_id).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
