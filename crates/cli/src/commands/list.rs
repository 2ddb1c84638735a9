//! The `list` command - shows known containers.

use crate::GlobalArgs;
use clap::Args;
use corral::{ContainerState, PodStatus};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output in JSON format
    #[arg(long)]
    json: bool,
}

pub async fn run(global: &GlobalArgs, args: ListArgs) -> anyhow::Result<()> {
    let lifecycle = global.lifecycle(global.runtime_config()?)?;
    let pods = lifecycle.list().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&pods)?);
    } else {
        print_text(&pods);
    }
    Ok(())
}

fn print_text(pods: &[PodStatus]) {
    println!("{:<24} {:<8} {:<8} BUNDLE", "ID", "PID", "STATUS");
    for pod in pods {
        for container in &pod.containers {
            let pid = container
                .pid
                .map_or("-".to_string(), |pid| pid.to_string());
            println!(
                "{:<24} {:<8} {:<8} {}",
                container.id,
                pid,
                state_name(container.state),
                pod.bundle.display()
            );
        }
    }
}

fn state_name(state: ContainerState) -> &'static str {
    match state {
        ContainerState::Ready => "created",
        ContainerState::Running => "running",
        ContainerState::Stopped => "stopped",
    }
}
