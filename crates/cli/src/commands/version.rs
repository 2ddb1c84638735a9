//! The `version` command - shows the runtime version and the engine it drives.

use crate::GlobalArgs;
use clap::Args;
use corral::{RuntimeConfig, SandboxEngine};

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output in JSON format
    #[arg(long)]
    json: bool,
}

pub fn run(global: &GlobalArgs, args: VersionArgs) -> anyhow::Result<()> {
    let config = global.runtime_config()?;
    let lifecycle = global.lifecycle(config.clone())?;
    let engine = lifecycle.engine().name();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report(engine, &config))?);
    } else {
        println!("corral {}", env!("CARGO_PKG_VERSION"));
        println!("engine: {engine}");
        println!("root: {}", config.root.display());
        println!("stop signal: {}", config.stop_signal);
    }
    Ok(())
}

fn report(engine: &str, config: &RuntimeConfig) -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "engine": engine,
        "root": config.root,
        "stop_signal": config.stop_signal,
    })
}
