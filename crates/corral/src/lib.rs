//! OCI container lifecycle orchestration with terminal attachment.
//!
//! corral sits between a CLI invocation and a sandbox engine. It validates a
//! create request, optionally allocates a pseudo-terminal, has the engine
//! create and start the container, relays the terminal to the caller's
//! stdio, waits for the container process, and tears everything down in a
//! fixed order whatever the outcome.
//!
//! ```rust,no_run
//! use corral::{ContainerRequest, ConsoleRequest, Lifecycle, LocalEngine, RuntimeConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> corral::Result<()> {
//! let config = RuntimeConfig::default();
//! let engine = Arc::new(LocalEngine::new(&config)?);
//! let lifecycle = Lifecycle::new(engine, config);
//!
//! let request = ContainerRequest::new("web", "/bundles/web")
//!     .console(ConsoleRequest::Allocate);
//! let outcome = lifecycle.run(&request).await?;
//! std::process::exit(outcome.exit_code());
//! # }
//! ```

pub mod engine;
mod lifecycle;
pub mod process;
mod relay;
mod terminal;
pub mod validator;

#[cfg(test)]
mod testing;

pub use engine::{LocalEngine, ProcessConfig};
pub use lifecycle::{Lifecycle, RunOutcome};
pub use relay::Relay;
pub use terminal::{RawModeGuard, SavedTerminalState, StdinTerminal, Terminal, TerminalMode};

pub use corral_core::{
    ConsoleRequest, Container, ContainerRequest, ContainerState, ContainerStatus, Error,
    PTMX_PATH, PTS_PTMX_PATH, Pod, PodSpec, PodStatus, Result, RuntimeConfig, SandboxEngine,
};
