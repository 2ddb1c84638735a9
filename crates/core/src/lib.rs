pub mod async_fd;
pub mod config;
pub mod engine;
pub mod error;
pub mod types;

pub use async_fd::AsyncOwnedFd;
pub use config::{DEFAULT_ROOT, RuntimeConfig};
pub use engine::SandboxEngine;
pub use error::{Error, Result};
pub use types::{
    ConsoleRequest, Container, ContainerRequest, ContainerState, ContainerStatus, PTMX_PATH,
    PTS_PTMX_PATH, Pod, PodSpec, PodStatus,
};
