use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Console path meaning "allocate a new pty for me".
pub const PTMX_PATH: &str = "/dev/ptmx";
/// Alternate spelling of [`PTMX_PATH`] through the devpts mount.
pub const PTS_PTMX_PATH: &str = "/dev/pts/ptmx";

/// What the caller asked for on `--console`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConsoleRequest {
    /// No console; the container inherits the runtime's stdio.
    #[default]
    None,
    /// Allocate a fresh pseudo-terminal and hand its slave to the container.
    Allocate,
    /// Pre-existing device passed through verbatim.
    Device(PathBuf),
}

impl ConsoleRequest {
    pub fn from_path(path: &str) -> Self {
        match path {
            "" => ConsoleRequest::None,
            PTMX_PATH | PTS_PTMX_PATH => ConsoleRequest::Allocate,
            other => ConsoleRequest::Device(PathBuf::from(other)),
        }
    }
}

/// A request to create (and optionally attach to) one container.
#[derive(Debug, Clone, Default)]
pub struct ContainerRequest {
    pub container_id: String,
    pub bundle: PathBuf,
    pub console: ConsoleRequest,
    pub pid_file: Option<PathBuf>,
    pub detach: bool,
}

impl ContainerRequest {
    pub fn new(container_id: impl Into<String>, bundle: impl AsRef<Path>) -> Self {
        Self {
            container_id: container_id.into(),
            bundle: bundle.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn console(mut self, console: ConsoleRequest) -> Self {
        self.console = console;
        self
    }

    pub fn pid_file(mut self, path: impl AsRef<Path>) -> Self {
        self.pid_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn detach(mut self, detach: bool) -> Self {
        self.detach = detach;
        self
    }
}
