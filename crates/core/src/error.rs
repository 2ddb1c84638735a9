use nix::sys::signal::Signal;
use std::path::PathBuf;

/// Errors that can occur while driving a container through its lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing {0}")]
    MissingArgument(&'static str),

    #[error("container ID '{0}' already in use, unique ID should be provided")]
    DuplicateContainer(String),

    #[error("container ID '{0}' does not exist")]
    UnknownContainer(String),

    #[error("invalid bundle path '{}': {reason}", path.display())]
    InvalidBundle { path: PathBuf, reason: String },

    #[error("failed to allocate terminal: {0}")]
    TerminalAllocation(String),

    #[error("sandbox failed to create pod: {0}")]
    SandboxCreate(String),

    #[error("sandbox failed to start pod: {0}")]
    SandboxStart(String),

    #[error("pod '{0}' has no containers")]
    EmptyPod(String),

    #[error("failed to wait on process {pid}: {reason}")]
    ProcessWait { pid: i32, reason: String },

    #[error("pod '{pod_id}' reports {count} container statuses, expecting exactly one")]
    InconsistentPodStatus { pod_id: String, count: usize },

    #[error("cleanup failed: {0}")]
    Cleanup(String),

    #[error("sandbox engine error: {0}")]
    Engine(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("interrupted by {0}")]
    Interrupted(Signal),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code reported for this error.
    ///
    /// Codes stay clear of 1 (generic failure) and of the 128+ range used for
    /// signal-terminated container processes. An interrupted run reports
    /// `128 + signal` like a shell would.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MissingArgument(_) => 2,
            Error::DuplicateContainer(_) => 3,
            Error::UnknownContainer(_) => 4,
            Error::InvalidBundle { .. } => 5,
            Error::TerminalAllocation(_) => 6,
            Error::SandboxCreate(_) => 7,
            Error::SandboxStart(_) => 8,
            Error::EmptyPod(_) => 9,
            Error::ProcessWait { .. } => 10,
            Error::InconsistentPodStatus { .. } => 11,
            Error::Cleanup(_) => 12,
            Error::Engine(_) => 13,
            Error::InvalidConfig(_) => 14,
            Error::Io(_) => 15,
            Error::Interrupted(signal) => 128 + *signal as i32,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
