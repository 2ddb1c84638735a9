use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle state of a container as recorded by the sandbox engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// Created but not yet started.
    Ready,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub id: String,
    /// Host PID of the container's primary process, once started.
    pub pid: Option<i32>,
    pub state: ContainerState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    pub id: String,
    pub bundle: PathBuf,
    pub containers: Vec<ContainerStatus>,
}

impl PodStatus {
    /// Returns the only container status of this pod.
    ///
    /// A pod hosting a single OCI container must report exactly one status;
    /// any other count is an engine consistency fault.
    pub fn single_container(&self) -> Result<&ContainerStatus> {
        match self.containers.as_slice() {
            [only] => Ok(only),
            other => Err(Error::InconsistentPodStatus {
                pod_id: self.id.clone(),
                count: other.len(),
            }),
        }
    }
}

/// A container as seen right after a create or start call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub pid: Option<i32>,
}

/// Handle returned by the engine from create and start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pod {
    pub id: String,
    pub containers: Vec<Container>,
}

impl Pod {
    /// The first container of the pod, whose process the runtime monitors.
    pub fn primary_container(&self) -> Result<&Container> {
        self.containers
            .first()
            .ok_or_else(|| Error::EmptyPod(self.id.clone()))
    }
}

/// Everything the engine needs to create a pod for one container.
#[derive(Debug, Clone)]
pub struct PodSpec {
    pub id: String,
    pub bundle: PathBuf,
    /// Terminal device handed to the container, if any.
    pub console: Option<PathBuf>,
    pub pid_file: Option<PathBuf>,
    pub runtime: RuntimeConfig,
}
