mod pod;
mod request;

pub use pod::{Container, ContainerState, ContainerStatus, Pod, PodSpec, PodStatus};
pub use request::{ConsoleRequest, ContainerRequest, PTMX_PATH, PTS_PTMX_PATH};
