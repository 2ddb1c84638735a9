use crate::error::Result;
use crate::types::{ContainerStatus, Pod, PodSpec, PodStatus};
use async_trait::async_trait;

/// The sandbox engine that owns container processes.
///
/// The runtime never creates or supervises processes itself; it drives an
/// engine through this small operation set. Each OCI container maps to a pod
/// of the same ID hosting exactly that container.
#[async_trait]
pub trait SandboxEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn list_pods(&self) -> Result<Vec<PodStatus>>;

    /// Creates a pod. Must fail with [`Error::DuplicateContainer`] if a pod
    /// with the same ID exists, checked atomically with the creation.
    ///
    /// [`Error::DuplicateContainer`]: crate::Error::DuplicateContainer
    async fn create_pod(&self, spec: &PodSpec) -> Result<Pod>;

    /// Starts every container in the pod; the returned pod carries their PIDs.
    async fn start_pod(&self, pod_id: &str) -> Result<Pod>;

    async fn stop_container(&self, pod_id: &str, container_id: &str) -> Result<ContainerStatus>;

    async fn delete_pod(&self, pod_id: &str, force: bool) -> Result<()>;

    async fn pod_status(&self, pod_id: &str) -> Result<PodStatus>;
}
