use async_trait::async_trait;
use corral_core::{
    Container, ContainerState, ContainerStatus, Error, Pod, PodSpec, PodStatus, Result,
    SandboxEngine,
};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;

/// In-memory engine that records every call it receives.
#[derive(Default)]
pub(crate) struct MockEngine {
    pods: Mutex<Vec<PodStatus>>,
    calls: Mutex<Vec<String>>,
    consoles: Mutex<Vec<Option<PathBuf>>>,
    pids: Mutex<Vec<i32>>,
    fail_create: bool,
    fail_start: bool,
    fail_delete: bool,
    empty_start: bool,
    script: Option<String>,
}

impl MockEngine {
    pub(crate) fn with_pods(ids: &[&str]) -> Self {
        let pods = ids.iter().map(|id| pod_status(id, 1)).collect();
        Self {
            pods: Mutex::new(pods),
            ..Default::default()
        }
    }

    pub(crate) fn with_status(status: PodStatus) -> Self {
        Self {
            pods: Mutex::new(vec![status]),
            ..Default::default()
        }
    }

    pub(crate) fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub(crate) fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub(crate) fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub(crate) fn empty_start(mut self) -> Self {
        self.empty_start = true;
        self
    }

    /// Starts `/bin/sh -c script` as the container process, with the pod's
    /// console (if any) as its stdio. Force-deleting the pod kills it.
    pub(crate) fn running(mut self, script: &str) -> Self {
        self.script = Some(script.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn consoles(&self) -> Vec<Option<PathBuf>> {
        self.consoles.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

pub(crate) fn pod_status(id: &str, containers: usize) -> PodStatus {
    PodStatus {
        id: id.to_string(),
        bundle: PathBuf::from("/bundle"),
        containers: (0..containers)
            .map(|i| ContainerStatus {
                id: if i == 0 {
                    id.to_string()
                } else {
                    format!("{id}-{i}")
                },
                pid: None,
                state: ContainerState::Running,
            })
            .collect(),
    }
}

#[async_trait]
impl SandboxEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn list_pods(&self) -> Result<Vec<PodStatus>> {
        self.record("list_pods");
        Ok(self.pods.lock().unwrap().clone())
    }

    async fn create_pod(&self, spec: &PodSpec) -> Result<Pod> {
        self.record("create_pod");
        self.consoles.lock().unwrap().push(spec.console.clone());
        if self.fail_create {
            return Err(Error::Engine("create refused".to_string()));
        }
        self.pods.lock().unwrap().push(pod_status(&spec.id, 1));
        Ok(Pod {
            id: spec.id.clone(),
            containers: vec![Container {
                id: spec.id.clone(),
                pid: None,
            }],
        })
    }

    async fn start_pod(&self, pod_id: &str) -> Result<Pod> {
        self.record("start_pod");
        if self.fail_start {
            return Err(Error::Engine("start refused".to_string()));
        }
        if self.empty_start {
            return Ok(Pod {
                id: pod_id.to_string(),
                containers: vec![],
            });
        }
        let pid = match &self.script {
            Some(script) => {
                let mut cmd = Command::new("/bin/sh");
                cmd.arg("-c").arg(script);
                let console = self.consoles.lock().unwrap().last().cloned().flatten();
                if let Some(console) = console {
                    let tty = OpenOptions::new()
                        .read(true)
                        .write(true)
                        .custom_flags(libc::O_NOCTTY)
                        .open(console)?;
                    cmd.stdin(Stdio::from(tty.try_clone()?))
                        .stdout(Stdio::from(tty.try_clone()?))
                        .stderr(Stdio::from(tty));
                }
                let pid = cmd.spawn()?.id() as i32;
                self.pids.lock().unwrap().push(pid);
                Some(pid)
            }
            None => None,
        };
        Ok(Pod {
            id: pod_id.to_string(),
            containers: vec![Container {
                id: pod_id.to_string(),
                pid,
            }],
        })
    }

    async fn stop_container(&self, pod_id: &str, container_id: &str) -> Result<ContainerStatus> {
        self.record("stop_container");
        let pods = self.pods.lock().unwrap();
        pods.iter()
            .find(|p| p.id == pod_id)
            .and_then(|p| p.containers.iter().find(|c| c.id == container_id))
            .map(|c| ContainerStatus {
                state: ContainerState::Stopped,
                ..c.clone()
            })
            .ok_or_else(|| Error::UnknownContainer(container_id.to_string()))
    }

    async fn delete_pod(&self, pod_id: &str, force: bool) -> Result<()> {
        self.record(if force { "delete_pod(force)" } else { "delete_pod" });
        if self.fail_delete {
            return Err(Error::Engine("delete refused".to_string()));
        }
        if force {
            for pid in self.pids.lock().unwrap().drain(..) {
                let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
            }
        }
        self.pods.lock().unwrap().retain(|p| p.id != pod_id);
        Ok(())
    }

    async fn pod_status(&self, pod_id: &str) -> Result<PodStatus> {
        self.record("pod_status");
        self.pods
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == pod_id)
            .cloned()
            .ok_or_else(|| Error::UnknownContainer(pod_id.to_string()))
    }
}
