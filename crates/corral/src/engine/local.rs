use super::bundle::ProcessConfig;
use async_trait::async_trait;
use corral_core::{
    Container, ContainerState, ContainerStatus, Error, Pod, PodSpec, PodStatus, Result,
    RuntimeConfig, SandboxEngine,
};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const STATE_FILE: &str = "state.json";

/// On-disk record of one pod.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PodRecord {
    id: String,
    bundle: PathBuf,
    console: Option<PathBuf>,
    pid_file: Option<PathBuf>,
    pid: Option<i32>,
    state: ContainerState,
}

impl PodRecord {
    fn status(&self) -> PodStatus {
        PodStatus {
            id: self.id.clone(),
            bundle: self.bundle.clone(),
            containers: vec![ContainerStatus {
                id: self.id.clone(),
                pid: self.pid,
                state: self.state,
            }],
        }
    }

    fn pod(&self) -> Pod {
        Pod {
            id: self.id.clone(),
            containers: vec![Container {
                id: self.id.clone(),
                pid: self.pid,
            }],
        }
    }
}

/// Runs each pod's process directly on the host, without isolation.
///
/// State lives in `<root>/<pod-id>/state.json`. Started processes are
/// children of the calling process and are never reaped here; whoever
/// drives the lifecycle waits on them.
pub struct LocalEngine {
    root: PathBuf,
    stop_signal: Signal,
}

impl LocalEngine {
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        Ok(Self {
            root: config.root.clone(),
            stop_signal: config.stop_signal()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pod_dir(&self, pod_id: &str) -> PathBuf {
        self.root.join(pod_id)
    }

    fn load(&self, pod_id: &str) -> Result<PodRecord> {
        let path = self.pod_dir(pod_id).join(STATE_FILE);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::UnknownContainer(pod_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&contents)
            .map_err(|e| Error::Engine(format!("corrupt state for {pod_id}: {e}")))
    }

    fn save(&self, record: &PodRecord) -> Result<()> {
        let dir = self.pod_dir(&record.id);
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| Error::Engine(format!("serializing state for {}: {e}", record.id)))?;
        let tmp = dir.join(format!("{STATE_FILE}.tmp"));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, dir.join(STATE_FILE))?;
        Ok(())
    }

    fn signal(&self, pid: i32, signal: Signal) -> Result<()> {
        match kill(Pid::from_raw(pid), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(Error::Engine(format!("sending {signal} to {pid}: {e}"))),
        }
    }

    fn discard(&self, pid: i32) {
        if let Err(e) = self.signal(pid, Signal::SIGKILL) {
            tracing::warn!(pid, "failed to kill untracked process: {}", e);
            return;
        }
        if let Err(e) = waitpid(Pid::from_raw(pid), None) {
            tracing::warn!(pid, "failed to reap untracked process: {}", e);
        }
    }

    fn spawn(&self, record: &PodRecord) -> Result<i32> {
        let process = ProcessConfig::load(&record.bundle)?;

        let mut cmd = Command::new(&process.args[0]);
        cmd.args(&process.args[1..])
            .current_dir(process.working_dir(&record.bundle));
        if !process.env.is_empty() {
            cmd.env_clear().envs(process.env_pairs());
        }

        if let Some(console) = &record.console {
            let tty = open_console(console)?;
            cmd.stdin(Stdio::from(tty.try_clone()?))
                .stdout(Stdio::from(tty.try_clone()?))
                .stderr(Stdio::from(tty));
            // SAFETY: pre_exec runs in the forked child before exec(). setsid()
            // and ioctl() are async-signal-safe, and fd 0 is the console opened
            // above, which becomes the new session's controlling terminal.
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setsid() < 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    if libc::ioctl(0, libc::TIOCSCTTY, 0) < 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let child = cmd
            .spawn()
            .map_err(|e| Error::Engine(format!("spawning {}: {e}", process.args[0])))?;
        Ok(child.id() as i32)
    }
}

fn open_console(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)
        .map_err(|e| Error::Engine(format!("opening console {}: {e}", path.display())))
}

fn check_pod_id(pod_id: &str) -> Result<()> {
    if pod_id.is_empty() {
        return Err(Error::MissingArgument("container ID"));
    }
    if pod_id == "." || pod_id == ".." || pod_id.contains('/') {
        return Err(Error::Engine(format!("invalid container ID '{pod_id}'")));
    }
    Ok(())
}

#[async_trait]
impl SandboxEngine for LocalEngine {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn list_pods(&self) -> Result<Vec<PodStatus>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut pods = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            match self.load(&id) {
                Ok(record) => pods.push(record.status()),
                Err(e) => tracing::warn!(pod = %id, "skipping unreadable pod state: {}", e),
            }
        }
        pods.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(pods)
    }

    async fn create_pod(&self, spec: &PodSpec) -> Result<Pod> {
        check_pod_id(&spec.id)?;
        ProcessConfig::load(&spec.bundle)?;

        std::fs::create_dir_all(&self.root)?;
        match std::fs::create_dir(self.pod_dir(&spec.id)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::DuplicateContainer(spec.id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        let record = PodRecord {
            id: spec.id.clone(),
            bundle: spec.bundle.clone(),
            console: spec.console.clone(),
            pid_file: spec.pid_file.clone(),
            pid: None,
            state: ContainerState::Ready,
        };
        if let Err(e) = self.save(&record) {
            let _ = std::fs::remove_dir_all(self.pod_dir(&spec.id));
            return Err(e);
        }

        tracing::debug!(pod = %spec.id, root = %self.root.display(), "pod created");
        Ok(record.pod())
    }

    async fn start_pod(&self, pod_id: &str) -> Result<Pod> {
        let mut record = self.load(pod_id)?;
        if record.state != ContainerState::Ready {
            return Err(Error::Engine(format!(
                "pod {pod_id} is {:?}, expected ready",
                record.state
            )));
        }

        let pid = self.spawn(&record)?;
        record.pid = Some(pid);
        record.state = ContainerState::Running;
        if let Err(e) = self.save(&record) {
            // Nothing on disk knows about this process, so nobody else can stop it.
            self.discard(pid);
            return Err(e);
        }

        if let Some(pid_file) = &record.pid_file {
            std::fs::write(pid_file, pid.to_string())?;
        }

        tracing::debug!(pod = %pod_id, pid, "pod started");
        Ok(record.pod())
    }

    async fn stop_container(&self, pod_id: &str, container_id: &str) -> Result<ContainerStatus> {
        let mut record = self.load(pod_id)?;
        if container_id != record.id {
            return Err(Error::UnknownContainer(container_id.to_string()));
        }

        if let (ContainerState::Running, Some(pid)) = (record.state, record.pid) {
            self.signal(pid, self.stop_signal)?;
        }
        record.state = ContainerState::Stopped;
        self.save(&record)?;

        Ok(ContainerStatus {
            id: record.id.clone(),
            pid: record.pid,
            state: record.state,
        })
    }

    async fn delete_pod(&self, pod_id: &str, force: bool) -> Result<()> {
        let record = self.load(pod_id)?;

        if let (ContainerState::Running, Some(pid)) = (record.state, record.pid) {
            if crate::process::process_running(pid) {
                if !force {
                    return Err(Error::Engine(format!(
                        "pod {pod_id} is still running, use force to delete it"
                    )));
                }
                self.signal(pid, Signal::SIGKILL)?;
            }
        }

        std::fs::remove_dir_all(self.pod_dir(pod_id))?;
        tracing::debug!(pod = %pod_id, "pod deleted");
        Ok(())
    }

    async fn pod_status(&self, pod_id: &str) -> Result<PodStatus> {
        Ok(self.load(pod_id)?.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::wait_for_exit;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        engine: LocalEngine,
        bundle: PathBuf,
    }

    fn fixture(script: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("bundle");
        std::fs::create_dir(&bundle).unwrap();
        let config = serde_json::json!({
            "process": { "args": ["/bin/sh", "-c", script] }
        });
        std::fs::write(bundle.join("config.json"), config.to_string()).unwrap();

        let runtime = RuntimeConfig {
            root: dir.path().join("state"),
            ..Default::default()
        };
        Fixture {
            engine: LocalEngine::new(&runtime).unwrap(),
            bundle,
            _dir: dir,
        }
    }

    fn spec(f: &Fixture, id: &str) -> PodSpec {
        PodSpec {
            id: id.to_string(),
            bundle: f.bundle.clone(),
            console: None,
            pid_file: None,
            runtime: RuntimeConfig::default(),
        }
    }

    #[tokio::test]
    async fn create_is_atomic_create_if_absent() {
        let f = fixture("exit 0");
        f.engine.create_pod(&spec(&f, "web")).await.unwrap();

        let err = f.engine.create_pod(&spec(&f, "web")).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateContainer(_)));

        let pods = f.engine.list_pods().await.unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].containers[0].state, ContainerState::Ready);
    }

    #[tokio::test]
    async fn create_rejects_path_like_ids() {
        let f = fixture("exit 0");
        for id in ["..", "a/b"] {
            assert!(f.engine.create_pod(&spec(&f, id)).await.is_err());
        }
    }

    #[tokio::test]
    async fn start_runs_the_bundle_process_and_writes_pid_file() {
        let f = fixture("exit 7");
        let pid_file = f.bundle.join("web.pid");
        let mut spec = spec(&f, "web");
        spec.pid_file = Some(pid_file.clone());
        f.engine.create_pod(&spec).await.unwrap();

        let pod = f.engine.start_pod("web").await.unwrap();
        let pid = pod.primary_container().unwrap().pid.unwrap();

        assert_eq!(std::fs::read_to_string(pid_file).unwrap(), pid.to_string());
        assert_eq!(wait_for_exit(pid).await.unwrap(), 7);

        let status = f.engine.pod_status("web").await.unwrap();
        assert_eq!(status.single_container().unwrap().state, ContainerState::Running);

        f.engine.delete_pod("web", false).await.unwrap();
        assert!(f.engine.list_pods().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_kills_the_process_when_state_cannot_be_saved() {
        let f = fixture("sleep 1; touch started-late");
        f.engine.create_pod(&spec(&f, "web")).await.unwrap();
        // A directory in place of the temp file defeats the write even as root.
        std::fs::create_dir(f.engine.pod_dir("web").join(format!("{STATE_FILE}.tmp"))).unwrap();

        assert!(f.engine.start_pod("web").await.is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!f.bundle.join("started-late").exists());
        let status = f.engine.pod_status("web").await.unwrap();
        assert_eq!(status.containers[0].pid, None);
        f.engine.delete_pod("web", true).await.unwrap();
    }

    #[tokio::test]
    async fn process_runs_in_its_configured_cwd() {
        let f = fixture("pwd > where");
        let work = f.bundle.join("work");
        std::fs::create_dir(&work).unwrap();
        let config = serde_json::json!({
            "process": { "args": ["/bin/sh", "-c", "pwd > where"], "cwd": "work" }
        });
        std::fs::write(f.bundle.join("config.json"), config.to_string()).unwrap();
        f.engine.create_pod(&spec(&f, "web")).await.unwrap();

        let pod = f.engine.start_pod("web").await.unwrap();
        assert_eq!(wait_for_exit(pod.containers[0].pid.unwrap()).await.unwrap(), 0);

        let recorded = std::fs::read_to_string(work.join("where")).unwrap();
        assert_eq!(
            PathBuf::from(recorded.trim()),
            work.canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn start_twice_fails() {
        let f = fixture("exit 0");
        f.engine.create_pod(&spec(&f, "web")).await.unwrap();
        let pod = f.engine.start_pod("web").await.unwrap();
        assert!(f.engine.start_pod("web").await.is_err());
        wait_for_exit(pod.containers[0].pid.unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn delete_running_pod_requires_force() {
        let f = fixture("sleep 30");
        f.engine.create_pod(&spec(&f, "web")).await.unwrap();
        let pod = f.engine.start_pod("web").await.unwrap();
        let pid = pod.containers[0].pid.unwrap();

        assert!(f.engine.delete_pod("web", false).await.is_err());
        f.engine.delete_pod("web", true).await.unwrap();

        assert_eq!(wait_for_exit(pid).await.unwrap(), 128 + 9);
        assert!(matches!(
            f.engine.pod_status("web").await,
            Err(Error::UnknownContainer(_))
        ));
    }

    #[tokio::test]
    async fn stop_container_signals_and_records_stopped() {
        let f = fixture("sleep 30");
        f.engine.create_pod(&spec(&f, "web")).await.unwrap();
        let pod = f.engine.start_pod("web").await.unwrap();
        let pid = pod.containers[0].pid.unwrap();

        let status = f.engine.stop_container("web", "web").await.unwrap();
        assert_eq!(status.state, ContainerState::Stopped);
        assert_eq!(wait_for_exit(pid).await.unwrap(), 128 + 9);

        assert!(matches!(
            f.engine.stop_container("web", "other").await,
            Err(Error::UnknownContainer(_))
        ));
    }
}
