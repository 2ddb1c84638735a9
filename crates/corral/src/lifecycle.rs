//! The `run` state machine: validate, create, attach, start, wait, delete.
//!
//! Every exit path after a terminal is allocated releases it exactly once,
//! and every exit path after creation asks the engine to force-delete the
//! pod. A failure during that cleanup is logged and never replaces the error
//! that caused the abort. SIGTERM, SIGHUP and SIGINT received while the
//! container is starting or running take the same abort path.

use crate::process::{process_running, termination_signal, wait_for_exit};
use crate::relay::Relay;
use crate::terminal::{RawModeGuard, StdinTerminal, Terminal, TerminalMode};
use crate::validator;
use corral_core::{
    ConsoleRequest, ContainerRequest, ContainerState, ContainerStatus, Error, PodSpec, PodStatus,
    Result, RuntimeConfig, SandboxEngine,
};
use nix::sys::signal::Signal;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

/// How a `run` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Started and left running in the background.
    Detached,
    /// The container process exited with this code.
    Exited(i32),
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Detached => 0,
            RunOutcome::Exited(code) => *code,
        }
    }
}

/// Resources held for one run, released in a fixed order.
#[derive(Default)]
struct Attachment {
    terminal: Option<Terminal>,
    relay: Option<Relay>,
    raw_mode: Option<RawModeGuard>,
}

impl Attachment {
    fn console_path(&self, request: &ConsoleRequest) -> Option<PathBuf> {
        match (&self.terminal, request) {
            (Some(terminal), _) => Some(terminal.path().to_path_buf()),
            (None, ConsoleRequest::Device(path)) => Some(path.clone()),
            (None, _) => None,
        }
    }

    /// Joins (or drops) the relay, closes the terminal, then restores stdin.
    async fn release(&mut self, drain: bool) -> Result<()> {
        if let Some(relay) = self.relay.take() {
            if drain {
                relay.drain().await;
            } else {
                relay.abandon();
            }
        }
        if let Some(terminal) = self.terminal.as_mut() {
            terminal.close();
        }
        match self.raw_mode.take() {
            Some(mut guard) => guard.restore(),
            None => Ok(()),
        }
    }
}

/// Drives containers through their lifecycle against a [`SandboxEngine`].
pub struct Lifecycle {
    engine: Arc<dyn SandboxEngine>,
    config: RuntimeConfig,
    terminal_mode: Arc<dyn TerminalMode>,
}

impl Lifecycle {
    pub fn new(engine: Arc<dyn SandboxEngine>, config: RuntimeConfig) -> Self {
        Self {
            engine,
            config,
            terminal_mode: Arc::new(StdinTerminal),
        }
    }

    pub fn with_terminal_mode(mut self, mode: Arc<dyn TerminalMode>) -> Self {
        self.terminal_mode = mode;
        self
    }

    pub fn engine(&self) -> &dyn SandboxEngine {
        self.engine.as_ref()
    }

    /// Creates and starts a container, then (unless detached) relays its
    /// terminal, waits for it, and deletes it.
    ///
    /// A termination signal received after creation fails the run with
    /// [`Error::Interrupted`] once the pod is deleted and the terminal
    /// released.
    pub async fn run(&self, request: &ContainerRequest) -> Result<RunOutcome> {
        self.run_until(request, termination_signal()?).await
    }

    /// [`run`](Self::run), aborting the launch when `interrupt` resolves.
    pub async fn run_until<F>(
        &self,
        request: &ContainerRequest,
        interrupt: F,
    ) -> Result<RunOutcome>
    where
        F: Future<Output = Signal> + Send,
    {
        let id = request.container_id.as_str();
        validator::validate_create(self.engine(), id, &request.bundle).await?;

        let mut attachment = Attachment::default();
        if request.console == ConsoleRequest::Allocate {
            attachment.terminal = Some(Terminal::allocate()?);
        }

        let spec = PodSpec {
            id: id.to_string(),
            bundle: request.bundle.clone(),
            console: attachment.console_path(&request.console),
            pid_file: request.pid_file.clone(),
            runtime: self.config.clone(),
        };

        tracing::info!(container = id, engine = self.engine.name(), "creating container");
        if let Err(e) = self.engine.create_pod(&spec).await {
            if let Err(cleanup) = attachment.release(false).await {
                tracing::warn!(container = id, "cleanup after failed create: {}", cleanup);
            }
            return Err(match e {
                Error::DuplicateContainer(_) => e,
                other => Error::SandboxCreate(other.to_string()),
            });
        }

        let launched = tokio::select! {
            result = self.launch(request, &mut attachment) => result,
            signal = interrupt => {
                tracing::warn!(container = id, %signal, "interrupted, tearing down container");
                Err(Error::Interrupted(signal))
            }
        };

        let code = match launched {
            Ok(Some(code)) => code,
            Ok(None) => {
                attachment.release(false).await?;
                tracing::info!(container = id, "container started detached");
                return Ok(RunOutcome::Detached);
            }
            Err(e) => {
                self.abort(id, &mut attachment).await;
                return Err(e);
            }
        };

        tracing::info!(container = id, code, "container exited");
        let deleted = self
            .engine
            .delete_pod(id, true)
            .await
            .map_err(|e| Error::Cleanup(format!("deleting container {id}: {e}")));
        let released = attachment.release(true).await;

        deleted?;
        released?;
        Ok(RunOutcome::Exited(code))
    }

    /// Attaches, starts, and waits. Returns `None` in detached mode.
    async fn launch(
        &self,
        request: &ContainerRequest,
        attachment: &mut Attachment,
    ) -> Result<Option<i32>> {
        let id = request.container_id.as_str();

        if !request.detach {
            if let Some(terminal) = &attachment.terminal {
                attachment.relay = Some(Relay::start(terminal)?);
                attachment.raw_mode = Some(RawModeGuard::enter(self.terminal_mode.clone())?);
            }
        }

        let pod = self
            .engine
            .start_pod(id)
            .await
            .map_err(|e| Error::SandboxStart(e.to_string()))?;

        if request.detach {
            return Ok(None);
        }

        let container = pod.primary_container()?;
        let pid = container.pid.ok_or_else(|| {
            Error::SandboxStart(format!("container {} has no process", container.id))
        })?;
        tracing::debug!(container = id, pid, "waiting for container process");

        wait_for_exit(pid).await.map(Some)
    }

    async fn abort(&self, id: &str, attachment: &mut Attachment) {
        if let Err(e) = self.engine.delete_pod(id, true).await {
            tracing::warn!(container = id, "failed to delete container after error: {}", e);
        }
        if let Err(e) = attachment.release(false).await {
            tracing::warn!(container = id, "failed to release terminal after error: {}", e);
        }
    }

    /// Forces a container whose process already exited into the stopped state.
    pub async fn update_stopped_container(&self, status: &PodStatus) -> Result<ContainerStatus> {
        let container = status.single_container()?;
        tracing::debug!(pod = %status.id, container = %container.id, "stopping exited container");
        self.engine.stop_container(&status.id, &container.id).await
    }

    /// Current status of an existing container, reconciled with the host.
    pub async fn state(&self, container_id: &str) -> Result<PodStatus> {
        validator::validate_existing(self.engine(), container_id).await?;
        let status = self.engine.pod_status(container_id).await?;

        let container = status.single_container()?;
        let exited = container.state == ContainerState::Running
            && !container.pid.is_some_and(process_running);
        if !exited {
            return Ok(status);
        }

        self.update_stopped_container(&status).await?;
        self.engine.pod_status(container_id).await
    }

    pub async fn delete(&self, container_id: &str, force: bool) -> Result<()> {
        validator::validate_existing(self.engine(), container_id).await?;
        self.engine.delete_pod(container_id, force).await
    }

    pub async fn list(&self) -> Result<Vec<PodStatus>> {
        self.engine.list_pods().await
    }
}
