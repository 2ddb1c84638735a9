//! Host process helpers for container PIDs handed out by the engine.

use corral_core::{Error, Result};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;
use std::future::Future;
use tokio::signal::unix::{SignalKind, signal};

/// Blocks until `pid` exits and returns its exit code.
///
/// `pid` must be a child of this process. A process killed by a signal
/// yields `128 + signal`, the shell convention.
pub async fn wait_for_exit(pid: i32) -> Result<i32> {
    let wait_err = move |reason: String| Error::ProcessWait { pid, reason };
    // waitpid treats 0 and negative values as process groups.
    if pid <= 0 {
        return Err(wait_err("not a process ID".to_string()));
    }

    tokio::task::spawn_blocking(move || {
        loop {
            match waitpid(Pid::from_raw(pid), None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(code),
                Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(128 + signal as i32),
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(wait_err(e.to_string())),
            }
        }
    })
    .await
    .map_err(|e| wait_err(e.to_string()))?
}

/// Whether a process with this PID currently exists.
pub fn process_running(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Resolves with the first SIGTERM, SIGHUP or SIGINT sent to this process.
///
/// Handlers are installed by this call, not on first poll, so the returned
/// future covers everything that happens after it returns.
pub fn termination_signal() -> Result<impl Future<Output = Signal> + Send + 'static> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = terminate.recv() => Signal::SIGTERM,
            _ = hangup.recv() => Signal::SIGHUP,
            _ = interrupt.recv() => Signal::SIGINT,
        }
    })
}
