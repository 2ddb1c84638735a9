//! Pseudo-terminal allocation and raw-mode handling of the invoking terminal.

use corral_core::{Error, Result};
use nix::fcntl::OFlag;
use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt};
use nix::sys::termios::{self, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg, Termios};
use std::io::IsTerminal;
use std::os::fd::{AsFd, FromRawFd, IntoRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A freshly allocated pty whose slave end is handed to the container.
///
/// Only the master is held open here; the slave is opened by the sandbox
/// engine through [`Terminal::path`]. Once the container's last slave fd
/// closes, reads on the master report end of stream.
pub struct Terminal {
    master: Option<OwnedFd>,
    slave_path: PathBuf,
}

impl Terminal {
    pub fn allocate() -> Result<Self> {
        let alloc_err = |what: &str, e: nix::Error| Error::TerminalAllocation(format!("{what}: {e}"));

        let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY | OFlag::O_CLOEXEC)
            .map_err(|e| alloc_err("posix_openpt", e))?;
        grantpt(&master).map_err(|e| alloc_err("grantpt", e))?;
        unlockpt(&master).map_err(|e| alloc_err("unlockpt", e))?;
        let slave_path = ptsname_r(&master).map_err(|e| alloc_err("ptsname", e))?;

        // SAFETY: into_raw_fd() relinquishes ownership of a valid open fd,
        // so wrapping it in a new OwnedFd leaves exactly one owner.
        let master = unsafe { OwnedFd::from_raw_fd(master.into_raw_fd()) };

        tracing::debug!(slave = %slave_path, "allocated pseudo-terminal");
        Ok(Self {
            master: Some(master),
            slave_path: PathBuf::from(slave_path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.slave_path
    }

    pub fn is_closed(&self) -> bool {
        self.master.is_none()
    }

    /// Duplicates the master fd for use by the I/O relay.
    pub(crate) fn clone_master(&self) -> Result<OwnedFd> {
        let master = self
            .master
            .as_ref()
            .ok_or_else(|| Error::TerminalAllocation("terminal already closed".to_string()))?;
        Ok(master.try_clone()?)
    }

    /// Releases the master. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.master.take().is_some() {
            tracing::debug!(slave = %self.slave_path.display(), "closed pseudo-terminal");
        }
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.close();
    }
}

/// Terminal mode of the invoking process's stdin, captured before going raw.
pub struct SavedTerminalState {
    termios: Option<Termios>,
}

impl SavedTerminalState {
    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self { termios: None }
    }
}

/// Switches the invoking terminal in and out of raw mode.
pub trait TerminalMode: Send + Sync {
    /// Puts stdin in raw mode. Returns `None` when stdin is not a terminal.
    fn enter_raw(&self) -> Result<Option<SavedTerminalState>>;

    fn restore(&self, state: SavedTerminalState) -> Result<()>;
}

/// [`TerminalMode`] acting on the process's real stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinTerminal;

impl TerminalMode for StdinTerminal {
    fn enter_raw(&self) -> Result<Option<SavedTerminalState>> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            return Ok(None);
        }

        let original = termios::tcgetattr(stdin.as_fd()).map_err(std::io::Error::from)?;
        let mut raw = original.clone();
        make_raw(&mut raw);
        termios::tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &raw).map_err(std::io::Error::from)?;

        Ok(Some(SavedTerminalState {
            termios: Some(original),
        }))
    }

    fn restore(&self, state: SavedTerminalState) -> Result<()> {
        if let Some(original) = state.termios {
            let stdin = std::io::stdin();
            termios::tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &original)
                .map_err(|e| Error::Cleanup(format!("restoring terminal state: {e}")))?;
        }
        Ok(())
    }
}

// Equivalent to cfmakeraw()
fn make_raw(raw: &mut Termios) {
    raw.input_flags.remove(InputFlags::IGNBRK);
    raw.input_flags.remove(InputFlags::BRKINT);
    raw.input_flags.remove(InputFlags::PARMRK);
    raw.input_flags.remove(InputFlags::ISTRIP);
    raw.input_flags.remove(InputFlags::INLCR);
    raw.input_flags.remove(InputFlags::IGNCR);
    raw.input_flags.remove(InputFlags::ICRNL);
    raw.input_flags.remove(InputFlags::IXON);

    raw.output_flags.remove(OutputFlags::OPOST);

    raw.local_flags.remove(LocalFlags::ECHO);
    raw.local_flags.remove(LocalFlags::ECHONL);
    raw.local_flags.remove(LocalFlags::ICANON);
    raw.local_flags.remove(LocalFlags::ISIG);
    raw.local_flags.remove(LocalFlags::IEXTEN);

    raw.control_flags.remove(ControlFlags::CSIZE);
    raw.control_flags.remove(ControlFlags::PARENB);
    raw.control_flags.insert(ControlFlags::CS8);
}

/// Scoped raw mode: restores the saved state exactly once, either through
/// [`RawModeGuard::restore`] or on drop.
pub struct RawModeGuard {
    mode: Arc<dyn TerminalMode>,
    saved: Option<SavedTerminalState>,
}

impl RawModeGuard {
    pub fn enter(mode: Arc<dyn TerminalMode>) -> Result<Self> {
        let saved = mode.enter_raw()?;
        Ok(Self { mode, saved })
    }

    pub fn restore(&mut self) -> Result<()> {
        match self.saved.take() {
            Some(state) => self.mode.restore(state),
            None => Ok(()),
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            tracing::warn!("failed to restore terminal state: {}", e);
        }
    }
}
