//! Copies bytes between the invoking process's stdio and a pty master.

use crate::terminal::Terminal;
use corral_core::{AsyncOwnedFd, Result};
use std::io::Read;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const INPUT_CHUNK: usize = 1024;
const OUTPUT_CHUNK: usize = 4096;

/// Two copy loops: input (stdin -> master) and output (master -> stdout).
///
/// Only the output loop is ever waited on. Trailing unread input may be
/// dropped when the container exits; trailing output may not.
pub struct Relay {
    output: JoinHandle<u64>,
    input: JoinHandle<()>,
}

impl Relay {
    /// Connects the terminal master to this process's stdin and stdout.
    pub fn start(terminal: &Terminal) -> Result<Self> {
        let master = AsyncOwnedFd::nonblocking(terminal.clone_master()?)?;
        Ok(Self::spawn(std::io::stdin(), tokio::io::stdout(), master))
    }

    /// Spawns the copy loops over arbitrary endpoints.
    ///
    /// `input` is read on a dedicated thread because interactive reads never
    /// complete on their own; that thread is abandoned rather than joined.
    pub fn spawn<I, O, M>(input: I, output: O, master: M) -> Self
    where
        I: Read + Send + 'static,
        O: AsyncWrite + Unpin + Send + 'static,
        M: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut master_reader, master_writer) = tokio::io::split(master);
        let (tx, rx) = mpsc::channel::<Vec<u8>>(16);

        if let Err(e) = std::thread::Builder::new()
            .name("corral-stdin".to_string())
            .spawn(move || read_input(input, tx))
        {
            tracing::warn!("failed to spawn stdin reader: {}", e);
        }

        let input = tokio::spawn(forward_input(rx, master_writer));

        let output = tokio::spawn(async move {
            let mut output = output;
            let mut buf = [0u8; OUTPUT_CHUNK];
            let mut copied = 0u64;
            loop {
                match master_reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if output.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                        copied += n as u64;
                        if output.flush().await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!("terminal read ended: {}", e);
                        break;
                    }
                }
            }
            copied
        });

        Self { output, input }
    }

    /// Waits for the output loop to drain, then drops the input loop.
    pub async fn drain(self) -> u64 {
        self.input.abort();
        match self.output.await {
            Ok(copied) => {
                tracing::debug!(bytes = copied, "terminal output drained");
                copied
            }
            Err(e) => {
                tracing::warn!("terminal output task failed: {}", e);
                0
            }
        }
    }

    /// Stops both loops without waiting for pending output.
    pub fn abandon(self) {
        self.input.abort();
        self.output.abort();
    }
}

fn read_input<I: Read>(mut input: I, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; INPUT_CHUNK];
    loop {
        match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

async fn forward_input<W: AsyncWrite + Unpin>(mut rx: mpsc::Receiver<Vec<u8>>, mut writer: W) {
    while let Some(chunk) = rx.recv().await {
        if writer.write_all(&chunk).await.is_err() {
            break;
        }
    }
}
