//! The seam between the correlation engine and the operating system.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::ExifToolConfig;
use crate::Result;

/// Boxed writer for the process's stdin.
pub type ProcessStdin = Box<dyn AsyncWrite + Send + Unpin>;

/// Boxed reader for the process's stdout or stderr.
pub type ProcessOutput = Box<dyn AsyncRead + Send + Unpin>;

/// Capabilities of a running external tool process.
///
/// The engine uses exactly this surface: take the three standard streams
/// once, then control the process during shutdown. Implementations other
/// than [`ExifToolProcess`](crate::process::ExifToolProcess) exist only for
/// tests.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Take ownership of the stdin writer. Can only be taken once.
    fn take_stdin(&mut self) -> Option<ProcessStdin>;

    /// Take ownership of the stdout reader. Can only be taken once.
    fn take_stdout(&mut self) -> Option<ProcessOutput>;

    /// Take ownership of the stderr reader. Can only be taken once.
    fn take_stderr(&mut self) -> Option<ProcessOutput>;

    /// The OS process ID, if the process is still running.
    fn pid(&self) -> Option<u32>;

    /// Send a cooperative cancel signal (SIGINT on Unix). A no-op on
    /// platforms without an equivalent.
    fn interrupt(&mut self) -> io::Result<()>;

    /// Forcefully kill the process and reap it.
    async fn kill(&mut self) -> io::Result<()>;

    /// Begin killing the process without waiting for it to exit.
    fn start_kill(&mut self) -> io::Result<()>;
}

/// Creates [`ProcessHandle`]s. Injected into the engine so tests can
/// substitute a scripted fake for the real tool.
#[async_trait]
pub trait ProcessFactory: Send + Sync {
    /// Start a new tool process for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolNotFound`](crate::Error::ToolNotFound) or
    /// [`Error::InitializationFailed`](crate::Error::InitializationFailed)
    /// when the process cannot be started.
    async fn start(&self, config: &ExifToolConfig) -> Result<Box<dyn ProcessHandle>>;
}
