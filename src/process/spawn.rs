//! Spawning the real ExifTool process.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use super::handle::{ProcessFactory, ProcessHandle, ProcessOutput, ProcessStdin};
use crate::config::ExifToolConfig;
use crate::{Error, Result};

/// A running ExifTool process in stay-open mode.
///
/// One process serves many sequential logical requests over its lifetime.
/// Dropping the struct kills the process if it is still running.
pub struct ExifToolProcess {
    child: Child,
}

impl ExifToolProcess {
    /// Spawn the tool with the stay-open argument contract.
    pub fn spawn(config: &ExifToolConfig) -> Result<Self> {
        let mut cmd = Command::new(config.executable());

        if let Some(dir) = &config.working_directory {
            cmd.current_dir(dir);
        }
        if !config.inherit_env {
            cmd.env_clear();
        }
        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }

        cmd.args(build_args(config));
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::ToolNotFound {
                    searched: config.executable().to_string(),
                }
            } else {
                Error::InitializationFailed(e)
            }
        })?;

        tracing::debug!(pid = ?child.id(), "spawned exiftool in stay-open mode");
        Ok(Self { child })
    }
}

#[async_trait]
impl ProcessHandle for ExifToolProcess {
    fn take_stdin(&mut self) -> Option<ProcessStdin> {
        self.child
            .stdin
            .take()
            .map(|s| Box::new(s) as ProcessStdin)
    }

    fn take_stdout(&mut self) -> Option<ProcessOutput> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as ProcessOutput)
    }

    fn take_stderr(&mut self) -> Option<ProcessOutput> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as ProcessOutput)
    }

    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    #[cfg(unix)]
    fn interrupt(&mut self) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(()); // already exited
        };
        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        kill(nix_pid, Signal::SIGINT).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    fn interrupt(&mut self) -> io::Result<()> {
        // No cooperative signal on this platform; the kill step follows.
        Ok(())
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }
}

impl Drop for ExifToolProcess {
    fn drop(&mut self) {
        // Try to kill the process if it's still running
        let _ = self.child.start_kill();
    }
}

/// The default [`ProcessFactory`]: spawns a real [`ExifToolProcess`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifToolLauncher;

#[async_trait]
impl ProcessFactory for ExifToolLauncher {
    async fn start(&self, config: &ExifToolConfig) -> Result<Box<dyn ProcessHandle>> {
        Ok(Box::new(ExifToolProcess::spawn(config)?))
    }
}

/// Build the startup argument list. Order matters: the `-config` option must
/// come first when present, and caller-supplied common arguments go last, in
/// the order supplied.
fn build_args(config: &ExifToolConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(file) = config.config_file() {
        args.push("-config".to_string());
        args.push(file.display().to_string());
    }

    args.push("-stay_open".to_string());
    args.push("True".to_string());
    args.push("-@".to_string());
    args.push("-".to_string());

    args.extend(config.common_args().iter().cloned());
    args
}
