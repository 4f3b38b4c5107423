//! Test utilities for libexiftool integration tests.
//!
//! [`FakeToolFactory`] stands in for the real exiftool binary: it implements
//! [`ProcessFactory`] over in-memory duplex pipes and runs a scripted
//! responder that speaks the stay-open input protocol. Argument lines are
//! collected until an `-execute<key>` marker, then answered with
//! `echo:<args>` followed by the `{ready<key>}` delimiter, so each response
//! is attributable to the request that caused it.
//!
//! Requests can carry directives that shape the responder's behavior:
//!
//! - `sleep:<ms>` delays the response (for cancellation/overlap tests)
//! - `stderr:<text>` writes to the error channel instead of responding
//! - `noreply` swallows the request without ever responding

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use libexiftool::process::{ProcessFactory, ProcessHandle, ProcessOutput, ProcessStdin};
use libexiftool::protocol::LINE_TERMINATOR;
use libexiftool::{Error, ExifToolConfig, Result};

/// A scripted stand-in for the exiftool process.
#[derive(Clone)]
pub struct FakeToolFactory {
    starts: Arc<AtomicUsize>,
    executed: Arc<AtomicUsize>,
    saw_stay_open_off: Arc<AtomicBool>,
    fail_spawn: bool,
    ignore_shutdown_command: bool,
    ignore_interrupt: bool,
    ignore_kill: bool,
    stdin_capacity: usize,
    stall_reads: Option<Duration>,
}

impl Default for FakeToolFactory {
    fn default() -> Self {
        Self {
            starts: Arc::new(AtomicUsize::new(0)),
            executed: Arc::new(AtomicUsize::new(0)),
            saw_stay_open_off: Arc::new(AtomicBool::new(false)),
            fail_spawn: false,
            ignore_shutdown_command: false,
            ignore_interrupt: false,
            ignore_kill: false,
            stdin_capacity: 64 * 1024,
            stall_reads: None,
        }
    }
}

impl FakeToolFactory {
    /// A cooperative tool: exits when told to leave stay-open mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose spawn always fails.
    pub fn failing_spawn() -> Self {
        Self {
            fail_spawn: true,
            ..Self::default()
        }
    }

    /// A tool that ignores the shutdown command, the cooperative signal and
    /// even the kill, forcing the disposal ladder to run to the end.
    pub fn non_cooperative() -> Self {
        Self {
            ignore_shutdown_command: true,
            ignore_interrupt: true,
            ignore_kill: true,
            ..Self::default()
        }
    }

    /// A tool whose stdin pipe is tiny and whose reader starts late, so a
    /// large request block experiences write backpressure.
    pub fn backpressured() -> Self {
        Self {
            stdin_capacity: 16,
            stall_reads: Some(Duration::from_millis(100)),
            ..Self::default()
        }
    }

    /// How many times a process was started.
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of `-execute` markers the responder has seen.
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    /// Whether the responder received `-stay_open` / `False`.
    pub fn saw_stay_open_off(&self) -> bool {
        self.saw_stay_open_off.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessFactory for FakeToolFactory {
    async fn start(&self, _config: &ExifToolConfig) -> Result<Box<dyn ProcessHandle>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_spawn {
            return Err(Error::InitializationFailed(io::Error::other(
                "scripted spawn failure",
            )));
        }

        let (stdin_client, stdin_fake) = tokio::io::duplex(self.stdin_capacity);
        let (stdout_client, stdout_fake) = tokio::io::duplex(64 * 1024);
        let (stderr_client, stderr_fake) = tokio::io::duplex(64 * 1024);

        let stop = CancellationToken::new();
        tokio::spawn(run_fake_tool(
            self.clone(),
            stdin_fake,
            stdout_fake,
            stderr_fake,
            stop.clone(),
        ));

        Ok(Box::new(FakeHandle {
            stdin: Some(Box::new(stdin_client)),
            stdout: Some(Box::new(stdout_client)),
            stderr: Some(Box::new(stderr_client)),
            stop,
            ignore_interrupt: self.ignore_interrupt,
            ignore_kill: self.ignore_kill,
        }))
    }
}

/// The handle side of the fake: hands out the client ends of the pipes and
/// maps the control operations onto the responder's stop token.
struct FakeHandle {
    stdin: Option<ProcessStdin>,
    stdout: Option<ProcessOutput>,
    stderr: Option<ProcessOutput>,
    stop: CancellationToken,
    ignore_interrupt: bool,
    ignore_kill: bool,
}

#[async_trait]
impl ProcessHandle for FakeHandle {
    fn take_stdin(&mut self) -> Option<ProcessStdin> {
        self.stdin.take()
    }

    fn take_stdout(&mut self) -> Option<ProcessOutput> {
        self.stdout.take()
    }

    fn take_stderr(&mut self) -> Option<ProcessOutput> {
        self.stderr.take()
    }

    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    fn interrupt(&mut self) -> io::Result<()> {
        if !self.ignore_interrupt {
            self.stop.cancel();
        }
        Ok(())
    }

    async fn kill(&mut self) -> io::Result<()> {
        if !self.ignore_kill {
            self.stop.cancel();
        }
        Ok(())
    }

    fn start_kill(&mut self) -> io::Result<()> {
        if !self.ignore_kill {
            self.stop.cancel();
        }
        Ok(())
    }
}

/// Parse the stay-open input protocol and answer each request. Responses go
/// through a single writer task per stream, so overlapping requests share
/// one ordered output stream just like the real tool.
async fn run_fake_tool(
    factory: FakeToolFactory,
    stdin: DuplexStream,
    stdout: DuplexStream,
    stderr: DuplexStream,
    stop: CancellationToken,
) {
    let (out_tx, out_rx) = mpsc::channel::<String>(64);
    let (err_tx, err_rx) = mpsc::channel::<String>(64);
    tokio::spawn(pipe_writer(stdout, out_rx));
    tokio::spawn(pipe_writer(stderr, err_rx));

    // A stalled reader leaves everything written to stdin sitting in the
    // pipe, exercising the client's behavior under write backpressure.
    if let Some(delay) = factory.stall_reads {
        tokio::select! {
            () = stop.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
    }

    let mut lines = BufReader::new(stdin).lines();
    let mut args: Vec<String> = Vec::new();

    loop {
        let line = tokio::select! {
            () = stop.cancelled() => return,
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                _ => return,
            },
        };

        if let Some(key) = line.strip_prefix("-execute") {
            factory.executed.fetch_add(1, Ordering::SeqCst);
            let request = std::mem::take(&mut args);
            tokio::spawn(respond(
                request,
                key.to_string(),
                out_tx.clone(),
                err_tx.clone(),
                stop.clone(),
            ));
        } else if line == "-stay_open" {
            let Ok(Some(value)) = lines.next_line().await else {
                return;
            };
            if value == "False" {
                factory.saw_stay_open_off.store(true, Ordering::SeqCst);
                if !factory.ignore_shutdown_command {
                    // Dropping the writers closes stdout/stderr: the client
                    // observes EOF, its exit signal.
                    return;
                }
            }
        } else {
            args.push(line);
        }
    }
}

async fn pipe_writer(mut stream: DuplexStream, mut rx: mpsc::Receiver<String>) {
    while let Some(chunk) = rx.recv().await {
        if stream.write_all(chunk.as_bytes()).await.is_err() {
            return;
        }
        let _ = stream.flush().await;
    }
}

async fn respond(
    request: Vec<String>,
    key: String,
    out: mpsc::Sender<String>,
    err: mpsc::Sender<String>,
    stop: CancellationToken,
) {
    let mut delay = None;
    let mut stderr_message = None;
    let mut silent = false;
    for arg in &request {
        if let Some(ms) = arg.strip_prefix("sleep:") {
            delay = ms.parse().ok().map(Duration::from_millis);
        } else if let Some(message) = arg.strip_prefix("stderr:") {
            stderr_message = Some(message.to_string());
        } else if arg == "noreply" {
            silent = true;
        }
    }

    if let Some(delay) = delay {
        tokio::select! {
            () = stop.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
    }
    if let Some(message) = stderr_message {
        let _ = err.send(message).await;
        return;
    }
    if silent {
        return;
    }

    let reply = format!(
        "echo:{joined}{lt}{{ready{key}}}{lt}",
        joined = request.join(","),
        lt = LINE_TERMINATOR,
    );
    let _ = out.send(reply).await;
}

/// The text the responder produces for a given argument list.
pub fn echo_of(args: &[&str]) -> String {
    format!("echo:{}{}", args.join(","), LINE_TERMINATOR)
}
