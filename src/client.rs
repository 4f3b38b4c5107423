//! High-level stay-open ExifTool client.
//!
//! This module provides [`ExifTool`], the main entry point. One instance
//! owns one external process and serves many sequential logical requests
//! over it.
//!
//! # Example
//!
//! ```ignore
//! use libexiftool::{ExifTool, ExifToolConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let tool = ExifTool::new(ExifToolConfig::builder().build()?);
//!     tool.initialize().await?;
//!
//!     let output = tool.execute(["-ver"]).await?;
//!     println!("{}", output);
//!
//!     tool.dispose().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::ExifToolConfig;
use crate::correlate::RequestCorrelator;
use crate::process::{
    ExifToolLauncher, ProcessFactory, ProcessHandle, ProcessOutput, ProcessStdin,
};
use crate::protocol::{ErrorFramer, OutputFramer, EXECUTE_PREFIX, LINE_TERMINATOR, STAY_OPEN_OFF};
use crate::{Error, Result};

/// Lifecycle states of an [`ExifTool`] instance. Transitions only move
/// forward; a disposed instance is terminal and a new one must be created
/// to talk to the tool again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created but `initialize` has not completed.
    Uninitialized,
    /// `initialize` is running.
    Initializing,
    /// Requests are accepted.
    Ready,
    /// `dispose` is running; new requests are rejected.
    Disposing,
    /// Terminal.
    Disposed,
}

/// A client for a single long-lived ExifTool process in stay-open mode.
///
/// The client feeds argument lines to the process over stdin and routes the
/// demultiplexed stdout back to the callers that requested it. Requests are
/// admitted one at a time, but several may be in flight concurrently; the
/// tool decides how it schedules them internally.
///
/// # Thread Safety
///
/// `ExifTool` is `Send + Sync`; share it behind an `Arc` and call
/// [`execute`](Self::execute) from any task.
///
/// # Shutdown
///
/// Call [`dispose`](Self::dispose) when done. A crashed or early-exited
/// process is not restarted: every in-flight and future request fails until
/// a new instance is created.
pub struct ExifTool {
    config: ExifToolConfig,
    factory: Arc<dyn ProcessFactory>,

    state: StdMutex<State>,
    init_lock: Mutex<()>,
    dispose_lock: Mutex<()>,

    /// Serializes logical request admission.
    admission: Mutex<()>,
    /// Serializes writes to the process stdin. Held only for the duration of
    /// one block write, never across a response wait. Shared with the
    /// per-request write tasks.
    writer: Arc<Mutex<Option<ProcessStdin>>>,

    correlator: Arc<RequestCorrelator>,
    handle: Mutex<Option<Box<dyn ProcessHandle>>>,
    pumps: StdMutex<Vec<JoinHandle<()>>>,
    /// One-shot guard so the stream pumps are wired exactly once.
    pumps_started: AtomicBool,

    /// Cancelled when disposal begins; layered under every caller token.
    shutdown: CancellationToken,
    exited_tx: StdMutex<Option<watch::Sender<bool>>>,
    exited_rx: watch::Receiver<bool>,
}

impl ExifTool {
    /// Create a client that will launch the real exiftool binary.
    pub fn new(config: ExifToolConfig) -> Self {
        Self::with_factory(config, Arc::new(ExifToolLauncher))
    }

    /// Create a client with a custom process factory. This is the seam used
    /// by tests to substitute a scripted process.
    pub fn with_factory(config: ExifToolConfig, factory: Arc<dyn ProcessFactory>) -> Self {
        let (exited_tx, exited_rx) = watch::channel(false);
        Self {
            config,
            factory,
            state: StdMutex::new(State::Uninitialized),
            init_lock: Mutex::new(()),
            dispose_lock: Mutex::new(()),
            admission: Mutex::new(()),
            writer: Arc::new(Mutex::new(None)),
            correlator: Arc::new(RequestCorrelator::new()),
            handle: Mutex::new(None),
            pumps: StdMutex::new(Vec::new()),
            pumps_started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            exited_tx: StdMutex::new(Some(exited_tx)),
            exited_rx,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of requests currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.correlator.in_flight()
    }

    /// OS process ID of the tool, while it is running.
    pub async fn pid(&self) -> Option<u32> {
        self.handle.lock().await.as_ref().and_then(|h| h.pid())
    }

    /// Start the external process and wire its streams.
    ///
    /// Calling `initialize` on an instance that is already Ready (or being
    /// disposed) returns immediately. Concurrent calls collapse into one
    /// process startup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolNotFound`] or [`Error::InitializationFailed`]
    /// when the process cannot be started; the instance stays uninitialized
    /// and `initialize` may be attempted again.
    pub async fn initialize(&self) -> Result<()> {
        match self.state() {
            State::Ready | State::Disposing | State::Disposed => return Ok(()),
            State::Uninitialized | State::Initializing => {}
        }

        let _guard = self.init_lock.lock().await;
        if self.state() != State::Uninitialized {
            return Ok(());
        }
        self.set_state(State::Initializing);

        let mut handle = match self.factory.start(&self.config).await {
            Ok(handle) => handle,
            Err(e) => {
                self.set_state(State::Uninitialized);
                return Err(e);
            }
        };

        // Disposal raced ahead of us; don't leak the fresh process.
        if self.shutdown.is_cancelled() {
            let _ = handle.start_kill();
            self.set_state(State::Disposed);
            return Err(Error::Disposing);
        }

        let streams = (
            handle.take_stdin(),
            handle.take_stdout(),
            handle.take_stderr(),
        );
        let (Some(stdin), Some(stdout), Some(stderr)) = streams else {
            let _ = handle.start_kill();
            self.set_state(State::Uninitialized);
            return Err(Error::InitializationFailed(std::io::Error::other(
                "process handle did not provide piped streams",
            )));
        };

        *self.writer.lock().await = Some(stdin);

        if !self.pumps_started.swap(true, Ordering::SeqCst) {
            let exited_tx = self
                .exited_tx
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            let mut pumps = self.pumps.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(exited_tx) = exited_tx {
                pumps.push(self.spawn_stdout_pump(stdout, exited_tx));
            }
            pumps.push(self.spawn_stderr_pump(stderr));
        }

        *self.handle.lock().await = Some(handle);
        {
            // Don't resurrect an instance that began disposing mid-startup.
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == State::Initializing {
                *state = State::Ready;
            }
        }
        Ok(())
    }

    /// Run one logical command and return its output text.
    ///
    /// Each element of `args` becomes one argument line. The returned text
    /// is everything the tool wrote to stdout for this command, exactly as
    /// emitted.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] / [`Error::Disposing`] / [`Error::Disposed`]
    ///   when called outside the Ready window
    /// - [`Error::ProcessError`] when the tool reported an error while this
    ///   request was pending
    /// - [`Error::Cancelled`] when the instance was disposed mid-request
    /// - [`Error::Io`] when the stdin write failed
    pub async fn execute<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        self.execute_inner(args, CancellationToken::new()).await
    }

    /// Like [`execute`](Self::execute), aborting the wait when `cancel`
    /// fires.
    ///
    /// Cancellation before the request's argument block is written prevents
    /// the write entirely. Cancellation afterwards only detaches the caller:
    /// the tool may still run the command, and its late response is dropped.
    pub async fn execute_cancellable<I, S>(
        &self,
        args: I,
        cancel: &CancellationToken,
    ) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        self.execute_inner(args, cancel.clone()).await
    }

    /// Convenience wrapper for a single-argument command.
    pub async fn execute_single(&self, arg: impl Into<String>) -> Result<String> {
        self.execute([arg.into()]).await
    }

    async fn execute_inner(&self, args: Vec<String>, cancel: CancellationToken) -> Result<String> {
        self.check_ready()?;

        // Admission: logical requests are processed one at a time. Waiting
        // here is cancellable by the caller and by disposal.
        let _admit = tokio::select! {
            guard = self.admission.lock() => guard,
            () = cancel.cancelled() => return Err(Error::Cancelled),
            () = self.shutdown.cancelled() => return Err(Error::Cancelled),
        };
        self.check_ready()?;
        // A token that fired while we were waiting to be admitted still
        // prevents the write.
        if cancel.is_cancelled() || self.shutdown.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Write phase: the whole argument block plus its execute marker goes
        // out as one write under the writer lock, so blocks from different
        // requests never interleave. The write runs on its own task: once
        // entered it always completes, even if this future is dropped
        // mid-write while the pipe is applying backpressure. An abandoned
        // half-block would desynchronize every later response.
        let writer = Arc::clone(&self.writer);
        let correlator = Arc::clone(&self.correlator);
        let write = tokio::spawn(async move {
            let mut writer = writer.lock().await;
            let writer = writer.as_mut().ok_or(Error::NotInitialized)?;

            let key = correlator.mint_key();
            let rx = correlator.register(&key)?;
            let block = render_block(&args, Some(&key));
            if let Err(e) = write_all_flush(writer, &block).await {
                correlator.discard(&key);
                return Err(e);
            }
            Ok(rx)
        });
        let rx = match write.await {
            Ok(outcome) => outcome?,
            // The write task is never aborted; a join failure means it
            // panicked and nothing was written.
            Err(_) => return Err(Error::Cancelled),
        };
        drop(_admit);

        // Wait phase: outside both locks so other requests can be written
        // while the tool computes this one.
        tokio::select! {
            outcome = rx => match outcome {
                Ok(result) => result,
                // Sender dropped without resolving; treated as a flush.
                Err(_) => Err(Error::Cancelled),
            },
            () = cancel.cancelled() => Err(Error::Cancelled),
            () = self.shutdown.cancelled() => Err(Error::Cancelled),
        }
    }

    /// Write an administrative command with no execute marker and return as
    /// soon as the lines are written. No response is expected or awaited.
    async fn send_command(&self, args: &[&str]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(Error::NotInitialized)?;
        let block = render_block(args, None);
        write_all_flush(writer, &block).await
    }

    /// Shut the instance down.
    ///
    /// Unblocks every admitted and waiting request with a cancellation, asks
    /// the tool to leave stay-open mode, escalates to a cooperative signal
    /// and then a kill if it does not exit, and finally releases all process
    /// resources. Never fails for ordinary process misbehavior; safe to call
    /// concurrently and repeatedly.
    pub async fn dispose(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                State::Uninitialized | State::Disposed => return,
                State::Disposing => {}
                State::Initializing | State::Ready => *state = State::Disposing,
            }
        }
        // Unblock anyone queued at the admission lock or waiting for a
        // response before we start tearing the process down.
        self.shutdown.cancel();

        let _guard = self.dispose_lock.lock().await;
        if self.state() == State::Disposed {
            return;
        }

        let step = self.config.shutdown_step_timeout();
        self.wait_exit(step).await;

        if !self.exited() {
            match timeout(step, self.send_command(&STAY_OPEN_OFF)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "stay_open off command failed"),
                Err(_) => tracing::debug!("stay_open off command timed out"),
            }
            self.wait_exit(step).await;
        }

        if !self.exited() {
            if let Some(handle) = self.handle.lock().await.as_mut() {
                if let Err(e) = handle.interrupt() {
                    tracing::debug!(error = %e, "interrupt failed");
                }
            }
            self.wait_exit(step).await;
        }

        if !self.exited() {
            if let Some(handle) = self.handle.lock().await.as_mut() {
                if let Err(e) = handle.kill().await {
                    tracing::warn!(error = %e, "kill failed");
                }
            }
            self.wait_exit(step).await;
        }

        // Unconditional cleanup, regardless of how (or whether) the process
        // exited.
        for pump in self
            .pumps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
        {
            pump.abort();
        }
        *self.handle.lock().await = None;
        *self.writer.lock().await = None;
        self.correlator.cancel_all();
        self.set_state(State::Disposed);
        tracing::debug!("exiftool instance disposed");
    }

    fn check_ready(&self) -> Result<()> {
        match self.state() {
            State::Ready => Ok(()),
            State::Uninitialized | State::Initializing => Err(Error::NotInitialized),
            State::Disposed => Err(Error::Disposed),
            State::Disposing => Err(Error::Disposing),
        }
    }

    fn set_state(&self, state: State) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn exited(&self) -> bool {
        *self.exited_rx.borrow()
    }

    /// Wait up to `bound` for the process-exit notification. Returns
    /// immediately if exit was already observed.
    async fn wait_exit(&self, bound: Duration) -> bool {
        let mut rx = self.exited_rx.clone();
        // `wait_for` yields a guard borrowing `rx`; keep it in a local that
        // drops before `rx` does.
        let outcome = timeout(bound, rx.wait_for(|exited| *exited)).await;
        matches!(outcome, Ok(Ok(_)))
    }

    fn spawn_stdout_pump(
        &self,
        mut stdout: ProcessOutput,
        exited_tx: watch::Sender<bool>,
    ) -> JoinHandle<()> {
        let correlator = Arc::clone(&self.correlator);
        let mut framer = OutputFramer::new(self.config.output_capacity(), self.config.encoding());

        tokio::spawn(async move {
            let mut chunk = vec![0u8; 8192];
            loop {
                match stdout.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => match framer.write(&chunk[..n]) {
                        Ok(frames) => {
                            for frame in frames {
                                correlator.resolve(&frame.key, frame.text);
                            }
                        }
                        Err(Error::BufferOverflow { needed, capacity }) => {
                            tracing::error!(
                                needed,
                                capacity,
                                "output buffer overflow; failing all in-flight requests"
                            );
                            correlator.fail_all_with(move || Error::BufferOverflow {
                                needed,
                                capacity,
                            });
                            return;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "stdout framing failed");
                            let message = e.to_string();
                            correlator.fail_all_with(move || Error::ProcessError {
                                message: message.clone(),
                            });
                            return;
                        }
                    },
                    Err(e) => {
                        tracing::debug!(error = %e, "stdout read failed");
                        break;
                    }
                }
            }
            // EOF: the process is gone. Everything still in flight can never
            // be answered.
            let _ = exited_tx.send(true);
            correlator.fail_all_with(|| Error::ProcessError {
                message: "exiftool process exited".to_string(),
            });
        })
    }

    fn spawn_stderr_pump(&self, mut stderr: ProcessOutput) -> JoinHandle<()> {
        let correlator = Arc::clone(&self.correlator);
        let framer = ErrorFramer::new(self.config.encoding());

        tokio::spawn(async move {
            let mut chunk = vec![0u8; 8192];
            loop {
                match stderr.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Some(message) = framer.write(&chunk[..n]) {
                            tracing::warn!(%message, "exiftool reported an error");
                            correlator.fail_all_with(|| Error::ProcessError {
                                message: message.clone(),
                            });
                        }
                    }
                }
            }
        })
    }
}

/// Render one request block: each argument on its own line, optionally
/// terminated by the execute-marker line carrying the key.
fn render_block<S: AsRef<str>>(args: &[S], execute_key: Option<&str>) -> String {
    let mut block = String::new();
    for arg in args {
        block.push_str(arg.as_ref());
        block.push_str(LINE_TERMINATOR);
    }
    if let Some(key) = execute_key {
        block.push_str(EXECUTE_PREFIX);
        block.push_str(key);
        block.push_str(LINE_TERMINATOR);
    }
    block
}

async fn write_all_flush(writer: &mut ProcessStdin, block: &str) -> Result<()> {
    writer
        .write_all(block.as_bytes())
        .await
        .map_err(Error::io)?;
    writer.flush().await.map_err(Error::io)
}
