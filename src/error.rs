/// Errors that can occur when driving a stay-open ExifTool process.
///
/// Errors are organized by category:
/// - Configuration errors: detected at `build()` time
/// - Startup errors: the external process could not be launched
/// - Lifecycle errors: `execute` called outside the Ready window
/// - Runtime errors: failures while requests are in flight
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    // -------------------------------------------------------------------------
    // Configuration errors (detected at build() time)
    // -------------------------------------------------------------------------
    /// Invalid configuration provided to the builder.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // -------------------------------------------------------------------------
    // Startup errors
    // -------------------------------------------------------------------------
    /// The exiftool binary was not found.
    #[error("exiftool not found (searched: {searched})")]
    ToolNotFound {
        /// The executable path or name that was looked up.
        searched: String,
    },

    /// The process could not be started. The component stays uninitialized
    /// and `initialize` may be attempted again.
    #[error("failed to start exiftool process: {0}")]
    InitializationFailed(#[source] std::io::Error),

    // -------------------------------------------------------------------------
    // Lifecycle errors
    // -------------------------------------------------------------------------
    /// `execute` was called before `initialize` completed.
    #[error("exiftool has not been initialized")]
    NotInitialized,

    /// `execute` was called while disposal is in progress.
    #[error("exiftool is shutting down")]
    Disposing,

    /// `execute` was called after disposal completed.
    #[error("exiftool has been disposed")]
    Disposed,

    // -------------------------------------------------------------------------
    // Runtime errors
    // -------------------------------------------------------------------------
    /// A freshly minted key was already registered. Keys are strictly
    /// increasing, so this indicates an internal invariant violation; nothing
    /// is written to the process when it occurs.
    #[error("request key {key} is already pending")]
    DuplicateKey {
        /// The colliding key.
        key: String,
    },

    /// The process wrote to its error channel. The error channel carries no
    /// request key, so the message is surfaced to every request that was
    /// pending at the time.
    #[error("exiftool reported an error: {message}")]
    ProcessError {
        /// The raw decoded stderr text.
        message: String,
    },

    /// The request was cancelled, either by the caller's token or because
    /// the component was disposed while the request was waiting.
    #[error("request cancelled")]
    Cancelled,

    /// The output buffer cannot hold a pending response. This is a
    /// deployment misconfiguration (responses are larger than provisioned
    /// for), not a transient condition.
    #[error("output buffer overflow: {needed} bytes needed, capacity is {capacity}")]
    BufferOverflow {
        /// Bytes the buffer would have had to hold.
        needed: usize,
        /// Configured buffer capacity.
        capacity: usize,
    },

    /// I/O error communicating with the subprocess.
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),
}

/// A specialized Result type for libexiftool operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an IO error.
    pub fn io(source: std::io::Error) -> Self {
        Self::Io(source)
    }

    /// True for admission-time lifecycle errors: the component was not in
    /// the Ready state when `execute` was called.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            Error::NotInitialized | Error::Disposing | Error::Disposed
        )
    }

    /// True when the outcome was a cancellation rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
