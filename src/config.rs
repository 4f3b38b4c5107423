//! Client configuration and builder.
//!
//! # Example
//!
//! ```ignore
//! use libexiftool::ExifToolConfig;
//!
//! let config = ExifToolConfig::builder()
//!     .executable("/usr/bin/exiftool")
//!     .config_file("/etc/exiftool.cfg")
//!     .common_args(["-charset", "utf8"])
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::TextEncoding;
use crate::{Error, Result};

/// Default capacity of the stdout reassembly buffer.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 64 * 1024;

/// Default bound for each step of the graceful shutdown ladder.
pub const DEFAULT_SHUTDOWN_STEP_TIMEOUT: Duration = Duration::from_millis(500);

/// Configuration for a stay-open ExifTool instance.
///
/// Use [`ExifToolConfig::builder()`] to create one. The configuration is a
/// plain value object; it can be cloned freely and shared between instances.
#[derive(Debug, Clone)]
pub struct ExifToolConfig {
    // Executable
    pub(crate) executable: String,
    pub(crate) config_file: Option<PathBuf>,
    pub(crate) common_args: Vec<String>,

    // Output handling
    pub(crate) encoding: TextEncoding,
    pub(crate) output_capacity: usize,

    // Process options
    pub(crate) working_directory: Option<PathBuf>,
    pub(crate) env_vars: HashMap<String, String>,
    pub(crate) inherit_env: bool,

    // Shutdown
    pub(crate) shutdown_step_timeout: Duration,
}

impl ExifToolConfig {
    /// Create a new builder with default settings.
    pub fn builder() -> ExifToolConfigBuilder {
        ExifToolConfigBuilder::default()
    }

    /// The executable path or name used to launch the tool.
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// The `-config` file passed at startup, if any.
    pub fn config_file(&self) -> Option<&PathBuf> {
        self.config_file.as_ref()
    }

    /// Common arguments appended to the startup argument list.
    pub fn common_args(&self) -> &[String] {
        &self.common_args
    }

    /// Text encoding used to decode stdout and stderr.
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Capacity of the stdout reassembly buffer in bytes.
    pub fn output_capacity(&self) -> usize {
        self.output_capacity
    }

    /// Bound for each step of the graceful shutdown ladder.
    pub fn shutdown_step_timeout(&self) -> Duration {
        self.shutdown_step_timeout
    }
}

/// Builder for [`ExifToolConfig`].
///
/// Validates the configuration when [`build()`](ExifToolConfigBuilder::build)
/// is called.
#[derive(Debug, Clone)]
pub struct ExifToolConfigBuilder {
    executable: String,
    config_file: Option<PathBuf>,
    common_args: Vec<String>,
    encoding: TextEncoding,
    output_capacity: usize,
    working_directory: Option<PathBuf>,
    env_vars: HashMap<String, String>,
    inherit_env: bool,
    shutdown_step_timeout: Duration,
}

impl Default for ExifToolConfigBuilder {
    fn default() -> Self {
        Self {
            executable: "exiftool".to_string(),
            config_file: None,
            common_args: Vec::new(),
            encoding: TextEncoding::default(),
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            working_directory: None,
            env_vars: HashMap::new(),
            inherit_env: true, // Default: inherit parent environment
            shutdown_step_timeout: DEFAULT_SHUTDOWN_STEP_TIMEOUT,
        }
    }
}

impl ExifToolConfigBuilder {
    /// Path or name of the exiftool executable. Defaults to `exiftool`
    /// (resolved via `PATH`).
    pub fn executable(mut self, path: impl Into<String>) -> Self {
        self.executable = path.into();
        self
    }

    /// ExifTool `-config` file to load at startup.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Common arguments appended after the stay-open flags, in the order
    /// given. Empty entries are filtered out.
    pub fn common_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.common_args = args
            .into_iter()
            .map(Into::into)
            .filter(|a: &String| !a.is_empty())
            .collect();
        self
    }

    /// Text encoding for the tool's output. Defaults to UTF-8.
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Capacity of the stdout reassembly buffer. Responses larger than this
    /// fail the instance with a buffer overflow, so size it for the largest
    /// expected response.
    pub fn output_capacity(mut self, bytes: usize) -> Self {
        self.output_capacity = bytes;
        self
    }

    /// Working directory for the subprocess.
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    /// Add/override an environment variable for the subprocess.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Don't inherit the parent environment.
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    /// Bound for each step of the graceful shutdown ladder. Disposal takes
    /// at most a few multiples of this when the process does not cooperate.
    pub fn shutdown_step_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_step_timeout = timeout;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the executable path is blank or
    /// the output capacity is zero.
    pub fn build(self) -> Result<ExifToolConfig> {
        if self.executable.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "executable path must not be blank".to_string(),
            ));
        }
        if self.output_capacity == 0 {
            return Err(Error::InvalidConfig(
                "output capacity must be non-zero".to_string(),
            ));
        }
        Ok(ExifToolConfig {
            executable: self.executable,
            config_file: self.config_file,
            common_args: self.common_args,
            encoding: self.encoding,
            output_capacity: self.output_capacity,
            working_directory: self.working_directory,
            env_vars: self.env_vars,
            inherit_env: self.inherit_env,
            shutdown_step_timeout: self.shutdown_step_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = ExifToolConfig::builder().build().unwrap();
        assert_eq!(config.executable(), "exiftool");
        assert!(config.config_file().is_none());
        assert!(config.common_args().is_empty());
        assert_eq!(config.encoding(), TextEncoding::Utf8);
        assert_eq!(config.output_capacity(), DEFAULT_OUTPUT_CAPACITY);
        assert_eq!(config.shutdown_step_timeout(), DEFAULT_SHUTDOWN_STEP_TIMEOUT);
    }

    #[test]
    fn blank_executable_is_rejected() {
        let err = ExifToolConfig::builder().executable("   ").build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = ExifToolConfig::builder().output_capacity(0).build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn empty_common_args_are_filtered() {
        let config = ExifToolConfig::builder()
            .common_args(["-charset", "", "utf8", ""])
            .build()
            .unwrap();
        assert_eq!(config.common_args(), ["-charset", "utf8"]);
    }

    #[test]
    fn builder_chains_options() {
        let config = ExifToolConfig::builder()
            .executable("/opt/exiftool/exiftool")
            .config_file("/etc/exiftool.cfg")
            .common_args(["-n"])
            .encoding(TextEncoding::Latin1)
            .output_capacity(128 * 1024)
            .working_directory("/tmp")
            .env("LANG", "C")
            .inherit_env(false)
            .shutdown_step_timeout(Duration::from_millis(100))
            .build()
            .unwrap();

        assert_eq!(config.executable(), "/opt/exiftool/exiftool");
        assert_eq!(config.config_file().unwrap().to_str(), Some("/etc/exiftool.cfg"));
        assert_eq!(config.encoding(), TextEncoding::Latin1);
        assert_eq!(config.output_capacity(), 128 * 1024);
        assert_eq!(config.shutdown_step_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn config_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<ExifToolConfig>();
    }
}
