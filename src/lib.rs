//! # libexiftool
//!
//! Async Rust wrapper for ExifTool's `-stay_open` batch mode.
//!
//! ExifTool is slow to start and normally runs one command per invocation.
//! In stay-open mode a single process stays resident and reads further
//! commands from stdin; this library turns that into a persistent worker
//! serving many sequential logical requests, without callers having to know
//! about process lifecycle, buffering, or output framing:
//!
//! - One [`ExifTool`] instance owns one external process
//! - Requests are tagged with a key, written as an atomic argument block,
//!   and awaited independently while others are in flight
//! - Shutdown degrades gracefully: stay-open off, cooperative signal, kill
//!
//! ## Quick Start
//!
//! ```ignore
//! use libexiftool::{ExifTool, ExifToolConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let tool = ExifTool::new(ExifToolConfig::builder().build()?);
//!     tool.initialize().await?;
//!
//!     let metadata = tool.execute(["-S", "photo.jpg"]).await?;
//!     println!("{}", metadata);
//!
//!     tool.dispose().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```ignore
//! use libexiftool::{ExifToolConfig, TextEncoding};
//!
//! let config = ExifToolConfig::builder()
//!     .executable("/opt/exiftool/exiftool")
//!     .config_file("/etc/exiftool.cfg")
//!     .common_args(["-charset", "utf8"])
//!     .encoding(TextEncoding::Utf8)
//!     .build()?;
//! ```
//!
//! ## Error model
//!
//! A request either returns the tool's output text or one [`Error`] naming
//! what went wrong: an invalid lifecycle state, a process-reported error, a
//! cancellation, or an I/O failure. [`ExifTool::dispose`] never surfaces
//! process misbehavior; cleanup is unconditional.

mod client;
mod config;
mod correlate;
mod error;
pub mod process;
pub mod protocol;

pub use error::{Error, Result};

// Re-export the main client types at crate root
pub use client::{ExifTool, State};
pub use config::{
    ExifToolConfig, ExifToolConfigBuilder, DEFAULT_OUTPUT_CAPACITY, DEFAULT_SHUTDOWN_STEP_TIMEOUT,
};
pub use correlate::RequestCorrelator;

// Re-export commonly used process types at crate root
pub use process::{ExifToolLauncher, ExifToolProcess, ProcessFactory, ProcessHandle};

// Re-export commonly used protocol types at crate root
pub use protocol::{ErrorFramer, OutputFramer, ResponseFrame, TextEncoding};
