//! Process management for the external ExifTool instance.
//!
//! The correlation engine never touches `tokio::process` directly; it talks
//! to an abstract [`ProcessHandle`] obtained from a [`ProcessFactory`]. The
//! default factory, [`ExifToolLauncher`], spawns the real tool with the
//! stay-open argument contract:
//!
//! ```text
//! exiftool [-config <file>] -stay_open True -@ - <common args...>
//! ```
//!
//! `-@ -` makes the tool read further arguments from stdin, which is where
//! the per-request argument lines and execute markers go. Tests substitute
//! their own factory to drive the engine without any real process.

mod handle;
mod spawn;

pub use handle::{ProcessFactory, ProcessHandle, ProcessOutput, ProcessStdin};
pub use spawn::{ExifToolLauncher, ExifToolProcess};
