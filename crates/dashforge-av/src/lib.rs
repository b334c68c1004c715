//! # dashforge-av
//!
//! External tool plumbing for the dashforge pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg,
//!   ffprobe, and MP4Box.
//! - **Command execution** ([`ToolCommand`], [`ProcessRunner`]) -- async
//!   process execution that streams output lines to callbacks while the tool
//!   runs.
//! - **Probing** ([`Prober`], [`FfprobeProber`]) -- structured source
//!   metadata as a [`ProbeDocument`].
//! - **Workspace management** ([`Workspace`]) -- per-invocation temporary
//!   directory plus file relocation and best-effort removal.

pub mod command;
pub mod probe;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ExecutionResult, LineSink, ProcessRunner, TokioProcessRunner, ToolCommand};
pub use probe::{FfprobeProber, ProbeDocument, ProbeFormat, ProbeStream, Prober};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::{relocate, remove_best_effort, Workspace};
