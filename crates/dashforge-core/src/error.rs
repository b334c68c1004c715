//! Unified error type for dashforge.
//!
//! All crates funnel their failures into [`Error`]. Structurally invalid
//! requests surface as [`Error::Validation`] before any side effect; failures
//! of the external tools themselves are reported by the pipeline as an absent
//! result rather than through this type.

/// Unified error type covering all failure modes in dashforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller input failed validation (missing file, empty ladder, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Source metadata could not be read or has an unexpected shape.
    #[error("Probe error: {0}")]
    Probe(String),

    /// An external tool (ffmpeg, ffprobe, MP4Box) is missing or could not run.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A manifest could not be found, parsed, or written.
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// The configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to a process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_) | Error::Config(_) => 2,
            Error::Probe(_) => 3,
            Error::Tool { .. } => 4,
            Error::Manifest(_) => 5,
            Error::Io { .. } | Error::Internal(_) => 1,
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Manifest`].
    pub fn manifest(message: impl Into<String>) -> Self {
        Error::Manifest(message.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
