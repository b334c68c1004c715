//! Progress and diagnostic sinks.
//!
//! The pipeline reports through these two single-method traits instead of
//! calling a logging framework directly, so callers decide where transcoder
//! progress and tool chatter end up. Both are invoked from the task draining
//! the external process's output and must return quickly.

use tokio::sync::mpsc;

/// Receives fractional completion estimates in `[0, 1]`.
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64);
}

/// Receives tool output lines that are not progress updates.
pub trait DiagnosticSink: Send + Sync {
    fn accept(&self, line: &str);
}

/// A [`ProgressSink`] wrapping a callback.
pub struct ProgressFn {
    callback: Box<dyn Fn(f64) + Send + Sync>,
}

impl ProgressFn {
    pub fn new(callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// A sink that discards all progress reports.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }
}

impl ProgressSink for ProgressFn {
    fn report(&self, fraction: f64) {
        (self.callback)(fraction);
    }
}

impl std::fmt::Debug for ProgressFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressFn").finish_non_exhaustive()
    }
}

/// A [`ProgressSink`] forwarding fractions over an unbounded channel, so the
/// consumer can be arbitrarily slow without stalling the output drain.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<f64>,
}

impl ChannelProgress {
    /// Create a sink and the receiver observing it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<f64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, fraction: f64) {
        // A dropped receiver only means nobody is watching.
        let _ = self.tx.send(fraction);
    }
}

/// Forwards tool output to `tracing` at TRACE level under `dashforge::tool`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn accept(&self, line: &str) {
        tracing::trace!(target: "dashforge::tool", "{line}");
    }
}
