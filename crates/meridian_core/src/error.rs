//! # Scheduler Error Types
//!
//! All errors that can surface from the tick scheduler, plus the process-wide
//! sink that failures inside a cycle are reported to.

use std::any::Any;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::lock::HandleId;
use crate::thread::WorkerId;

/// Errors that can occur while configuring or running the scheduler.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Objects were submitted for assignment but the provider has no worker.
    #[error("no worker threads available to assign {objects} objects")]
    NoWorkers {
        /// Number of objects waiting for assignment.
        objects: usize,
    },

    /// The OS refused to spawn a scheduler thread.
    #[error("failed to spawn thread {name}: {source}")]
    ThreadSpawn {
        /// Name of the thread that could not be spawned.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// `start` was called on a driver that is already running.
    #[error("update driver is already running")]
    AlreadyRunning,

    /// A tick cycle panicked outside of any object tick.
    #[error("tick cycle {tick} panicked: {message}")]
    CyclePanicked {
        /// Cycle number.
        tick: u64,
        /// Panic payload, rendered as text.
        message: String,
    },

    /// A single object's tick panicked inside a worker.
    #[error("object {handle} panicked during tick on worker {worker}: {message}")]
    TickPanicked {
        /// Worker that was ticking the object.
        worker: WorkerId,
        /// Handle of the object.
        handle: HandleId,
        /// Panic payload, rendered as text.
        message: String,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while loading a [`crate::SchedulerConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The config file is not valid TOML for the schema.
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Receives failures caught at the worker and driver boundaries.
///
/// Reporting must not block: it is called from worker threads in the
/// middle of a tick window.
pub trait ErrorSink: Send + Sync {
    /// Reports a failure. The scheduler keeps running afterwards.
    fn report(&self, error: &SchedulerError);
}

/// Default sink: logs every failure through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, error: &SchedulerError) {
        tracing::error!(%error, "scheduler failure");
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");

        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_error_display() {
        let error = SchedulerError::NoWorkers { objects: 3 };
        assert_eq!(error.to_string(), "no worker threads available to assign 3 objects");

        let error = SchedulerError::from(ConfigError::Invalid("threads must be > 0".into()));
        assert_eq!(error.to_string(), "invalid configuration: threads must be > 0");
    }
}
