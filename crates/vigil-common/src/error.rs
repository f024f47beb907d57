//! Unified error types for the Vigil workspace.
//!
//! The taxonomy separates request-level failures (surfaced to the caller)
//! from per-watch failures (logged, the rest of the request proceeds).

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum VigilError {
    /// No container ID in the request resolved to a live process.
    #[error("no container ID resolved to a live process")]
    NoResolvablePids,

    /// The event queue has been closed or its name unlinked.
    #[error("event queue {id} is closed")]
    QueueClosed {
        /// Identifier of the closed queue.
        id: String,
    },

    /// The event queue is at capacity.
    #[error("event queue {id} is full")]
    QueueFull {
        /// Identifier of the full queue.
        id: String,
    },

    /// An encoded event record exceeds the queue's message size limit.
    #[error("event record of {size} bytes exceeds the {max}-byte limit")]
    MessageTooLarge {
        /// Size of the rejected record.
        size: usize,
        /// Maximum allowed message size.
        max: usize,
    },

    /// A queue payload could not be decoded into an event record.
    #[error("malformed event record: {message}")]
    Decode {
        /// Description of the malformed payload.
        message: String,
    },

    /// A filesystem watch could not be established or failed fatally.
    #[error("watch failed at {path}: {source}")]
    Watch {
        /// Path the watch was attached to.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A user-supplied log template failed to render.
    #[error("template render failed: {message}")]
    Template {
        /// Description of the render failure.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, VigilError>;
