//! # vigil-watch
//!
//! Filesystem-watch mechanics for the Vigil agent: composing inotify
//! event masks from named event kinds, translating watch paths into a
//! target process's filesystem view, one-shot cancellation signals, and
//! the per-(process, subject) attach-and-poll loop.

pub mod attacher;
pub mod mask;
pub mod nspath;
pub mod signal;

pub use attacher::{AttachSpec, EventSink, WatchAttacher, WatchOutcome};
pub use nspath::NamespacePathResolver;
pub use signal::{CancellationSignal, SignalId};
