//! System-wide constants and defaults.

/// Default log-line template applied when a request carries an empty
/// `logFormat`.
pub const DEFAULT_LOG_FORMAT: &str = "{event} {ftype} '{path}{sep}{file}' ({pod}:{node})";

/// Root of the procfs mount used for host-view path resolution.
pub const PROC_ROOT: &str = "/proc";

/// Maximum number of undelivered messages an event queue holds.
pub const QUEUE_CAPACITY: usize = 10;

/// Maximum encoded size of a single event-queue message in bytes.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Prefix for generated event-queue names.
pub const QUEUE_NAME_PREFIX: &str = "/vigil";

/// Application name used in logs and queue naming.
pub const APP_NAME: &str = "vigil";

/// Binary name for the agent daemon.
pub const BIN_NAME: &str = "vigild";
