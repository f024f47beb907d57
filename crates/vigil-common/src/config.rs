//! Global configuration model for the Vigil agent.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Root of the procfs mount used to resolve container-view paths
    /// and to scan for container PIDs.
    pub proc_root: PathBuf,
    /// Maximum number of undelivered messages per event queue.
    pub queue_capacity: usize,
    /// Maximum encoded size of a single queue message in bytes.
    pub max_message_size: usize,
    /// Template applied when a request carries an empty `logFormat`.
    pub default_log_format: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from(crate::constants::PROC_ROOT),
            queue_capacity: crate::constants::QUEUE_CAPACITY,
            max_message_size: crate::constants::MAX_MESSAGE_SIZE,
            default_log_format: crate::constants::DEFAULT_LOG_FORMAT.to_owned(),
        }
    }
}

impl AgentConfig {
    /// Returns a config rooted at a non-standard procfs path.
    ///
    /// Used by tests and by deployments where the host's procfs is
    /// mounted somewhere other than `/proc` inside the agent container.
    #[must_use]
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            ..Self::default()
        }
    }
}
