//! Domain primitive types used across the Vigil workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a container instance, as reported by the
/// orchestrator. May carry a runtime scheme prefix such as `docker://`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the ID with any `<runtime>://` scheme prefix removed.
    ///
    /// Orchestrators hand out IDs like `docker://3f4a…` or
    /// `containerd://3f4a…`; the bare ID is what appears in cgroup paths.
    #[must_use]
    pub fn runtime_stripped(&self) -> &str {
        self.0
            .split_once("://")
            .map_or(self.0.as_str(), |(_, id)| id)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single monitoring directive: which paths to watch, for which event
/// kinds, and whether to descend into subdirectories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherSubject {
    /// Paths to watch, expressed inside the container's filesystem view.
    pub paths: Vec<String>,
    /// Named event kinds (`all`, `access`, `modify`, `attrib`, `open`,
    /// `close`, `create`, `delete`, `move`). Unrecognized names are
    /// silently ignored.
    pub events: Vec<String>,
    /// Whether to also watch every directory under each path.
    #[serde(default)]
    pub recursive: bool,
}

/// A watch-creation or watch-destruction request from the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest {
    /// Node the target pod is scheduled on.
    pub node_name: String,
    /// Pod the watched containers belong to.
    pub pod_name: String,
    /// Containers to monitor.
    pub container_ids: Vec<ContainerId>,
    /// Monitoring directives, applied to every resolved process.
    pub subjects: Vec<WatcherSubject>,
    /// Log-line template; empty means the built-in default.
    #[serde(default)]
    pub log_format: String,
}

/// A single decoded filesystem event, as carried on an event queue.
///
/// `path_name` is the host-view path the watch was registered on; the
/// formatter strips the `/proc/<pid>/root` prefix before rendering.
/// `file_name` is empty when the event pertains to the watched path
/// itself rather than a child entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRecord {
    /// Raw inotify event mask.
    pub event_mask: u32,
    /// Whether the event subject is a directory.
    pub is_dir: bool,
    /// Host-view path of the watched directory or file.
    pub path_name: String,
    /// Child entry the event refers to, if any.
    pub file_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_prefix_is_stripped() {
        let id = ContainerId::new("docker://3f4a9bc1");
        assert_eq!(id.runtime_stripped(), "3f4a9bc1");
    }

    #[test]
    fn bare_id_is_unchanged() {
        let id = ContainerId::new("3f4a9bc1");
        assert_eq!(id.runtime_stripped(), "3f4a9bc1");
    }

    #[test]
    fn containerd_prefix_is_stripped() {
        let id = ContainerId::new("cri-o://deadbeef");
        assert_eq!(id.runtime_stripped(), "deadbeef");
    }

    #[test]
    fn watch_request_deserializes_camel_case() {
        let json = r#"{
            "nodeName": "node-1",
            "podName": "web-0",
            "containerIds": ["docker://abc"],
            "subjects": [{"paths": ["/etc"], "events": ["modify"], "recursive": true}]
        }"#;
        let req: WatchRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.node_name, "node-1");
        assert_eq!(req.subjects[0].paths, vec!["/etc"]);
        assert!(req.subjects[0].recursive);
        assert!(req.log_format.is_empty());
    }
}
