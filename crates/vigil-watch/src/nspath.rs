//! Container-view path translation.
//!
//! A path requested against a container is resolved through the target
//! process's host-visible root at `/proc/<pid>/root`, so watches observe
//! exactly that container's filesystem view without joining its mount
//! namespace. The formatter strips the same prefix before rendering, so
//! emitted paths read as the container sees them.

use std::path::{Path, PathBuf};

use nix::unistd::Pid;

/// Translates paths between the host view and a container's view.
#[derive(Debug, Clone)]
pub struct NamespacePathResolver {
    proc_root: PathBuf,
}

impl Default for NamespacePathResolver {
    fn default() -> Self {
        Self::new(vigil_common::constants::PROC_ROOT)
    }
}

impl NamespacePathResolver {
    /// Creates a resolver rooted at the given procfs mount.
    #[must_use]
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    /// Returns the host-view form of `path` as seen by process `pid`.
    ///
    /// `/etc/passwd` for PID 4242 becomes `/proc/4242/root/etc/passwd`.
    #[must_use]
    pub fn resolve(&self, pid: Pid, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let relative = path.strip_prefix("/").unwrap_or(path);
        self.proc_root
            .join(pid.to_string())
            .join("root")
            .join(relative)
    }

    /// Strips a leading `<proc_root>/<pid>/root` prefix from `path`.
    ///
    /// Paths without the prefix are returned unchanged. Stripping the
    /// watched root itself yields the empty string, matching the wire
    /// contract for events on the watch root.
    #[must_use]
    pub fn strip(&self, path: &str) -> String {
        let proc_root = self.proc_root.to_string_lossy();
        let Some(rest) = path.strip_prefix(proc_root.as_ref()) else {
            return path.to_owned();
        };
        let Some(rest) = rest.strip_prefix('/') else {
            return path.to_owned();
        };
        let Some((pid, rest)) = rest.split_once('/') else {
            return path.to_owned();
        };
        if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
            return path.to_owned();
        }
        match rest.strip_prefix("root") {
            Some(stripped) if stripped.is_empty() || stripped.starts_with('/') => {
                stripped.to_owned()
            }
            _ => path.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefixes_with_proc_root() {
        let resolver = NamespacePathResolver::default();
        assert_eq!(
            resolver.resolve(Pid::from_raw(4242), "/etc/passwd"),
            PathBuf::from("/proc/4242/root/etc/passwd")
        );
    }

    #[test]
    fn resolve_handles_relative_paths() {
        let resolver = NamespacePathResolver::default();
        assert_eq!(
            resolver.resolve(Pid::from_raw(1), "var/log"),
            PathBuf::from("/proc/1/root/var/log")
        );
    }

    #[test]
    fn strip_removes_host_view_prefix() {
        let resolver = NamespacePathResolver::default();
        assert_eq!(resolver.strip("/proc/4242/root/etc"), "/etc");
    }

    #[test]
    fn strip_of_watch_root_is_empty() {
        let resolver = NamespacePathResolver::default();
        assert_eq!(resolver.strip("/proc/4242/root"), "");
    }

    #[test]
    fn strip_leaves_foreign_paths_alone() {
        let resolver = NamespacePathResolver::default();
        assert_eq!(resolver.strip("/var/log/syslog"), "/var/log/syslog");
        assert_eq!(resolver.strip("/proc/self/root/etc"), "/proc/self/root/etc");
        assert_eq!(resolver.strip("/proc/42/rootfs/etc"), "/proc/42/rootfs/etc");
    }

    #[test]
    fn strip_respects_custom_proc_root() {
        let resolver = NamespacePathResolver::new("/host/proc");
        assert_eq!(resolver.strip("/host/proc/7/root/data"), "/data");
        assert_eq!(resolver.strip("/proc/7/root/data"), "/proc/7/root/data");
    }
}
