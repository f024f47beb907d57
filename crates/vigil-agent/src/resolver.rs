//! Container-ID to host-PID resolution.
//!
//! The agent only ever sees container IDs; watches need host PIDs. The
//! default resolver scans procfs and matches the (prefix-stripped)
//! container ID against each process's cgroup membership.

use std::path::PathBuf;

use nix::unistd::Pid;

use vigil_common::types::ContainerId;

/// Resolves a container ID to the host PID of its init process.
pub trait ContainerPidResolver: Send + Sync {
    /// Returns the host PID, or `None` when no live process matches.
    fn resolve(&self, container_id: &ContainerId) -> Option<Pid>;
}

/// Procfs-scanning resolver: a process belongs to a container when the
/// container ID appears in its `/proc/<pid>/cgroup`.
#[derive(Debug, Clone)]
pub struct ProcPidResolver {
    proc_root: PathBuf,
}

impl Default for ProcPidResolver {
    fn default() -> Self {
        Self::new(vigil_common::constants::PROC_ROOT)
    }
}

impl ProcPidResolver {
    /// Creates a resolver scanning the given procfs root.
    #[must_use]
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl ContainerPidResolver for ProcPidResolver {
    fn resolve(&self, container_id: &ContainerId) -> Option<Pid> {
        let wanted = container_id.runtime_stripped();
        if wanted.is_empty() {
            return None;
        }
        let entries = std::fs::read_dir(&self.proc_root).ok()?;

        let mut candidates: Vec<i32> = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(pid) = name.to_str().and_then(|n| n.parse::<i32>().ok()) else {
                continue;
            };
            let cgroup = entry.path().join("cgroup");
            let Ok(contents) = std::fs::read_to_string(cgroup) else {
                continue;
            };
            if contents.contains(wanted) {
                candidates.push(pid);
            }
        }
        // The container's init process has the lowest PID among members.
        candidates.into_iter().min().map(Pid::from_raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_proc_entry(root: &std::path::Path, pid: i32, cgroup: &str) {
        let dir = root.join(pid.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("cgroup"), cgroup).unwrap();
    }

    #[test]
    fn finds_pid_by_cgroup_membership() {
        let tmp = tempfile::tempdir().unwrap();
        write_proc_entry(tmp.path(), 100, "0::/kubepods/pod1/3f4a9bc1\n");
        write_proc_entry(tmp.path(), 200, "0::/kubepods/pod2/deadbeef\n");

        let resolver = ProcPidResolver::new(tmp.path());
        assert_eq!(
            resolver.resolve(&ContainerId::new("3f4a9bc1")),
            Some(Pid::from_raw(100))
        );
    }

    #[test]
    fn strips_runtime_prefix_before_matching() {
        let tmp = tempfile::tempdir().unwrap();
        write_proc_entry(tmp.path(), 321, "0::/kubepods/pod1/3f4a9bc1\n");

        let resolver = ProcPidResolver::new(tmp.path());
        assert_eq!(
            resolver.resolve(&ContainerId::new("docker://3f4a9bc1")),
            Some(Pid::from_raw(321))
        );
    }

    #[test]
    fn picks_the_lowest_member_pid() {
        let tmp = tempfile::tempdir().unwrap();
        write_proc_entry(tmp.path(), 900, "0::/kubepods/pod1/3f4a9bc1\n");
        write_proc_entry(tmp.path(), 150, "0::/kubepods/pod1/3f4a9bc1\n");

        let resolver = ProcPidResolver::new(tmp.path());
        assert_eq!(
            resolver.resolve(&ContainerId::new("3f4a9bc1")),
            Some(Pid::from_raw(150))
        );
    }

    #[test]
    fn unknown_container_resolves_to_none() {
        let tmp = tempfile::tempdir().unwrap();
        write_proc_entry(tmp.path(), 100, "0::/kubepods/pod1/3f4a9bc1\n");

        let resolver = ProcPidResolver::new(tmp.path());
        assert_eq!(resolver.resolve(&ContainerId::new("missing")), None);
    }

    #[test]
    fn non_numeric_proc_entries_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("sys")).unwrap();
        std::fs::write(tmp.path().join("sys/cgroup"), "3f4a9bc1").unwrap();

        let resolver = ProcPidResolver::new(tmp.path());
        assert_eq!(resolver.resolve(&ContainerId::new("3f4a9bc1")), None);
    }
}
