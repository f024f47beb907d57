//! The per-(process, subject) watch attach-and-poll loop.
//!
//! Each attacher owns its own inotify instance and watch-descriptor
//! table exclusively. The loop multiplexes the inotify event stream
//! against a [`CancellationSignal`] and pushes decoded records into an
//! [`EventSink`]; push failures are logged and never abort the loop.
//!
//! Recursive subjects are covered dynamically: the watch mask always
//! includes directory-creation bits internally, and a watch is added for
//! every directory that appears under a recursive root after attach.
//! Events that do not match the requested mask are filtered before
//! emission.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use inotify::{EventMask, EventOwned, Inotify, WatchDescriptor, WatchMask, Watches};
use nix::unistd::Pid;

use vigil_common::error::Result;
use vigil_common::types::EventRecord;

use crate::nspath::NamespacePathResolver;
use crate::signal::CancellationSignal;

/// Destination for decoded filesystem events.
///
/// Implemented by the agent's event queue; tests substitute an
/// in-memory collector.
pub trait EventSink: Send + Sync {
    /// Pushes one record toward the consumer.
    ///
    /// # Errors
    ///
    /// Returns an error when the sink is full or closed; the attacher
    /// logs and drops the record.
    fn push(&self, record: &EventRecord) -> Result<()>;
}

/// Everything a single attach loop needs to know about its target.
#[derive(Debug, Clone)]
pub struct AttachSpec {
    /// Host PID of the monitored container process.
    pub pid: Pid,
    /// Paths to watch, as seen inside the container.
    pub paths: Vec<PathBuf>,
    /// Composed inotify event mask requested by the subject.
    pub mask: u32,
    /// Whether directories under each path are watched as well.
    pub recursive: bool,
}

/// Terminal outcome of an attach loop, reported to the registry reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The loop observed its cancellation signal and exited cleanly.
    Canceled,
    /// The watch facility failed fatally or no watch could be attached.
    Failed,
}

/// One attach-and-poll task for a single (process, subject) pair.
pub struct WatchAttacher {
    spec: AttachSpec,
    resolver: NamespacePathResolver,
    signal: CancellationSignal,
    sink: Arc<dyn EventSink>,
}

impl WatchAttacher {
    /// Creates an attacher for the given target, wired to a signal and
    /// an event sink.
    #[must_use]
    pub fn new(
        spec: AttachSpec,
        resolver: NamespacePathResolver,
        signal: CancellationSignal,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            spec,
            resolver,
            signal,
            sink,
        }
    }

    /// Runs the attach-and-poll loop until canceled or fatally failed.
    pub async fn run(self) -> WatchOutcome {
        let mut inotify = match Inotify::init() {
            Ok(inotify) => inotify,
            Err(error) => {
                tracing::warn!(pid = %self.spec.pid, %error, "inotify init failed");
                return WatchOutcome::Failed;
            }
        };

        let watch_mask = self.effective_watch_mask();
        let mut watches = inotify.watches();
        let mut wd_paths: HashMap<WatchDescriptor, PathBuf> = HashMap::new();

        for path in &self.spec.paths {
            let host_path = self.resolver.resolve(self.spec.pid, path);
            add_watch(&mut watches, &mut wd_paths, &host_path, watch_mask);
            if self.spec.recursive {
                for dir in collect_subdirs(&host_path) {
                    add_watch(&mut watches, &mut wd_paths, &dir, watch_mask);
                }
            }
        }

        if wd_paths.is_empty() {
            tracing::warn!(pid = %self.spec.pid, "no watch could be attached");
            return WatchOutcome::Failed;
        }
        tracing::debug!(
            pid = %self.spec.pid,
            watches = wd_paths.len(),
            mask = self.spec.mask,
            "watches attached"
        );

        let mut stream = match inotify.into_event_stream([0u8; 4096]) {
            Ok(stream) => stream,
            Err(error) => {
                tracing::warn!(pid = %self.spec.pid, %error, "event stream setup failed");
                return WatchOutcome::Failed;
            }
        };
        let mut watches = stream.watches();

        loop {
            tokio::select! {
                () = self.signal.cancelled() => {
                    tracing::debug!(pid = %self.spec.pid, "watch canceled");
                    return WatchOutcome::Canceled;
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        self.handle_event(&mut watches, &mut wd_paths, event);
                    }
                    Some(Err(error)) => {
                        tracing::error!(pid = %self.spec.pid, %error, "watch facility error");
                        return WatchOutcome::Failed;
                    }
                    None => {
                        tracing::error!(pid = %self.spec.pid, "event stream ended");
                        return WatchOutcome::Failed;
                    }
                }
            }
        }
    }

    /// The mask actually registered with the kernel. Recursive roots
    /// always watch directory creations so coverage can be extended.
    fn effective_watch_mask(&self) -> WatchMask {
        let mut bits = self.spec.mask;
        if self.spec.recursive {
            bits |= libc::IN_CREATE | libc::IN_MOVED_TO;
        }
        WatchMask::from_bits_truncate(bits)
    }

    fn handle_event(
        &self,
        watches: &mut Watches,
        wd_paths: &mut HashMap<WatchDescriptor, PathBuf>,
        event: EventOwned,
    ) {
        if event.mask.contains(EventMask::Q_OVERFLOW) {
            tracing::warn!(pid = %self.spec.pid, "inotify queue overflowed, events lost");
            return;
        }
        if event.mask.contains(EventMask::IGNORED) {
            let _ = wd_paths.remove(&event.wd);
            return;
        }
        let Some(dir_path) = wd_paths.get(&event.wd).cloned() else {
            return;
        };

        let file_name = event
            .name
            .as_ref()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let is_dir = event.mask.contains(EventMask::ISDIR);

        // A directory appearing under a recursive root extends coverage,
        // including anything nested inside a moved-in tree.
        if self.spec.recursive
            && is_dir
            && event
                .mask
                .intersects(EventMask::CREATE | EventMask::MOVED_TO)
            && !file_name.is_empty()
        {
            let new_dir = dir_path.join(&file_name);
            let watch_mask = self.effective_watch_mask();
            add_watch(watches, wd_paths, &new_dir, watch_mask);
            for dir in collect_subdirs(&new_dir) {
                add_watch(watches, wd_paths, &dir, watch_mask);
            }
        }

        // Bits watched only for coverage bookkeeping are not emitted.
        if event.mask.bits() & self.spec.mask == 0 {
            return;
        }

        let record = EventRecord {
            event_mask: event.mask.bits(),
            is_dir,
            path_name: dir_path.to_string_lossy().into_owned(),
            file_name,
        };
        if let Err(error) = self.sink.push(&record) {
            tracing::warn!(pid = %self.spec.pid, %error, "dropping event");
        }
    }
}

fn add_watch(
    watches: &mut Watches,
    wd_paths: &mut HashMap<WatchDescriptor, PathBuf>,
    path: &Path,
    mask: WatchMask,
) {
    match watches.add(path, mask) {
        Ok(wd) => {
            let _ = wd_paths.insert(wd, path.to_path_buf());
        }
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to add watch");
        }
    }
}

/// Directories transitively reachable under `root` at call time.
/// Symlinks are not followed.
fn collect_subdirs(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let is_dir = entry.file_type().is_ok_and(|ft| ft.is_dir());
            if is_dir {
                let path = entry.path();
                found.push(path.clone());
                pending.push(path);
            }
        }
    }
    found
}
