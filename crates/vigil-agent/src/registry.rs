//! The watcher registry: one handle per (node, resolved PID set).
//!
//! All structural state lives behind a single async mutex: the handle
//! map and every handle's cancellation-signal list. Watch tasks report
//! their terminal outcome over a completion channel consumed by a
//! reaper task, which reclaims the signal bookkeeping immediately — no
//! polling.
//!
//! Updating an existing handle re-creates its event queue; events the
//! prior generation had queued but not yet formatted are discarded
//! (see the queue module).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use nix::unistd::Pid;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use vigil_common::config::AgentConfig;
use vigil_common::constants::QUEUE_NAME_PREFIX;
use vigil_common::error::Result;
use vigil_common::types::{WatchRequest, WatcherSubject};
use vigil_watch::mask::mask_from_events;
use vigil_watch::{
    AttachSpec, CancellationSignal, EventSink, NamespacePathResolver, SignalId, WatchAttacher,
    WatchOutcome,
};

use crate::format::{EventFormatter, LogSink};
use crate::queue::{QueueBroker, QueueWriter};

/// Spawns one watch task per (process, subject) pair.
///
/// The production implementation runs the inotify attach loop; tests
/// substitute task bodies with controlled lifetimes.
pub trait WatchSpawner: Send + Sync + 'static {
    /// Starts a watch task and returns its join handle.
    fn spawn_watch(
        &self,
        spec: AttachSpec,
        signal: CancellationSignal,
        sink: Arc<dyn EventSink>,
    ) -> JoinHandle<WatchOutcome>;
}

/// Production spawner backed by [`WatchAttacher`].
pub struct InotifySpawner {
    resolver: NamespacePathResolver,
}

impl InotifySpawner {
    /// Creates a spawner resolving paths through the given procfs root.
    #[must_use]
    pub const fn new(resolver: NamespacePathResolver) -> Self {
        Self { resolver }
    }
}

impl WatchSpawner for InotifySpawner {
    fn spawn_watch(
        &self,
        spec: AttachSpec,
        signal: CancellationSignal,
        sink: Arc<dyn EventSink>,
    ) -> JoinHandle<WatchOutcome> {
        tokio::spawn(WatchAttacher::new(spec, self.resolver.clone(), signal, sink).run())
    }
}

/// Registry key: a node plus the exact set of resolved PIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WatcherKey {
    node_name: String,
    pids: BTreeSet<Pid>,
}

impl WatcherKey {
    fn new(node_name: &str, pids: &[Pid]) -> Self {
        Self {
            node_name: node_name.to_owned(),
            pids: pids.iter().copied().collect(),
        }
    }
}

/// Registry entry for one active registration.
struct WatcherHandle {
    pod_name: String,
    queue: QueueWriter,
    cancel_signals: Vec<CancellationSignal>,
}

/// What a create call returns to the orchestrator: where the events go
/// and which cancellation signals this call brought to life.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleDescriptor {
    /// Node of the registration.
    pub node_name: String,
    /// Pod of the registration.
    pub pod_name: String,
    /// Event queue generation serving this registration.
    pub queue_id: String,
    /// Resolved host PIDs.
    pub pids: Vec<i32>,
    /// Identifiers of the cancellation signals created by this call.
    pub signal_ids: Vec<u64>,
}

struct Completion {
    key: WatcherKey,
    signal_id: SignalId,
    outcome: WatchOutcome,
}

/// Stateful core mapping (node, PID set) to active watcher handles.
pub struct WatcherRegistry {
    handles: Arc<Mutex<HashMap<WatcherKey, WatcherHandle>>>,
    broker: QueueBroker,
    spawner: Arc<dyn WatchSpawner>,
    sink: Arc<dyn LogSink>,
    resolver: NamespacePathResolver,
    default_log_format: String,
    completion_tx: mpsc::UnboundedSender<Completion>,
}

impl WatcherRegistry {
    /// Creates a registry and starts its completion reaper task.
    #[must_use]
    pub fn new(
        config: &AgentConfig,
        spawner: Arc<dyn WatchSpawner>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let handles = Arc::new(Mutex::new(HashMap::new()));
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let _ = tokio::spawn(Self::reap(Arc::clone(&handles), completion_rx));
        Self {
            handles,
            broker: QueueBroker::new(config.queue_capacity, config.max_message_size),
            spawner,
            sink,
            resolver: NamespacePathResolver::new(&config.proc_root),
            default_log_format: config.default_log_format.clone(),
            completion_tx,
        }
    }

    /// Creates a watcher for the key, or replaces the watches of an
    /// existing one: prior watch tasks are canceled, the event queue is
    /// re-created, and one fresh task is spawned per (PID, subject)
    /// pair.
    pub async fn upsert(&self, request: &WatchRequest, pids: &[Pid]) -> Result<HandleDescriptor> {
        let key = WatcherKey::new(&request.node_name, pids);
        let mut handles = self.handles.lock().await;

        if let Some(existing) = handles.get_mut(&key) {
            tracing::info!(node = %request.node_name, pod = %request.pod_name, "updating watcher");
            for signal in existing.cancel_signals.drain(..) {
                signal.trigger();
            }
        } else {
            tracing::info!(node = %request.node_name, pod = %request.pod_name, "starting watcher");
        }

        let queue_name = queue_name(&key);
        let (writer, reader) = self.broker.create(&queue_name);
        let template = if request.log_format.is_empty() {
            self.default_log_format.clone()
        } else {
            request.log_format.clone()
        };
        let formatter = EventFormatter::new(
            reader,
            self.broker.clone(),
            template,
            request.node_name.clone(),
            request.pod_name.clone(),
            self.resolver.clone(),
            Arc::clone(&self.sink),
        );
        let _ = tokio::spawn(formatter.run());

        let mut signals = Vec::with_capacity(pids.len() * request.subjects.len());
        for &pid in &key.pids {
            for subject in &request.subjects {
                signals.push(self.spawn_pair(&key, pid, subject, &writer));
            }
        }
        let signal_ids: Vec<u64> = signals.iter().map(|s| s.id().as_u64()).collect();

        let descriptor = HandleDescriptor {
            node_name: request.node_name.clone(),
            pod_name: request.pod_name.clone(),
            queue_id: writer.id().to_string(),
            pids: key.pids.iter().map(|pid| pid.as_raw()).collect(),
            signal_ids,
        };

        match handles.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let handle = entry.get_mut();
                handle.pod_name = request.pod_name.clone();
                handle.queue = writer;
                handle.cancel_signals = signals;
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                let _ = entry.insert(WatcherHandle {
                    pod_name: request.pod_name.clone(),
                    queue: writer,
                    cancel_signals: signals,
                });
            }
        }
        Ok(descriptor)
    }

    /// Tears down the watcher for the exact (node, PID set) key.
    ///
    /// A missing key is a successful no-op.
    pub async fn teardown(&self, node_name: &str, pids: &[Pid]) -> Result<()> {
        let key = WatcherKey::new(node_name, pids);
        let mut handles = self.handles.lock().await;
        let Some(handle) = handles.remove(&key) else {
            tracing::debug!(node = %node_name, "no watcher for key, teardown is a no-op");
            return Ok(());
        };
        tracing::info!(node = %node_name, pod = %handle.pod_name, "stopping watcher");

        if let Err(error) = handle.queue.send_sentinel().await {
            tracing::warn!(queue = %handle.queue.id(), %error, "sentinel delivery failed");
        }
        for signal in &handle.cancel_signals {
            signal.trigger();
        }
        Ok(())
    }

    /// Lists the current registrations.
    pub async fn handles(&self) -> Vec<HandleDescriptor> {
        let handles = self.handles.lock().await;
        handles
            .iter()
            .map(|(key, handle)| HandleDescriptor {
                node_name: key.node_name.clone(),
                pod_name: handle.pod_name.clone(),
                queue_id: handle.queue.id().to_string(),
                pids: key.pids.iter().map(|pid| pid.as_raw()).collect(),
                signal_ids: handle
                    .cancel_signals
                    .iter()
                    .map(|s| s.id().as_u64())
                    .collect(),
            })
            .collect()
    }

    fn spawn_pair(
        &self,
        key: &WatcherKey,
        pid: Pid,
        subject: &WatcherSubject,
        writer: &QueueWriter,
    ) -> CancellationSignal {
        let signal = CancellationSignal::new();
        let spec = AttachSpec {
            pid,
            paths: subject.paths.iter().map(Into::into).collect(),
            mask: mask_from_events(&subject.events),
            recursive: subject.recursive,
        };
        let task = self
            .spawner
            .spawn_watch(spec, signal.clone(), Arc::new(writer.clone()));

        let completion_tx = self.completion_tx.clone();
        let key = key.clone();
        let signal_id = signal.id();
        let _ = tokio::spawn(async move {
            let outcome = task.await.unwrap_or(WatchOutcome::Failed);
            let _ = completion_tx.send(Completion {
                key,
                signal_id,
                outcome,
            });
        });
        signal
    }

    /// Reclaims signal bookkeeping as watch tasks finish.
    async fn reap(
        handles: Arc<Mutex<HashMap<WatcherKey, WatcherHandle>>>,
        mut completion_rx: mpsc::UnboundedReceiver<Completion>,
    ) {
        while let Some(completion) = completion_rx.recv().await {
            if completion.outcome == WatchOutcome::Failed {
                tracing::warn!(
                    node = %completion.key.node_name,
                    signal = %completion.signal_id,
                    "watch task failed"
                );
            }
            let mut handles = handles.lock().await;
            if let Some(handle) = handles.get_mut(&completion.key) {
                handle
                    .cancel_signals
                    .retain(|signal| signal.id() != completion.signal_id);
            }
        }
    }
}

/// Queue name for a registration key, stable across updates of the same
/// key and distinct between unrelated handles.
fn queue_name(key: &WatcherKey) -> String {
    let pids = key
        .pids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".");
    format!("{QUEUE_NAME_PREFIX}-{}-{pids}", key.node_name)
}
