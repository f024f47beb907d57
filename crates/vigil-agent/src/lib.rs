//! # vigil-agent
//!
//! The stateful core of the Vigil file-integrity-monitoring agent: named
//! bounded event queues, the single-consumer log formatter, the watcher
//! registry with its create/update/destroy protocol, and the request
//! facade that ties container-ID resolution to the registry.

pub mod format;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod service;

pub use format::{EventFormatter, LogSink, TracingSink};
pub use queue::{QueueBroker, QueueId, QueueMessage, QueueReader, QueueWriter};
pub use registry::{HandleDescriptor, InotifySpawner, WatchSpawner, WatcherRegistry};
pub use resolver::{ContainerPidResolver, ProcPidResolver};
pub use service::WatchService;
