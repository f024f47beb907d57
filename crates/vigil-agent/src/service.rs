//! The request-handling facade for watch creation and destruction.
//!
//! Mirrors the orchestrator-facing RPC contract: both operations first
//! resolve container IDs to live PIDs and fail without side effects
//! when nothing resolves. Everything past resolution is delegated to
//! the registry.

use std::sync::Arc;

use nix::unistd::Pid;

use vigil_common::error::{Result, VigilError};
use vigil_common::types::WatchRequest;

use crate::registry::{HandleDescriptor, WatcherRegistry};
use crate::resolver::ContainerPidResolver;

/// Facade implementing the create/destroy watch operations.
pub struct WatchService {
    registry: WatcherRegistry,
    resolver: Arc<dyn ContainerPidResolver>,
}

impl WatchService {
    /// Creates a service over a registry and a PID resolver.
    #[must_use]
    pub fn new(registry: WatcherRegistry, resolver: Arc<dyn ContainerPidResolver>) -> Self {
        Self { registry, resolver }
    }

    /// Creates or updates the watcher for the request's containers.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::NoResolvablePids`] when no container ID
    /// resolves to a live process; no state is mutated in that case.
    pub async fn create_watch(&self, request: &WatchRequest) -> Result<HandleDescriptor> {
        let pids = self.resolve_pids(request)?;
        self.registry.upsert(request, &pids).await
    }

    /// Destroys the watcher for the request's containers.
    ///
    /// Succeeds even when no matching watcher exists, as long as the
    /// container IDs resolve.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::NoResolvablePids`] when no container ID
    /// resolves to a live process.
    pub async fn destroy_watch(&self, request: &WatchRequest) -> Result<()> {
        let pids = self.resolve_pids(request)?;
        self.registry.teardown(&request.node_name, &pids).await
    }

    /// Lists the active registrations.
    pub async fn handles(&self) -> Vec<HandleDescriptor> {
        self.registry.handles().await
    }

    fn resolve_pids(&self, request: &WatchRequest) -> Result<Vec<Pid>> {
        let pids: Vec<Pid> = request
            .container_ids
            .iter()
            .filter_map(|id| {
                let pid = self.resolver.resolve(id);
                if pid.is_none() {
                    tracing::debug!(container = %id, "container did not resolve to a PID");
                }
                pid
            })
            .collect();
        if pids.is_empty() {
            return Err(VigilError::NoResolvablePids);
        }
        Ok(pids)
    }
}
