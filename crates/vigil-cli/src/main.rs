//! # vigild — Vigil agent daemon
//!
//! Per-node file-integrity-monitoring agent for containerized
//! workloads. Accepts create/destroy watch requests as JSON lines on
//! stdin (one request per line, the framing an RPC transport would
//! otherwise provide) and emits one formatted log line per matching
//! filesystem event.

#![allow(clippy::print_stdout)]

mod control;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use vigil_agent::{InotifySpawner, ProcPidResolver, TracingSink, WatchService, WatcherRegistry};
use vigil_common::config::AgentConfig;
use vigil_watch::NamespacePathResolver;

/// Vigil — per-node file-integrity monitoring for containers.
#[derive(Parser, Debug)]
#[command(name = vigil_common::constants::BIN_NAME, version, about, long_about = None)]
struct Args {
    /// Procfs root used for PID resolution and container-view paths.
    #[arg(long, default_value = vigil_common::constants::PROC_ROOT)]
    proc_root: PathBuf,

    /// Per-queue capacity in undelivered messages.
    #[arg(long, default_value_t = vigil_common::constants::QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Template applied when a request carries no logFormat.
    #[arg(long, default_value = vigil_common::constants::DEFAULT_LOG_FORMAT)]
    log_format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = AgentConfig {
        proc_root: args.proc_root.clone(),
        queue_capacity: args.queue_capacity,
        default_log_format: args.log_format.clone(),
        ..AgentConfig::default()
    };
    tracing::info!(proc_root = %config.proc_root.display(), "starting agent");

    let registry = WatcherRegistry::new(
        &config,
        Arc::new(InotifySpawner::new(NamespacePathResolver::new(
            &config.proc_root,
        ))),
        Arc::new(TracingSink),
    );
    let service = WatchService::new(registry, Arc::new(ProcPidResolver::new(&config.proc_root)));

    control::serve(service).await
}
