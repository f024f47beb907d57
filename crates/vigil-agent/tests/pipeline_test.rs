//! End-to-end pipeline test: request in, formatted log line out.
//!
//! Exercises resolution, registry bookkeeping, a real inotify watch,
//! the event queue, and the formatter against a fake procfs layout.

#![allow(clippy::expect_used, clippy::unwrap_used)]
#![cfg(target_os = "linux")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use vigil_agent::{
    InotifySpawner, LogSink, ProcPidResolver, WatchService, WatcherRegistry,
};
use vigil_common::config::AgentConfig;
use vigil_common::types::{ContainerId, WatchRequest, WatcherSubject};
use vigil_watch::NamespacePathResolver;

const PID: i32 = 4242;
const CONTAINER: &str = "3f4a9bc1";

#[derive(Default)]
struct CollectingSink {
    lines: Mutex<Vec<String>>,
}

impl CollectingSink {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl LogSink for CollectingSink {
    fn write_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_owned());
    }
}

fn fake_proc_root() -> TempDir {
    let tmp = tempfile::tempdir().expect("tempdir");
    let proc_entry = tmp.path().join(PID.to_string());
    std::fs::create_dir_all(proc_entry.join("root/watch")).expect("container view");
    std::fs::write(
        proc_entry.join("cgroup"),
        format!("0::/kubepods/pod-web-0/{CONTAINER}\n"),
    )
    .expect("cgroup file");
    tmp
}

fn pipeline(tmp: &TempDir) -> (WatchService, Arc<CollectingSink>) {
    let config = AgentConfig::with_proc_root(tmp.path());
    let sink = Arc::new(CollectingSink::default());
    let registry = WatcherRegistry::new(
        &config,
        Arc::new(InotifySpawner::new(NamespacePathResolver::new(tmp.path()))),
        Arc::clone(&sink) as Arc<dyn LogSink>,
    );
    let service = WatchService::new(registry, Arc::new(ProcPidResolver::new(tmp.path())));
    (service, sink)
}

fn watch_request() -> WatchRequest {
    WatchRequest {
        node_name: "node-1".to_owned(),
        pod_name: "web-0".to_owned(),
        container_ids: vec![ContainerId::new(format!("docker://{CONTAINER}"))],
        subjects: vec![WatcherSubject {
            paths: vec!["/watch".to_owned()],
            events: vec!["create".to_owned(), "modify".to_owned()],
            recursive: false,
        }],
        log_format: String::new(),
    }
}

async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not met within timeout");
}

#[tokio::test]
async fn create_event_becomes_a_formatted_line() {
    let tmp = fake_proc_root();
    let (service, sink) = pipeline(&tmp);

    let descriptor = service.create_watch(&watch_request()).await.unwrap();
    assert_eq!(descriptor.pids, vec![PID]);
    assert_eq!(descriptor.signal_ids.len(), 1);
    tokio::time::sleep(Duration::from_millis(150)).await;

    std::fs::write(
        tmp.path().join(PID.to_string()).join("root/watch/secret"),
        b"x",
    )
    .expect("write watched file");

    wait_for(|| {
        sink.lines()
            .iter()
            .any(|l| l == "IN_CREATE file '/watch/secret' (web-0:node-1)")
    })
    .await;
}

#[tokio::test]
async fn destroyed_watch_emits_nothing_further() {
    let tmp = fake_proc_root();
    let (service, sink) = pipeline(&tmp);

    let _ = service.create_watch(&watch_request()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    service.destroy_watch(&watch_request()).await.unwrap();
    assert!(service.handles().await.is_empty());
    tokio::time::sleep(Duration::from_millis(150)).await;

    let before = sink.lines().len();
    std::fs::write(
        tmp.path().join(PID.to_string()).join("root/watch/late"),
        b"x",
    )
    .expect("write watched file");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(sink.lines().len(), before);
}

#[tokio::test]
async fn custom_template_is_applied() {
    let tmp = fake_proc_root();
    let (service, sink) = pipeline(&tmp);

    let mut request = watch_request();
    request.log_format = "{node}|{pod}|{event}|{path}{sep}{file}".to_owned();
    let _ = service.create_watch(&request).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    std::fs::write(
        tmp.path().join(PID.to_string()).join("root/watch/cfg"),
        b"x",
    )
    .expect("write watched file");

    wait_for(|| {
        sink.lines()
            .iter()
            .any(|l| l == "node-1|web-0|IN_CREATE|/watch/cfg")
    })
    .await;
}
