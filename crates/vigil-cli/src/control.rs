//! Line-oriented control interface.
//!
//! Each stdin line is one JSON request; each response is one JSON line
//! on stdout. The wire schema mirrors the orchestrator contract: an
//! `op` discriminator plus the watch-request fields.

use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncBufReadExt;

use vigil_agent::WatchService;
use vigil_common::types::WatchRequest;

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum ControlRequest {
    /// Create or update a watcher.
    CreateWatch {
        #[serde(flatten)]
        request: WatchRequest,
    },
    /// Destroy a watcher.
    DestroyWatch {
        #[serde(flatten)]
        request: WatchRequest,
    },
    /// List active registrations.
    ListWatches,
}

/// Serves control requests until stdin closes.
///
/// # Errors
///
/// Returns an error only when stdin itself fails.
pub async fn serve(service: WatchService) -> anyhow::Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = dispatch(&service, &line).await;
        println!("{response}");
    }
    tracing::info!("control stream closed, shutting down");
    Ok(())
}

async fn dispatch(service: &WatchService, line: &str) -> String {
    let request: ControlRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(error) => {
            tracing::warn!(%error, "unparseable control request");
            return json!({ "error": error.to_string() }).to_string();
        }
    };

    let result = match request {
        ControlRequest::CreateWatch { request } => service
            .create_watch(&request)
            .await
            .map(|descriptor| json!({ "handle": descriptor })),
        ControlRequest::DestroyWatch { request } => service
            .destroy_watch(&request)
            .await
            .map(|()| json!({ "status": "ok" })),
        ControlRequest::ListWatches => Ok(json!({ "handles": service.handles().await })),
    };

    match result {
        Ok(value) => value.to_string(),
        Err(error) => {
            tracing::warn!(%error, "control request failed");
            json!({ "error": error.to_string() }).to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_parses_with_flattened_fields() {
        let line = r#"{
            "op": "createWatch",
            "nodeName": "node-1",
            "podName": "web-0",
            "containerIds": ["docker://abc"],
            "subjects": [{"paths": ["/etc"], "events": ["all"], "recursive": false}],
            "logFormat": ""
        }"#;
        let parsed: ControlRequest = serde_json::from_str(line).unwrap();
        match parsed {
            ControlRequest::CreateWatch { request } => {
                assert_eq!(request.node_name, "node-1");
                assert_eq!(request.container_ids.len(), 1);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn list_request_parses() {
        let parsed: ControlRequest = serde_json::from_str(r#"{"op": "listWatches"}"#).unwrap();
        assert!(matches!(parsed, ControlRequest::ListWatches));
    }
}
