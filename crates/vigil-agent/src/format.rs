//! Event formatting and the single-consumer queue drain loop.
//!
//! One formatter task runs per queue generation. It renders each record
//! through the registration's template and hands the finished line to a
//! [`LogSink`]. A malformed template drops that single event with a
//! warning; the loop keeps consuming. The sentinel terminates the loop
//! and unlinks the queue name; a generation replaced by an update exits
//! immediately, discarding anything still queued.

use std::sync::Arc;

use vigil_common::error::{Result, VigilError};
use vigil_common::types::EventRecord;
use vigil_watch::NamespacePathResolver;
use vigil_watch::mask::dominant_event_name;

use crate::queue::{QueueBroker, QueueMessage, QueueReader, decode_record, is_sentinel};

/// Destination for fully rendered log lines.
pub trait LogSink: Send + Sync {
    /// Writes one finished line.
    fn write_line(&self, line: &str);
}

/// Default sink: emits lines through `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_line(&self, line: &str) {
        tracing::info!(target: "vigil::events", "{line}");
    }
}

/// Renders `template`, substituting `{placeholder}` occurrences from
/// `args`.
///
/// # Errors
///
/// Returns [`VigilError::Template`] for unknown placeholders or
/// unbalanced braces.
pub fn render_template(template: &str, args: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            return Err(VigilError::Template {
                message: "unbalanced '{'".to_owned(),
            });
        };
        let key = &after_open[..close];
        let Some(&(_, value)) = args.iter().find(|(name, _)| *name == key) else {
            return Err(VigilError::Template {
                message: format!("unknown placeholder {{{key}}}"),
            });
        };
        out.push_str(value);
        rest = &after_open[close + 1..];
    }
    if rest.contains('}') {
        return Err(VigilError::Template {
            message: "unbalanced '}'".to_owned(),
        });
    }
    out.push_str(rest);
    Ok(out)
}

/// The single consumer loop for one queue generation.
pub struct EventFormatter {
    reader: QueueReader,
    broker: QueueBroker,
    template: String,
    node_name: String,
    pod_name: String,
    resolver: NamespacePathResolver,
    sink: Arc<dyn LogSink>,
}

impl EventFormatter {
    /// Creates a formatter for one queue generation.
    #[must_use]
    pub fn new(
        reader: QueueReader,
        broker: QueueBroker,
        template: String,
        node_name: String,
        pod_name: String,
        resolver: NamespacePathResolver,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            reader,
            broker,
            template,
            node_name,
            pod_name,
            resolver,
            sink,
        }
    }

    /// Drains the queue until the sentinel arrives, the generation is
    /// replaced, or every writer is gone.
    pub async fn run(mut self) {
        loop {
            match self.reader.next().await {
                QueueMessage::Replaced => {
                    tracing::debug!(queue = %self.reader.id(), "queue generation replaced, discarding");
                    return;
                }
                QueueMessage::Disconnected => {
                    self.broker.unlink(self.reader.id());
                    return;
                }
                QueueMessage::Payload(payload) if is_sentinel(&payload) => {
                    tracing::debug!(queue = %self.reader.id(), "sentinel received");
                    self.broker.unlink(self.reader.id());
                    return;
                }
                QueueMessage::Payload(payload) => self.consume(&payload),
            }
        }
    }

    fn consume(&self, payload: &[u8]) {
        match decode_record(payload) {
            Ok(record) => match self.render(&record) {
                Ok(line) => self.sink.write_line(&line),
                Err(error) => {
                    tracing::warn!(queue = %self.reader.id(), %error, "malformed log format, event dropped");
                }
            },
            Err(error) => {
                tracing::warn!(queue = %self.reader.id(), %error, "undecodable payload dropped");
            }
        }
    }

    fn render(&self, record: &EventRecord) -> Result<String> {
        let event = dominant_event_name(record.event_mask).unwrap_or_default();
        let ftype = if record.is_dir { "directory" } else { "file" };
        let path = self.resolver.strip(&record.path_name);
        let sep = if record.file_name.is_empty() { "" } else { "/" };
        render_template(
            &self.template,
            &[
                ("event", event),
                ("ftype", ftype),
                ("path", &path),
                ("file", &record.file_name),
                ("sep", sep),
                ("pod", &self.pod_name),
                ("node", &self.node_name),
            ],
        )
    }
}
