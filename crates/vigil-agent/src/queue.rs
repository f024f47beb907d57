//! Named, bounded event queues.
//!
//! A queue carries fixed-maximum-size binary event records from many
//! watch tasks to exactly one formatter. Names live in a process-wide
//! broker; re-creating a name bumps its generation, which closes the
//! prior generation's consumer and discards whatever it had queued.
//! That discard is deliberate: an update favors simplicity over
//! exactly-once delivery across generations.
//!
//! A distinguished sentinel payload, which no record encoding can
//! produce, tells the consumer to terminate and unlink the name.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;
use tokio::sync::mpsc;

use vigil_common::error::{Result, VigilError};
use vigil_common::types::EventRecord;
use vigil_watch::EventSink;

const RECORD_TAG: u8 = 0x01;
const SENTINEL_TAG: u8 = 0x00;

/// Returns the sentinel payload.
#[must_use]
pub fn sentinel() -> Vec<u8> {
    vec![SENTINEL_TAG]
}

/// Whether a payload is the sentinel shutdown message.
#[must_use]
pub fn is_sentinel(payload: &[u8]) -> bool {
    payload == [SENTINEL_TAG]
}

/// Encodes a record into its wire form.
///
/// Layout: tag byte, little-endian `u32` mask, directory flag, then the
/// length-prefixed path and file name.
///
/// # Errors
///
/// Returns [`VigilError::MessageTooLarge`] when the encoded form would
/// exceed `max_size`.
pub fn encode_record(record: &EventRecord, max_size: usize) -> Result<Vec<u8>> {
    let path = record.path_name.as_bytes();
    let file = record.file_name.as_bytes();
    let size = 1 + 4 + 1 + 2 + path.len() + 2 + file.len();
    if size > max_size || path.len() > usize::from(u16::MAX) || file.len() > usize::from(u16::MAX)
    {
        return Err(VigilError::MessageTooLarge {
            size,
            max: max_size,
        });
    }

    let mut buf = Vec::with_capacity(size);
    buf.push(RECORD_TAG);
    buf.extend_from_slice(&record.event_mask.to_le_bytes());
    buf.push(u8::from(record.is_dir));
    #[allow(clippy::cast_possible_truncation)]
    buf.extend_from_slice(&(path.len() as u16).to_le_bytes());
    buf.extend_from_slice(path);
    #[allow(clippy::cast_possible_truncation)]
    buf.extend_from_slice(&(file.len() as u16).to_le_bytes());
    buf.extend_from_slice(file);
    Ok(buf)
}

/// Decodes a wire payload back into a record.
///
/// # Errors
///
/// Returns [`VigilError::Decode`] for sentinel payloads, wrong tags,
/// truncated buffers, or non-UTF-8 strings.
pub fn decode_record(payload: &[u8]) -> Result<EventRecord> {
    let malformed = |message: &str| VigilError::Decode {
        message: message.to_owned(),
    };

    let (&tag, rest) = payload.split_first().ok_or_else(|| malformed("empty payload"))?;
    if tag != RECORD_TAG {
        return Err(malformed("unexpected tag"));
    }
    let (mask_bytes, rest) = rest
        .split_first_chunk::<4>()
        .ok_or_else(|| malformed("truncated mask"))?;
    let (&is_dir, rest) = rest.split_first().ok_or_else(|| malformed("truncated flag"))?;

    let (path, rest) = take_string(rest).ok_or_else(|| malformed("truncated path"))?;
    let (file, rest) = take_string(rest).ok_or_else(|| malformed("truncated file name"))?;
    if !rest.is_empty() {
        return Err(malformed("trailing bytes"));
    }

    Ok(EventRecord {
        event_mask: u32::from_le_bytes(*mask_bytes),
        is_dir: is_dir != 0,
        path_name: path,
        file_name: file,
    })
}

fn take_string(buf: &[u8]) -> Option<(String, &[u8])> {
    let (len_bytes, rest) = buf.split_first_chunk::<2>()?;
    let len = usize::from(u16::from_le_bytes(*len_bytes));
    if rest.len() < len {
        return None;
    }
    let (bytes, rest) = rest.split_at(len);
    Some((String::from_utf8(bytes.to_vec()).ok()?, rest))
}

/// Identity of one queue generation: the name plus a counter that is
/// bumped every time the name is re-created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueId {
    name: String,
    generation: u64,
}

impl QueueId {
    /// Returns the queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.generation)
    }
}

struct QueueEntry {
    generation: u64,
    tx: mpsc::Sender<Vec<u8>>,
    closed: Arc<Notify>,
}

/// Process-wide registry of named queues.
#[derive(Clone)]
pub struct QueueBroker {
    entries: Arc<Mutex<HashMap<String, QueueEntry>>>,
    capacity: usize,
    max_message_size: usize,
}

impl QueueBroker {
    /// Creates a broker with the given per-queue capacity and message
    /// size limit.
    #[must_use]
    pub fn new(capacity: usize, max_message_size: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
            max_message_size,
        }
    }

    /// Creates (or re-creates) the queue `name` and returns its writer
    /// and reader.
    ///
    /// An existing generation under the same name is closed: its
    /// consumer wakes and exits, and messages it had not yet consumed
    /// are discarded.
    pub fn create(&self, name: &str) -> (QueueWriter, QueueReader) {
        let mut entries = self.lock();
        let generation = entries.get(name).map_or(1, |e| {
            e.closed.notify_one();
            e.generation + 1
        });
        let (tx, rx) = mpsc::channel(self.capacity);
        let closed = Arc::new(Notify::new());
        let id = QueueId {
            name: name.to_owned(),
            generation,
        };
        let _ = entries.insert(
            name.to_owned(),
            QueueEntry {
                generation,
                tx: tx.clone(),
                closed: Arc::clone(&closed),
            },
        );
        tracing::debug!(queue = %id, "queue generation opened");
        (
            QueueWriter {
                id: id.clone(),
                tx,
                max_message_size: self.max_message_size,
            },
            QueueReader { id, rx, closed },
        )
    }

    /// Opens an additional writer to the current generation of `name`.
    #[must_use]
    pub fn open_write(&self, name: &str) -> Option<QueueWriter> {
        let entries = self.lock();
        entries.get(name).map(|entry| QueueWriter {
            id: QueueId {
                name: name.to_owned(),
                generation: entry.generation,
            },
            tx: entry.tx.clone(),
            max_message_size: self.max_message_size,
        })
    }

    /// Unlinks `id`'s name, invalidating it for further opens.
    ///
    /// A stale generation cannot unlink a name that has since been
    /// re-created.
    pub fn unlink(&self, id: &QueueId) {
        let mut entries = self.lock();
        if entries.get(&id.name).is_some_and(|e| e.generation == id.generation) {
            let _ = entries.remove(&id.name);
            tracing::debug!(queue = %id, "queue unlinked");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, QueueEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer handle to one queue generation.
#[derive(Clone)]
pub struct QueueWriter {
    id: QueueId,
    tx: mpsc::Sender<Vec<u8>>,
    max_message_size: usize,
}

impl QueueWriter {
    /// Returns the generation this writer feeds.
    #[must_use]
    pub const fn id(&self) -> &QueueId {
        &self.id
    }

    /// Pushes a payload without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::QueueFull`] or [`VigilError::QueueClosed`].
    pub fn try_send(&self, payload: Vec<u8>) -> Result<()> {
        self.tx.try_send(payload).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => VigilError::QueueFull {
                id: self.id.to_string(),
            },
            mpsc::error::TrySendError::Closed(_) => VigilError::QueueClosed {
                id: self.id.to_string(),
            },
        })
    }

    /// Delivers the sentinel, waiting for capacity if needed, so the
    /// consumer is guaranteed to observe it behind any queued events.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::QueueClosed`] if the consumer is gone.
    pub async fn send_sentinel(&self) -> Result<()> {
        self.tx
            .send(sentinel())
            .await
            .map_err(|_| VigilError::QueueClosed {
                id: self.id.to_string(),
            })
    }
}

impl EventSink for QueueWriter {
    fn push(&self, record: &EventRecord) -> Result<()> {
        let payload = encode_record(record, self.max_message_size)?;
        self.try_send(payload)
    }
}

/// What a consumer sees on its next receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueMessage {
    /// A payload arrived.
    Payload(Vec<u8>),
    /// This generation was replaced by a newer one; anything still
    /// queued is to be discarded.
    Replaced,
    /// Every writer is gone and the queue is drained.
    Disconnected,
}

/// The single consumer handle to one queue generation.
pub struct QueueReader {
    id: QueueId,
    rx: mpsc::Receiver<Vec<u8>>,
    closed: Arc<Notify>,
}

impl QueueReader {
    /// Returns the generation this reader drains.
    #[must_use]
    pub const fn id(&self) -> &QueueId {
        &self.id
    }

    /// Receives the next message, multiplexed against generation
    /// replacement. Replacement wins over a simultaneously ready
    /// payload: once the next generation is open, nothing more from
    /// this one is delivered.
    pub async fn next(&mut self) -> QueueMessage {
        tokio::select! {
            biased;

            () = self.closed.notified() => QueueMessage::Replaced,
            payload = self.rx.recv() => {
                payload.map_or(QueueMessage::Disconnected, QueueMessage::Payload)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> EventRecord {
        EventRecord {
            event_mask: libc::IN_CREATE,
            is_dir: false,
            path_name: "/proc/42/root/etc".to_owned(),
            file_name: "passwd".to_owned(),
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let encoded = encode_record(&record(), 1024).unwrap();
        assert_eq!(decode_record(&encoded).unwrap(), record());
    }

    #[test]
    fn oversized_record_is_rejected() {
        let mut big = record();
        big.path_name = "x".repeat(2048);
        assert!(matches!(
            encode_record(&big, 1024),
            Err(VigilError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn sentinel_is_distinct_from_any_record() {
        let encoded = encode_record(&record(), 1024).unwrap();
        assert!(!is_sentinel(&encoded));
        assert!(is_sentinel(&sentinel()));
        assert!(decode_record(&sentinel()).is_err());
    }

    #[test]
    fn truncated_payload_fails_decode() {
        let encoded = encode_record(&record(), 1024).unwrap();
        assert!(decode_record(&encoded[..encoded.len() - 1]).is_err());
    }

    #[tokio::test]
    async fn writer_and_reader_pass_payloads() {
        let broker = QueueBroker::new(10, 1024);
        let (writer, mut reader) = broker.create("/vigil-test");
        writer.try_send(b"abc".to_vec()).unwrap();
        assert_eq!(reader.next().await, QueueMessage::Payload(b"abc".to_vec()));
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let broker = QueueBroker::new(1, 1024);
        let (writer, _reader) = broker.create("/vigil-test");
        writer.try_send(b"a".to_vec()).unwrap();
        assert!(matches!(
            writer.try_send(b"b".to_vec()),
            Err(VigilError::QueueFull { .. })
        ));
    }

    #[tokio::test]
    async fn recreation_closes_the_prior_generation_and_discards() {
        let broker = QueueBroker::new(10, 1024);
        let (old_writer, mut old_reader) = broker.create("/vigil-test");
        old_writer.try_send(b"stale".to_vec()).unwrap();

        let (new_writer, _new_reader) = broker.create("/vigil-test");
        let message =
            tokio::time::timeout(std::time::Duration::from_secs(1), old_reader.next())
                .await
                .unwrap();
        assert_eq!(message, QueueMessage::Replaced);
        assert_ne!(old_writer.id(), new_writer.id());
        assert_eq!(
            broker.open_write("/vigil-test").unwrap().id(),
            new_writer.id()
        );
    }

    #[tokio::test]
    async fn stale_generation_cannot_unlink_a_newer_one() {
        let broker = QueueBroker::new(10, 1024);
        let (old_writer, _old_reader) = broker.create("/vigil-test");
        let (new_writer, _new_reader) = broker.create("/vigil-test");

        broker.unlink(old_writer.id());
        assert!(broker.open_write("/vigil-test").is_some());

        broker.unlink(new_writer.id());
        assert!(broker.open_write("/vigil-test").is_none());
    }
}
