//! JSON-backed durable store with write coalescing.
//!
//! Two documents live under the data directory: `state.json` (round state,
//! history, side-game slices) and `balances.json`. Loading is
//! default-tolerant: a missing file yields the documented defaults and a
//! corrupt file is logged and replaced by defaults, since in-memory state is
//! authoritative for the remainder of the process lifetime.
//!
//! Mutations do not hit disk synchronously. Callers snapshot the document
//! under their lock and hand the serialized bytes to [`StoreWriter`], which
//! keeps only the newest snapshot per document and flushes after a short
//! quiet window. Failed writes stay queued so the next flush retries them.
//! `flush` and shutdown drain the queue deterministically.

use glyphmine_types::{Balances, RoundState};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

const STATE_FILE: &str = "state.json";
const BALANCES_FILE: &str = "balances.json";

/// Which persisted document a write targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Document {
    State,
    Balances,
}

impl Document {
    fn file_name(&self) -> &'static str {
        match self {
            Document::State => STATE_FILE,
            Document::Balances => BALANCES_FILE,
        }
    }
}

/// Filesystem access for the two JSON documents.
#[derive(Clone, Debug)]
pub struct JsonStore {
    data_dir: PathBuf,
}

impl JsonStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path(&self, doc: Document) -> PathBuf {
        self.data_dir.join(doc.file_name())
    }

    /// Load the round state, merging absent fields with their defaults.
    pub fn load_state(&self) -> RoundState {
        self.load_document(Document::State)
    }

    /// Load the balance map.
    pub fn load_balances(&self) -> Balances {
        self.load_document(Document::Balances)
    }

    fn load_document<T: serde::de::DeserializeOwned + Default>(&self, doc: Document) -> T {
        let path = self.path(doc);
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(err) => {
                    error!(?doc, %err, "corrupt document, falling back to defaults");
                    T::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(err) => {
                error!(?doc, %err, "failed to read document, falling back to defaults");
                T::default()
            }
        }
    }

    /// Write a serialized document atomically (temp file + rename), so a
    /// crash mid-write never leaves a torn document behind.
    pub fn write(&self, doc: Document, json: &str) -> std::io::Result<()> {
        let path = self.path(doc);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

enum Command {
    Write { doc: Document, json: String },
    Flush(oneshot::Sender<()>),
}

/// Write-coalescing queue in front of [`JsonStore`].
///
/// Rapid repeated snapshots of the same document collapse into one disk
/// write per quiet window. Dropping the writer (or calling [`shutdown`])
/// drains everything still pending.
///
/// [`shutdown`]: StoreWriter::shutdown
pub struct StoreWriter {
    tx: mpsc::UnboundedSender<Command>,
    handle: JoinHandle<()>,
}

impl StoreWriter {
    /// Spawn the background worker with the given debounce window.
    pub fn spawn(store: JsonStore, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(worker(store, rx, debounce));
        Self { tx, handle }
    }

    /// Queue the latest snapshot of a document. Never blocks.
    pub fn schedule(&self, doc: Document, json: String) {
        if self.tx.send(Command::Write { doc, json }).is_err() {
            warn!(?doc, "store writer is gone, dropping snapshot");
        }
    }

    /// Force everything pending to disk and wait for completion.
    pub async fn flush(&self) {
        self.flush_handle().await;
    }

    /// A flush future that does not borrow the writer, for callers holding
    /// the writer behind a lock.
    pub fn flush_handle(&self) -> impl std::future::Future<Output = ()> {
        let tx = self.tx.clone();
        async move {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(Command::Flush(ack_tx)).is_ok() {
                let _ = ack_rx.await;
            }
        }
    }

    /// Flush pending writes and stop the worker.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(err) = self.handle.await {
            warn!(%err, "store writer task did not shut down cleanly");
        }
    }
}

async fn worker(store: JsonStore, mut rx: mpsc::UnboundedReceiver<Command>, debounce: Duration) {
    let mut pending: HashMap<Document, String> = HashMap::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let sleep_until = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3_600));
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Write { doc, json }) => {
                    pending.insert(doc, json);
                    deadline = Some(Instant::now() + debounce);
                }
                Some(Command::Flush(ack)) => {
                    flush_pending(&store, &mut pending);
                    deadline = if pending.is_empty() { None } else { Some(Instant::now() + debounce) };
                    let _ = ack.send(());
                }
                None => {
                    flush_pending(&store, &mut pending);
                    if !pending.is_empty() {
                        error!(documents = pending.len(), "unflushed documents at shutdown");
                    }
                    return;
                }
            },
            _ = tokio::time::sleep_until(sleep_until), if deadline.is_some() => {
                flush_pending(&store, &mut pending);
                // Failed writes stay pending; re-arm so they retry.
                deadline = if pending.is_empty() { None } else { Some(Instant::now() + debounce) };
            }
        }
    }
}

fn flush_pending(store: &JsonStore, pending: &mut HashMap<Document, String>) {
    pending.retain(|doc, json| match store.write(*doc, json) {
        Ok(()) => {
            debug!(?doc, bytes = json.len(), "flushed document");
            false
        }
        Err(err) => {
            warn!(?doc, %err, "document write failed, will retry");
            true
        }
    });
}
