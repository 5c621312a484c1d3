//! Incremental indexing: embed every record that has no vector yet.
//!
//! A pass scans the library, announces `0/N`, encodes the missing records
//! one at a time off the caller's thread, merges each vector back under a
//! short write lock and finally persists the library once.
//!
//! Records edited after they were embedded keep their old vector; only
//! records without one are picked up.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::eid::Eid;
use crate::library::Library;
use crate::records::RecordStore;

use super::encoder::{EncodeError, TextEncoder};
use super::Embedding;

/// `processed` out of `total` records handled in the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.processed == self.total
    }
}

impl Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.processed, self.total)
    }
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Records that were missing a vector when the pass started.
    pub total: usize,
    pub embedded: usize,
    pub failed: usize,
    /// Vectors dropped because the record was deleted, edited or embedded
    /// elsewhere while this pass was running.
    pub discarded: usize,
    pub cancelled: bool,
    pub persisted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Indexing aborted: {0}")]
    Encode(#[from] EncodeError),

    #[error("Failed to persist records: {0}")]
    Persist(anyhow::Error),

    #[error("An indexing pass is already running")]
    AlreadyRunning,

    #[error("Failed to start indexing worker: {0}")]
    Spawn(std::io::Error),

    #[error("Indexing worker panicked")]
    WorkerPanicked,
}

/// Cooperative cancellation flag, checked between records.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Pending {
    id: Eid,
    descriptor: String,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct Indexer {
    library: Arc<Library>,
    store: Arc<dyn RecordStore>,
    encoder: Arc<dyn TextEncoder>,
    encode_timeout: Option<Duration>,
    running: Arc<AtomicBool>,
}

impl Indexer {
    pub fn new(
        library: Arc<Library>,
        store: Arc<dyn RecordStore>,
        encoder: Arc<dyn TextEncoder>,
    ) -> Self {
        Self {
            library,
            store,
            encoder,
            encode_timeout: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bound every single encode call.
    pub fn with_encode_timeout(mut self, timeout: Duration) -> Self {
        self.encode_timeout = Some(timeout);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a pass on a worker thread.
    pub fn start(&self) -> Result<IndexingPass, IndexError> {
        let (progress_tx, progress_rx) = mpsc::channel();
        let cancel = CancelToken::default();

        let handle = std::thread::Builder::new()
            .name("indexer".to_string())
            .spawn({
                let indexer = self.clone();
                let cancel = cancel.clone();
                move || {
                    let _span = tracing::info_span!("indexer").entered();
                    indexer.run(&cancel, |progress| {
                        // the receiver may have been dropped; the pass still completes
                        let _ = progress_tx.send(progress);
                    })
                }
            })
            .map_err(IndexError::Spawn)?;

        Ok(IndexingPass {
            progress: progress_rx,
            cancel,
            handle,
        })
    }

    /// Run a pass on the current thread.
    ///
    /// Emits nothing and writes nothing when the encoder is unavailable or
    /// no record is missing a vector.
    pub fn run(
        &self,
        cancel: &CancelToken,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<PassReport, IndexError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(IndexError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        if !self.encoder.is_loaded() {
            log::info!("encoder unavailable, skipping indexing");
            return Ok(PassReport::default());
        }

        let pending = self.scan();
        if pending.is_empty() {
            log::debug!("every record already has an embedding");
            return Ok(PassReport::default());
        }

        let total = pending.len();
        let mut report = PassReport {
            total,
            ..Default::default()
        };
        log::info!("indexing {total} records");
        on_progress(Progress { processed: 0, total });

        let mut fatal = None;
        for (done, item) in pending.into_iter().enumerate() {
            if cancel.is_cancelled() {
                log::info!("indexing cancelled after {done}/{total}");
                report.cancelled = true;
                break;
            }

            match self.encode_bounded(&item.descriptor) {
                Ok(embedding) if embedding.is_fallback() => {
                    log::warn!("record {} produced no usable embedding", item.id);
                    report.failed += 1;
                }
                Ok(embedding) => {
                    if self.merge(&item, embedding) {
                        report.embedded += 1;
                    } else {
                        report.discarded += 1;
                    }
                }
                Err(err) if err.is_fatal() => {
                    log::error!("indexing stopped at record {}: {err}", item.id);
                    fatal = Some(err);
                    break;
                }
                Err(err) => {
                    log::warn!("failed to embed record {}: {err}", item.id);
                    report.failed += 1;
                }
            }

            on_progress(Progress {
                processed: done + 1,
                total,
            });
        }

        self.library
            .persist(self.store.as_ref())
            .map_err(IndexError::Persist)?;
        report.persisted = true;

        match fatal {
            Some(err) => Err(err.into()),
            None => Ok(report),
        }
    }

    fn scan(&self) -> Vec<Pending> {
        self.library
            .read()
            .iter()
            .flat_map(|category| category.items.iter())
            .filter(|record| record.embedding.is_none())
            .map(|record| Pending {
                id: record.id.clone(),
                descriptor: record.descriptor(),
            })
            .collect()
    }

    /// Store `embedding` if the record still exists, still lacks a vector
    /// and still describes the same text.
    fn merge(&self, item: &Pending, embedding: Embedding) -> bool {
        self.library.update(|categories| {
            let Some(record) = categories
                .iter_mut()
                .flat_map(|category| category.items.iter_mut())
                .find(|record| record.id == item.id)
            else {
                return false;
            };

            if record.embedding.is_some() || record.descriptor() != item.descriptor {
                return false;
            }

            record.embedding = Some(embedding);
            true
        })
    }

    fn encode_bounded(&self, text: &str) -> Result<Embedding, EncodeError> {
        let Some(timeout) = self.encode_timeout else {
            return self.encoder.encode(text);
        };

        let (tx, rx) = mpsc::channel();
        let encoder = Arc::clone(&self.encoder);
        let text = text.to_string();
        // a timed-out call keeps running detached and may keep the model busy;
        // query encoding waits only briefly for it (see `encode_query`)
        std::thread::spawn(move || {
            let _ = tx.send(encoder.encode(&text));
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(EncodeError::Timeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(EncodeError::Inference("encoder thread panicked".to_string()))
            }
        }
    }
}

/// A pass running on a worker thread.
///
/// Iterating yields progress in computation order and ends when the worker
/// finishes. The sequence cannot be restarted; start a new pass instead.
pub struct IndexingPass {
    progress: mpsc::Receiver<Progress>,
    cancel: CancelToken,
    handle: JoinHandle<Result<PassReport, IndexError>>,
}

impl IndexingPass {
    /// Ask the worker to stop before the next record.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Block until the worker is done.
    pub fn wait(self) -> Result<PassReport, IndexError> {
        self.handle.join().map_err(|_| IndexError::WorkerPanicked)?
    }
}

impl Iterator for IndexingPass {
    type Item = Progress;

    fn next(&mut self) -> Option<Self::Item> {
        self.progress.recv().ok()
    }
}
