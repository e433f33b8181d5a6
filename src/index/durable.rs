//! Asynchronous, batched, crash-safe ingestion on top of [`VectorStore`].
//!
//! Producers call [`DurableVectorIndex::add_async`], which only enqueues. A single
//! writer task drains the bounded queue into batches and flushes a batch once it
//! reaches `batch_size` or once `save_interval` has passed since the last flush. Dirty
//! state is saved to disk at most once per `save_interval`, plus on
//! [`DurableVectorIndex::force_save`] and on shutdown.
//!
//! A failed flush keeps its batch for the next cycle. A failed save leaves the previous
//! snapshot on disk untouched.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::persist::{self, IndexPaths};
use super::store::{SearchHits, VectorStore};
use crate::config::IndexConfig;
use crate::error::{Result, VigilError};

/// Runtime knobs for the writer.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub dimension: usize,
    pub batch_size: usize,
    pub save_interval: Duration,
    pub queue_capacity: usize,
    pub force_save_timeout: Duration,
}

impl From<&IndexConfig> for IndexOptions {
    fn from(config: &IndexConfig) -> Self {
        Self {
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            save_interval: Duration::from_secs(config.save_interval_secs),
            queue_capacity: config.queue_capacity.max(1),
            force_save_timeout: Duration::from_secs(config.force_save_timeout_secs),
        }
    }
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self::from(&IndexConfig::default())
    }
}

enum WriterCommand {
    Add { vector: Vec<f32>, text: String },
    /// Flush everything queued ahead of this marker, save, and report back.
    Flush(oneshot::Sender<Result<()>>),
}

/// Everything the writer task and the save fallback share.
struct Shared {
    store: Arc<VectorStore>,
    paths: IndexPaths,
    /// Items enqueued but not yet flushed into the store.
    pending: AtomicUsize,
    /// Serializes saves so an older snapshot never renames over a newer one.
    save_lock: Mutex<()>,
}

impl Shared {
    fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock();
        let (index_bytes, texts_bytes) = self.store.encode_snapshot()?;
        persist::atomic_write(&self.paths.index, &index_bytes)?;
        persist::atomic_write(&self.paths.texts, &texts_bytes)?;
        tracing::info!(vectors = self.store.len(), "index saved");
        Ok(())
    }
}

pub struct DurableVectorIndex {
    shared: Arc<Shared>,
    tx: mpsc::Sender<WriterCommand>,
    cancel: CancellationToken,
    writer: Mutex<Option<JoinHandle<()>>>,
    options: IndexOptions,
}

impl DurableVectorIndex {
    /// Load (or create) the index at `paths` and start its writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(paths: IndexPaths, options: IndexOptions) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| VigilError::Internal(format!("index writer needs a tokio runtime: {e}")))?;

        let (index, texts) = persist::load_snapshot(&paths, options.dimension);
        let store = Arc::new(VectorStore::from_parts(index, texts));

        let shared = Arc::new(Shared {
            store,
            paths,
            pending: AtomicUsize::new(0),
            save_lock: Mutex::new(()),
        });
        let (tx, rx) = mpsc::channel(options.queue_capacity);
        let cancel = CancellationToken::new();

        let writer = runtime.spawn(run_writer(
            rx,
            Arc::clone(&shared),
            options.clone(),
            cancel.clone(),
        ));

        tracing::info!(
            vectors = shared.store.len(),
            dimension = options.dimension,
            batch_size = options.batch_size,
            "durable vector index ready"
        );

        Ok(Self {
            shared,
            tx,
            cancel,
            writer: Mutex::new(Some(writer)),
            options,
        })
    }

    pub fn dimension(&self) -> usize {
        self.options.dimension
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.shared.paths
    }

    /// Vectors in the index plus those still queued.
    pub fn count(&self) -> usize {
        self.shared.store.len() + self.shared.pending.load(Ordering::SeqCst)
    }

    /// Vectors already flushed and searchable.
    pub fn flushed_count(&self) -> usize {
        self.shared.store.len()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Enqueue a vector for the writer. Never blocks.
    pub fn add_async(&self, vector: Vec<f32>, text: impl Into<String>) -> Result<()> {
        if vector.len() != self.options.dimension {
            return Err(VigilError::DimensionMismatch {
                expected: self.options.dimension,
                actual: vector.len(),
            });
        }
        if self.cancel.is_cancelled() {
            return Err(VigilError::WriterClosed);
        }

        // Count before sending so the writer can never decrement below zero.
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        let command = WriterCommand::Add {
            vector,
            text: text.into(),
        };
        match self.tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.shared.pending.fetch_sub(1, Ordering::SeqCst);
                match e {
                    mpsc::error::TrySendError::Full(_) => {
                        tracing::warn!("index ingestion queue full, vector not queued");
                        Err(VigilError::QueueFull)
                    }
                    mpsc::error::TrySendError::Closed(_) => Err(VigilError::WriterClosed),
                }
            }
        }
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<SearchHits> {
        self.shared.store.search(query, k)
    }

    pub fn search_with_texts(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32, String)>> {
        self.shared.store.search_with_texts(query, k)
    }

    pub fn text(&self, id: u64) -> Option<String> {
        self.shared.store.text(id)
    }

    pub fn texts(&self) -> Vec<String> {
        self.shared.store.texts()
    }

    /// Wait (bounded) for the queue to drain, then save.
    ///
    /// If the writer does not acknowledge within `force_save_timeout`, whatever has been
    /// flushed so far is saved anyway.
    pub async fn force_save(&self) -> Result<()> {
        tracing::info!("forcing index save");
        let deadline = Instant::now() + self.options.force_save_timeout;
        let (ack_tx, ack_rx) = oneshot::channel();

        let sent = tokio::time::timeout_at(deadline, self.tx.send(WriterCommand::Flush(ack_tx))).await;
        match sent {
            Ok(Ok(())) => match tokio::time::timeout_at(deadline, ack_rx).await {
                Ok(Ok(result)) => return result,
                Ok(Err(_)) => tracing::warn!("index writer stopped before acknowledging save"),
                Err(_) => tracing::warn!("force save timed out waiting for queue drain"),
            },
            Ok(Err(_)) => tracing::warn!("index writer closed, saving flushed state"),
            Err(_) => tracing::warn!("force save timed out enqueueing flush marker"),
        }

        self.save_flushed().await
    }

    /// Save the currently flushed state without waiting for the queue.
    async fn save_flushed(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || shared.save())
            .await
            .map_err(|e| VigilError::Internal(format!("save task failed: {e}")))?
    }

    /// Stop the writer after it drains the queue and performs a final save.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("shutting down durable vector index");
        self.cancel.cancel();
        let handle = self.writer.lock().take();
        if let Some(handle) = handle {
            let wait = self.options.force_save_timeout.max(Duration::from_secs(1));
            match tokio::time::timeout(wait, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(VigilError::Internal(format!("index writer panicked: {e}"))),
                Err(_) => return Err(VigilError::Timeout(wait)),
            }
        }
        Ok(())
    }
}

impl Drop for DurableVectorIndex {
    fn drop(&mut self) {
        // Lets a detached writer drain and save on its own.
        self.cancel.cancel();
    }
}

fn flush_batch(shared: &Shared, batch: &mut Vec<(Vec<f32>, String)>) -> bool {
    if batch.is_empty() {
        return false;
    }
    match shared.store.add_batch(batch) {
        Ok(range) => {
            shared.pending.fetch_sub(batch.len(), Ordering::SeqCst);
            tracing::info!(count = batch.len(), first_id = range.start, "flushed batch to index");
            batch.clear();
            true
        }
        Err(e) => {
            tracing::error!(count = batch.len(), error = %e, "batch flush failed, retaining for retry");
            false
        }
    }
}

async fn save_in_background(shared: &Arc<Shared>) -> Result<()> {
    let shared = Arc::clone(shared);
    let result = tokio::task::spawn_blocking(move || shared.save())
        .await
        .map_err(|e| VigilError::Internal(format!("save task failed: {e}")))
        .and_then(|r| r);
    if let Err(ref e) = result {
        tracing::error!(error = %e, "index save failed, previous snapshot kept");
    }
    result
}

async fn run_writer(
    mut rx: mpsc::Receiver<WriterCommand>,
    shared: Arc<Shared>,
    options: IndexOptions,
    cancel: CancellationToken,
) {
    let mut batch: Vec<(Vec<f32>, String)> = Vec::with_capacity(options.batch_size);
    let mut dirty = false;
    let mut last_flush = Instant::now();
    let mut last_save = Instant::now();

    let tick = options
        .save_interval
        .min(Duration::from_millis(250))
        .max(Duration::from_millis(10));
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            command = rx.recv() => match command {
                Some(WriterCommand::Add { vector, text }) => batch.push((vector, text)),
                Some(WriterCommand::Flush(ack)) => {
                    dirty |= flush_batch(&shared, &mut batch);
                    let result = if batch.is_empty() {
                        save_in_background(&shared).await
                    } else {
                        Err(VigilError::Internal("batch flush failed before save".into()))
                    };
                    if result.is_ok() {
                        dirty = false;
                        last_save = Instant::now();
                    }
                    last_flush = Instant::now();
                    let _ = ack.send(result);
                    continue;
                }
                None => break,
            },
            _ = ticker.tick() => {}
        }

        let interval_elapsed = last_flush.elapsed() >= options.save_interval;
        if batch.len() >= options.batch_size || (!batch.is_empty() && interval_elapsed) {
            dirty |= flush_batch(&shared, &mut batch);
            last_flush = Instant::now();
        }

        if dirty && last_save.elapsed() >= options.save_interval {
            if save_in_background(&shared).await.is_ok() {
                dirty = false;
            }
            last_save = Instant::now();
        }
    }

    // Drain whatever producers managed to enqueue before the channel closed.
    rx.close();
    let mut waiting_acks = Vec::new();
    while let Ok(command) = rx.try_recv() {
        match command {
            WriterCommand::Add { vector, text } => batch.push((vector, text)),
            WriterCommand::Flush(ack) => waiting_acks.push(ack),
        }
    }
    dirty |= flush_batch(&shared, &mut batch);
    if !batch.is_empty() {
        tracing::error!(count = batch.len(), "unflushed vectors dropped at shutdown");
        shared.pending.fetch_sub(batch.len(), Ordering::SeqCst);
    }

    let result = if dirty || !waiting_acks.is_empty() {
        save_in_background(&shared).await
    } else {
        Ok(())
    };
    for ack in waiting_acks {
        let _ = ack.send(match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(VigilError::Internal(e.to_string())),
        });
    }
    tracing::info!("index writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(dimension: usize) -> IndexOptions {
        IndexOptions {
            dimension,
            batch_size: 4,
            save_interval: Duration::from_secs(3600),
            queue_capacity: 64,
            force_save_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn add_async_is_searchable_after_force_save() {
        let tmp = TempDir::new().unwrap();
        let index = DurableVectorIndex::open(IndexPaths::in_dir(tmp.path()), options(2)).unwrap();

        index.add_async(vec![1.0, 0.0], "east").unwrap();
        index.add_async(vec![0.0, 1.0], "north").unwrap();
        assert_eq!(index.count(), 2);

        index.force_save().await.unwrap();
        assert_eq!(index.flushed_count(), 2);
        assert_eq!(index.pending_count(), 0);

        let hits = index.search(&[0.0, 1.0], 1).unwrap();
        assert_eq!(index.text(hits.ids[0]).as_deref(), Some("north"));
    }

    #[tokio::test]
    async fn full_batch_flushes_without_force() {
        let tmp = TempDir::new().unwrap();
        let index = DurableVectorIndex::open(IndexPaths::in_dir(tmp.path()), options(2)).unwrap();

        for i in 0..4 {
            index.add_async(vec![i as f32, 1.0], format!("t{i}")).unwrap();
        }

        for _ in 0..100 {
            if index.flushed_count() == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(index.flushed_count(), 4);
    }

    #[tokio::test]
    async fn add_async_rejects_wrong_dimension() {
        let tmp = TempDir::new().unwrap();
        let index = DurableVectorIndex::open(IndexPaths::in_dir(tmp.path()), options(3)).unwrap();
        let err = index.add_async(vec![1.0], "bad").unwrap_err();
        assert!(matches!(err, VigilError::DimensionMismatch { .. }));
        assert_eq!(index.count(), 0);
    }

    #[tokio::test]
    async fn full_queue_reports_queue_full() {
        let tmp = TempDir::new().unwrap();
        let mut opts = options(1);
        opts.queue_capacity = 1;
        opts.batch_size = 1000;
        let index = DurableVectorIndex::open(IndexPaths::in_dir(tmp.path()), opts).unwrap();

        // The writer may pull one item off the queue; a burst still overflows capacity 1.
        let results: Vec<_> = (0..50).map(|i| index.add_async(vec![i as f32], "x")).collect();
        assert!(results.iter().any(|r| matches!(r, Err(VigilError::QueueFull))));
        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(index.count(), accepted);
    }

    #[tokio::test]
    async fn shutdown_drains_and_saves() {
        let tmp = TempDir::new().unwrap();
        let paths = IndexPaths::in_dir(tmp.path());
        {
            let index = DurableVectorIndex::open(paths.clone(), options(2)).unwrap();
            index.add_async(vec![1.0, 0.0], "a").unwrap();
            index.shutdown().await.unwrap();
            assert!(matches!(
                index.add_async(vec![1.0, 0.0], "b"),
                Err(VigilError::WriterClosed)
            ));
        }

        let reopened = DurableVectorIndex::open(paths, options(2)).unwrap();
        assert_eq!(reopened.texts(), vec!["a".to_string()]);
    }
}
