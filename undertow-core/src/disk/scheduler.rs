//! Asynchronous write-back scheduler over a shared work queue.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::TorrentData;
use crate::config::DiskConfig;

/// Completion callback invoked with the write outcome.
///
/// `true` means the bytes reached storage; `false` means the write failed
/// and the caller decides on redelivery, the scheduler never retries.
pub type WriteCompletion = Box<dyn FnOnce(bool) + Send + 'static>;

struct QueuedWrite {
    offset: u64,
    data: Bytes,
    on_complete: Option<WriteCompletion>,
}

struct Shared {
    storage: Arc<dyn TorrentData>,
    queue: Mutex<VecDeque<QueuedWrite>>,
    work_available: Notify,
    stop: AtomicBool,
    queued: AtomicUsize,
    wake_interval: Duration,
}

/// Bounded-concurrency asynchronous disk write scheduler.
///
/// `queue_write` never blocks the caller. Worker tasks drain the shared
/// queue, push each entry through the storage collaborator and report the
/// outcome to the entry's completion callback. Entries are consumed
/// exactly once and never dropped while the scheduler runs; entries still
/// queued at shutdown are abandoned by design (process teardown, not a
/// durability log).
pub struct DiskScheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl DiskScheduler {
    /// Creates a scheduler writing through `storage`.
    ///
    /// Worker count comes from `config.max_concurrent_writes`, minimum 1.
    pub fn new(storage: Arc<dyn TorrentData>, config: &DiskConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                storage,
                queue: Mutex::new(VecDeque::new()),
                work_available: Notify::new(),
                stop: AtomicBool::new(false),
                queued: AtomicUsize::new(0),
                wake_interval: config.worker_wake_interval,
            }),
            workers: Mutex::new(Vec::new()),
            worker_count: config.max_concurrent_writes.max(1),
        }
    }

    /// Spawns the worker pool. Calling while already running is a no-op.
    pub fn start(&self) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return;
        }
        self.shared.stop.store(false, Ordering::Release);
        for worker in 0..self.worker_count {
            let shared = Arc::clone(&self.shared);
            workers.push(tokio::spawn(worker_loop(worker, shared)));
        }
        tracing::debug!(workers = self.worker_count, "disk scheduler started");
    }

    /// Enqueues a write and returns immediately.
    ///
    /// The optional callback fires exactly once with the write outcome
    /// after a worker has processed the entry.
    pub fn queue_write(&self, offset: u64, data: Bytes, on_complete: Option<WriteCompletion>) {
        self.shared.queued.fetch_add(1, Ordering::AcqRel);
        self.shared.queue.lock().push_back(QueuedWrite {
            offset,
            data,
            on_complete,
        });
        self.shared.work_available.notify_waiters();
    }

    /// Number of writes accepted but not yet completed by a worker.
    pub fn queued_writes(&self) -> usize {
        self.shared.queued.load(Ordering::Acquire)
    }

    /// Stops accepting drains and joins every worker.
    ///
    /// Workers finish the entry they are processing; they re-check the
    /// stop flag within the wake interval, so the join completes promptly.
    pub async fn shutdown(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.work_available.notify_waiters();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in futures::future::join_all(workers).await {
            if let Err(error) = worker {
                tracing::error!(%error, "disk worker terminated abnormally");
            }
        }
        tracing::debug!("disk scheduler stopped");
    }
}

async fn worker_loop(worker: usize, shared: Arc<Shared>) {
    loop {
        // Drain until the queue is empty or a stop is requested. The stop
        // check sits inside the drain so a deep queue cannot delay the
        // shutdown join: the in-flight entry finishes, the rest are
        // abandoned.
        loop {
            if shared.stop.load(Ordering::Acquire) {
                return;
            }
            let next = { shared.queue.lock().pop_front() };
            let Some(write) = next else {
                break;
            };
            let outcome = shared.storage.write_data(write.offset, &write.data).await;
            if let Err(error) = &outcome {
                tracing::warn!(worker, offset = write.offset, %error, "disk write failed");
            }
            let succeeded = outcome.is_ok();
            if let Some(on_complete) = write.on_complete {
                let call = panic::catch_unwind(AssertUnwindSafe(|| on_complete(succeeded)));
                if call.is_err() {
                    tracing::error!(
                        worker,
                        offset = write.offset,
                        "write completion callback panicked"
                    );
                }
            }
            shared.queued.fetch_sub(1, Ordering::AcqRel);
        }
        // Bounded wait so the stop flag is observed even without new work.
        let _ = tokio::time::timeout(shared.wake_interval, shared.work_available.notified()).await;
    }
}
