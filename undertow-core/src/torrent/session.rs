//! Periodic scheduler tying modes, disk and transfer accounting together.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use super::mode::TorrentMode;
use crate::config::UndertowConfig;
use crate::disk::scheduler::{DiskScheduler, WriteCompletion};
use crate::disk::TorrentData;
use crate::network::stats::{Stats, StatsSnapshot};

struct SessionShared {
    config: RwLock<UndertowConfig>,
    stats: Stats,
    disk: DiskScheduler,
    mode: RwLock<Arc<dyn TorrentMode>>,
}

/// Download orchestration driver for one torrent.
///
/// Owns the periodic tick: every interval the transfer accounting rolls
/// forward (re-applying the configured bandwidth limits) and the active
/// mode re-evaluates its piece ranking or super-seed assignments. Received
/// blocks flow through [`queue_block`](Self::queue_block) into the disk
/// scheduler without blocking the network path.
pub struct TorrentSession {
    shared: Arc<SessionShared>,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

impl TorrentSession {
    /// Creates a session writing through `storage` under `mode`.
    pub fn new(
        config: UndertowConfig,
        storage: Arc<dyn TorrentData>,
        mode: Arc<dyn TorrentMode>,
    ) -> Self {
        let stats = Stats::new(&config.network);
        let disk = DiskScheduler::new(storage, &config.disk);
        Self {
            shared: Arc::new(SessionShared {
                config: RwLock::new(config),
                stats,
                disk,
                mode: RwLock::new(mode),
            }),
            tick_task: Mutex::new(None),
        }
    }

    /// Starts the disk workers and the tick loop. Idempotent.
    pub fn start(&self) {
        self.shared.disk.start();

        let mut tick_task = self.tick_task.lock();
        if tick_task.is_some() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let tick_interval = shared.config.read().torrent.tick_interval;
        *tick_task = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval(tick_interval);
            loop {
                ticks.tick().await;
                let network = shared.config.read().network.clone();
                shared.stats.update(&network);
                let mode = Arc::clone(&*shared.mode.read());
                mode.update();
            }
        }));
        tracing::debug!("torrent session started");
    }

    /// Hands a received block to the disk scheduler and accounts for it.
    ///
    /// Never blocks; the optional callback fires once a writer commits or
    /// fails the block.
    pub fn queue_block(&self, offset: u64, data: Bytes, on_complete: Option<WriteCompletion>) {
        self.shared.stats.record_download(data.len() as u64);
        self.shared.disk.queue_write(offset, data, on_complete);
    }

    /// Accounts for bytes sent to a peer.
    pub fn record_upload(&self, bytes: u64) {
        self.shared.stats.record_upload(bytes);
    }

    /// Whether the download budget admits `bytes` this interval.
    pub fn can_download(&self, bytes: u64) -> bool {
        self.shared.stats.download().limiter().allows(bytes)
    }

    /// Whether the upload budget admits `bytes` this interval.
    pub fn can_upload(&self, bytes: u64) -> bool {
        self.shared.stats.upload().limiter().allows(bytes)
    }

    /// Applies new bandwidth limits; the next tick picks them up.
    pub fn set_bandwidth_limits(&self, download: Option<u64>, upload: Option<u64>) {
        let mut config = self.shared.config.write();
        config.network.download_limit = download;
        config.network.upload_limit = upload;
    }

    /// The currently active mode.
    pub fn mode(&self) -> Arc<dyn TorrentMode> {
        Arc::clone(&*self.shared.mode.read())
    }

    /// Swaps the active mode.
    ///
    /// The caller owns the attach/detach lifecycle of both modes; this
    /// only changes which one the tick drives.
    pub fn set_mode(&self, mode: Arc<dyn TorrentMode>) {
        *self.shared.mode.write() = mode;
        tracing::debug!("torrent mode switched");
    }

    /// Transfer accounting handle.
    pub fn stats(&self) -> &Stats {
        &self.shared.stats
    }

    /// Point-in-time transfer statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Writes accepted but not yet committed by a disk worker.
    pub fn queued_writes(&self) -> usize {
        self.shared.disk.queued_writes()
    }

    /// Stops the tick loop and drains the disk worker pool.
    pub async fn shutdown(&self) {
        if let Some(tick_task) = self.tick_task.lock().take() {
            tick_task.abort();
        }
        self.shared.disk.shutdown().await;
        tracing::debug!("torrent session stopped");
    }
}
