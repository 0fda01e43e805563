//! Process-wide transfer accounting.
//!
//! One download and one upload meter, each pairing a monotonic byte total
//! with a rate estimator and a bandwidth limiter. A handle is passed into
//! the scheduler explicitly rather than reached through a global.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::bandwidth::{BandwidthLimiter, UNLIMITED};
use super::rate_estimator::RateEstimator;
use crate::config::NetworkConfig;

/// Byte total, rate estimator and limiter for one transfer direction.
pub struct TransferMeter {
    total: AtomicU64,
    rate: Arc<RateEstimator>,
    limiter: BandwidthLimiter,
}

impl TransferMeter {
    fn new(window: std::time::Duration, limit: u64) -> Self {
        let rate = Arc::new(RateEstimator::new(window));
        let limiter = BandwidthLimiter::new(Arc::clone(&rate), limit);
        Self {
            total: AtomicU64::new(0),
            rate,
            limiter,
        }
    }

    /// Records transferred bytes. Safe from any thread.
    pub fn record(&self, bytes: u64) {
        self.total.fetch_add(bytes, Ordering::AcqRel);
        self.rate.add(bytes);
    }

    /// Monotonic total of bytes transferred in this direction.
    pub fn total_bytes(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// Current average rate in bytes per second.
    pub fn average_rate(&self) -> u64 {
        self.rate.average_rate()
    }

    /// Admission gate for this direction.
    pub fn limiter(&self) -> &BandwidthLimiter {
        &self.limiter
    }

    fn update(&self, limit: u64) {
        self.rate.update();
        self.limiter.set_rate_limit(limit);
    }
}

/// Global download and upload accounting pair.
pub struct Stats {
    download: TransferMeter,
    upload: TransferMeter,
}

impl Stats {
    /// Creates stats bound to the configured limits and rate window.
    pub fn new(network: &NetworkConfig) -> Self {
        Self {
            download: TransferMeter::new(
                network.rate_window,
                network.download_limit.unwrap_or(UNLIMITED),
            ),
            upload: TransferMeter::new(
                network.rate_window,
                network.upload_limit.unwrap_or(UNLIMITED),
            ),
        }
    }

    /// Records received bytes.
    pub fn record_download(&self, bytes: u64) {
        self.download.record(bytes);
    }

    /// Records sent bytes.
    pub fn record_upload(&self, bytes: u64) {
        self.upload.record(bytes);
    }

    /// Download-direction meter.
    pub fn download(&self) -> &TransferMeter {
        &self.download
    }

    /// Upload-direction meter.
    pub fn upload(&self) -> &TransferMeter {
        &self.upload
    }

    /// Per-tick refresh: rolls both rate windows and re-applies the
    /// configured limits, so live limit changes are honored instead of
    /// cached. Call from exactly one scheduling site.
    pub fn update(&self, network: &NetworkConfig) {
        self.download
            .update(network.download_limit.unwrap_or(UNLIMITED));
        self.upload
            .update(network.upload_limit.unwrap_or(UNLIMITED));
    }

    /// Plain snapshot for display surfaces.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            downloaded_bytes: self.download.total_bytes(),
            uploaded_bytes: self.upload.total_bytes(),
            download_rate: self.download.average_rate(),
            upload_rate: self.upload.average_rate(),
        }
    }
}

/// Point-in-time transfer statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub downloaded_bytes: u64,
    pub uploaded_bytes: u64,
    /// Bytes per second averaged over the rate window
    pub download_rate: u64,
    /// Bytes per second averaged over the rate window
    pub upload_rate: u64,
}
