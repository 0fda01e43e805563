//! Rolling bytes-per-second estimation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// Default averaging window.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(5);

/// Rolling-window transfer rate estimator.
///
/// Producers call [`add`](Self::add) from any thread; exactly one
/// scheduling site calls [`update`](Self::update) once per second to roll
/// the window, otherwise the average advances twice for one interval.
/// [`average_rate`](Self::average_rate) is a lock-free concurrent read.
pub struct RateEstimator {
    /// Bytes accumulated since the last window roll
    pending: AtomicU64,
    /// One bucket per elapsed second, newest last
    buckets: Mutex<VecDeque<u64>>,
    window_secs: u64,
    average: AtomicU64,
}

impl RateEstimator {
    /// Creates an estimator averaging over `window` (minimum one second).
    pub fn new(window: Duration) -> Self {
        let window_secs = window.as_secs().max(1);
        Self {
            pending: AtomicU64::new(0),
            buckets: Mutex::new(VecDeque::with_capacity(window_secs as usize)),
            window_secs,
            average: AtomicU64::new(0),
        }
    }

    /// Records transferred bytes into the current interval.
    pub fn add(&self, bytes: u64) {
        self.pending.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Rolls the window forward one interval and recomputes the average.
    pub fn update(&self) {
        let bytes = self.pending.swap(0, Ordering::AcqRel);
        let mut buckets = self.buckets.lock();
        buckets.push_back(bytes);
        while buckets.len() as u64 > self.window_secs {
            buckets.pop_front();
        }
        let total: u64 = buckets.iter().sum();
        self.average.store(total / self.window_secs, Ordering::Release);
    }

    /// Average transfer rate in bytes per second over the window.
    pub fn average_rate(&self) -> u64 {
        self.average.load(Ordering::Acquire)
    }

    /// Averaging window length in seconds.
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_WINDOW)
    }
}
