//! Bandwidth admission gate over a measured transfer rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::rate_estimator::RateEstimator;

/// Rate limit value meaning no limit is applied.
pub const UNLIMITED: u64 = 0;

/// Token-budget gate pairing a rate estimator with a mutable limit.
///
/// Admission logic consults the limiter before dispatching further bytes;
/// a limit of zero means unlimited. Limits may change live and take effect
/// on the next check, no restart required.
pub struct BandwidthLimiter {
    rate: Arc<RateEstimator>,
    /// Bytes per second; [`UNLIMITED`] disables the gate
    limit: AtomicU64,
}

impl BandwidthLimiter {
    /// Creates a limiter observing `rate` with the given limit.
    pub fn new(rate: Arc<RateEstimator>, limit: u64) -> Self {
        Self {
            rate,
            limit: AtomicU64::new(limit),
        }
    }

    /// Configured limit in bytes per second, zero meaning unlimited.
    pub fn rate_limit(&self) -> u64 {
        self.limit.load(Ordering::Acquire)
    }

    /// Applies a new limit, effective immediately.
    pub fn set_rate_limit(&self, limit: u64) {
        self.limit.store(limit, Ordering::Release);
    }

    /// Whether no limit is currently applied.
    pub fn is_unlimited(&self) -> bool {
        self.rate_limit() == UNLIMITED
    }

    /// Bytes that may still be dispatched this interval.
    pub fn available_budget(&self) -> u64 {
        let limit = self.rate_limit();
        if limit == UNLIMITED {
            return u64::MAX;
        }
        limit.saturating_sub(self.rate.average_rate())
    }

    /// Whether dispatching `bytes` stays within the budget.
    pub fn allows(&self, bytes: u64) -> bool {
        bytes <= self.available_budget()
    }

    /// The estimator this limiter observes.
    pub fn estimator(&self) -> &Arc<RateEstimator> {
        &self.rate
    }
}
