//! Centralized configuration for Undertow.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the codebase. Bandwidth limits are re-read every
//! scheduler tick, so changes made at runtime take effect live.

use std::time::Duration;

use crate::network::DEFAULT_RATE_WINDOW;
use crate::UndertowError;

/// Central configuration for all Undertow components.
#[derive(Debug, Clone, Default)]
pub struct UndertowConfig {
    pub torrent: TorrentConfig,
    pub network: NetworkConfig,
    pub disk: DiskConfig,
}

/// Piece selection and scheduling configuration.
#[derive(Debug, Clone)]
pub struct TorrentConfig {
    /// Tie-breaking noise amplitude for rarest-first selection
    pub selection_noise_amplitude: f64,
    /// Interval between scheduler ticks
    pub tick_interval: Duration,
}

impl Default for TorrentConfig {
    fn default() -> Self {
        Self {
            selection_noise_amplitude: 0.05,
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Bandwidth accounting configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Download bandwidth limit in bytes per second (None = unlimited)
    pub download_limit: Option<u64>,
    /// Upload bandwidth limit in bytes per second (None = unlimited)
    pub upload_limit: Option<u64>,
    /// Averaging window for transfer rate estimation
    pub rate_window: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            download_limit: None,
            upload_limit: None,
            rate_window: DEFAULT_RATE_WINDOW,
        }
    }
}

/// Disk write scheduler configuration.
#[derive(Debug, Clone)]
pub struct DiskConfig {
    /// Number of concurrent disk writer tasks
    pub max_concurrent_writes: usize,
    /// How long an idle writer waits before re-checking for work
    pub worker_wake_interval: Duration,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            max_concurrent_writes: num_cpus::get().min(4),
            worker_wake_interval: Duration::from_secs(1),
        }
    }
}

/// Reads and parses an environment variable, `None` when unset.
fn parse_env<T: std::str::FromStr>(name: &str) -> crate::Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| UndertowError::Configuration {
                reason: format!("invalid {name}: {value}"),
            }),
        Err(_) => Ok(None),
    }
}

impl UndertowConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    ///
    /// # Errors
    ///
    /// - `UndertowError::Configuration` - If a set variable fails to parse
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();

        if let Some(bytes_per_sec) = parse_env::<u64>("UNDERTOW_DOWNLOAD_LIMIT")? {
            config.network.download_limit = (bytes_per_sec > 0).then_some(bytes_per_sec);
        }

        if let Some(bytes_per_sec) = parse_env::<u64>("UNDERTOW_UPLOAD_LIMIT")? {
            config.network.upload_limit = (bytes_per_sec > 0).then_some(bytes_per_sec);
        }

        if let Some(count) = parse_env::<usize>("UNDERTOW_MAX_CONCURRENT_WRITES")? {
            config.disk.max_concurrent_writes = count.max(1);
        }

        Ok(config)
    }

    /// Creates a configuration with short intervals for fast tests.
    pub fn for_testing() -> Self {
        Self {
            torrent: TorrentConfig {
                selection_noise_amplitude: 0.0,
                tick_interval: Duration::from_millis(10),
            },
            network: NetworkConfig {
                rate_window: Duration::from_secs(1),
                ..Default::default()
            },
            disk: DiskConfig {
                max_concurrent_writes: 2,
                worker_wake_interval: Duration::from_millis(20),
            },
        }
    }
}
