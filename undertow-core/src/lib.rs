//! Undertow Core - download orchestration for BitTorrent swarms
//!
//! This crate provides the decision layer of a BitTorrent client: piece
//! selection strategies, the per-torrent mode state machine (normal,
//! end-game, super-seed), an asynchronous disk write scheduler and global
//! bandwidth accounting. Wire framing, peer transport and discovery are
//! external collaborators reached through traits.

pub mod config;
pub mod disk;
pub mod network;
pub mod torrent;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::UndertowConfig;
pub use disk::{DiskScheduler, StorageError, TorrentData};
pub use network::{BandwidthLimiter, RateEstimator, Stats, StatsSnapshot};
pub use torrent::{
    EndGameMode, NormalMode, SuperSeedMode, TorrentError, TorrentMode, TorrentSession,
};

/// Core errors that can bubble up from any Undertow subsystem.
#[derive(Debug, thiserror::Error)]
pub enum UndertowError {
    #[error("Torrent error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, UndertowError>;
