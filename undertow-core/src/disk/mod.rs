//! Disk write-back layer for verified torrent data.
//!
//! Decouples network receipt from storage commit: received blocks are
//! queued and persisted by a bounded pool of writer tasks, so network
//! progress never waits on disk latency.

pub mod scheduler;

use async_trait::async_trait;

pub use scheduler::{DiskScheduler, WriteCompletion};

/// Storage collaborator the disk workers write through.
///
/// Implementations own the file layout; the scheduler only knows torrent
/// offsets and byte buffers.
#[async_trait]
pub trait TorrentData: Send + Sync {
    /// Persists `data` at the given torrent offset.
    ///
    /// # Errors
    ///
    /// - `StorageError::InsufficientSpace` - If not enough disk space
    /// - `StorageError::Io` - If the file system operation failed
    async fn write_data(&self, offset: u64, data: &[u8]) -> Result<(), StorageError>;
}

/// Errors that occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Not enough disk space available for the operation
    #[error("insufficient disk space: need {needed} bytes, have {available}")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        needed: u64,
        /// Number of bytes currently available
        available: u64,
    },

    /// File system specific error occurred
    #[error("file system error: {message}")]
    FilesystemError {
        /// Description of the file system error
        message: String,
    },

    /// Standard I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
