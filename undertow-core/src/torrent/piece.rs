//! Piece metadata snapshot consumed by selection strategies.

use super::PieceIndex;

/// Point-in-time view of one piece's download state.
///
/// Owned by the torrent; selectors and modes receive snapshot slices and
/// never mutate them. Verification is monotonic: once `verified` is set the
/// piece is never ranked for request again by any strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentPiece {
    /// Zero-based piece index, stable for the torrent lifetime
    pub index: PieceIndex,
    /// Whether the piece hash has been verified
    pub verified: bool,
    /// Number of swarm peers lacking this piece; `f64::INFINITY` when no
    /// bitfields have been observed yet
    pub rarity: f64,
    /// Strategy-defined composite rank weight
    pub importance: f64,
    /// Fraction of blocks received, 0.0 to 1.0, not necessarily verified
    pub download_progress: f64,
}

impl TorrentPiece {
    /// Creates piece metadata with no swarm information yet.
    pub fn new(index: PieceIndex) -> Self {
        Self {
            index,
            verified: false,
            rarity: f64::INFINITY,
            importance: 0.0,
            download_progress: 0.0,
        }
    }

    /// Sets the observed rarity.
    pub fn with_rarity(mut self, rarity: f64) -> Self {
        self.rarity = rarity;
        self
    }

    /// Sets the composite rank weight.
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Sets the received-block fraction.
    pub fn with_progress(mut self, progress: f64) -> Self {
        self.download_progress = progress.clamp(0.0, 1.0);
        self
    }

    /// Marks the piece as hash-verified.
    pub fn verified(mut self) -> Self {
        self.verified = true;
        self
    }
}
