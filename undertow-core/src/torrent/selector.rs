//! Piece selection strategies for torrent downloads.
//!
//! Each strategy ranks candidate pieces in descending request priority.
//! Verified pieces are excluded from every ranking; randomized noise terms
//! break ties so peers evaluating similar swarm state do not herd onto the
//! same pieces.

use super::piece::TorrentPiece;
use super::PieceIndex;

/// Default tie-breaking noise amplitude for rarest-first ranking.
pub const DEFAULT_NOISE_AMPLITUDE: f64 = 0.05;

/// Noise amplitude used by the random-order strategy.
const RANDOM_ORDER_AMPLITUDE: f64 = 0.2;

/// Rarity substituted when no swarm bitfields have been observed yet.
const UNKNOWN_RARITY: f64 = 10.0;

/// Trait for piece selection strategies.
///
/// Implementations are pure over the snapshot they receive: they never
/// mutate input and materialize an owned ranking on every call.
pub trait PieceSelector: Send + Sync {
    /// Ranks candidate pieces in descending request priority.
    ///
    /// Pieces already verified are never part of the output.
    fn ranked_pieces(&self, pieces: &[TorrentPiece]) -> Vec<PieceIndex>;

    /// How many peers may concurrently hold a request for the same block.
    ///
    /// The request-issuance layer consults this; only end-game selection
    /// permits duplicates (first response wins, the rest are discarded).
    fn max_duplicated_requests(&self) -> usize {
        1
    }
}

fn noise(amplitude: f64) -> f64 {
    if amplitude > 0.0 {
        rand::random_range(0.0..amplitude)
    } else {
        0.0
    }
}

/// Filters out verified pieces and sorts the rest by a computed key,
/// descending. The sort is stable, so equal keys keep input order.
fn rank_by<F>(pieces: &[TorrentPiece], key: F) -> Vec<PieceIndex>
where
    F: Fn(&TorrentPiece) -> f64,
{
    let mut candidates: Vec<(PieceIndex, f64)> = pieces
        .iter()
        .filter(|piece| !piece.verified)
        .map(|piece| (piece.index, key(piece)))
        .collect();
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
    candidates.into_iter().map(|(index, _)| index).collect()
}

/// Rarest-first selection with randomized tie breaking.
///
/// Rank is `importance + noise`, noise drawn uniformly in
/// `[0, noise_amplitude)` independently per piece per call.
#[derive(Debug, Clone)]
pub struct RarestFirst {
    noise_amplitude: f64,
}

impl RarestFirst {
    /// Creates the strategy with the default noise amplitude.
    pub fn new() -> Self {
        Self {
            noise_amplitude: DEFAULT_NOISE_AMPLITUDE,
        }
    }

    /// Overrides the noise amplitude. Zero yields deterministic ordering.
    pub fn with_noise_amplitude(mut self, amplitude: f64) -> Self {
        self.noise_amplitude = amplitude.max(0.0);
        self
    }
}

impl Default for RarestFirst {
    fn default() -> Self {
        Self::new()
    }
}

impl PieceSelector for RarestFirst {
    fn ranked_pieces(&self, pieces: &[TorrentPiece]) -> Vec<PieceIndex> {
        rank_by(pieces, |piece| {
            piece.importance + noise(self.noise_amplitude)
        })
    }
}

/// Availability-first bootstrap that converges to rarest-first.
///
/// Until the first piece verifies, ranks by
/// `download_progress + (1 - rarity)`, substituting [`UNKNOWN_RARITY`] for
/// infinite rarity. This biases early selection toward widely available
/// pieces so the client has something to reciprocate quickly. Once at least
/// one piece is verified, behaves exactly like [`RarestFirst`].
#[derive(Debug, Clone, Default)]
pub struct AvailableThenRarestFirst {
    rarest: RarestFirst,
}

impl AvailableThenRarestFirst {
    /// Creates the strategy with the default noise amplitude.
    pub fn new() -> Self {
        Self {
            rarest: RarestFirst::new(),
        }
    }

    /// Overrides the noise amplitude of the rarest-first phase.
    pub fn with_noise_amplitude(mut self, amplitude: f64) -> Self {
        self.rarest = self.rarest.with_noise_amplitude(amplitude);
        self
    }
}

impl PieceSelector for AvailableThenRarestFirst {
    fn ranked_pieces(&self, pieces: &[TorrentPiece]) -> Vec<PieceIndex> {
        let any_verified = pieces.iter().any(|piece| piece.verified);
        if any_verified {
            return self.rarest.ranked_pieces(pieces);
        }
        rank_by(pieces, |piece| {
            let rarity = if piece.rarity.is_infinite() {
                UNKNOWN_RARITY
            } else {
                piece.rarity
            };
            piece.download_progress + (1.0 - rarity)
        })
    }
}

/// Progress-weighted random selection, ignoring rarity entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomOrder;

impl RandomOrder {
    /// Creates the strategy.
    pub fn new() -> Self {
        Self
    }
}

impl PieceSelector for RandomOrder {
    fn ranked_pieces(&self, pieces: &[TorrentPiece]) -> Vec<PieceIndex> {
        rank_by(pieces, |piece| {
            piece.download_progress + noise(RANDOM_ORDER_AMPLITUDE)
        })
    }
}

/// Deterministic importance ranking with unbounded request duplication.
///
/// Used to close out the final pieces of a download: every eligible peer
/// may be asked for the same outstanding block so a single slow holder
/// cannot stall completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndGame;

impl EndGame {
    /// Creates the strategy.
    pub fn new() -> Self {
        Self
    }
}

impl PieceSelector for EndGame {
    fn ranked_pieces(&self, pieces: &[TorrentPiece]) -> Vec<PieceIndex> {
        rank_by(pieces, |piece| piece.importance)
    }

    fn max_duplicated_requests(&self) -> usize {
        usize::MAX
    }
}
