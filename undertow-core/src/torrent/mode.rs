//! Per-torrent mode state machine.
//!
//! A torrent runs in exactly one mode at a time: normal download, end-game,
//! or super-seed. The mode owns the active piece selector and the
//! peer-interaction policy (request duplication, bitfield masking). Mode
//! switching is driven by policy outside this module; the binding contract
//! here guarantees a mode instance serves at most one torrent.

use std::sync::Arc;

use parking_lot::Mutex;

use super::selector::{AvailableThenRarestFirst, EndGame, PieceSelector};
use super::swarm::TorrentView;
use super::{PieceIndex, TorrentError};

/// Capability surface of a torrent mode.
///
/// Callers hold an opaque `Arc<dyn TorrentMode>` chosen at torrent
/// configuration time; no further type inspection happens at call sites.
pub trait TorrentMode: Send + Sync {
    /// Whether the same outstanding block may be requested from every
    /// eligible peer at once. Only end-game races requests this way.
    fn request_all_peers_for_same_block(&self) -> bool {
        false
    }

    /// Whether outbound have-piece announcements are suppressed and a
    /// leecher-like bitfield presented. Only super-seeding masks.
    fn masks_bitfield(&self) -> bool {
        false
    }

    /// Binds this mode to a torrent.
    ///
    /// Rebinding to the same torrent is a no-op. Per-mode state is
    /// allocated fresh on every successful bind.
    ///
    /// # Errors
    ///
    /// - `TorrentError::ModeAlreadyBound` - If currently serving a
    ///   different torrent
    fn attach(self: Arc<Self>, torrent: Arc<dyn TorrentView>) -> Result<(), TorrentError>;

    /// Unbinds from the current torrent and releases per-mode state.
    /// No-op when already detached.
    fn detach(&self);

    /// Runs one scheduling tick. No-op when detached.
    fn update(&self);

    /// Latest materialized ranking produced by [`update`](Self::update).
    ///
    /// Empty when detached, and always empty for super-seeding (a seed
    /// requests nothing).
    fn ranked_pieces(&self) -> Vec<PieceIndex>;

    /// Duplicate-request allowance of the active selector.
    fn max_duplicated_requests(&self) -> usize {
        1
    }
}

/// Shared selector-driven machinery for the downloading modes.
struct SelectionCore {
    selector: Box<dyn PieceSelector>,
    state: Mutex<Option<SelectionState>>,
}

struct SelectionState {
    torrent: Arc<dyn TorrentView>,
    ranking: Vec<PieceIndex>,
}

impl SelectionCore {
    fn new(selector: Box<dyn PieceSelector>) -> Self {
        Self {
            selector,
            state: Mutex::new(None),
        }
    }

    fn attach(&self, torrent: Arc<dyn TorrentView>) -> Result<(), TorrentError> {
        let mut state = self.state.lock();
        if let Some(current) = state.as_ref() {
            if current.torrent.info_hash() == torrent.info_hash() {
                return Ok(());
            }
            return Err(TorrentError::ModeAlreadyBound {
                bound: current.torrent.info_hash(),
                requested: torrent.info_hash(),
            });
        }
        tracing::debug!(torrent = %torrent.info_hash(), "mode attached");
        *state = Some(SelectionState {
            torrent,
            ranking: Vec::new(),
        });
        Ok(())
    }

    fn detach(&self) {
        if self.state.lock().take().is_some() {
            tracing::debug!("mode detached");
        }
    }

    fn update(&self) {
        let mut state = self.state.lock();
        if let Some(state) = state.as_mut() {
            let pieces = state.torrent.pieces();
            state.ranking = self.selector.ranked_pieces(&pieces);
        }
    }

    fn ranked_pieces(&self) -> Vec<PieceIndex> {
        self.state
            .lock()
            .as_ref()
            .map(|state| state.ranking.clone())
            .unwrap_or_default()
    }
}

/// Steady-state download mode.
///
/// Defaults to availability-first selection that converges to rarest-first
/// once the torrent has a verified piece to reciprocate with.
pub struct NormalMode {
    core: SelectionCore,
}

impl NormalMode {
    /// Creates the mode with the default selector.
    pub fn new() -> Arc<Self> {
        Self::with_selector(Box::new(AvailableThenRarestFirst::new()))
    }

    /// Creates the mode with a caller-chosen selector.
    pub fn with_selector(selector: Box<dyn PieceSelector>) -> Arc<Self> {
        Arc::new(Self {
            core: SelectionCore::new(selector),
        })
    }
}

impl TorrentMode for NormalMode {
    fn attach(self: Arc<Self>, torrent: Arc<dyn TorrentView>) -> Result<(), TorrentError> {
        self.core.attach(torrent)
    }

    fn detach(&self) {
        self.core.detach();
    }

    fn update(&self) {
        self.core.update();
    }

    fn ranked_pieces(&self) -> Vec<PieceIndex> {
        self.core.ranked_pieces()
    }

    fn max_duplicated_requests(&self) -> usize {
        self.core.selector.max_duplicated_requests()
    }
}

/// Final-phase download mode.
///
/// Remaining pieces are requested redundantly from multiple peers so a
/// single slow holder cannot stall completion.
pub struct EndGameMode {
    core: SelectionCore,
}

impl EndGameMode {
    /// Creates the mode. The selector is fixed to end-game ranking.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            core: SelectionCore::new(Box::new(EndGame::new())),
        })
    }
}

impl TorrentMode for EndGameMode {
    fn request_all_peers_for_same_block(&self) -> bool {
        true
    }

    fn attach(self: Arc<Self>, torrent: Arc<dyn TorrentView>) -> Result<(), TorrentError> {
        self.core.attach(torrent)
    }

    fn detach(&self) {
        self.core.detach();
    }

    fn update(&self) {
        self.core.update();
    }

    fn ranked_pieces(&self) -> Vec<PieceIndex> {
        self.core.ranked_pieces()
    }

    fn max_duplicated_requests(&self) -> usize {
        self.core.selector.max_duplicated_requests()
    }
}
