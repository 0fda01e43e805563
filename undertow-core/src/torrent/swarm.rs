//! Collaborator traits for the torrent and peer surfaces.
//!
//! The orchestration core never owns peer connections or piece tables.
//! It queries them through these traits and receives peer state changes
//! as messages on a mode-owned channel.

use std::net::SocketAddr;
use std::sync::Arc;

use super::piece::TorrentPiece;
use super::{InfoHash, PieceIndex};

/// Read-only query surface over a live torrent.
///
/// Implementations return snapshots; the core holds no locks into the
/// torrent's own state while ranking pieces.
pub trait TorrentView: Send + Sync {
    /// Identity of this torrent.
    fn info_hash(&self) -> InfoHash;

    /// Total number of pieces.
    fn piece_count(&self) -> u32;

    /// Snapshot of a single piece, or `None` if out of range.
    fn piece(&self, index: PieceIndex) -> Option<TorrentPiece>;

    /// Snapshot of every piece's metadata.
    fn pieces(&self) -> Vec<TorrentPiece>;

    /// Connected peers whose reported bitfield lacks the given piece.
    fn peers_without_piece(&self, index: PieceIndex) -> Vec<Arc<dyn SwarmPeer>>;
}

/// Non-owning handle to a peer connection.
///
/// Peers are owned by the connection subsystem; the core keeps handles only
/// for the duration of a super-seed assignment. Identity is the socket
/// address.
pub trait SwarmPeer: Send + Sync {
    /// Socket address, used as the peer identity.
    fn address(&self) -> SocketAddr;

    /// Whether the underlying connection is still alive.
    fn is_connected(&self) -> bool;

    /// Whether the peer's reported bitfield contains the piece.
    fn has_piece(&self, index: PieceIndex) -> bool;

    /// Synthesizes an outbound have-piece message to this peer only.
    ///
    /// Used by super-seeding so the peer believes it discovered the piece
    /// through a normal announcement and requests it.
    fn announce_piece(&self, index: PieceIndex);
}

/// Peer state change delivered to a mode's event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEvent {
    /// Peer the change originated from
    pub peer: SocketAddr,
    /// What changed
    pub change: PeerChange,
}

/// The kinds of peer state change the mode reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerChange {
    /// Connection was lost or closed
    Disconnected,
    /// A full bitfield message was processed
    BitfieldReceived,
    /// The peer announced possession of one piece
    HavePiece(PieceIndex),
}

impl PeerEvent {
    /// Creates an event for the given peer.
    pub fn new(peer: SocketAddr, change: PeerChange) -> Self {
        Self { peer, change }
    }
}
