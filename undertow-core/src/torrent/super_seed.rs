//! Super-seeding mode (BEP 16).
//!
//! Feeds pieces to peers one at a time and only offers a peer another
//! piece after observing, through its bitfield or have messages, that it
//! redistributed the previous one. This stops a single fast peer from
//! being told about every piece and hoarding the seed's upload capacity.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::mode::TorrentMode;
use super::swarm::{PeerEvent, SwarmPeer, TorrentView};
use super::{PieceIndex, TorrentError};

/// Rank penalty per peer already being fed a piece.
///
/// A piece with several assignees is deprioritized so distinct pieces
/// spread across the swarm instead of piling onto one.
const ASSIGNED_PEER_PENALTY: f64 = 0.1;

/// Super-seeding mode state machine.
///
/// One instance serves one torrent at a time. `update()` may be invoked
/// concurrently from the scheduler tick and from peer-event delivery;
/// overlapping calls collapse to a single in-flight recomputation via a
/// compare-and-swap guard, trading completeness of every trigger for
/// freshness.
pub struct SuperSeedMode {
    state: Mutex<Option<SuperSeedState>>,
    updating: AtomicBool,
}

struct SuperSeedState {
    torrent: Arc<dyn TorrentView>,
    /// Peer address -> the single piece that peer is being fed.
    assigned: HashMap<SocketAddr, Assignment>,
    /// Per-piece count of currently-assigned peers; kept transactionally
    /// consistent with `assigned` under the state lock.
    piece_peer_counts: Vec<u32>,
    events: mpsc::UnboundedSender<PeerEvent>,
    evaluator: JoinHandle<()>,
}

struct Assignment {
    peer: Arc<dyn SwarmPeer>,
    piece: PieceIndex,
}

impl SuperSeedMode {
    /// Creates a detached super-seed mode.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(None),
            updating: AtomicBool::new(false),
        })
    }

    /// Sender for peer state changes while attached.
    ///
    /// The peer connection layer clones this and delivers disconnect,
    /// bitfield and have-piece notifications; each delivery re-triggers an
    /// evaluation. Returns `None` when detached.
    pub fn peer_events(&self) -> Option<mpsc::UnboundedSender<PeerEvent>> {
        self.state.lock().as_ref().map(|state| state.events.clone())
    }

    /// Snapshot of current peer-to-piece assignments.
    pub fn assignments(&self) -> HashMap<SocketAddr, PieceIndex> {
        self.state
            .lock()
            .as_ref()
            .map(|state| {
                state
                    .assigned
                    .iter()
                    .map(|(address, assignment)| (*address, assignment.piece))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of per-piece assigned-peer counts.
    pub fn piece_peer_counts(&self) -> Vec<u32> {
        self.state
            .lock()
            .as_ref()
            .map(|state| state.piece_peer_counts.clone())
            .unwrap_or_default()
    }

    fn run_update(&self) {
        let mut guard = self.state.lock();
        let Some(state) = guard.as_mut() else {
            return;
        };

        // Release peers that vanished or proved redistribution: once the
        // assigned piece shows up in the peer's own bitfield it is ready
        // for the next offer.
        let released: Vec<SocketAddr> = state
            .assigned
            .iter()
            .filter(|(_, assignment)| {
                !assignment.peer.is_connected() || assignment.peer.has_piece(assignment.piece)
            })
            .map(|(address, _)| *address)
            .collect();
        for address in released {
            if let Some(assignment) = state.assigned.remove(&address) {
                let slot = assignment.piece.as_u32() as usize;
                state.piece_peer_counts[slot] = state.piece_peer_counts[slot].saturating_sub(1);
                tracing::debug!(
                    peer = %address,
                    piece = %assignment.piece,
                    "super-seed assignment released"
                );
            }
        }

        // Rank verified pieces, rarest first, discounting pieces already
        // being fed to peers.
        let pieces = state.torrent.pieces();
        let mut candidates: Vec<(PieceIndex, f64)> = pieces
            .iter()
            .filter(|piece| piece.verified)
            .map(|piece| {
                let assignees = state.piece_peer_counts[piece.index.as_u32() as usize];
                (piece.index, piece.rarity - assignees as f64 * ASSIGNED_PEER_PENALTY)
            })
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (piece, _) in candidates {
            let mut eligible: Vec<Arc<dyn SwarmPeer>> = state
                .torrent
                .peers_without_piece(piece)
                .into_iter()
                .filter(|peer| {
                    peer.is_connected() && !state.assigned.contains_key(&peer.address())
                })
                .collect();
            if eligible.is_empty() {
                continue;
            }
            let chosen = eligible.swap_remove(rand::random_range(0..eligible.len()));
            chosen.announce_piece(piece);
            state.piece_peer_counts[piece.as_u32() as usize] += 1;
            tracing::debug!(peer = %chosen.address(), %piece, "super-seed piece offered");
            state.assigned.insert(
                chosen.address(),
                Assignment {
                    peer: chosen,
                    piece,
                },
            );
        }
    }
}

impl TorrentMode for SuperSeedMode {
    fn masks_bitfield(&self) -> bool {
        true
    }

    fn attach(self: Arc<Self>, torrent: Arc<dyn TorrentView>) -> Result<(), TorrentError> {
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

        let (events, mut event_rx) = mpsc::unbounded_channel::<PeerEvent>();
        let mode = Arc::downgrade(&self);
        let evaluator = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let Some(mode) = mode.upgrade() else {
                    break;
                };
                tracing::trace!(peer = %event.peer, change = ?event.change, "peer state change");
                mode.update();
            }
        });

        tracing::debug!(torrent = %torrent.info_hash(), "super-seed attached");
        *state = Some(SuperSeedState {
            piece_peer_counts: vec![0; torrent.piece_count() as usize],
            torrent,
            assigned: HashMap::new(),
            events,
            evaluator,
        });
        Ok(())
    }

    fn detach(&self) {
        let state = self.state.lock().take();
        if let Some(state) = state {
            state.evaluator.abort();
            tracing::debug!(torrent = %state.torrent.info_hash(), "super-seed detached");
        }
    }

    fn update(&self) {
        // Ticks and peer events can arrive faster than an evaluation
        // completes; overlapping calls are dropped, not queued.
        if self
            .updating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.run_update();
        self.updating.store(false, Ordering::Release);
    }

    fn ranked_pieces(&self) -> Vec<PieceIndex> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Weak;
    use std::time::Duration;

    use super::super::piece::TorrentPiece;
    use super::super::swarm::PeerChange;
    use super::super::InfoHash;
    use super::*;

    struct MockPeer {
        address: SocketAddr,
        connected: AtomicBool,
        bitfield: Mutex<HashSet<u32>>,
        announced: Mutex<Vec<PieceIndex>>,
    }

    impl MockPeer {
        fn new(port: u16) -> Arc<Self> {
            Arc::new(Self {
                address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
                connected: AtomicBool::new(true),
                bitfield: Mutex::new(HashSet::new()),
                announced: Mutex::new(Vec::new()),
            })
        }

        fn disconnect(&self) {
            self.connected.store(false, Ordering::Release);
        }

        fn receive_piece(&self, index: u32) {
            self.bitfield.lock().insert(index);
        }

        fn announced(&self) -> Vec<PieceIndex> {
            self.announced.lock().clone()
        }
    }

    impl SwarmPeer for MockPeer {
        fn address(&self) -> SocketAddr {
            self.address
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::Acquire)
        }

        fn has_piece(&self, index: PieceIndex) -> bool {
            self.bitfield.lock().contains(&index.as_u32())
        }

        fn announce_piece(&self, index: PieceIndex) {
            self.announced.lock().push(index);
        }
    }

    struct MockSwarm {
        info_hash: InfoHash,
        pieces: Mutex<Vec<TorrentPiece>>,
        peers: Mutex<Vec<Arc<MockPeer>>>,
        // Lets a test re-enter update() from inside pieces().
        reentrant: Mutex<Option<Weak<SuperSeedMode>>>,
        nested_attempts: AtomicUsize,
    }

    impl MockSwarm {
        fn new(id: u8, pieces: Vec<TorrentPiece>, peers: Vec<Arc<MockPeer>>) -> Arc<Self> {
            Arc::new(Self {
                info_hash: InfoHash::new([id; 20]),
                pieces: Mutex::new(pieces),
                peers: Mutex::new(peers),
                reentrant: Mutex::new(None),
                nested_attempts: AtomicUsize::new(0),
            })
        }
    }

    impl TorrentView for MockSwarm {
        fn info_hash(&self) -> InfoHash {
            self.info_hash
        }

        fn piece_count(&self) -> u32 {
            self.pieces.lock().len() as u32
        }

        fn piece(&self, index: PieceIndex) -> Option<TorrentPiece> {
            self.pieces.lock().get(index.as_u32() as usize).cloned()
        }

        fn pieces(&self) -> Vec<TorrentPiece> {
            if let Some(mode) = self.reentrant.lock().as_ref().and_then(Weak::upgrade) {
                self.nested_attempts.fetch_add(1, Ordering::AcqRel);
                // Must return immediately: an update is already running.
                mode.update();
            }
            self.pieces.lock().clone()
        }

        fn peers_without_piece(&self, index: PieceIndex) -> Vec<Arc<dyn SwarmPeer>> {
            self.peers
                .lock()
                .iter()
                .filter(|peer| peer.is_connected() && !peer.has_piece(index))
                .map(|peer| Arc::clone(peer) as Arc<dyn SwarmPeer>)
                .collect()
        }
    }

    fn seeded_pieces(count: u32, rarities: &[f64]) -> Vec<TorrentPiece> {
        (0..count)
            .map(|i| {
                TorrentPiece::new(PieceIndex::new(i))
                    .with_rarity(rarities[i as usize])
                    .verified()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_first_update_spreads_distinct_pieces() {
        let peers = vec![MockPeer::new(1001), MockPeer::new(1002)];
        let swarm = MockSwarm::new(
            1,
            seeded_pieces(3, &[2.0, 2.0, 2.0]),
            peers.clone(),
        );
        let mode = SuperSeedMode::new();
        mode.clone().attach(swarm).unwrap();

        mode.update();

        let assignments = mode.assignments();
        assert_eq!(assignments.len(), 2);
        let counts = mode.piece_peer_counts();
        assert_eq!(counts.iter().sum::<u32>(), 2);
        assert_eq!(counts.iter().filter(|&&c| c == 1).count(), 2);
        assert_eq!(counts.iter().filter(|&&c| c == 0).count(), 1);
        for peer in &peers {
            assert_eq!(peer.announced().len(), 1);
        }
        mode.detach();
    }

    #[tokio::test]
    async fn test_peer_never_assigned_two_pieces() {
        let peer = MockPeer::new(1003);
        let swarm = MockSwarm::new(
            1,
            seeded_pieces(4, &[5.0, 4.0, 3.0, 2.0]),
            vec![peer.clone()],
        );
        let mode = SuperSeedMode::new();
        mode.clone().attach(swarm).unwrap();

        mode.update();
        mode.update();

        assert_eq!(mode.assignments().len(), 1);
        assert_eq!(peer.announced().len(), 1);
        assert_eq!(mode.piece_peer_counts().iter().sum::<u32>(), 1);
        mode.detach();
    }

    #[tokio::test]
    async fn test_redistribution_unlocks_next_piece() {
        let peer = MockPeer::new(1004);
        let swarm = MockSwarm::new(1, seeded_pieces(2, &[3.0, 1.0]), vec![peer.clone()]);
        let mode = SuperSeedMode::new();
        mode.clone().attach(swarm).unwrap();

        mode.update();
        let first = mode.assignments()[&peer.address];

        // Peer proves it redistributed: its bitfield now has the piece.
        peer.receive_piece(first.as_u32());
        mode.update();

        let second = mode.assignments()[&peer.address];
        assert_ne!(first, second);
        assert_eq!(peer.announced().len(), 2);
        // Count for the redistributed piece returned to zero.
        assert_eq!(mode.piece_peer_counts()[first.as_u32() as usize], 0);
        mode.detach();
    }

    #[tokio::test]
    async fn test_disconnected_peer_released() {
        let peer = MockPeer::new(1005);
        let swarm = MockSwarm::new(1, seeded_pieces(1, &[3.0]), vec![peer.clone()]);
        let mode = SuperSeedMode::new();
        mode.clone().attach(swarm).unwrap();

        mode.update();
        assert_eq!(mode.assignments().len(), 1);

        peer.disconnect();
        mode.update();

        assert!(mode.assignments().is_empty());
        assert_eq!(mode.piece_peer_counts(), vec![0]);
        mode.detach();
    }

    #[tokio::test]
    async fn test_never_offers_piece_the_peer_already_has() {
        let peer = MockPeer::new(1006);
        peer.receive_piece(0);
        peer.receive_piece(1);
        let swarm = MockSwarm::new(1, seeded_pieces(3, &[9.0, 8.0, 1.0]), vec![peer.clone()]);
        let mode = SuperSeedMode::new();
        mode.clone().attach(swarm).unwrap();

        mode.update();

        assert_eq!(mode.assignments()[&peer.address], PieceIndex::new(2));
        assert_eq!(peer.announced(), vec![PieceIndex::new(2)]);
        mode.detach();
    }

    #[tokio::test]
    async fn test_unverified_pieces_never_offered() {
        let peer = MockPeer::new(1007);
        let pieces = vec![
            TorrentPiece::new(PieceIndex::new(0)).with_rarity(9.0),
            TorrentPiece::new(PieceIndex::new(1)).with_rarity(1.0).verified(),
        ];
        let swarm = MockSwarm::new(1, pieces, vec![peer.clone()]);
        let mode = SuperSeedMode::new();
        mode.clone().attach(swarm).unwrap();

        mode.update();

        assert_eq!(mode.assignments()[&peer.address], PieceIndex::new(1));
        mode.detach();
    }

    #[tokio::test]
    async fn test_assignment_penalty_spreads_pieces() {
        // Piece 0 is rarest, but once assigned its effective rank drops
        // below piece 1, so a peer arriving later gets a different piece.
        let first_peer = MockPeer::new(1008);
        let swarm = MockSwarm::new(1, seeded_pieces(2, &[1.05, 1.0]), vec![first_peer.clone()]);
        let mode = SuperSeedMode::new();
        mode.clone().attach(swarm.clone()).unwrap();

        mode.update();
        assert_eq!(mode.assignments()[&first_peer.address], PieceIndex::new(0));

        let late_peer = MockPeer::new(1009);
        swarm.peers.lock().push(late_peer.clone());
        mode.update();

        assert_eq!(mode.assignments()[&late_peer.address], PieceIndex::new(1));
        assert_eq!(mode.piece_peer_counts(), vec![1, 1]);
        mode.detach();
    }

    #[tokio::test]
    async fn test_reentrant_update_collapses_to_noop() {
        let peer = MockPeer::new(1010);
        let swarm = MockSwarm::new(1, seeded_pieces(2, &[2.0, 1.0]), vec![peer.clone()]);
        let mode = SuperSeedMode::new();
        mode.clone().attach(swarm.clone()).unwrap();
        *swarm.reentrant.lock() = Some(Arc::downgrade(&mode));

        // Without the in-flight guard the nested call would deadlock on
        // the state lock.
        mode.update();

        assert!(swarm.nested_attempts.load(Ordering::Acquire) >= 1);
        assert_eq!(mode.assignments().len(), 1);
        assert_eq!(peer.announced().len(), 1);
        mode.detach();
    }

    #[tokio::test]
    async fn test_attach_second_torrent_fails() {
        let mode = SuperSeedMode::new();
        mode.clone()
            .attach(MockSwarm::new(1, seeded_pieces(1, &[1.0]), vec![]))
            .unwrap();
        let result = mode
            .clone()
            .attach(MockSwarm::new(2, seeded_pieces(1, &[1.0]), vec![]));
        assert!(matches!(result, Err(TorrentError::ModeAlreadyBound { .. })));
        mode.detach();
    }

    #[tokio::test]
    async fn test_detach_clears_state() {
        let peer = MockPeer::new(1011);
        let swarm = MockSwarm::new(1, seeded_pieces(1, &[1.0]), vec![peer]);
        let mode = SuperSeedMode::new();
        mode.clone().attach(swarm).unwrap();
        mode.update();
        assert!(!mode.assignments().is_empty());

        mode.detach();

        assert!(mode.assignments().is_empty());
        assert!(mode.piece_peer_counts().is_empty());
        assert!(mode.peer_events().is_none());
        // Detached mode accepts ticks without effect.
        mode.update();
    }

    #[tokio::test]
    async fn test_peer_event_triggers_evaluation() {
        let peer = MockPeer::new(1012);
        let swarm = MockSwarm::new(1, seeded_pieces(1, &[1.0]), vec![]);
        let mode = SuperSeedMode::new();
        mode.clone().attach(swarm.clone()).unwrap();

        mode.update();
        assert!(mode.assignments().is_empty());

        // Peer appears and its bitfield arrives; the event should drive a
        // fresh evaluation without any scheduler tick.
        swarm.peers.lock().push(peer.clone());
        let events = mode.peer_events().unwrap();
        events
            .send(PeerEvent::new(peer.address, PeerChange::BitfieldReceived))
            .unwrap();

        let mut assigned = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if !mode.assignments().is_empty() {
                assigned = true;
                break;
            }
        }
        assert!(assigned, "peer event did not trigger an evaluation");
        mode.detach();
    }

    #[tokio::test]
    async fn test_super_seed_masks_bitfield() {
        let mode = SuperSeedMode::new();
        assert!(mode.masks_bitfield());
        assert!(!mode.request_all_peers_for_same_block());
        assert!(mode.ranked_pieces().is_empty());
    }
}
