use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::error::DownloadError;
use crate::metainfo::Metainfo;
use crate::peer::{PeerError, PeerId, PeerSession};
use crate::tracker::HttpTracker;

/// Port reported to the tracker. This client never listens for incoming
/// connections, but the announce still needs a value in the BitTorrent
/// range.
pub const DEFAULT_PORT: u16 = 6881;

// How long an idle worker waits before re-checking the queue.
const IDLE_WAIT: Duration = Duration::from_millis(200);

/// Everything a worker needs to know about one piece.
#[derive(Debug, Clone, Copy)]
struct PieceSpec {
    index: u32,
    length: u32,
    hash: [u8; 20],
}

/// Drives piece downloads for one torrent.
///
/// A `Downloader` owns the parsed metainfo and a process-stable peer ID. It
/// can discover peers via the tracker, download a single verified piece, or
/// download the whole file concurrently from every reachable peer.
///
/// # Examples
///
/// ```no_run
/// use btfetch::download::Downloader;
/// use btfetch::metainfo::Metainfo;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let data = std::fs::read("example.torrent")?;
/// let downloader = Downloader::new(Metainfo::from_bytes(&data)?);
///
/// let file = downloader.download().await?;
/// std::fs::write("example.bin", &file)?;
/// # Ok(())
/// # }
/// ```
pub struct Downloader {
    metainfo: Metainfo,
    peer_id: PeerId,
    port: u16,
}

impl Downloader {
    /// Creates a downloader with a freshly generated peer ID.
    pub fn new(metainfo: Metainfo) -> Self {
        Self {
            metainfo,
            peer_id: PeerId::generate(),
            port: DEFAULT_PORT,
        }
    }

    pub fn metainfo(&self) -> &Metainfo {
        &self.metainfo
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Asks the tracker for peers.
    pub async fn peers(&self) -> Result<Vec<SocketAddr>, DownloadError> {
        let tracker = HttpTracker::new(&self.metainfo.announce)?;
        let response = tracker
            .announce(
                &self.metainfo.info_hash,
                &self.peer_id,
                self.port,
                0,
                0,
                self.metainfo.info.length,
            )
            .await?;
        Ok(response.peers)
    }

    /// Performs a handshake with one peer and returns its peer ID.
    pub async fn handshake(&self, addr: SocketAddr) -> Result<PeerId, DownloadError> {
        let session = PeerSession::connect(
            addr,
            *self.metainfo.info_hash.as_bytes(),
            *self.peer_id.as_bytes(),
            self.metainfo.info.piece_count(),
        )
        .await?;
        Ok(session.peer_id())
    }

    /// Downloads and verifies a single piece, discovering peers first.
    pub async fn download_piece(&self, index: u32) -> Result<Bytes, DownloadError> {
        let peers = self.peers().await?;
        self.download_piece_from(&peers, index).await
    }

    /// Downloads and verifies a single piece from the given peers.
    ///
    /// Peers are tried in order until one of them delivers the piece.
    /// A handshake mismatch is fatal and ends the attempt immediately;
    /// any other peer failure moves on to the next peer.
    pub async fn download_piece_from(
        &self,
        peers: &[SocketAddr],
        index: u32,
    ) -> Result<Bytes, DownloadError> {
        let spec = self
            .piece_spec(index)
            .ok_or(DownloadError::InvalidPieceIndex(index))?;

        if peers.is_empty() {
            return Err(DownloadError::NoPeers);
        }

        for &addr in peers {
            match self.piece_from_peer(addr, spec).await {
                Ok(data) => return Ok(data),
                Err(DownloadError::Peer(err)) if err.is_handshake_mismatch() => {
                    return Err(DownloadError::Peer(err));
                }
                Err(err) => {
                    warn!(peer = %addr, piece = index, error = %err, "peer failed piece");
                }
            }
        }

        Err(DownloadError::PieceFailed(index))
    }

    /// Downloads the whole file, discovering peers first.
    pub async fn download(&self) -> Result<Bytes, DownloadError> {
        let peers = self.peers().await?;
        self.download_from(&peers).await
    }

    /// Downloads the whole file from the given peers.
    ///
    /// Spawns one worker per peer. Workers claim piece indices from a shared
    /// queue; a failed piece goes back to the queue for another worker. The
    /// download fails once every remaining peer has failed the same piece,
    /// or immediately if any peer answers the handshake for a different
    /// torrent.
    pub async fn download_from(&self, peers: &[SocketAddr]) -> Result<Bytes, DownloadError> {
        if peers.is_empty() {
            return Err(DownloadError::NoPeers);
        }

        let piece_count = self.metainfo.info.piece_count();
        let pieces: Arc<Vec<PieceSpec>> = Arc::new(
            self.metainfo
                .info
                .pieces
                .iter()
                .enumerate()
                .map(|(i, hash)| PieceSpec {
                    index: i as u32,
                    length: self.metainfo.info.piece_size(i as u32) as u32,
                    hash: *hash,
                })
                .collect(),
        );

        let pool = WorkPool::new(piece_count);
        let (tx, mut rx) = mpsc::channel::<(u32, Bytes)>(piece_count.max(1));

        let mut workers = JoinSet::new();
        for &addr in peers {
            pool.register(addr);
            workers.spawn(piece_worker(
                addr,
                *self.metainfo.info_hash.as_bytes(),
                *self.peer_id.as_bytes(),
                Arc::clone(&pieces),
                Arc::clone(&pool),
                tx.clone(),
            ));
        }
        drop(tx);

        // Disjoint writes at index * piece_length make assembly order-free.
        let mut output = vec![0u8; self.metainfo.info.length as usize];
        let piece_length = self.metainfo.info.piece_length as usize;
        let mut received = 0usize;

        while let Some((index, data)) = rx.recv().await {
            let offset = index as usize * piece_length;
            output[offset..offset + data.len()].copy_from_slice(&data);
            received += 1;
            info!(piece = index, received, total = piece_count, "piece verified");
            if received == piece_count {
                break;
            }
        }

        workers.abort_all();
        while workers.join_next().await.is_some() {}

        if received == piece_count {
            Ok(Bytes::from(output))
        } else if let Some(err) = pool.take_fatal() {
            Err(DownloadError::Peer(err))
        } else if let Some(index) = pool.abandoned() {
            Err(DownloadError::PieceFailed(index))
        } else {
            Err(DownloadError::Incomplete(piece_count - received))
        }
    }

    fn piece_spec(&self, index: u32) -> Option<PieceSpec> {
        let hash = *self.metainfo.info.piece_hash(index)?;
        Some(PieceSpec {
            index,
            length: self.metainfo.info.piece_size(index) as u32,
            hash,
        })
    }

    async fn piece_from_peer(
        &self,
        addr: SocketAddr,
        spec: PieceSpec,
    ) -> Result<Bytes, DownloadError> {
        let mut session = PeerSession::connect(
            addr,
            *self.metainfo.info_hash.as_bytes(),
            *self.peer_id.as_bytes(),
            self.metainfo.info.piece_count(),
        )
        .await?;

        session.prepare().await?;

        if !session.has_piece(spec.index) {
            return Err(DownloadError::PieceFailed(spec.index));
        }

        let data = session
            .download_piece(spec.index, spec.length, &spec.hash)
            .await?;
        Ok(data)
    }
}

// Shared bookkeeping between download workers.
//
// The queue holds unclaimed piece indices. `failures` records which peers
// have failed which piece; once every registered-and-still-active peer has
// failed a piece, it is abandoned and the download as a whole fails. A
// fatal error (handshake mismatch) stops every worker.
struct WorkPool {
    queue: Mutex<VecDeque<u32>>,
    failures: Mutex<HashMap<u32, HashSet<SocketAddr>>>,
    active: Mutex<HashSet<SocketAddr>>,
    remaining: AtomicUsize,
    abandoned: Mutex<Option<u32>>,
    fatal: Mutex<Option<PeerError>>,
}

impl WorkPool {
    fn new(piece_count: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new((0..piece_count as u32).collect()),
            failures: Mutex::new(HashMap::new()),
            active: Mutex::new(HashSet::new()),
            remaining: AtomicUsize::new(piece_count),
            abandoned: Mutex::new(None),
            fatal: Mutex::new(None),
        })
    }

    fn register(&self, addr: SocketAddr) {
        self.active.lock().insert(addr);
    }

    fn deregister(&self, addr: SocketAddr) {
        self.active.lock().remove(&addr);
    }

    fn claim(&self) -> Option<u32> {
        self.queue.lock().pop_front()
    }

    fn release(&self, index: u32) {
        self.queue.lock().push_back(index);
    }

    fn mark_done(&self) {
        self.remaining.fetch_sub(1, Ordering::AcqRel);
    }

    // True once there is nothing left for a worker to do: every piece is
    // verified, a piece was abandoned, or a fatal error was recorded.
    fn should_stop(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
            || self.abandoned.lock().is_some()
            || self.fatal.lock().is_some()
    }

    // Records that `addr` failed `index`. Returns true if every active
    // worker has now failed this piece, in which case the caller abandons it.
    fn record_failure(&self, index: u32, addr: SocketAddr) -> bool {
        let mut failures = self.failures.lock();
        failures.entry(index).or_default().insert(addr);
        let failed = &failures[&index];
        self.active.lock().iter().all(|a| failed.contains(a))
    }

    fn abandon(&self, index: u32) {
        self.abandoned.lock().get_or_insert(index);
    }

    fn abandoned(&self) -> Option<u32> {
        *self.abandoned.lock()
    }

    fn record_fatal(&self, err: PeerError) {
        self.fatal.lock().get_or_insert(err);
    }

    fn take_fatal(&self) -> Option<PeerError> {
        self.fatal.lock().take()
    }
}

// One worker per peer: owns the session and keeps claiming pieces until the
// download finishes, the connection dies, or a piece is abandoned. A
// handshake mismatch is recorded as fatal and stops the whole pool.
async fn piece_worker(
    addr: SocketAddr,
    info_hash: [u8; 20],
    our_peer_id: [u8; 20],
    pieces: Arc<Vec<PieceSpec>>,
    pool: Arc<WorkPool>,
    tx: mpsc::Sender<(u32, Bytes)>,
) {
    if let Err(err) = worker_loop(addr, info_hash, our_peer_id, &pieces, &pool, &tx).await {
        warn!(peer = %addr, error = %err, "worker stopped");
        if err.is_handshake_mismatch() {
            pool.record_fatal(err);
        }
    }
    pool.deregister(addr);
}

async fn worker_loop(
    addr: SocketAddr,
    info_hash: [u8; 20],
    our_peer_id: [u8; 20],
    pieces: &[PieceSpec],
    pool: &WorkPool,
    tx: &mpsc::Sender<(u32, Bytes)>,
) -> Result<(), PeerError> {
    let mut session = PeerSession::connect(addr, info_hash, our_peer_id, pieces.len()).await?;
    session.prepare().await?;
    debug!(peer = %addr, "worker ready");

    loop {
        if pool.should_stop() {
            return Ok(());
        }

        let Some(index) = pool.claim() else {
            // Other workers may still fail and re-queue pieces.
            sleep(IDLE_WAIT).await;
            continue;
        };
        let spec = pieces[index as usize];

        if !session.has_piece(index) {
            pool.release(index);
            if pool.record_failure(index, addr) {
                pool.abandon(index);
                return Ok(());
            }
            sleep(IDLE_WAIT).await;
            continue;
        }

        match session.download_piece(index, spec.length, &spec.hash).await {
            Ok(data) => {
                pool.mark_done();
                debug!(peer = %addr, piece = index, "piece downloaded");
                if tx.send((index, data)).await.is_err() {
                    return Ok(());
                }
            }
            Err(err) => {
                // Any session error ends this worker; the piece goes back
                // to the queue for someone else.
                pool.release(index);
                if pool.record_failure(index, addr) {
                    pool.abandon(index);
                }
                return Err(err);
            }
        }
    }
}
