use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("tracker error: {0}")]
    Tracker(#[from] crate::tracker::TrackerError),

    #[error("peer error: {0}")]
    Peer(#[from] crate::peer::PeerError),

    #[error("tracker returned no peers")]
    NoPeers,

    #[error("piece index {0} out of range")]
    InvalidPieceIndex(u32),

    #[error("piece {0} could not be retrieved from any peer")]
    PieceFailed(u32),

    #[error("download ended with {0} pieces missing")]
    Incomplete(usize),
}
