use thiserror::Error;

/// Errors that can occur during peer communication.
///
/// I/O failures, protocol violations, and hash mismatches are scoped to one
/// connection: the caller recovers by closing the session and retrying the
/// piece on another peer. Handshake failures are not — a peer answering for
/// the wrong torrent invalidates the whole peer list, so they surface to
/// the user instead (see [`PeerError::is_handshake_mismatch`]).
#[derive(Debug, Error)]
pub enum PeerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent an invalid handshake.
    #[error("invalid handshake")]
    InvalidHandshake,

    /// The peer's info hash doesn't match ours.
    #[error("info hash mismatch")]
    InfoHashMismatch,

    /// Received a malformed protocol message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Received an unknown message ID.
    #[error("invalid message id: {0}")]
    InvalidMessageId(u8),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation timed out.
    #[error("timeout")]
    Timeout,

    /// Protocol violation by the peer.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A downloaded piece failed SHA1 verification.
    #[error("piece {0} failed hash verification")]
    HashMismatch(u32),
}

impl PeerError {
    /// Returns true for handshake failures: the peer speaks a different
    /// protocol or serves a different torrent. Retrying the piece on
    /// another peer does not recover these; the download fails instead.
    pub fn is_handshake_mismatch(&self) -> bool {
        matches!(
            self,
            PeerError::InvalidHandshake | PeerError::InfoHashMismatch
        )
    }
}
