use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use super::bitfield::Bitfield;
use super::error::PeerError;
use super::message::{Handshake, Message};
use super::peer_id::PeerId;
use super::piece::PieceDownload;
use super::transport::PeerTransport;

/// Maximum concurrent in-flight block requests per peer.
pub const REQUEST_PIPELINE: usize = 5;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake exchanged, bitfield not yet seen.
    Handshaked,
    /// Bitfield (or first post-handshake message) processed; we are choked.
    Ready,
    /// The peer unchoked us; requests may be sent.
    Unchoked,
}

/// A stateful connection to one peer.
///
/// A session lives for the duration of one TCP connection. It performs the
/// handshake on connect, tracks choke/interest state and the peer's
/// bitfield, and downloads pieces with pipelined block requests.
///
/// # Examples
///
/// ```no_run
/// use btfetch::peer::{PeerId, PeerSession};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let our_id = PeerId::generate();
/// let mut session = PeerSession::connect(
///     "127.0.0.1:6881".parse()?,
///     [0u8; 20], // info hash
///     *our_id.as_bytes(),
///     100, // piece count
/// )
/// .await?;
///
/// println!("connected to {}", session.peer_id());
/// # Ok(())
/// # }
/// ```
pub struct PeerSession {
    addr: SocketAddr,
    peer_id: PeerId,
    state: SessionState,
    choked: bool,
    interested: bool,
    bitfield: Option<Bitfield>,
    piece_count: usize,
    transport: PeerTransport,
}

impl PeerSession {
    /// Opens a TCP connection and performs the handshake exchange.
    ///
    /// # Errors
    ///
    /// Fails with [`PeerError::InvalidHandshake`] if the peer's handshake is
    /// malformed, and [`PeerError::InfoHashMismatch`] if it is serving a
    /// different torrent.
    pub async fn connect(
        addr: SocketAddr,
        info_hash: [u8; 20],
        our_peer_id: [u8; 20],
        piece_count: usize,
    ) -> Result<Self, PeerError> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| PeerError::Timeout)??;
        let mut transport = PeerTransport::new(stream);

        let handshake = Handshake::new(info_hash, our_peer_id);
        transport.send_handshake(&handshake).await?;

        let their_handshake = transport.receive_handshake().await?;

        if their_handshake.info_hash != info_hash {
            return Err(PeerError::InfoHashMismatch);
        }

        debug!(peer = %addr, "handshake complete");

        Ok(Self {
            addr,
            peer_id: PeerId(their_handshake.peer_id),
            state: SessionState::Handshaked,
            choked: true,
            interested: false,
            bitfield: None,
            piece_count,
            transport,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The remote peer's ID, learned during the handshake.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the peer's bitfield, if it has announced one.
    pub fn bitfield(&self) -> Option<&Bitfield> {
        self.bitfield.as_ref()
    }

    /// Returns true if the peer claims to have the given piece.
    ///
    /// A peer that never announced a bitfield is assumed to have nothing
    /// until `have` messages say otherwise.
    pub fn has_piece(&self, index: u32) -> bool {
        self.bitfield
            .as_ref()
            .is_some_and(|bf| bf.has_piece(index as usize))
    }

    /// Expresses interest and waits until the peer unchokes us.
    ///
    /// Bitfield and `have` messages received while waiting are recorded.
    /// No-op if we are already unchoked.
    pub async fn prepare(&mut self) -> Result<(), PeerError> {
        if !self.interested {
            self.transport.send_message(&Message::Interested).await?;
            self.interested = true;
        }

        while self.choked {
            let message = self.transport.receive_message().await?;
            self.handle_control(message);
        }

        Ok(())
    }

    /// Downloads and verifies one piece.
    ///
    /// Issues up to [`REQUEST_PIPELINE`] concurrent block requests. Replies
    /// are matched by offset and may arrive in any order. If the peer chokes
    /// us mid-piece, unanswered requests are re-queued and reissued after
    /// the next unchoke.
    ///
    /// # Errors
    ///
    /// [`PeerError::HashMismatch`] if the assembled piece does not match
    /// `expected_hash`; [`PeerError::Protocol`] on impossible offsets or
    /// block sizes; [`PeerError::Timeout`] if a request goes unanswered for
    /// too long.
    pub async fn download_piece(
        &mut self,
        index: u32,
        length: u32,
        expected_hash: &[u8; 20],
    ) -> Result<Bytes, PeerError> {
        if self.choked {
            self.prepare().await?;
        }

        let mut piece = PieceDownload::new(index, length);

        while !piece.is_complete() {
            if piece.has_stale_request() {
                return Err(PeerError::Timeout);
            }

            while !self.choked && piece.in_flight() < REQUEST_PIPELINE {
                let Some(request) = piece.next_request() else {
                    break;
                };
                trace!(
                    piece = request.index,
                    begin = request.begin,
                    length = request.length,
                    "requesting block"
                );
                self.transport
                    .send_message(&Message::Request {
                        index: request.index,
                        begin: request.begin,
                        length: request.length,
                    })
                    .await?;
            }

            match self.transport.receive_message().await? {
                Message::Piece {
                    index: got,
                    begin,
                    data,
                } => {
                    if got != index {
                        return Err(PeerError::Protocol(format!(
                            "piece message for {} while downloading {}",
                            got, index
                        )));
                    }
                    piece.receive(begin, data)?;
                }
                Message::Choke => {
                    debug!(peer = %self.addr, "choked mid-piece, re-queueing requests");
                    self.choked = true;
                    self.state = SessionState::Ready;
                    piece.requeue_pending();
                }
                message => self.handle_control(message),
            }
        }

        piece.into_verified(expected_hash)
    }

    // Updates connection state from messages that are not piece data.
    fn handle_control(&mut self, message: Message) {
        match message {
            Message::Choke => {
                self.choked = true;
                self.state = SessionState::Ready;
            }
            Message::Unchoke => {
                self.choked = false;
                self.state = SessionState::Unchoked;
            }
            Message::Bitfield(bits) => {
                debug!(peer = %self.addr, "received bitfield");
                self.bitfield = Some(Bitfield::from_bytes(bits, self.piece_count));
                if self.state == SessionState::Handshaked {
                    self.state = SessionState::Ready;
                }
            }
            Message::Have { piece } => {
                self.bitfield
                    .get_or_insert_with(|| Bitfield::new(self.piece_count))
                    .set_piece(piece as usize);
            }
            Message::KeepAlive => {}
            // We never upload, so the peer's interest and requests are noise.
            Message::Interested
            | Message::NotInterested
            | Message::Request { .. }
            | Message::Cancel { .. }
            | Message::Piece { .. } => {}
        }
    }
}
