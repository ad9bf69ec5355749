//! Peer wire protocol (BEP-3)
//!
//! This module implements the BitTorrent peer wire protocol: the 68-byte
//! handshake, length-prefixed message framing, per-connection choke and
//! interest state, and pipelined block download with SHA1 verification.

mod bitfield;
mod error;
mod message;
mod peer_id;
mod piece;
mod session;
mod transport;

pub use bitfield::Bitfield;
pub use error::PeerError;
pub use message::{Handshake, Message, MessageId};
pub use peer_id::PeerId;
pub use piece::{block_count, block_length, BlockRequest, PieceDownload, BLOCK_SIZE};
pub use session::{PeerSession, SessionState, REQUEST_PIPELINE};
pub use transport::PeerTransport;
