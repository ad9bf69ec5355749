//! btfetch - a minimal BitTorrent client
//!
//! This library implements enough of the BitTorrent protocol to download a
//! single-file torrent: it parses metainfo files, discovers peers through an
//! HTTP tracker, and fetches pieces concurrently from multiple peers with
//! SHA1 verification of every piece.
//!
//! # Modules
//!
//! - [`bencode`] - Bencode encoding/decoding (BEP-3)
//! - [`metainfo`] - Torrent file parsing and info hashes
//! - [`tracker`] - HTTP tracker announces
//! - [`peer`] - Peer wire protocol: handshake, framing, piece transfer
//! - [`download`] - Single-piece and whole-file download orchestration

pub mod bencode;
pub mod download;
pub mod metainfo;
pub mod peer;
pub mod tracker;

pub use bencode::{decode, encode, BencodeError, Value};
pub use download::{DownloadError, Downloader};
pub use metainfo::{Info, InfoHash, Metainfo, MetainfoError};
pub use peer::{
    Bitfield, Handshake, Message, MessageId, PeerError, PeerId, PeerSession, PeerTransport,
};
pub use tracker::{AnnounceResponse, HttpTracker, TrackerError};
