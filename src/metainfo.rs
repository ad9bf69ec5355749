//! Torrent metainfo handling (BEP-3)
//!
//! This module parses single-file `.torrent` files and computes the
//! info hash that identifies a torrent swarm-wide.

mod error;
mod info_hash;
mod torrent;

pub use error::MetainfoError;
pub use info_hash::InfoHash;
pub use torrent::{Info, Metainfo};

#[cfg(test)]
mod tests;
