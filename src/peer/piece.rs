//! Block bookkeeping for a piece under download.
//!
//! A piece is transferred as 16KB blocks which may arrive in any order.
//! [`PieceDownload`] tracks which blocks are requestable, in flight, and
//! received, and assembles and verifies the piece once all blocks are in.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use bytes::Bytes;
use sha1::{Digest, Sha1};

use super::error::PeerError;

/// Standard block size (16KB).
pub const BLOCK_SIZE: u32 = 16384;

/// How long an in-flight block request may go unanswered before the peer is
/// considered failed.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A request for a specific block of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    /// The piece index.
    pub index: u32,
    /// Byte offset within the piece.
    pub begin: u32,
    /// Length of the block in bytes.
    pub length: u32,
}

/// Computes the number of blocks in a piece of the given length.
pub fn block_count(piece_length: u32) -> u32 {
    piece_length.div_ceil(BLOCK_SIZE)
}

/// Computes the length of the block starting at `begin` within a piece.
///
/// Every block is `BLOCK_SIZE` bytes except possibly the last one.
pub fn block_length(piece_length: u32, begin: u32) -> u32 {
    BLOCK_SIZE.min(piece_length.saturating_sub(begin))
}

/// State for one piece being downloaded from a peer.
///
/// # Examples
///
/// ```
/// use btfetch::peer::PieceDownload;
///
/// let mut piece = PieceDownload::new(0, 40000);
/// let first = piece.next_request().unwrap();
/// assert_eq!((first.begin, first.length), (0, 16384));
/// ```
#[derive(Debug)]
pub struct PieceDownload {
    index: u32,
    length: u32,
    to_request: VecDeque<u32>,
    pending: HashMap<u32, Instant>,
    blocks: HashMap<u32, Bytes>,
}

impl PieceDownload {
    /// Starts tracking a piece of `length` bytes at `index`.
    pub fn new(index: u32, length: u32) -> Self {
        let to_request = (0..block_count(length)).map(|i| i * BLOCK_SIZE).collect();
        Self {
            index,
            length,
            to_request,
            pending: HashMap::new(),
            blocks: HashMap::new(),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// Number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Takes the next block to request, marking it in flight.
    ///
    /// Returns `None` once every remaining block is in flight or received.
    pub fn next_request(&mut self) -> Option<BlockRequest> {
        let begin = self.to_request.pop_front()?;
        self.pending.insert(begin, Instant::now());
        Some(BlockRequest {
            index: self.index,
            begin,
            length: block_length(self.length, begin),
        })
    }

    /// Accepts a received block.
    ///
    /// Blocks may arrive in any order; they are matched by offset. An
    /// unaligned or out-of-range offset, or a block of the wrong size, is a
    /// protocol violation.
    pub fn receive(&mut self, begin: u32, data: Bytes) -> Result<(), PeerError> {
        if begin % BLOCK_SIZE != 0 || begin >= self.length {
            return Err(PeerError::Protocol(format!(
                "block offset {} out of range for piece {}",
                begin, self.index
            )));
        }

        let expected = block_length(self.length, begin);
        if data.len() as u32 != expected {
            return Err(PeerError::Protocol(format!(
                "block at offset {} has {} bytes, expected {}",
                begin,
                data.len(),
                expected
            )));
        }

        self.pending.remove(&begin);
        self.blocks.insert(begin, data);
        Ok(())
    }

    /// Moves every in-flight request back to the request queue.
    ///
    /// Used when the peer chokes us: outstanding requests will not be
    /// answered and must be reissued after the next unchoke.
    pub fn requeue_pending(&mut self) {
        let mut offsets: Vec<u32> = self.pending.drain().map(|(begin, _)| begin).collect();
        offsets.sort_unstable();
        for begin in offsets.into_iter().rev() {
            self.to_request.push_front(begin);
        }
    }

    /// Returns true if any in-flight request is older than [`REQUEST_TIMEOUT`].
    pub fn has_stale_request(&self) -> bool {
        let now = Instant::now();
        self.pending
            .values()
            .any(|&sent_at| now.duration_since(sent_at) > REQUEST_TIMEOUT)
    }

    /// Returns true once every block has been received.
    pub fn is_complete(&self) -> bool {
        self.blocks.len() as u32 == block_count(self.length)
    }

    /// Concatenates the received blocks in offset order.
    pub fn assemble(&self) -> Bytes {
        let mut data = Vec::with_capacity(self.length as usize);
        for i in 0..block_count(self.length) {
            if let Some(block) = self.blocks.get(&(i * BLOCK_SIZE)) {
                data.extend_from_slice(block);
            }
        }
        Bytes::from(data)
    }

    /// Assembles the piece and checks it against the expected SHA1 hash.
    pub fn into_verified(self, expected: &[u8; 20]) -> Result<Bytes, PeerError> {
        let data = self.assemble();

        let mut hasher = Sha1::new();
        hasher.update(&data);
        let digest: [u8; 20] = hasher.finalize().into();

        if digest != *expected {
            return Err(PeerError::HashMismatch(self.index));
        }

        Ok(data)
    }
}
