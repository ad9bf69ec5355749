//! Download orchestration.
//!
//! This module drives one or many peer sessions to fetch a single piece or
//! the whole file. Workers (one per peer) claim piece indices from a shared
//! queue, download and verify them, and hand the bytes back to the
//! coordinator, which assembles the file in a pre-allocated buffer.

mod coordinator;
mod error;

pub use coordinator::{Downloader, DEFAULT_PORT};
pub use error::DownloadError;

#[cfg(test)]
mod tests;
