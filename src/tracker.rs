//! HTTP tracker protocol ([BEP-3]).
//!
//! Trackers are servers that help peers find each other. A client
//! "announces" to the tracker with its info hash and transfer statistics and
//! receives back a list of peers participating in the swarm.
//!
//! The announce request is a plain HTTP GET; the response is a bencoded
//! dictionary. Peer lists use the compact format ([BEP-23]): 6 bytes per
//! peer, 4 bytes IPv4 address plus 2 bytes port, both in network order.
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html
//! [BEP-23]: http://bittorrent.org/beps/bep_0023.html

mod error;
mod http;
mod response;

pub use error::TrackerError;
pub use http::HttpTracker;
pub use response::AnnounceResponse;
