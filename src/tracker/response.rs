use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use super::error::TrackerError;
use crate::bencode::decode;

/// A parsed tracker announce response.
#[derive(Debug, Clone)]
pub struct AnnounceResponse {
    /// Seconds the client should wait between regular announces.
    pub interval: u32,
    /// Minimum announce interval, if the tracker enforces one.
    pub min_interval: Option<u32>,
    /// Number of seeders in the swarm.
    pub complete: Option<u32>,
    /// Number of leechers in the swarm.
    pub incomplete: Option<u32>,
    /// Peer endpoints from the compact peer list.
    pub peers: Vec<SocketAddr>,
}

impl AnnounceResponse {
    /// Parses a bencoded announce response body.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Failure`] if the response carries a
    /// `failure reason` key, and [`TrackerError::InvalidResponse`] if the
    /// body is not a dictionary or lacks the required `interval` and
    /// `peers` fields.
    pub fn from_bencode(data: &[u8]) -> Result<Self, TrackerError> {
        let value = decode(data)?;
        let dict = value
            .as_dict()
            .ok_or_else(|| TrackerError::InvalidResponse("expected dict".into()))?;

        if let Some(failure) = dict
            .get(b"failure reason".as_slice())
            .and_then(|v| v.as_str())
        {
            return Err(TrackerError::Failure(failure.to_string()));
        }

        let interval = dict
            .get(b"interval".as_slice())
            .and_then(|v| v.as_integer())
            .ok_or_else(|| TrackerError::InvalidResponse("missing interval".into()))?
            as u32;

        let min_interval = dict
            .get(b"min interval".as_slice())
            .and_then(|v| v.as_integer())
            .map(|v| v as u32);

        let complete = dict
            .get(b"complete".as_slice())
            .and_then(|v| v.as_integer())
            .map(|v| v as u32);

        let incomplete = dict
            .get(b"incomplete".as_slice())
            .and_then(|v| v.as_integer())
            .map(|v| v as u32);

        let peers_bytes = dict
            .get(b"peers".as_slice())
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| TrackerError::InvalidResponse("missing peers".into()))?;

        if peers_bytes.len() % 6 != 0 {
            return Err(TrackerError::InvalidResponse(
                "peers length not a multiple of 6".into(),
            ));
        }

        Ok(Self {
            interval,
            min_interval,
            complete,
            incomplete,
            peers: parse_compact_peers(peers_bytes),
        })
    }
}

/// Parses a compact peer list: 6-byte groups of IPv4 address + port,
/// both big-endian.
pub fn parse_compact_peers(data: &[u8]) -> Vec<SocketAddr> {
    data.chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddr::new(IpAddr::V4(ip), port)
        })
        .collect()
}
