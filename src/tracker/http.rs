use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::error::TrackerError;
use super::response::AnnounceResponse;
use crate::metainfo::InfoHash;
use crate::peer::PeerId;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// An HTTP tracker client.
///
/// # Examples
///
/// ```no_run
/// use btfetch::metainfo::InfoHash;
/// use btfetch::peer::PeerId;
/// use btfetch::tracker::HttpTracker;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let tracker = HttpTracker::new("http://tracker.example.com/announce")?;
///
/// let response = tracker
///     .announce(
///         &InfoHash::from_bytes([0u8; 20]),
///         &PeerId::generate(),
///         6881,    // port
///         0,       // uploaded
///         0,       // downloaded
///         1000,    // left
///     )
///     .await?;
///
/// println!("Found {} peers", response.peers.len());
/// # Ok(())
/// # }
/// ```
pub struct HttpTracker {
    client: Client,
    url: String,
}

impl HttpTracker {
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TrackerError::InvalidUrl(url.to_string()));
        }

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(TrackerError::Http)?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Announces to the tracker and returns the peer list.
    pub async fn announce(
        &self,
        info_hash: &InfoHash,
        peer_id: &PeerId,
        port: u16,
        uploaded: u64,
        downloaded: u64,
        left: u64,
    ) -> Result<AnnounceResponse, TrackerError> {
        let url = format!(
            "{}?info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            self.url,
            url_encode(info_hash.as_bytes()),
            url_encode(peer_id.as_bytes()),
            port,
            uploaded,
            downloaded,
            left
        );

        debug!(url = %url, "announcing to tracker");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::BadStatus(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let announce = AnnounceResponse::from_bencode(&bytes)?;
        debug!(peers = announce.peers.len(), "tracker responded");
        Ok(announce)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Percent-encodes arbitrary bytes for a tracker query string.
///
/// Unreserved bytes (ASCII letters, digits, `-`, `_`, `.`, `~`) pass through
/// verbatim; every other byte becomes `%` plus two lowercase hex digits.
pub fn url_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::new(), |mut s, &b| {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.' || b == b'~' {
            s.push(b as char);
        } else {
            let _ = write!(s, "%{:02x}", b);
        }
        s
    })
}
