use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("tracker returned error: {0}")]
    Failure(String),

    #[error("unexpected status: {0}")]
    BadStatus(u16),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}
