use super::error::MetainfoError;
use super::info_hash::InfoHash;
use crate::bencode::{decode, encode, Value};
use bytes::Bytes;

/// A parsed single-file torrent.
///
/// Contains the tracker URL, the info dictionary, and the info hash derived
/// from it.
///
/// # Examples
///
/// ```no_run
/// use btfetch::metainfo::Metainfo;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let data = std::fs::read("example.torrent")?;
/// let metainfo = Metainfo::from_bytes(&data)?;
///
/// println!("Torrent: {}", metainfo.info.name);
/// println!("Size: {} bytes", metainfo.info.length);
/// println!("Info hash: {}", metainfo.info_hash);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// The info dictionary containing file and piece information.
    pub info: Info,
    /// The unique identifier for this torrent (SHA1 of the info dictionary).
    pub info_hash: InfoHash,
    /// Tracker URL to announce to.
    pub announce: String,
    /// Unix timestamp when the torrent was created.
    pub creation_date: Option<i64>,
    /// Optional comment about the torrent.
    pub comment: Option<String>,
    /// Name/version of the program that created the torrent.
    pub created_by: Option<String>,
    raw_info: Bytes,
}

/// The info dictionary from a single-file torrent.
#[derive(Debug, Clone)]
pub struct Info {
    /// Suggested name for the downloaded file.
    pub name: String,
    /// Total file size in bytes.
    pub length: u64,
    /// Number of bytes per piece (the last piece may be shorter).
    pub piece_length: u64,
    /// SHA1 hash of each piece, in piece order.
    pub pieces: Vec<[u8; 20]>,
}

impl Metainfo {
    /// Parses a torrent file from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The data is not valid bencode
    /// - Required fields are missing (announce, info, name, pieces, ...)
    /// - The pieces field does not hold exactly one 20-byte hash per piece
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        let value = decode(data)?;
        let dict = value.as_dict().ok_or(MetainfoError::InvalidField("root"))?;

        let announce = dict
            .get(b"announce".as_slice())
            .ok_or(MetainfoError::MissingField("announce"))?
            .as_str()
            .ok_or(MetainfoError::InvalidField("announce"))?
            .to_string();

        let info_value = dict
            .get(b"info".as_slice())
            .ok_or(MetainfoError::MissingField("info"))?;

        // The decoder only accepts canonical key order, so re-encoding the
        // info dictionary reproduces its exact byte span in the file.
        let raw_info = Bytes::from(encode(info_value)?);
        let info_hash = InfoHash::from_info_bytes(&raw_info);

        let info = parse_info(info_value)?;

        let creation_date = dict
            .get(b"creation date".as_slice())
            .and_then(|v| v.as_integer());

        let comment = dict
            .get(b"comment".as_slice())
            .and_then(|v| v.as_str())
            .map(String::from);

        let created_by = dict
            .get(b"created by".as_slice())
            .and_then(|v| v.as_str())
            .map(String::from);

        Ok(Self {
            info,
            info_hash,
            announce,
            creation_date,
            comment,
            created_by,
            raw_info,
        })
    }

    /// Returns the raw bencoded info dictionary.
    pub fn raw_info(&self) -> &Bytes {
        &self.raw_info
    }
}

impl Info {
    /// Returns the number of pieces in the torrent.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Returns the size in bytes of the piece at `index`.
    ///
    /// All pieces have `piece_length` bytes except the last, which holds the
    /// remainder of the file.
    pub fn piece_size(&self, index: u32) -> u64 {
        if (index as usize) + 1 < self.pieces.len() {
            return self.piece_length;
        }
        let remainder = self.length % self.piece_length;
        if remainder == 0 {
            self.piece_length
        } else {
            remainder
        }
    }

    /// Returns the expected SHA1 hash of the piece at `index`.
    pub fn piece_hash(&self, index: u32) -> Option<&[u8; 20]> {
        self.pieces.get(index as usize)
    }
}

fn parse_info(value: &Value) -> Result<Info, MetainfoError> {
    let dict = value.as_dict().ok_or(MetainfoError::InvalidField("info"))?;

    let name = dict
        .get(b"name".as_slice())
        .and_then(|v| v.as_str())
        .ok_or(MetainfoError::MissingField("name"))?
        .to_string();

    let length = dict
        .get(b"length".as_slice())
        .and_then(|v| v.as_integer())
        .ok_or(MetainfoError::MissingField("length"))?;
    if length < 0 {
        return Err(MetainfoError::InvalidField("length"));
    }
    let length = length as u64;

    let piece_length = dict
        .get(b"piece length".as_slice())
        .and_then(|v| v.as_integer())
        .ok_or(MetainfoError::MissingField("piece length"))?;
    if piece_length <= 0 {
        return Err(MetainfoError::InvalidField("piece length"));
    }
    let piece_length = piece_length as u64;

    let pieces_bytes = dict
        .get(b"pieces".as_slice())
        .and_then(|v| v.as_bytes())
        .ok_or(MetainfoError::MissingField("pieces"))?;

    if pieces_bytes.len() % 20 != 0 {
        return Err(MetainfoError::InvalidField("pieces"));
    }

    let pieces: Vec<[u8; 20]> = pieces_bytes
        .chunks_exact(20)
        .map(|chunk| {
            let mut arr = [0u8; 20];
            arr.copy_from_slice(chunk);
            arr
        })
        .collect();

    // One hash per piece: len(pieces) == ceil(length / piece_length).
    let expected = length.div_ceil(piece_length) as usize;
    if pieces.len() != expected {
        return Err(MetainfoError::InvalidField("pieces"));
    }

    Ok(Info {
        name,
        length,
        piece_length,
        pieces,
    })
}
