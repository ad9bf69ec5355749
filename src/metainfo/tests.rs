use std::collections::BTreeMap;

use bytes::Bytes;
use sha1::{Digest, Sha1};

use super::*;
use crate::bencode::{encode, Value};

fn sample_info(length: i64, piece_length: i64, piece_count: usize) -> Value {
    let mut info = BTreeMap::new();
    info.insert(Bytes::from_static(b"length"), Value::Integer(length));
    info.insert(Bytes::from_static(b"name"), Value::string("sample.txt"));
    info.insert(
        Bytes::from_static(b"piece length"),
        Value::Integer(piece_length),
    );
    let mut pieces = Vec::with_capacity(piece_count * 20);
    for i in 0..piece_count {
        pieces.extend(std::iter::repeat_n(i as u8, 20));
    }
    info.insert(Bytes::from_static(b"pieces"), Value::Bytes(pieces.into()));
    Value::Dict(info)
}

fn sample_torrent(info: Value) -> Vec<u8> {
    let mut root = BTreeMap::new();
    root.insert(
        Bytes::from_static(b"announce"),
        Value::string("http://tracker.example.com/announce"),
    );
    root.insert(Bytes::from_static(b"info"), info);
    encode(&Value::Dict(root)).unwrap()
}

#[test]
fn test_parse_single_file_torrent() {
    let data = sample_torrent(sample_info(100_000, 16384, 7));
    let metainfo = Metainfo::from_bytes(&data).unwrap();

    assert_eq!(metainfo.announce, "http://tracker.example.com/announce");
    assert_eq!(metainfo.info.name, "sample.txt");
    assert_eq!(metainfo.info.length, 100_000);
    assert_eq!(metainfo.info.piece_length, 16384);
    assert_eq!(metainfo.info.piece_count(), 7);
}

#[test]
fn test_info_hash_matches_encoded_info() {
    let info = sample_info(32768, 16384, 2);
    let info_bytes = encode(&info).unwrap();
    let data = sample_torrent(info);

    let metainfo = Metainfo::from_bytes(&data).unwrap();

    let mut hasher = Sha1::new();
    hasher.update(&info_bytes);
    let expected: [u8; 20] = hasher.finalize().into();

    assert_eq!(metainfo.info_hash.as_bytes(), &expected);
    assert_eq!(metainfo.raw_info().as_ref(), info_bytes.as_slice());
}

#[test]
fn test_piece_sizes() {
    // 6 full pieces of 16384 plus a final 1696-byte piece
    let data = sample_torrent(sample_info(100_000, 16384, 7));
    let info = Metainfo::from_bytes(&data).unwrap().info;

    for i in 0..6 {
        assert_eq!(info.piece_size(i), 16384);
    }
    assert_eq!(info.piece_size(6), 100_000 - 6 * 16384);
}

#[test]
fn test_piece_size_exact_multiple() {
    let data = sample_torrent(sample_info(32768, 16384, 2));
    let info = Metainfo::from_bytes(&data).unwrap().info;

    assert_eq!(info.piece_size(0), 16384);
    assert_eq!(info.piece_size(1), 16384);
}

#[test]
fn test_piece_hashes() {
    let data = sample_torrent(sample_info(32768, 16384, 2));
    let info = Metainfo::from_bytes(&data).unwrap().info;

    assert_eq!(info.piece_hash(0), Some(&[0u8; 20]));
    assert_eq!(info.piece_hash(1), Some(&[1u8; 20]));
    assert_eq!(info.piece_hash(2), None);
}

#[test]
fn test_missing_announce() {
    let mut root = BTreeMap::new();
    root.insert(Bytes::from_static(b"info"), sample_info(16384, 16384, 1));
    let data = encode(&Value::Dict(root)).unwrap();

    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::MissingField("announce"))
    ));
}

#[test]
fn test_missing_info_fields() {
    let mut info = BTreeMap::new();
    info.insert(Bytes::from_static(b"name"), Value::string("x"));
    let data = sample_torrent(Value::Dict(info));

    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::MissingField("length"))
    ));
}

#[test]
fn test_ragged_pieces_rejected() {
    let mut info = BTreeMap::new();
    info.insert(Bytes::from_static(b"length"), Value::Integer(16384));
    info.insert(Bytes::from_static(b"name"), Value::string("x"));
    info.insert(Bytes::from_static(b"piece length"), Value::Integer(16384));
    info.insert(
        Bytes::from_static(b"pieces"),
        Value::Bytes(Bytes::from_static(&[0u8; 19])),
    );
    let data = sample_torrent(Value::Dict(info));

    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::InvalidField("pieces"))
    ));
}

#[test]
fn test_piece_count_mismatch_rejected() {
    // 3 hashes for a 2-piece file
    let data = sample_torrent(sample_info(32768, 16384, 3));

    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::InvalidField("pieces"))
    ));
}

#[test]
fn test_zero_piece_length_rejected() {
    let data = sample_torrent(sample_info(16384, 0, 1));
    assert!(Metainfo::from_bytes(&data).is_err());
}

#[test]
fn test_info_hash_hex_roundtrip() {
    let hash = InfoHash::from_hex("d69f91e6b2ae4c542468d1073a71d4ea13879a7f").unwrap();
    assert_eq!(hash.to_hex(), "d69f91e6b2ae4c542468d1073a71d4ea13879a7f");
    assert!(InfoHash::from_hex("d69f").is_err());
    assert!(InfoHash::from_hex("zz9f91e6b2ae4c542468d1073a71d4ea13879a7f").is_err());
}
