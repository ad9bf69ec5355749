use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use sha1::{Digest, Sha1};
use tokio::net::TcpListener;

use super::*;
use crate::bencode::{encode, Value};
use crate::metainfo::Metainfo;
use crate::peer::{Bitfield, Handshake, Message, PeerError, PeerId, PeerTransport};

fn make_torrent(data: &[u8], piece_length: usize) -> Metainfo {
    let mut pieces = Vec::new();
    for chunk in data.chunks(piece_length) {
        let mut hasher = Sha1::new();
        hasher.update(chunk);
        let digest: [u8; 20] = hasher.finalize().into();
        pieces.extend_from_slice(&digest);
    }

    let mut info = BTreeMap::new();
    info.insert(
        Bytes::from_static(b"length"),
        Value::Integer(data.len() as i64),
    );
    info.insert(Bytes::from_static(b"name"), Value::string("swarm.bin"));
    info.insert(
        Bytes::from_static(b"piece length"),
        Value::Integer(piece_length as i64),
    );
    info.insert(Bytes::from_static(b"pieces"), Value::Bytes(pieces.into()));

    let mut root = BTreeMap::new();
    root.insert(
        Bytes::from_static(b"announce"),
        Value::string("http://127.0.0.1:1/announce"),
    );
    root.insert(Bytes::from_static(b"info"), Value::Dict(info));

    Metainfo::from_bytes(&encode(&Value::Dict(root)).unwrap()).unwrap()
}

fn test_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

#[derive(Clone, Copy, Default)]
struct SeederOpts {
    // Flip a bit in every block served.
    corrupt: bool,
    // Drop the connection after serving this many block requests.
    disconnect_after: Option<usize>,
    // Announce no pieces at all.
    empty_bitfield: bool,
    // Answer the handshake with a different info hash.
    wrong_info_hash: bool,
}

// A scripted seeder holding the complete file. Accepts any number of
// connections and serves block requests straight from `data`.
async fn spawn_seeder(metainfo: &Metainfo, data: Arc<Vec<u8>>, opts: SeederOpts) -> SocketAddr {
    let info_hash = *metainfo.info_hash.as_bytes();
    let piece_count = metainfo.info.piece_count();
    let piece_length = metainfo.info.piece_length as usize;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let data = Arc::clone(&data);

            tokio::spawn(async move {
                let mut transport = PeerTransport::new(stream);
                if transport.receive_handshake().await.is_err() {
                    return;
                }
                let mut reply_hash = info_hash;
                if opts.wrong_info_hash {
                    reply_hash[0] ^= 0xFF;
                }
                let reply = Handshake::new(reply_hash, *PeerId::generate().as_bytes());
                if transport.send_handshake(&reply).await.is_err() {
                    return;
                }

                let bitfield = if opts.empty_bitfield {
                    Bitfield::new(piece_count)
                } else {
                    Bitfield::full(piece_count)
                };
                if transport
                    .send_message(&Message::Bitfield(bitfield.to_bytes()))
                    .await
                    .is_err()
                {
                    return;
                }

                let mut served = 0usize;
                loop {
                    match transport.receive_message().await {
                        Ok(Message::Interested) => {
                            if transport.send_message(&Message::Unchoke).await.is_err() {
                                return;
                            }
                        }
                        Ok(Message::Request {
                            index,
                            begin,
                            length,
                        }) => {
                            if let Some(limit) = opts.disconnect_after {
                                if served >= limit {
                                    return;
                                }
                            }
                            served += 1;

                            let start = index as usize * piece_length + begin as usize;
                            let mut block = data[start..start + length as usize].to_vec();
                            if opts.corrupt {
                                block[0] ^= 0xFF;
                            }
                            if transport
                                .send_message(&Message::Piece {
                                    index,
                                    begin,
                                    data: block.into(),
                                })
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                        Ok(_) => {}
                        Err(_) => return,
                    }
                }
            });
        }
    });

    addr
}

#[tokio::test]
async fn test_download_piece_from_single_peer() {
    let data = Arc::new(test_data(3 * 32768 + 5000));
    let metainfo = make_torrent(&data, 32768);
    let addr = spawn_seeder(&metainfo, Arc::clone(&data), SeederOpts::default()).await;

    let downloader = Downloader::new(metainfo);
    let piece = downloader.download_piece_from(&[addr], 1).await.unwrap();

    assert_eq!(piece.as_ref(), &data[32768..2 * 32768]);
}

#[tokio::test]
async fn test_download_short_final_piece() {
    let data = Arc::new(test_data(3 * 32768 + 5000));
    let metainfo = make_torrent(&data, 32768);
    let addr = spawn_seeder(&metainfo, Arc::clone(&data), SeederOpts::default()).await;

    let downloader = Downloader::new(metainfo);
    let piece = downloader.download_piece_from(&[addr], 3).await.unwrap();

    assert_eq!(piece.len(), 5000);
    assert_eq!(piece.as_ref(), &data[3 * 32768..]);
}

#[tokio::test]
async fn test_download_piece_retries_on_tampered_data() {
    let data = Arc::new(test_data(2 * 32768));
    let metainfo = make_torrent(&data, 32768);

    let bad = spawn_seeder(
        &metainfo,
        Arc::clone(&data),
        SeederOpts {
            corrupt: true,
            ..Default::default()
        },
    )
    .await;
    let good = spawn_seeder(&metainfo, Arc::clone(&data), SeederOpts::default()).await;

    let downloader = Downloader::new(metainfo);
    let piece = downloader
        .download_piece_from(&[bad, good], 0)
        .await
        .unwrap();

    assert_eq!(piece.as_ref(), &data[..32768]);
}

#[tokio::test]
async fn test_download_piece_invalid_index() {
    let data = Arc::new(test_data(32768));
    let metainfo = make_torrent(&data, 32768);
    let downloader = Downloader::new(metainfo);

    assert!(matches!(
        downloader.download_piece_from(&["127.0.0.1:1".parse().unwrap()], 9).await,
        Err(DownloadError::InvalidPieceIndex(9))
    ));
}

#[tokio::test]
async fn test_download_requires_peers() {
    let data = Arc::new(test_data(32768));
    let metainfo = make_torrent(&data, 32768);
    let downloader = Downloader::new(metainfo);

    assert!(matches!(
        downloader.download_from(&[]).await,
        Err(DownloadError::NoPeers)
    ));
    assert!(matches!(
        downloader.download_piece_from(&[], 0).await,
        Err(DownloadError::NoPeers)
    ));
}

#[tokio::test]
async fn test_download_full_file_from_swarm_with_failing_peer() {
    // 10 pieces: nine full 32KB pieces plus a short tail. One of the three
    // seeders drops its connection mid-transfer; the swarm must still finish.
    let data = Arc::new(test_data(9 * 32768 + 5000));
    let metainfo = make_torrent(&data, 32768);

    let flaky = spawn_seeder(
        &metainfo,
        Arc::clone(&data),
        SeederOpts {
            disconnect_after: Some(4),
            ..Default::default()
        },
    )
    .await;
    let steady1 = spawn_seeder(&metainfo, Arc::clone(&data), SeederOpts::default()).await;
    let steady2 = spawn_seeder(&metainfo, Arc::clone(&data), SeederOpts::default()).await;

    let downloader = Downloader::new(metainfo);
    let file = downloader
        .download_from(&[flaky, steady1, steady2])
        .await
        .unwrap();

    assert_eq!(file.len(), data.len());
    assert_eq!(file.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_download_fails_when_every_peer_tampers() {
    let data = Arc::new(test_data(32768));
    let metainfo = make_torrent(&data, 32768);
    let bad = spawn_seeder(
        &metainfo,
        Arc::clone(&data),
        SeederOpts {
            corrupt: true,
            ..Default::default()
        },
    )
    .await;

    let downloader = Downloader::new(metainfo);
    assert!(matches!(
        downloader.download_from(&[bad]).await,
        Err(DownloadError::PieceFailed(0))
    ));
}

#[tokio::test]
async fn test_download_aborts_on_foreign_swarm_peer() {
    let data = Arc::new(test_data(32768));
    let metainfo = make_torrent(&data, 32768);
    let foreign = spawn_seeder(
        &metainfo,
        Arc::clone(&data),
        SeederOpts {
            wrong_info_hash: true,
            ..Default::default()
        },
    )
    .await;

    let downloader = Downloader::new(metainfo);
    assert!(matches!(
        downloader.download_from(&[foreign]).await,
        Err(DownloadError::Peer(PeerError::InfoHashMismatch))
    ));
}

#[tokio::test]
async fn test_download_piece_aborts_on_foreign_swarm_peer() {
    // A healthy peer later in the list must not mask the mismatch.
    let data = Arc::new(test_data(32768));
    let metainfo = make_torrent(&data, 32768);
    let foreign = spawn_seeder(
        &metainfo,
        Arc::clone(&data),
        SeederOpts {
            wrong_info_hash: true,
            ..Default::default()
        },
    )
    .await;
    let good = spawn_seeder(&metainfo, Arc::clone(&data), SeederOpts::default()).await;

    let downloader = Downloader::new(metainfo);
    assert!(matches!(
        downloader.download_piece_from(&[foreign, good], 0).await,
        Err(DownloadError::Peer(PeerError::InfoHashMismatch))
    ));
}

#[tokio::test]
async fn test_download_fails_when_no_peer_has_the_piece() {
    let data = Arc::new(test_data(32768));
    let metainfo = make_torrent(&data, 32768);
    let empty = spawn_seeder(
        &metainfo,
        Arc::clone(&data),
        SeederOpts {
            empty_bitfield: true,
            ..Default::default()
        },
    )
    .await;

    let downloader = Downloader::new(metainfo);
    assert!(matches!(
        downloader.download_from(&[empty]).await,
        Err(DownloadError::PieceFailed(0))
    ));
}
