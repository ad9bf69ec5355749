//! btfetch - command-line entry point.
//!
//! Thin dispatcher over the library: each subcommand loads its inputs,
//! calls into the core, and prints the result.

mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use btfetch::bencode::decode;
use btfetch::download::Downloader;
use btfetch::metainfo::Metainfo;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Decode { value } => {
            let decoded =
                decode(value.as_bytes()).context("failed to decode bencoded value")?;
            println!("{}", cli::render_json(&decoded));
        }

        Command::Info { torrent } => {
            let metainfo = load_torrent(&torrent)?;
            println!("Tracker URL: {}", metainfo.announce);
            println!("Length: {}", metainfo.info.length);
            println!("Info Hash: {}", metainfo.info_hash);
            println!("Piece Length: {}", metainfo.info.piece_length);
            println!("Piece Hashes:");
            for hash in &metainfo.info.pieces {
                println!("{}", hex(hash));
            }
        }

        Command::Peers { torrent } => {
            let downloader = Downloader::new(load_torrent(&torrent)?);
            let peers = downloader
                .peers()
                .await
                .context("failed to fetch peers from tracker")?;
            for peer in peers {
                println!("{}", peer);
            }
        }

        Command::Handshake { torrent, peer } => {
            let downloader = Downloader::new(load_torrent(&torrent)?);
            let peer_id = downloader
                .handshake(peer)
                .await
                .with_context(|| format!("handshake with {} failed", peer))?;
            println!("Peer ID: {}", peer_id.to_hex());
        }

        Command::DownloadPiece {
            output,
            torrent,
            piece,
        } => {
            let downloader = Downloader::new(load_torrent(&torrent)?);
            let data = downloader
                .download_piece(piece)
                .await
                .with_context(|| format!("failed to download piece {}", piece))?;
            tokio::fs::write(&output, &data)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(piece, path = %output.display(), "piece written");
        }

        Command::Download { output, torrent } => {
            let downloader = Downloader::new(load_torrent(&torrent)?);
            let name = downloader.metainfo().info.name.clone();
            let data = downloader
                .download()
                .await
                .with_context(|| format!("failed to download {}", name))?;
            tokio::fs::write(&output, &data)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(name = %name, path = %output.display(), "download complete");
        }
    }

    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_torrent(path: &Path) -> Result<Metainfo> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read torrent file {}", path.display()))?;
    Metainfo::from_bytes(&data).context("failed to parse torrent file")
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}
