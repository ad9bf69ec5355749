//! Command-line argument parsing and output rendering.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use btfetch::bencode::Value;

#[derive(Debug, Parser)]
#[command(name = "btfetch")]
#[command(about = "A minimal BitTorrent client for single-file torrents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a bencoded value and print it as JSON
    Decode {
        /// The bencoded value
        value: String,
    },

    /// Print metadata from a torrent file
    Info {
        /// Path to the .torrent file
        torrent: PathBuf,
    },

    /// List the peers reported by the tracker
    Peers {
        /// Path to the .torrent file
        torrent: PathBuf,
    },

    /// Perform a handshake with one peer and print its peer ID
    Handshake {
        /// Path to the .torrent file
        torrent: PathBuf,
        /// Peer address as ip:port
        peer: SocketAddr,
    },

    /// Download a single verified piece
    #[command(name = "download_piece")]
    DownloadPiece {
        /// Where to write the piece
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        /// Path to the .torrent file
        torrent: PathBuf,
        /// Piece index
        piece: u32,
    },

    /// Download the whole file
    Download {
        /// Where to write the file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        /// Path to the .torrent file
        torrent: PathBuf,
    },
}

/// Renders a decoded bencode value as JSON.
///
/// Integers map to numbers and byte strings to text, replacing invalid
/// UTF-8 sequences. Lists and dictionaries convert recursively.
pub fn render_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
        Value::List(l) => serde_json::Value::Array(l.iter().map(render_json).collect()),
        Value::Dict(d) => serde_json::Value::Object(
            d.iter()
                .map(|(k, v)| (String::from_utf8_lossy(k).into_owned(), render_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btfetch::bencode::decode;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download_piece() {
        let cli = Cli::parse_from([
            "btfetch",
            "download_piece",
            "-o",
            "/tmp/piece-0",
            "sample.torrent",
            "0",
        ]);

        match cli.command {
            Command::DownloadPiece {
                output,
                torrent,
                piece,
            } => {
                assert_eq!(output, PathBuf::from("/tmp/piece-0"));
                assert_eq!(torrent, PathBuf::from("sample.torrent"));
                assert_eq!(piece, 0);
            }
            _ => panic!("expected download_piece"),
        }
    }

    #[test]
    fn test_render_json() {
        let value = decode(b"d3:agei30e4:name5:Alicee").unwrap();
        let json = render_json(&value);
        assert_eq!(json.to_string(), r#"{"age":30,"name":"Alice"}"#);
    }

    #[test]
    fn test_render_json_lossy_strings() {
        let value = decode(b"2:\xff\xfe").unwrap();
        let json = render_json(&value);
        assert_eq!(json, serde_json::Value::String("\u{fffd}\u{fffd}".into()));
    }

    #[test]
    fn test_render_json_nested() {
        let value = decode(b"l4:spami42eli1eee").unwrap();
        assert_eq!(render_json(&value).to_string(), r#"["spam",42,[1]]"#);
    }
}
