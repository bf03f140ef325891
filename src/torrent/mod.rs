//! Metainfo (`.torrent`) parsing and the torrent-wide shared types.
//!
//! A metainfo file is one bencode dictionary: the tracker URL under
//! `announce` plus an `info` sub-dictionary describing the published file.
//! Parsing produces an immutable [`file::TorrentFile`] that the tracker
//! client and the downloader both hang off of.

use thiserror::Error;

pub mod bitfield;
pub mod file;
pub mod info_hash;

#[derive(Debug, Error)]
pub enum TorrentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode decoding error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("malformed pieces: length must be a non-zero multiple of 20")]
    MalformedPieces,

    #[error("invalid torrent file: {0}")]
    InvalidFormat(String),
}

pub type TorrentResult<T> = std::result::Result<T, TorrentError>;
