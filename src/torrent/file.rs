//! Torrent metainfo structure and parsing.

use crate::bencode::{self, BencodeResult, BencodeValue, FromBencode, ToBencode};
use crate::torrent::info_hash;
use crate::torrent::{TorrentError, TorrentResult};

use std::collections::HashMap;
use std::io::Read;
use tracing::instrument;

/// Length of a SHA-1 digest in bytes.
pub const SHA_LEN: usize = 20;

/// The raw `info` sub-dictionary of a metainfo file, bound field-for-field.
///
/// Field order here is irrelevant to the info hash: marshalling goes through
/// the sorted dictionary emitter.
#[derive(Debug, Default, PartialEq, Clone)]
pub(crate) struct RawInfo {
    pub length: i64,
    pub name: String,
    /// Bound from the `piece length` key - the space is part of the format.
    pub piece_length: i64,
    /// Concatenated 20-byte SHA-1 digests, one per piece. Binary, not UTF-8.
    pub pieces: Vec<u8>,
}

/// The raw top-level metainfo dictionary.
#[derive(Debug, Default, PartialEq, Clone)]
pub(crate) struct RawFile {
    pub announce: String,
    pub info: RawInfo,
}

impl FromBencode for RawInfo {
    fn from_bencode(value: &BencodeValue) -> BencodeResult<Self> {
        let dict = value.as_dict()?;
        let mut raw = RawInfo::default();
        if let Some(BencodeValue::Integer(length)) = dict.get(b"length".as_slice()) {
            raw.length = *length;
        }
        if let Some(BencodeValue::String(name)) = dict.get(b"name".as_slice()) {
            raw.name = String::from_utf8_lossy(name).into_owned();
        }
        if let Some(BencodeValue::Integer(piece_length)) = dict.get(b"piece length".as_slice()) {
            raw.piece_length = *piece_length;
        }
        if let Some(BencodeValue::String(pieces)) = dict.get(b"pieces".as_slice()) {
            raw.pieces = pieces.clone();
        }
        Ok(raw)
    }
}

impl ToBencode for RawInfo {
    fn to_bencode(&self) -> BencodeValue {
        let mut dict = HashMap::new();
        dict.insert(b"length".to_vec(), BencodeValue::Integer(self.length));
        dict.insert(
            b"name".to_vec(),
            BencodeValue::String(self.name.clone().into_bytes()),
        );
        dict.insert(
            b"piece length".to_vec(),
            BencodeValue::Integer(self.piece_length),
        );
        dict.insert(b"pieces".to_vec(), BencodeValue::String(self.pieces.clone()));
        BencodeValue::Dict(dict)
    }
}

impl FromBencode for RawFile {
    fn from_bencode(value: &BencodeValue) -> BencodeResult<Self> {
        let dict = value.as_dict()?;
        let mut raw = RawFile::default();
        if let Some(BencodeValue::String(announce)) = dict.get(b"announce".as_slice()) {
            raw.announce = String::from_utf8_lossy(announce).into_owned();
        }
        if let Some(info @ BencodeValue::Dict(_)) = dict.get(b"info".as_slice()) {
            raw.info = RawInfo::from_bencode(info)?;
        }
        Ok(raw)
    }
}

/// Parsed, validated metainfo for one single-file torrent.
///
/// Immutable once built; every other subsystem borrows it.
#[derive(Debug, PartialEq, Clone)]
pub struct TorrentFile {
    /// Tracker URL from the `announce` key.
    pub announce: String,
    /// SHA-1 of the re-encoded `info` dictionary - the torrent's identity
    /// in both the tracker announce and the peer handshake.
    pub info_hash: [u8; SHA_LEN],
    /// Suggested output filename.
    pub name: String,
    /// Total file size in bytes.
    pub length: usize,
    /// Nominal piece size; every piece but possibly the last has exactly
    /// this length.
    pub piece_length: usize,
    /// One 20-byte digest per piece, in piece order.
    pub piece_hashes: Vec<[u8; SHA_LEN]>,
}

impl TorrentFile {
    /// Parses a metainfo stream.
    ///
    /// Decodes the bencode document, binds it into [`RawFile`], re-encodes
    /// the `info` record to compute the info hash, and slices the `pieces`
    /// blob into per-piece digests.
    #[instrument(skip(reader), level = "debug")]
    pub fn parse<R: Read>(reader: R) -> TorrentResult<TorrentFile> {
        let document = bencode::decoder::decode(reader)?;
        let raw = RawFile::from_bencode(&document)?;

        if raw.announce.is_empty() {
            return Err(TorrentError::InvalidFormat("missing announce URL".into()));
        }
        if raw.info.length <= 0 {
            // multi-file torrents have no `length` key and are out of scope
            return Err(TorrentError::InvalidFormat(
                "missing or non-positive file length".into(),
            ));
        }
        if raw.info.piece_length <= 0 {
            return Err(TorrentError::InvalidFormat(
                "missing or non-positive piece length".into(),
            ));
        }

        let info_hash = info_hash::calculate_info_hash(&raw.info)?;
        let piece_hashes = split_piece_hashes(&raw.info.pieces)?;

        Ok(TorrentFile {
            announce: raw.announce,
            info_hash,
            name: raw.info.name,
            length: raw.info.length as usize,
            piece_length: raw.info.piece_length as usize,
            piece_hashes,
        })
    }

    /// Number of pieces in the torrent.
    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Byte range `[begin, end)` of a piece within the file.
    ///
    /// The end is clamped to the file length, so the last piece may be
    /// shorter than `piece_length` but is never empty.
    pub fn piece_bounds(&self, index: usize) -> (usize, usize) {
        let begin = index * self.piece_length;
        let end = (begin + self.piece_length).min(self.length);
        (begin, end)
    }
}

/// Splits the concatenated `pieces` blob into 20-byte digests.
fn split_piece_hashes(pieces: &[u8]) -> TorrentResult<Vec<[u8; SHA_LEN]>> {
    if pieces.is_empty() || pieces.len() % SHA_LEN != 0 {
        return Err(TorrentError::MalformedPieces);
    }
    Ok(pieces
        .chunks_exact(SHA_LEN)
        .map(|chunk| {
            let mut hash = [0u8; SHA_LEN];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect())
}
