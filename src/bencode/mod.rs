//! Bencode codec: the serialization format used by the BitTorrent protocol.
//!
//! Everything that crosses a torrent boundary in this crate flows through
//! this module: the `.torrent` metainfo file, the tracker announce response,
//! and the re-encoded `info` dictionary whose SHA-1 identifies the torrent
//! on the wire.

use std::collections::HashMap;
use thiserror::Error;

pub mod decoder;
pub mod encoder;

/// A single bencode value.
///
/// Bencode has exactly four shapes:
///
/// 1. `String(Vec<u8>)` - a length-prefixed byte string (`5:hello`). Stored
///    as raw bytes, not UTF-8: the `pieces` blob in a metainfo file is a
///    string of binary SHA-1 digests.
/// 2. `Integer(i64)` - a signed decimal wrapped in `i`/`e` (`i42e`).
/// 3. `List(Vec<BencodeValue>)` - an ordered sequence wrapped in `l`/`e`.
/// 4. `Dict(HashMap<Vec<u8>, BencodeValue>)` - byte-string keys mapped to
///    values, wrapped in `d`/`e`. Keys are emitted in ascending raw-byte
///    order so that encoding is deterministic.
#[derive(Debug, PartialEq, Clone)]
pub enum BencodeValue {
    String(Vec<u8>),
    Integer(i64),
    List(Vec<BencodeValue>),
    Dict(HashMap<Vec<u8>, BencodeValue>),
}

impl BencodeValue {
    /// Borrows the byte string inside, or fails with `WrongType`.
    pub fn as_str(&self) -> BencodeResult<&[u8]> {
        match self {
            BencodeValue::String(s) => Ok(s),
            _ => Err(BencodeError::WrongType),
        }
    }

    /// Returns the integer inside, or fails with `WrongType`.
    pub fn as_int(&self) -> BencodeResult<i64> {
        match self {
            BencodeValue::Integer(i) => Ok(*i),
            _ => Err(BencodeError::WrongType),
        }
    }

    /// Borrows the list inside, or fails with `WrongType`.
    pub fn as_list(&self) -> BencodeResult<&[BencodeValue]> {
        match self {
            BencodeValue::List(list) => Ok(list),
            _ => Err(BencodeError::WrongType),
        }
    }

    /// Borrows the dictionary inside, or fails with `WrongType`.
    pub fn as_dict(&self) -> BencodeResult<&HashMap<Vec<u8>, BencodeValue>> {
        match self {
            BencodeValue::Dict(dict) => Ok(dict),
            _ => Err(BencodeError::WrongType),
        }
    }
}

/// Error type for bencode decoding and encoding.
#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid bencode")]
    InvalidBencode,

    #[error("expected a digit")]
    ExpectNumber,

    #[error("expected ':'")]
    ExpectColon,

    #[error("expected 'i'")]
    ExpectCharI,

    #[error("expected 'e'")]
    ExpectCharE,

    #[error("wrong bencode type")]
    WrongType,
}

pub type BencodeResult<T> = std::result::Result<T, BencodeError>;

/// Builds a typed record out of a decoded bencode dictionary.
///
/// Binding is lenient the way real `.torrent` consumers are: a key that is
/// missing leaves the field at its default, and a key whose value has the
/// wrong shape is skipped. Only a top-level shape mismatch (e.g. binding a
/// record against a bare integer) is an error, reported as `WrongType`.
pub trait FromBencode: Sized {
    fn from_bencode(value: &BencodeValue) -> BencodeResult<Self>;
}

/// Renders a typed record back into a bencode value.
///
/// The emitter sorts dictionary keys, so any record marshalled through this
/// trait round-trips to byte-identical output - the property the info-hash
/// computation depends on.
pub trait ToBencode {
    fn to_bencode(&self) -> BencodeValue;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessor_type_mismatch() {
        let value = BencodeValue::Integer(7);
        assert!(matches!(value.as_str(), Err(BencodeError::WrongType)));
        assert!(matches!(value.as_list(), Err(BencodeError::WrongType)));
        assert_eq!(value.as_int().unwrap(), 7);
    }

    #[test]
    fn round_trip_nested_value() {
        let mut dict = HashMap::new();
        dict.insert(b"spam".to_vec(), BencodeValue::Integer(-3));
        dict.insert(
            b"eggs".to_vec(),
            BencodeValue::List(vec![
                BencodeValue::String(b"a".to_vec()),
                BencodeValue::Integer(0),
            ]),
        );
        let value = BencodeValue::Dict(dict);

        let mut encoded = Vec::new();
        let written = encoder::encode(&mut encoded, &value).unwrap();
        assert_eq!(written, encoded.len());

        let decoded = decoder::decode(&encoded[..]).unwrap();
        assert_eq!(decoded, value);
    }
}
