use super::BencodeResult;
use super::BencodeValue;

use std::collections::HashMap;
use std::io::Write;

/// Encodes one bencode value into the writer and returns the number of
/// bytes written.
///
/// Output is deterministic: dictionary keys are emitted in ascending
/// raw-byte lexicographic order, integers carry no leading zeros, and
/// strings are prefixed with their exact byte length. Decoding and
/// re-encoding a value therefore reproduces the original bytes, which is
/// what keeps the info hash stable across the tracker announce and the
/// peer handshake.
pub fn encode<W: Write>(writer: &mut W, value: &BencodeValue) -> BencodeResult<usize> {
    match value {
        BencodeValue::String(s) => encode_string(writer, s),
        BencodeValue::Integer(i) => encode_integer(writer, *i),
        BencodeValue::List(list) => encode_list(writer, list),
        BencodeValue::Dict(dict) => encode_dict(writer, dict),
    }
}

fn encode_string<W: Write>(writer: &mut W, s: &[u8]) -> BencodeResult<usize> {
    let prefix = format!("{}:", s.len());
    writer.write_all(prefix.as_bytes())?;
    writer.write_all(s)?;
    Ok(prefix.len() + s.len())
}

fn encode_integer<W: Write>(writer: &mut W, value: i64) -> BencodeResult<usize> {
    let body = format!("i{}e", value);
    writer.write_all(body.as_bytes())?;
    Ok(body.len())
}

fn encode_list<W: Write>(writer: &mut W, list: &[BencodeValue]) -> BencodeResult<usize> {
    writer.write_all(b"l")?;
    let mut written = 2;
    for item in list {
        written += encode(writer, item)?;
    }
    writer.write_all(b"e")?;
    Ok(written)
}

fn encode_dict<W: Write>(
    writer: &mut W,
    dict: &HashMap<Vec<u8>, BencodeValue>,
) -> BencodeResult<usize> {
    writer.write_all(b"d")?;
    let mut written = 2;
    let mut keys: Vec<&Vec<u8>> = dict.keys().collect();
    keys.sort_unstable();
    for key in keys {
        written += encode_string(writer, key)?;
        written += encode(writer, &dict[key])?;
    }
    writer.write_all(b"e")?;
    Ok(written)
}
