use super::BencodeError;
use super::BencodeResult;
use super::BencodeValue;

use std::collections::HashMap;
use std::io::{self, Read};
use tracing::instrument;

type ByteStream<R> = std::iter::Peekable<io::Bytes<R>>;

/// Decodes one complete bencode value from the reader.
///
/// The first byte selects the shape: a digit starts a string, `i` an
/// integer, `l` a list and `d` a dictionary. Anything else fails with
/// `InvalidBencode`. Failures never yield a partial value.
///
/// # Example
/// `decode(&b"d3:keyi42ee"[..])` yields a dictionary mapping `key` to 42.
#[instrument(skip(reader), level = "debug")]
pub fn decode<R: Read>(reader: R) -> BencodeResult<BencodeValue> {
    let mut stream = reader.bytes().peekable();
    decode_value(&mut stream)
}

fn decode_value<R: Read>(stream: &mut ByteStream<R>) -> BencodeResult<BencodeValue> {
    match peek_byte(stream)? {
        b'0'..=b'9' => decode_string(stream).map(BencodeValue::String),
        b'i' => decode_integer(stream).map(BencodeValue::Integer),
        b'l' => decode_list(stream).map(BencodeValue::List),
        b'd' => decode_dict(stream).map(BencodeValue::Dict),
        _ => Err(BencodeError::InvalidBencode),
    }
}

/// Decodes a byte string in the form `<length>:<bytes>`.
///
/// The length is a non-negative decimal; the payload is exactly that many
/// raw bytes with no terminator. Fails with `ExpectNumber` when the length
/// digits are absent and `ExpectColon` when the separator is.
pub fn decode_string<R: Read>(stream: &mut ByteStream<R>) -> BencodeResult<Vec<u8>> {
    if !peek_byte(stream)?.is_ascii_digit() {
        return Err(BencodeError::ExpectNumber);
    }
    let mut length: usize = 0;
    while peek_byte(stream)?.is_ascii_digit() {
        let digit = (next_byte(stream)? - b'0') as usize;
        length = length
            .checked_mul(10)
            .and_then(|n| n.checked_add(digit))
            .ok_or(BencodeError::InvalidBencode)?;
    }
    if next_byte(stream)? != b':' {
        return Err(BencodeError::ExpectColon);
    }
    let mut bytes = vec![0u8; length];
    for slot in bytes.iter_mut() {
        *slot = next_byte(stream)?;
    }
    Ok(bytes)
}

/// Decodes an integer in the form `i<decimal>e`.
///
/// Leading zeros and `-0` are accepted: `.torrent` files in the wild carry
/// both and this decoder stays compatible with them.
pub fn decode_integer<R: Read>(stream: &mut ByteStream<R>) -> BencodeResult<i64> {
    if next_byte(stream)? != b'i' {
        return Err(BencodeError::ExpectCharI);
    }
    let mut digits = String::new();
    if peek_byte(stream)? == b'-' {
        next_byte(stream)?;
        digits.push('-');
    }
    while peek_byte(stream)?.is_ascii_digit() {
        digits.push(next_byte(stream)? as char);
    }
    let value = digits
        .parse::<i64>()
        .map_err(|_| BencodeError::ExpectNumber)?;
    if next_byte(stream)? != b'e' {
        return Err(BencodeError::ExpectCharE);
    }
    Ok(value)
}

fn decode_list<R: Read>(stream: &mut ByteStream<R>) -> BencodeResult<Vec<BencodeValue>> {
    // caller dispatched on 'l'
    next_byte(stream)?;
    let mut list = Vec::new();
    while peek_byte(stream)? != b'e' {
        list.push(decode_value(stream)?);
    }
    next_byte(stream)?;
    Ok(list)
}

fn decode_dict<R: Read>(stream: &mut ByteStream<R>) -> BencodeResult<HashMap<Vec<u8>, BencodeValue>> {
    next_byte(stream)?;
    let mut dict = HashMap::new();
    while peek_byte(stream)? != b'e' {
        let key = decode_string(stream)?;
        let value = decode_value(stream)?;
        // duplicate keys: the later occurrence wins
        dict.insert(key, value);
    }
    next_byte(stream)?;
    Ok(dict)
}

fn next_byte<R: Read>(stream: &mut ByteStream<R>) -> BencodeResult<u8> {
    stream
        .next()
        .ok_or_else(|| BencodeError::Io(io::ErrorKind::UnexpectedEof.into()))?
        .map_err(BencodeError::Io)
}

fn peek_byte<R: Read>(stream: &mut ByteStream<R>) -> BencodeResult<u8> {
    match stream.peek() {
        Some(Ok(byte)) => Ok(*byte),
        Some(Err(e)) => Err(BencodeError::Io(e.kind().into())),
        None => Err(BencodeError::Io(io::ErrorKind::UnexpectedEof.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_integers() {
        assert_eq!(decode(&b"i0e"[..]).unwrap(), BencodeValue::Integer(0));
        assert_eq!(decode(&b"i-42e"[..]).unwrap(), BencodeValue::Integer(-42));
        assert_eq!(decode(&b"i12345e"[..]).unwrap(), BencodeValue::Integer(12345));
    }

    #[test]
    fn decode_tolerates_wild_integer_profiles() {
        // leading zeros and negative zero show up in real torrents
        assert_eq!(decode(&b"i007e"[..]).unwrap(), BencodeValue::Integer(7));
        assert_eq!(decode(&b"i-0e"[..]).unwrap(), BencodeValue::Integer(0));
    }

    #[test]
    fn decode_strings() {
        assert_eq!(
            decode(&b"5:hello"[..]).unwrap(),
            BencodeValue::String(b"hello".to_vec())
        );
        assert_eq!(decode(&b"0:"[..]).unwrap(), BencodeValue::String(Vec::new()));
    }

    #[test]
    fn decode_binary_string() {
        let input = b"4:\x00\xff\x01\x7f";
        assert_eq!(
            decode(&input[..]).unwrap(),
            BencodeValue::String(vec![0x00, 0xff, 0x01, 0x7f])
        );
    }

    #[test]
    fn decode_list_and_dict() {
        assert_eq!(
            decode(&b"l4:spami42ee"[..]).unwrap(),
            BencodeValue::List(vec![
                BencodeValue::String(b"spam".to_vec()),
                BencodeValue::Integer(42),
            ])
        );

        let decoded = decode(&b"d3:keyi42ee"[..]).unwrap();
        let dict = decoded.as_dict().unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict[&b"key".to_vec()], BencodeValue::Integer(42));
    }

    #[test]
    fn duplicate_dict_keys_overwrite() {
        let decoded = decode(&b"d1:ai1e1:ai2ee"[..]).unwrap();
        let dict = decoded.as_dict().unwrap();
        assert_eq!(dict[&b"a".to_vec()], BencodeValue::Integer(2));
    }

    #[test]
    fn decode_error_kinds() {
        assert!(matches!(
            decode(&b"x"[..]),
            Err(BencodeError::InvalidBencode)
        ));
        assert!(matches!(decode(&b"ie"[..]), Err(BencodeError::ExpectNumber)));
        assert!(matches!(decode(&b"i42x"[..]), Err(BencodeError::ExpectCharE)));
        assert!(matches!(decode(&b"5xhello"[..]), Err(BencodeError::ExpectColon)));
        assert!(matches!(decode(&b"3:ab"[..]), Err(BencodeError::Io(_))));
    }
}
