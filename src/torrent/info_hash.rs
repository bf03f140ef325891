use crate::bencode::{encoder, ToBencode};
use crate::torrent::file::{RawInfo, SHA_LEN};
use crate::torrent::TorrentResult;

use sha1::{Digest, Sha1};

/// Computes the SHA-1 of the re-encoded `info` dictionary.
///
/// The digest identifies the torrent in both the tracker announce and the
/// peer handshake, so the bytes hashed here must be exactly the bytes a
/// compliant encoder produces: sorted keys, exact string lengths, no
/// leading zeros. Any re-encoding drift would make every handshake fail.
pub(crate) fn calculate_info_hash(info: &RawInfo) -> TorrentResult<[u8; SHA_LEN]> {
    let mut buffer = Vec::new();
    encoder::encode(&mut buffer, &info.to_bencode())?;

    let mut hasher = Sha1::new();
    hasher.update(&buffer);
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_hash_matches_hand_encoded_dict() {
        let info = RawInfo {
            length: 3,
            name: "a".to_string(),
            piece_length: 2,
            pieces: vec![0u8; 20],
        };

        // keys in sorted order: length, name, piece length, pieces
        let mut expected_bytes = Vec::new();
        expected_bytes.extend_from_slice(b"d6:lengthi3e4:name1:a12:piece lengthi2e6:pieces20:");
        expected_bytes.extend_from_slice(&[0u8; 20]);
        expected_bytes.extend_from_slice(b"e");

        let mut hasher = Sha1::new();
        hasher.update(&expected_bytes);
        let expected: [u8; SHA_LEN] = hasher.finalize().into();

        assert_eq!(calculate_info_hash(&info).unwrap(), expected);
    }

    #[test]
    fn info_hash_is_stable_across_calls() {
        let info = RawInfo {
            length: 1024,
            name: "payload.bin".to_string(),
            piece_length: 256,
            pieces: (0..80).collect(),
        };
        assert_eq!(
            calculate_info_hash(&info).unwrap(),
            calculate_info_hash(&info).unwrap()
        );
    }
}
