//! Tracker client: announce URL construction, the HTTP GET, and compact
//! peer-list parsing.
//!
//! One announce is all this downloader ever makes. The tracker answers
//! with a bencode dictionary `{ interval, peers }` where `peers` is a
//! string of 6-byte records: 4 bytes IPv4 address, 2 bytes big-endian
//! port.

use crate::bencode::{self, BencodeResult, BencodeValue, FromBencode};
use crate::torrent::file::TorrentFile;

use rand::Rng;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Port advertised to the tracker. Cosmetic: we never accept inbound
/// connections.
pub const PEER_PORT: u16 = 6666;

/// Total timeout for the announce request.
const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(15);

/// Bytes per compact peer record: 4 for the address, 2 for the port.
const PEER_RECORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("received malformed peers")]
    MalformedPeers,

    #[error("bencode decoding error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("invalid announce URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("tracker request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// One peer advertised by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// The tracker's bencode response body.
#[derive(Debug, Default, PartialEq)]
struct TrackerResponse {
    interval: i64,
    peers: Vec<u8>,
}

impl FromBencode for TrackerResponse {
    fn from_bencode(value: &BencodeValue) -> BencodeResult<Self> {
        let dict = value.as_dict()?;
        let mut response = TrackerResponse::default();
        if let Some(BencodeValue::Integer(interval)) = dict.get(b"interval".as_slice()) {
            response.interval = *interval;
        }
        if let Some(BencodeValue::String(peers)) = dict.get(b"peers".as_slice()) {
            response.peers = peers.clone();
        }
        Ok(response)
    }
}

/// Generates this client's 20-byte peer id: a fixed client prefix plus
/// random tail, regenerated per run.
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    let prefix = b"-RD0001-";
    peer_id[..prefix.len()].copy_from_slice(prefix);
    let mut rng = rand::rng();
    rng.fill(&mut peer_id[prefix.len()..]);
    peer_id
}

/// Announces to the tracker and returns the peers it advertises.
///
/// Sends a single GET with `compact=1` and a 15 second total timeout, then
/// decodes the bencode body and expands the compact peer string.
#[instrument(skip_all, fields(announce = %torrent.announce))]
pub async fn find_peers(torrent: &TorrentFile, peer_id: &[u8; 20]) -> TrackerResult<Vec<PeerInfo>> {
    let announce_url = build_announce_url(torrent, peer_id)?;
    debug!(url = %announce_url, "announcing to tracker");

    let client = reqwest::Client::builder()
        .timeout(ANNOUNCE_TIMEOUT)
        .build()?;
    let body = client.get(&announce_url).send().await?.bytes().await?;

    let document = bencode::decoder::decode(&body[..])?;
    let response = TrackerResponse::from_bencode(&document)?;
    debug!(interval = response.interval, "tracker answered");
    parse_compact_peers(&response.peers)
}

/// Builds the announce URL.
///
/// `info_hash` and `peer_id` carry raw bytes, so they are percent-encoded
/// by hand and appended to the finished query string; routing them through
/// the URL library's query builder would escape the percent signs a second
/// time.
fn build_announce_url(torrent: &TorrentFile, peer_id: &[u8; 20]) -> TrackerResult<String> {
    let mut url = url::Url::parse(&torrent.announce)?;
    url.query_pairs_mut()
        .append_pair("port", &PEER_PORT.to_string())
        .append_pair("uploaded", "0")
        .append_pair("downloaded", "0")
        .append_pair("compact", "1")
        .append_pair("left", &torrent.length.to_string())
        .finish();

    let mut announce_url = url.to_string();
    announce_url.push_str("&info_hash=");
    announce_url.push_str(&url_encode(&torrent.info_hash));
    announce_url.push_str("&peer_id=");
    announce_url.push_str(&url_encode(peer_id));
    Ok(announce_url)
}

/// Percent-encodes raw bytes per RFC 3986: unreserved characters pass
/// through, everything else becomes `%XX`.
fn url_encode(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 3);
    for &byte in bytes {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    encoded
}

/// Expands the compact peer string into addresses.
fn parse_compact_peers(peers: &[u8]) -> TrackerResult<Vec<PeerInfo>> {
    if peers.len() % PEER_RECORD_LEN != 0 {
        return Err(TrackerError::MalformedPeers);
    }
    Ok(peers
        .chunks_exact(PEER_RECORD_LEN)
        .map(|record| PeerInfo {
            ip: Ipv4Addr::new(record[0], record[1], record[2], record[3]),
            port: u16::from_be_bytes([record[4], record[5]]),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_torrent() -> TorrentFile {
        TorrentFile {
            announce: "http://tracker.test:6969/announce".to_string(),
            info_hash: *b"\x12\x34\xab\xcd\xef binary hash!!!",
            name: "a".to_string(),
            length: 1234,
            piece_length: 512,
            piece_hashes: vec![[0u8; 20]; 3],
        }
    }

    #[test]
    fn peer_id_has_client_prefix_and_full_length() {
        let peer_id = generate_peer_id();
        assert_eq!(&peer_id[..8], b"-RD0001-");
        assert_eq!(peer_id.len(), 20);
    }

    #[test]
    fn url_encode_passes_unreserved_and_escapes_the_rest() {
        assert_eq!(url_encode(b"AZaz09-._~"), "AZaz09-._~");
        assert_eq!(url_encode(&[0x00, 0xff, b' ']), "%00%FF%20");
    }

    #[test]
    fn announce_url_carries_all_parameters() {
        let torrent = sample_torrent();
        let peer_id = *b"-RD0001-qrstuvwxyz01";
        let announce_url = build_announce_url(&torrent, &peer_id).unwrap();

        assert!(announce_url.starts_with("http://tracker.test:6969/announce?"));
        assert!(announce_url.contains("port=6666"));
        assert!(announce_url.contains("uploaded=0"));
        assert!(announce_url.contains("downloaded=0"));
        assert!(announce_url.contains("compact=1"));
        assert!(announce_url.contains("left=1234"));
        // raw-byte percent encoding, not hex of the digest
        assert!(announce_url.contains("info_hash=%124%AB%CD%EF%20binary%20hash%21%21%21"));
        assert!(announce_url.contains("peer_id=-RD0001-qrstuvwxyz01"));
    }

    #[test]
    fn compact_peers_expand_with_big_endian_ports() {
        let blob = [
            127, 0, 0, 1, 0x1a, 0xe1, // 127.0.0.1:6881
            10, 0, 0, 2, 0x00, 0x50, // 10.0.0.2:80
        ];
        let peers = parse_compact_peers(&blob).unwrap();
        assert_eq!(
            peers,
            vec![
                PeerInfo { ip: Ipv4Addr::new(127, 0, 0, 1), port: 6881 },
                PeerInfo { ip: Ipv4Addr::new(10, 0, 0, 2), port: 80 },
            ]
        );
    }

    #[test]
    fn truncated_peer_blob_is_malformed() {
        assert!(matches!(
            parse_compact_peers(&[127, 0, 0, 1, 0x1a]),
            Err(TrackerError::MalformedPeers)
        ));
    }

    #[test]
    fn tracker_response_binds_from_bencode() {
        let mut body = Vec::new();
        body.extend_from_slice(b"d8:intervali1800e5:peers6:");
        body.extend_from_slice(&[127, 0, 0, 1, 0x1a, 0xe1]);
        body.extend_from_slice(b"e");

        let document = bencode::decoder::decode(&body[..]).unwrap();
        let response = TrackerResponse::from_bencode(&document).unwrap();
        assert_eq!(response.interval, 1800);
        assert_eq!(response.peers, vec![127, 0, 0, 1, 0x1a, 0xe1]);
    }
}
