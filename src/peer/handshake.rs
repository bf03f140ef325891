//! The BitTorrent peer handshake.
//!
//! The handshake is the first exchange on a fresh peer connection. It
//! proves both sides speak the protocol and are talking about the same
//! torrent: a peer whose echoed info hash differs is serving something
//! else and the connection is useless.

use crate::peer::{PeerError, PeerResult};

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Wire size of a complete handshake.
pub const HANDSHAKE_LEN: usize = 68;

const PROTOCOL: &[u8; 19] = b"BitTorrent protocol";

/// A handshake message: fixed 68-byte layout of
/// `[pstrlen=19]["BitTorrent protocol"][8 reserved zero bytes][info_hash][peer_id]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self { info_hash, peer_id }
    }

    /// Serializes the handshake into its 68-byte wire form.
    pub fn serialize(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];
        buf[0] = PROTOCOL.len() as u8;
        buf[1..20].copy_from_slice(PROTOCOL);
        // bytes 20..28 stay zero: reserved extension bits
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    /// Reads and validates the peer's handshake from the stream.
    ///
    /// Fails with `HandshakeMismatch` when the protocol header is not the
    /// one we speak; the info hash is left for the caller to compare.
    pub async fn read(stream: &mut TcpStream) -> PeerResult<Self> {
        let mut buf = [0u8; HANDSHAKE_LEN];
        stream.read_exact(&mut buf).await?;
        Self::parse(&buf)
    }

    /// Parses a 68-byte handshake buffer.
    pub fn parse(buf: &[u8; HANDSHAKE_LEN]) -> PeerResult<Self> {
        if buf[0] as usize != PROTOCOL.len() || &buf[1..20] != PROTOCOL {
            return Err(PeerError::HandshakeMismatch);
        }
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[48..68]);
        Ok(Self { info_hash, peer_id })
    }
}
