//! One live peer connection: dial, handshake, mandatory bitfield, then a
//! framed message stream with choke state.

use crate::peer::handshake::Handshake;
use crate::peer::message::{Message, MessageId};
use crate::peer::{PeerError, PeerResult};
use crate::torrent::bitfield::Bitfield;
use crate::tracker::PeerInfo;

use std::net::SocketAddrV4;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
const BITFIELD_TIMEOUT: Duration = Duration::from_secs(5);

/// A peer connection after a completed handshake and initial bitfield.
///
/// Owned by exactly one download worker; nothing here is shared.
#[derive(Debug)]
pub struct PeerConnection {
    stream: TcpStream,
    pub peer: PeerInfo,
    /// Peers start out choking us; only CHOKE/UNCHOKE flip this.
    pub choked: bool,
    pub bitfield: Bitfield,
}

impl PeerConnection {
    /// Dials the peer and runs the connection preamble: handshake exchange,
    /// info-hash check, then the mandatory first BITFIELD.
    ///
    /// Each stage runs under its own deadline (dial 5 s, handshake 3 s,
    /// bitfield 5 s); expiry surfaces as [`PeerError::Timeout`].
    #[instrument(skip(info_hash, peer_id), level = "debug")]
    pub async fn connect(
        peer: PeerInfo,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
    ) -> PeerResult<Self> {
        let addr = SocketAddrV4::new(peer.ip, peer.port);
        let stream = timeout(DIAL_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| PeerError::Timeout)??;

        let mut conn = Self {
            stream,
            peer,
            choked: true,
            bitfield: Bitfield::default(),
        };

        timeout(
            HANDSHAKE_TIMEOUT,
            conn.exchange_handshake(info_hash, peer_id),
        )
        .await
        .map_err(|_| PeerError::Timeout)??;

        timeout(BITFIELD_TIMEOUT, conn.recv_bitfield())
            .await
            .map_err(|_| PeerError::Timeout)??;

        debug!(peer = %conn.peer, "peer connection established");
        Ok(conn)
    }

    async fn exchange_handshake(
        &mut self,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
    ) -> PeerResult<()> {
        let ours = Handshake::new(info_hash, peer_id);
        self.stream.write_all(&ours.serialize()).await?;

        let theirs = Handshake::read(&mut self.stream).await?;
        if theirs.info_hash != info_hash {
            // the peer is serving a different torrent
            return Err(PeerError::HandshakeMismatch);
        }
        Ok(())
    }

    /// Waits for the peer's initial BITFIELD.
    ///
    /// The protocol requires it as the first real message; keep-alives may
    /// precede it, anything else rejects the peer.
    async fn recv_bitfield(&mut self) -> PeerResult<()> {
        loop {
            match Message::read(&mut self.stream).await? {
                None => continue,
                Some(message) if message.id == MessageId::Bitfield => {
                    self.bitfield = Bitfield::from_bytes(message.payload);
                    return Ok(());
                }
                Some(message) => {
                    return Err(PeerError::UnexpectedMessage(message.id as u8));
                }
            }
        }
    }

    /// Reads one message; `None` is a keep-alive.
    pub async fn read_message(&mut self) -> PeerResult<Option<Message>> {
        Message::read(&mut self.stream).await
    }

    pub async fn send_message(&mut self, message: &Message) -> PeerResult<()> {
        message.write(&mut self.stream).await
    }

    pub fn has_piece(&self, index: usize) -> bool {
        self.bitfield.has_piece(index)
    }
}
