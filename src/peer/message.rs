//! Post-handshake message framing and the message catalog.
//!
//! Every message is `[4-byte big-endian length][payload]`; a zero length
//! is a keep-alive carrying nothing. In a non-empty frame the first
//! payload byte is the message id and the rest is the typed body.

use crate::peer::{PeerError, PeerResult};

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a frame body. The largest legitimate frame is a PIECE
/// carrying one 16 KiB block plus its 9-byte header; bitfields for any
/// plausible piece count also fit well below this.
const MAX_FRAME_LEN: usize = 1 << 16;

/// Message ids of the peer wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = PeerError;

    fn try_from(value: u8) -> PeerResult<Self> {
        use MessageId::*;
        match value {
            0 => Ok(Choke),
            1 => Ok(Unchoke),
            2 => Ok(Interested),
            3 => Ok(NotInterested),
            4 => Ok(Have),
            5 => Ok(Bitfield),
            6 => Ok(Request),
            7 => Ok(Piece),
            8 => Ok(Cancel),
            other => Err(PeerError::UnexpectedMessage(other)),
        }
    }
}

/// One framed peer message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn interested() -> Self {
        Self {
            id: MessageId::Interested,
            payload: Vec::new(),
        }
    }

    /// Builds a REQUEST for `length` bytes of piece `index` starting at
    /// offset `begin`.
    pub fn request(index: u32, begin: u32, length: u32) -> Self {
        let mut payload = BytesMut::with_capacity(12);
        payload.put_u32(index);
        payload.put_u32(begin);
        payload.put_u32(length);
        Self {
            id: MessageId::Request,
            payload: payload.to_vec(),
        }
    }

    /// Serializes the message with its length prefix.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(4 + 1 + self.payload.len());
        buf.put_u32(self.payload.len() as u32 + 1);
        buf.put_u8(self.id as u8);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    /// Reads one frame from the stream.
    ///
    /// Returns `None` for a keep-alive (length prefix zero). An id outside
    /// the catalog fails with `UnexpectedMessage`.
    pub async fn read<R>(stream: &mut R) -> PeerResult<Option<Message>>
    where
        R: AsyncRead + Unpin,
    {
        let mut length_buf = [0u8; 4];
        stream.read_exact(&mut length_buf).await?;
        let length = u32::from_be_bytes(length_buf) as usize;
        if length == 0 {
            return Ok(None);
        }
        if length > MAX_FRAME_LEN {
            return Err(PeerError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame of length {length} is too large"),
            )));
        }
        let mut frame = vec![0u8; length];
        stream.read_exact(&mut frame).await?;
        let id = MessageId::try_from(frame[0])?;
        Ok(Some(Message {
            id,
            payload: frame[1..].to_vec(),
        }))
    }

    /// Writes the framed message to the stream.
    pub async fn write<W>(&self, stream: &mut W) -> PeerResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        stream.write_all(&self.serialize()).await?;
        Ok(())
    }

    /// Extracts the piece index from a HAVE body.
    pub fn have_index(&self) -> PeerResult<u32> {
        if self.payload.len() != 4 {
            return Err(PeerError::FrameTooShort);
        }
        Ok(BigEndian::read_u32(&self.payload))
    }

    /// Copies the block carried by a PIECE body into the piece buffer at
    /// the offset the payload declares, returning the block length.
    ///
    /// Blocks may arrive in any order, so placement trusts only the
    /// payload's own `begin` field. The declared index must match the
    /// piece being downloaded and the block must land inside the buffer.
    pub fn copy_piece_block(&self, index: u32, buf: &mut [u8]) -> PeerResult<usize> {
        if self.payload.len() < 8 {
            return Err(PeerError::FrameTooShort);
        }
        let got = BigEndian::read_u32(&self.payload[0..4]);
        if got != index {
            return Err(PeerError::IndexMismatch {
                expected: index,
                got,
            });
        }
        let begin = BigEndian::read_u32(&self.payload[4..8]) as usize;
        let block = &self.payload[8..];
        if begin + block.len() > buf.len() {
            return Err(PeerError::BlockOutOfRange);
        }
        buf[begin..begin + block.len()].copy_from_slice(block);
        Ok(block.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keep_alive_reads_as_none() {
        let mut stream = &[0u8, 0, 0, 0][..];
        assert_eq!(Message::read(&mut stream).await.unwrap(), None);
    }

    #[tokio::test]
    async fn frame_round_trip() {
        let message = Message::request(3, 16384, 16384);
        let bytes = message.serialize();
        assert_eq!(bytes[..4], [0, 0, 0, 13]);
        assert_eq!(bytes[4], MessageId::Request as u8);

        let mut stream = &bytes[..];
        let read_back = Message::read(&mut stream).await.unwrap().unwrap();
        assert_eq!(read_back, message);
    }

    #[tokio::test]
    async fn unknown_id_is_rejected() {
        let mut stream = &[0u8, 0, 0, 1, 42][..];
        assert!(matches!(
            Message::read(&mut stream).await,
            Err(PeerError::UnexpectedMessage(42))
        ));
    }

    #[test]
    fn request_body_is_big_endian() {
        let message = Message::request(1, 2, 3);
        assert_eq!(
            message.payload,
            [0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3]
        );
    }

    #[test]
    fn have_index_parses_and_validates_length() {
        let have = Message {
            id: MessageId::Have,
            payload: vec![0, 0, 0, 9],
        };
        assert_eq!(have.have_index().unwrap(), 9);

        let short = Message {
            id: MessageId::Have,
            payload: vec![0, 0, 9],
        };
        assert!(matches!(short.have_index(), Err(PeerError::FrameTooShort)));
    }

    #[test]
    fn piece_block_lands_at_declared_offset() {
        let mut payload = vec![0, 0, 0, 2, 0, 0, 0, 4];
        payload.extend_from_slice(b"data");
        let piece = Message {
            id: MessageId::Piece,
            payload,
        };

        let mut buf = vec![0u8; 10];
        assert_eq!(piece.copy_piece_block(2, &mut buf).unwrap(), 4);
        assert_eq!(&buf[4..8], b"data");
    }

    #[test]
    fn piece_block_index_mismatch() {
        let piece = Message {
            id: MessageId::Piece,
            payload: vec![0, 0, 0, 7, 0, 0, 0, 0, 1],
        };
        let mut buf = vec![0u8; 4];
        assert!(matches!(
            piece.copy_piece_block(2, &mut buf),
            Err(PeerError::IndexMismatch { expected: 2, got: 7 })
        ));
    }

    #[test]
    fn piece_block_outside_buffer() {
        let mut payload = vec![0, 0, 0, 0, 0, 0, 0, 8];
        payload.extend_from_slice(b"data");
        let piece = Message {
            id: MessageId::Piece,
            payload,
        };
        let mut buf = vec![0u8; 10];
        assert!(matches!(
            piece.copy_piece_block(0, &mut buf),
            Err(PeerError::BlockOutOfRange)
        ));
    }

    #[test]
    fn truncated_piece_body() {
        let piece = Message {
            id: MessageId::Piece,
            payload: vec![0, 0, 0, 0, 0, 0],
        };
        let mut buf = vec![0u8; 4];
        assert!(matches!(
            piece.copy_piece_block(0, &mut buf),
            Err(PeerError::FrameTooShort)
        ));
    }
}
