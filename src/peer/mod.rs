//! Peer wire protocol: handshake, framed messages, and the per-connection
//! state machine.

use thiserror::Error;

pub mod connection;
pub mod handshake;
pub mod message;

pub use connection::PeerConnection;
pub use handshake::Handshake;
pub use message::{Message, MessageId};

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake info hash mismatch")]
    HandshakeMismatch,

    #[error("unexpected message id {0}")]
    UnexpectedMessage(u8),

    #[error("message frame too short")]
    FrameTooShort,

    #[error("piece index mismatch: expected {expected}, got {got}")]
    IndexMismatch { expected: u32, got: u32 },

    #[error("piece block outside the piece buffer")]
    BlockOutOfRange,

    #[error("peer timed out")]
    Timeout,
}

pub type PeerResult<T> = std::result::Result<T, PeerError>;
