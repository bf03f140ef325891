//! Piece scheduler and downloader.
//!
//! One worker per announced peer pulls piece tasks off a shared queue,
//! pipelines block requests over its own connection, verifies each piece
//! against its digest and hands the bytes to the aggregator. Failed or
//! mismatched pieces go back on the queue for another worker; a failing
//! peer only ever takes its own worker down.

use crate::peer::message::{Message, MessageId};
use crate::peer::{PeerConnection, PeerError, PeerResult};
use crate::torrent::file::{TorrentFile, SHA_LEN};
use crate::tracker::PeerInfo;

use kanal::{AsyncReceiver, AsyncSender};
use sha1::{Digest, Sha1};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Size of one REQUESTed block. Every block but a piece's last has exactly
/// this length.
pub const BLOCK_SIZE: usize = 16384;

/// Maximum REQUESTs in flight per piece.
pub const MAX_BACKLOG: usize = 5;

/// Wall-clock deadline for downloading a single piece from a single peer.
const PIECE_DEADLINE: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("piece {0} failed its checksum")]
    PieceChecksumMismatch(usize),

    #[error("all peers disconnected before the download finished")]
    NoPeersLeft,

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// One piece waiting to be downloaded. Recycled unchanged on failure.
#[derive(Debug, Clone)]
struct PieceTask {
    index: usize,
    expected_sha: [u8; SHA_LEN],
    length: usize,
}

/// One verified piece on its way to the aggregator. The buffer moves with
/// it; nothing else ever aliases these bytes.
#[derive(Debug)]
struct PieceResult {
    index: usize,
    data: Vec<u8>,
}

/// In-flight state for one piece on one connection.
///
/// Rebuilt from scratch for every attempt: a recycled task starts over
/// with zeroed counters and a fresh buffer.
struct PieceProgress<'a> {
    conn: &'a mut PeerConnection,
    index: usize,
    requested: usize,
    downloaded: usize,
    backlog: usize,
    buf: Vec<u8>,
}

impl PieceProgress<'_> {
    /// Reads one message and folds it into the piece state. Keep-alives
    /// and catalog messages we never asked for fall through silently.
    async fn handle_message(&mut self) -> PeerResult<()> {
        let Some(message) = self.conn.read_message().await? else {
            return Ok(());
        };
        match message.id {
            MessageId::Choke => self.conn.choked = true,
            MessageId::Unchoke => self.conn.choked = false,
            MessageId::Have => {
                let index = message.have_index()?;
                self.conn.bitfield.set_piece(index as usize);
            }
            MessageId::Piece => {
                let n = message.copy_piece_block(self.index as u32, &mut self.buf)?;
                self.downloaded += n;
                self.backlog = self.backlog.saturating_sub(1);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Downloads one piece over an established connection.
///
/// While unchoked, keeps up to [`MAX_BACKLOG`] REQUESTs in flight, each for
/// a [`BLOCK_SIZE`] block (the piece's final block may be shorter). Blocks
/// are placed at the offsets their PIECE payloads declare, so out-of-order
/// delivery assembles correctly.
async fn download_piece(conn: &mut PeerConnection, task: &PieceTask) -> PeerResult<Vec<u8>> {
    let mut state = PieceProgress {
        conn,
        index: task.index,
        requested: 0,
        downloaded: 0,
        backlog: 0,
        buf: vec![0u8; task.length],
    };

    while state.downloaded < task.length {
        if !state.conn.choked {
            while state.backlog < MAX_BACKLOG && state.requested < task.length {
                let block_len = BLOCK_SIZE.min(task.length - state.requested);
                let request = Message::request(
                    task.index as u32,
                    state.requested as u32,
                    block_len as u32,
                );
                state.conn.send_message(&request).await?;
                state.backlog += 1;
                state.requested += block_len;
            }
        }
        state.handle_message().await?;
    }

    Ok(state.buf)
}

fn verify_piece(task: &PieceTask, data: &[u8]) -> bool {
    let digest: [u8; SHA_LEN] = Sha1::digest(data).into();
    digest == task.expected_sha
}

/// One attempt at one piece: download under the piece deadline, then
/// verify the digest.
async fn attempt_piece(conn: &mut PeerConnection, task: &PieceTask) -> DownloadResult<Vec<u8>> {
    let data = timeout(PIECE_DEADLINE, download_piece(conn, task))
        .await
        .map_err(|_| PeerError::Timeout)??;
    if !verify_piece(task, &data) {
        return Err(DownloadError::PieceChecksumMismatch(task.index));
    }
    Ok(data)
}

/// One worker per peer: connect, declare interest, then drain the task
/// queue.
///
/// Tasks the peer cannot serve (missing bit) or fails to deliver go back
/// on the queue. Connection-level errors and piece deadlines end the
/// worker; a checksum mismatch only recycles the piece.
#[instrument(skip_all, fields(peer = %peer))]
async fn peer_worker(
    peer: PeerInfo,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    task_tx: AsyncSender<PieceTask>,
    task_rx: AsyncReceiver<PieceTask>,
    result_tx: mpsc::Sender<PieceResult>,
) {
    let mut conn = match PeerConnection::connect(peer, info_hash, peer_id).await {
        Ok(conn) => conn,
        Err(err) => {
            warn!("failed to connect: {err}");
            return;
        }
    };

    if let Err(err) = conn.send_message(&Message::interested()).await {
        warn!("failed to send interested: {err}");
        return;
    }

    while let Ok(task) = task_rx.recv().await {
        if !conn.has_piece(task.index) {
            if task_tx.send(task).await.is_err() {
                break;
            }
            continue;
        }

        debug!(piece = task.index, "picked up piece");
        let data = match attempt_piece(&mut conn, &task).await {
            Ok(data) => data,
            Err(err @ DownloadError::PieceChecksumMismatch(_)) => {
                // bad data from an otherwise working peer: recycle the
                // piece, keep the connection
                warn!("recycling piece: {err}");
                if task_tx.send(task).await.is_err() {
                    break;
                }
                continue;
            }
            Err(err) => {
                warn!(piece = task.index, "dropping peer: {err}");
                let _ = task_tx.send(task).await;
                return;
            }
        };

        if result_tx
            .send(PieceResult {
                index: task.index,
                data,
            })
            .await
            .is_err()
        {
            // aggregator is gone; nothing left to do
            break;
        }
    }
}

/// Downloads the whole file into memory.
///
/// Seeds the task queue with one task per piece, spawns a worker per peer
/// and aggregates verified pieces into a single buffer. Pieces arrive in
/// arbitrary order and land at `index * piece_length`.
///
/// Fails with [`DownloadError::NoPeersLeft`] if every worker exits while
/// pieces are still missing; no partial output escapes in that case.
#[instrument(skip_all, fields(name = %torrent.name, pieces = torrent.piece_count()))]
pub async fn download(
    torrent: &TorrentFile,
    peers: &[PeerInfo],
    peer_id: [u8; 20],
) -> DownloadResult<Vec<u8>> {
    info!("starting download of {}", torrent.name);
    let piece_count = torrent.piece_count();

    // capacity covers every piece, so seeding and recycling never block
    let (task_tx, task_rx) = kanal::bounded_async(piece_count);
    for (index, expected_sha) in torrent.piece_hashes.iter().enumerate() {
        let (begin, end) = torrent.piece_bounds(index);
        let task = PieceTask {
            index,
            expected_sha: *expected_sha,
            length: end - begin,
        };
        task_tx
            .send(task)
            .await
            .expect("task queue is open and sized for every piece");
    }

    let (result_tx, mut result_rx) = mpsc::channel(piece_count);
    for &peer in peers {
        tokio::spawn(peer_worker(
            peer,
            torrent.info_hash,
            peer_id,
            task_tx.clone(),
            task_rx.clone(),
            result_tx.clone(),
        ));
    }
    // workers hold the only remaining result senders: when all of them
    // exit, the stream ends and we know no progress is possible
    drop(result_tx);

    let mut buf = vec![0u8; torrent.length];
    let mut done = 0usize;
    while done < piece_count {
        let Some(result) = result_rx.recv().await else {
            task_rx.close();
            return Err(DownloadError::NoPeersLeft);
        };
        let (begin, end) = torrent.piece_bounds(result.index);
        buf[begin..end].copy_from_slice(&result.data);
        done += 1;
        let percent = done as f64 / piece_count as f64 * 100.0;
        info!("downloading, progress: {:.2}%", percent);
    }

    // drain idle workers blocked on the empty queue
    task_rx.close();
    Ok(buf)
}

/// Downloads the torrent and writes it to `name` in the current working
/// directory, overwriting any existing file. One sequential write, made
/// only after every piece has been verified.
pub async fn download_to_file(
    torrent: &TorrentFile,
    peers: &[PeerInfo],
    peer_id: [u8; 20],
) -> DownloadResult<()> {
    let data = download(torrent, peers, peer_id).await?;
    tokio::fs::write(&torrent.name, &data).await?;
    info!("wrote {} ({} bytes)", torrent.name, data.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(length: usize) -> PieceTask {
        PieceTask {
            index: 0,
            expected_sha: Sha1::digest(vec![0xabu8; length]).into(),
            length,
        }
    }

    #[test]
    fn verify_piece_accepts_matching_digest() {
        let task = task(100);
        assert!(verify_piece(&task, &vec![0xabu8; 100]));
    }

    #[test]
    fn verify_piece_rejects_flipped_bit() {
        let task = task(100);
        let mut data = vec![0xabu8; 100];
        data[50] ^= 0x01;
        assert!(!verify_piece(&task, &data));
    }

    #[test]
    fn block_sizes_cover_the_piece_exactly() {
        // mirrors the request loop's arithmetic for a short final block
        let length = BLOCK_SIZE * 2 + 5;
        let mut requested = 0;
        let mut blocks = Vec::new();
        while requested < length {
            let block_len = BLOCK_SIZE.min(length - requested);
            blocks.push(block_len);
            requested += block_len;
        }
        assert_eq!(blocks, vec![BLOCK_SIZE, BLOCK_SIZE, 5]);
        assert_eq!(blocks.iter().sum::<usize>(), length);
    }
}
