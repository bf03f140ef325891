use anyhow::Context;
use clap::Parser;
use rs_torrent_dl::download;
use rs_torrent_dl::torrent::file::TorrentFile;
use rs_torrent_dl::tracker;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Single-file BitTorrent downloader.
#[derive(Debug, Parser)]
#[command(name = "rstd", version)]
struct Args {
    /// Path to the .torrent metainfo file.
    torrent: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let file = File::open(&args.torrent)
        .with_context(|| format!("open {}", args.torrent.display()))?;
    let torrent = TorrentFile::parse(BufReader::new(file)).context("parse torrent file")?;
    info!(
        "loaded {} ({} bytes, info hash {})",
        torrent.name,
        torrent.length,
        hex::encode(torrent.info_hash)
    );

    let peer_id = tracker::generate_peer_id();
    let peers = tracker::find_peers(&torrent, &peer_id)
        .await
        .context("announce to tracker")?;
    if peers.is_empty() {
        anyhow::bail!("tracker returned no peers");
    }
    info!("tracker returned {} peers", peers.len());

    download::download_to_file(&torrent, &peers, peer_id)
        .await
        .context("download failed")?;
    Ok(())
}
