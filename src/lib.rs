//! Library root for rs-torrent-dl, a single-file BitTorrent downloader.
//!
//! The pipeline runs left to right: `bencode` parses the metainfo into a
//! `torrent::file::TorrentFile`, `tracker` turns its announce URL into a
//! peer list, and `download` drives one `peer` connection per worker until
//! every verified piece has landed.
pub mod bencode;
pub mod download;
pub mod peer;
pub mod torrent;
pub mod tracker;
