//! Provider gateway abstraction.
//!
//! The resolver treats providers as four capabilities: check availability,
//! add content, list/poll downloads, get a direct link.

mod qbittorrent;
mod types;

pub use qbittorrent::QBittorrentGateway;
pub use types::*;
