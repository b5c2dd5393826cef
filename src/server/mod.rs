//! Remote leap server and its clients
//!
//! A server keeps its project's index open for warm queries, confirms
//! content matches for clients that only hold a synced copy of the index,
//! and serves that index file to them as a block-level delta.
//!
//! Architecture:
//! - `leap serve`: [`daemon::LeapServer`] on a TCP listener, a thread per connection
//! - Client: [`LeapClient`] sends one request at a time and waits for the reply
//! - Sync: [`transfer::reindex_and_transfer`] drives the server through one session

mod client;
pub mod daemon;
pub mod protocol;
pub mod remote;
pub mod transfer;

pub use client::LeapClient;
pub use daemon::{LeapServer, ServerConfig};
pub use remote::RemoteContentSearcher;
pub use transfer::{TransferSummary, TransferTarget, reindex_and_transfer};

/// Port a server listens on when the address names none
pub const DEFAULT_PORT: u16 = 1234;

/// Append [`DEFAULT_PORT`] to a bare host name
pub fn with_default_port(host: &str) -> String {
    let bare = !host.contains(':') || (host.starts_with('[') && host.ends_with(']'));
    if bare {
        format!("{}:{}", host, DEFAULT_PORT)
    } else {
        host.to_string()
    }
}
