//! # leap - fuzzy file and content search over a trigram index
//!
//! leap answers launcher-style queries (`path`, `path:line`, `path:/regexp`)
//! against a single-file trigram index, either locally or through a leap
//! server, and keeps a local copy of a server's index current with a
//! block-level delta transfer.
//!
//! ## Architecture
//!
//! - [`index`] - Index building, reading and re-indexing
//! - [`query`] - Query parsing, trigram planning, name matching and content scanning
//! - [`sync`] - Rolling/strong checksums and the block patcher
//! - [`server`] - Wire protocol, server, client, remote content search and index transfer
//! - [`output`] - Result entries (Alfred JSON and terminal listing)
//! - [`utils`] - Encoding, trigrams, configuration, logging, encoded paths
//!
//! ## Quick Start
//!
//! ```ignore
//! use leap::query::{QueryEngine, parse};
//! use std::path::Path;
//!
//! let engine = QueryEngine::open(Path::new("/home/gopher/.leapindex"), None)?;
//! let parsed = parse("ma:/fn main");
//! let entries = engine.query(&parsed.patterns, parsed.query_type, &[parsed.suffix], &engine)?;
//!
//! for entry in entries {
//!     println!("{}", entry.subtitle);
//! }
//! ```

pub mod error;
pub mod index;
pub mod output;
pub mod query;
pub mod server;
pub mod sync;
pub mod utils;

pub use error::{LeapError, Result};
