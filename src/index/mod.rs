//! Single-file trigram index: building, reading and re-indexing.

pub mod build;
pub mod indexer;
pub mod reader;
pub mod types;
pub mod writer;

pub use build::{BuildSummary, build_index};
pub use indexer::{CommandIndexer, InProcessIndexer, Indexer};
pub use reader::TrigramIndex;
pub use types::*;
pub use writer::IndexWriter;
