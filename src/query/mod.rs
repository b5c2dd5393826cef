//! Query pipeline: input parsing, posting-list planning, name filtering and
//! ranking, and content confirmation.

pub mod engine;
pub mod parser;
pub mod planner;
pub mod scanner;
pub mod trimmer;

/// Upper bound on entries returned by one query
pub const MAXIMUM_MATCHES: usize = 50;

pub use engine::{ContentResolver, QueryEngine};
pub use parser::{ParsedQuery, QueryType, parse};
pub use planner::regexp_query;
pub use trimmer::PathTrimmer;
