//! Utility functions shared across leap.
//!
//! ## Modules
//!
//! - [`encoding`] - Variable-length integer and delta encoding for posting lists
//! - [`trigram`] - 3-byte sequence extraction for indexing
//! - [`config`] - Per-user project configuration (`~/.leaprc`)
//! - [`logging`] - Log file setup and rolling
//! - [`plumb`] - Encoded "jump to line" paths
//! - [`progress`] - Index build progress, when built with the `progress` feature
//!
//! ```no_run
//! use leap::utils::{encoded_to_plumb, extract_trigrams};
//!
//! let trigrams = extract_trigrams(b"hello world");
//! assert_eq!(encoded_to_plumb("/tmp/.leaping/glenda:5/src/main.rs"), "/src/main.rs:5");
//! ```

pub mod config;
pub mod encoding;
pub mod logging;
pub mod plumb;
pub mod progress;
pub mod trigram;

pub use encoding::*;
pub use plumb::{encoded_to_file, encoded_to_number, encoded_to_plumb};
pub use trigram::*;
