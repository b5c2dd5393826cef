//! Wire contract between leap clients and a leap server.
//!
//! Uses a simple length-prefixed JSON protocol:
//! - 4 bytes (little-endian u32): message length
//! - N bytes: JSON-encoded message
//!
//! Raw bytes (file ranges, indexer output, strong checksums) travel as base64
//! strings.

use crate::error::LeapError;
use crate::output::ResultEntry;
use crate::sync::ChecksumIndex;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Messages larger than this are refused
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// A complete query run on the server against its current project
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryBundle {
    #[serde(rename = "fn")]
    pub fnames: Vec<String>,
    pub stype: String,
    pub suffix: String,
}

/// Content confirmation for file ids from the server's copy of the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSearchResultArgs {
    pub fnames: Vec<u32>,
    /// Content regexp source, already carrying its `(?m)` flag
    pub suffix: String,
    pub prefixes: Option<Vec<String>>,
    pub remoteindex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAndBuildChecksumIndexArgs {
    pub token: u64,
    pub remote_project_name: String,
    /// Index file on the server
    pub remote_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoRequestArgs {
    pub start: u64,
    pub end: u64,
    pub token: u64,
}

/// Checksum manifest of a freshly built server index. Each block carries its
/// strong checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCheckSumIndexData {
    #[serde(with = "crate::utils::encoding::base64_bytes")]
    pub cindex_output: Vec<u8>,
    pub file_size: u64,
    pub reference_file_index: ChecksumIndex,
}

/// Request from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Leap(QueryBundle),
    RemoteContentSearchResult(ContentSearchResultArgs),
    IndexAndBuildChecksumIndex(IndexAndBuildChecksumIndexArgs),
    DoRequestOnServer(DoRequestArgs),
    /// Close the sync session opened with `token`
    FinishSync { token: u64 },
    /// Graceful shutdown request
    Shutdown,
    /// Ping for connection testing
    Ping { greeting: String },
}

/// Error category carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireErrorKind {
    InvalidPattern,
    TokenMismatch,
    Index,
    Other,
}

/// Response from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    QueryResult { entries: Vec<ResultEntry> },
    ContentSearchResult { entries: Vec<ResultEntry> },
    ChecksumIndex(RemoteCheckSumIndexData),
    Bytes {
        #[serde(with = "crate::utils::encoding::base64_bytes")]
        data: Vec<u8>,
    },
    SyncFinished,
    /// Shutdown acknowledged
    ShuttingDown,
    Pong { reply: String },
    Error { kind: WireErrorKind, message: String },
}

impl Response {
    /// Encode a failure for the wire
    pub fn from_error(err: &LeapError) -> Self {
        let kind = match err {
            LeapError::InvalidPattern { .. } => WireErrorKind::InvalidPattern,
            LeapError::TokenMismatch(_) => WireErrorKind::TokenMismatch,
            LeapError::IndexUnreadable { .. } => WireErrorKind::Index,
            _ => WireErrorKind::Other,
        };
        let message = match err {
            LeapError::TokenMismatch(m) => m.clone(),
            other => other.to_string(),
        };
        Response::Error { kind, message }
    }
}

/// Decode a wire failure back into a [`LeapError`]
pub fn wire_error(kind: WireErrorKind, message: String) -> LeapError {
    match kind {
        WireErrorKind::InvalidPattern => LeapError::InvalidPattern {
            pattern: String::new(),
            reason: message,
        },
        WireErrorKind::TokenMismatch => LeapError::TokenMismatch(message),
        WireErrorKind::Index | WireErrorKind::Other => LeapError::Remote(message),
    }
}

/// Write a message to a stream with length prefix
pub fn write_message<W: Write>(writer: &mut W, msg: &impl Serialize) -> std::io::Result<()> {
    let json = serde_json::to_vec(msg).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "Message too large"));
    }

    let len = json.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&json)?;
    writer.flush()?;

    Ok(())
}

/// Read a message from a stream with length prefix
pub fn read_message<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> std::io::Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "Message too large"));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    serde_json::from_slice(&buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
