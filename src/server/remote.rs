//! Content confirmation delegated to a leap server.

use crate::error::{LeapError, Result};
use crate::index::FileId;
use crate::output::ResultEntry;
use crate::query::ContentResolver;
use crate::server::client::LeapClient;
use crate::server::protocol::ContentSearchResultArgs;
use regex::bytes::Regex;
use std::sync::{Mutex, PoisonError};

/// Resolves content matches by asking a server to scan its copy of the
/// indexed files.
///
/// File ids come from the local copy of the index, which must be a synced
/// copy of `remote_index` on the server.
pub struct RemoteContentSearcher {
    client: Mutex<LeapClient>,
    remote_index: String,
    prefixes: Option<Vec<String>>,
}

impl RemoteContentSearcher {
    pub fn new(client: LeapClient, remote_index: impl Into<String>, prefixes: Option<Vec<String>>) -> Self {
        Self {
            client: Mutex::new(client),
            remote_index: remote_index.into(),
            prefixes,
        }
    }
}

impl ContentResolver for RemoteContentSearcher {
    fn content_search_result(&self, file_ids: &[FileId], _re: &Regex, pattern: &str) -> Result<Vec<ResultEntry>> {
        let args = ContentSearchResultArgs {
            fnames: file_ids.to_vec(),
            suffix: pattern.to_string(),
            prefixes: self.prefixes.clone(),
            remoteindex: self.remote_index.clone(),
        };
        let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        client.remote_content_search(args).map_err(|e| match e {
            LeapError::RemoteUnavailable(m) => {
                LeapError::RemoteUnavailable(format!("remote content search on {}: {}", self.remote_index, m))
            }
            other => other,
        })
    }
}
