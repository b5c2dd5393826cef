//! Client for a leap server

use crate::error::{LeapError, Result};
use crate::output::ResultEntry;
use crate::server::protocol::{
    ContentSearchResultArgs, DoRequestArgs, IndexAndBuildChecksumIndexArgs, QueryBundle, RemoteCheckSumIndexData,
    Request, Response, read_message, wire_error, write_message,
};
use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

/// Delays between connection attempts
const RETRY_DELAYS: [Duration; 4] = [
    Duration::from_millis(1),
    Duration::from_millis(10),
    Duration::from_millis(100),
    Duration::from_millis(1000),
];

/// One connection to a leap server. Calls are sequential on the connection.
pub struct LeapClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl LeapClient {
    /// Connect once
    pub fn connect<A: ToSocketAddrs + std::fmt::Display>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(&addr)
            .map_err(|e| LeapError::RemoteUnavailable(format!("can't connect to {}: {}", addr, e)))?;
        let _ = stream.set_nodelay(true);
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        Ok(Self { reader, writer })
    }

    /// Connect, retrying with growing delays while the server comes up
    pub fn connect_with_retry(addr: &str) -> Result<Self> {
        let mut last = match Self::connect(addr) {
            Ok(client) => return Ok(client),
            Err(e) => e,
        };
        for delay in RETRY_DELAYS {
            thread::sleep(delay);
            match Self::connect(addr) {
                Ok(client) => return Ok(client),
                Err(e) => {
                    log::debug!("connect to {} failed, retrying: {}", addr, e);
                    last = e;
                }
            }
        }
        Err(last)
    }

    fn call(&mut self, request: &Request) -> Result<Response> {
        let transport = |e: std::io::Error| LeapError::RemoteUnavailable(e.to_string());
        write_message(&mut self.writer, request).map_err(transport)?;
        let response: Response = read_message(&mut self.reader).map_err(transport)?;
        match response {
            Response::Error { kind, message } => Err(wire_error(kind, message)),
            other => Ok(other),
        }
    }

    /// Run a whole query against the server's current project
    pub fn leap(&mut self, fnames: Vec<String>, stype: &str, suffix: impl Into<String>) -> Result<Vec<ResultEntry>> {
        let request = Request::Leap(QueryBundle {
            fnames,
            stype: stype.to_string(),
            suffix: suffix.into(),
        });
        match self.call(&request)? {
            Response::QueryResult { entries } => Ok(entries),
            other => Err(unexpected("QueryResult", &other)),
        }
    }

    pub fn remote_content_search(&mut self, args: ContentSearchResultArgs) -> Result<Vec<ResultEntry>> {
        match self.call(&Request::RemoteContentSearchResult(args))? {
            Response::ContentSearchResult { entries } => Ok(entries),
            other => Err(unexpected("ContentSearchResult", &other)),
        }
    }

    pub fn index_and_build_checksum_index(
        &mut self,
        args: IndexAndBuildChecksumIndexArgs,
    ) -> Result<RemoteCheckSumIndexData> {
        match self.call(&Request::IndexAndBuildChecksumIndex(args))? {
            Response::ChecksumIndex(data) => Ok(data),
            other => Err(unexpected("ChecksumIndex", &other)),
        }
    }

    pub fn do_request(&mut self, start: u64, end: u64, token: u64) -> Result<Vec<u8>> {
        match self.call(&Request::DoRequestOnServer(DoRequestArgs { start, end, token }))? {
            Response::Bytes { data } => Ok(data),
            other => Err(unexpected("Bytes", &other)),
        }
    }

    pub fn finish_sync(&mut self, token: u64) -> Result<()> {
        match self.call(&Request::FinishSync { token })? {
            Response::SyncFinished => Ok(()),
            other => Err(unexpected("SyncFinished", &other)),
        }
    }

    /// Request graceful shutdown
    pub fn shutdown(&mut self) -> Result<()> {
        match self.call(&Request::Shutdown)? {
            Response::ShuttingDown => Ok(()),
            other => Err(unexpected("ShuttingDown", &other)),
        }
    }

    /// Ping the server
    pub fn ping(&mut self, greeting: &str) -> Result<String> {
        let request = Request::Ping {
            greeting: greeting.to_string(),
        };
        match self.call(&request)? {
            Response::Pong { reply } => Ok(reply),
            other => Err(unexpected("Pong", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &Response) -> LeapError {
    LeapError::Protocol(format!("expected {} response, got {:?}", wanted, got))
}
