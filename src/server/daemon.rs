//! leap server
//!
//! Answers whole queries against its own project, confirms content matches
//! for remote clients, and serves delta-sync sessions for its index file.

use crate::error::{LeapError, Result};
use crate::index::Indexer;
use crate::output::ResultEntry;
use crate::query::{ContentResolver, QueryEngine, QueryType};
use crate::server::protocol::{
    ContentSearchResultArgs, DoRequestArgs, IndexAndBuildChecksumIndexArgs, QueryBundle, RemoteCheckSumIndexData,
    Request, Response, read_message, write_message,
};
use crate::sync::{BLOCK_SIZE, ChecksumIndex};
use crate::utils::plumb::JUMP_PREFIX;
use lru::LruCache;
use regex::bytes::Regex;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

/// LRU cache size for filename query results
const CACHE_SIZE: usize = 128;

/// Largest byte range served by one DoRequestOnServer
const MAX_BYTES_PER_REQUEST: u64 = 16 << 20;

/// What the server searches and how it rebuilds its index
pub struct ServerConfig {
    pub index_path: PathBuf,
    pub prefixes: Option<Vec<String>>,
    pub indexer: Box<dyn Indexer>,
    /// Where server-side content matches are copied
    pub jump_prefix: String,
    /// How long an unfinished sync session blocks other clients
    pub session_timeout: Duration,
}

impl ServerConfig {
    pub fn new(index_path: PathBuf, prefixes: Option<Vec<String>>, indexer: Box<dyn Indexer>) -> Self {
        Self {
            index_path,
            prefixes,
            indexer,
            jump_prefix: JUMP_PREFIX.to_string(),
            session_timeout: SESSION_IDLE_TIMEOUT,
        }
    }
}

/// Opened engine plus the file state it was opened from
struct SearchCache {
    engine: Option<Arc<QueryEngine>>,
    mtime: Option<SystemTime>,
    results: LruCache<QueryBundle, Vec<ResultEntry>>,
}

/// Idle time after which an open sync session may be taken over
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// The single delta-sync session a server allows at a time
#[derive(Default)]
struct SyncSession {
    /// Non-zero while a session is open
    token: u64,
    /// The index file the session's checksums were computed over
    file: Option<File>,
    /// Last request made in this session
    last_used: Option<Instant>,
    /// Bumped on every registration, so a reindex finishing late can tell
    /// whether its session was taken over
    generation: u64,
}

impl SyncSession {
    fn is_open(&self) -> bool {
        self.token != 0
    }

    fn idle_for(&self, timeout: Duration) -> bool {
        self.last_used.is_none_or(|t| t.elapsed() >= timeout)
    }

    fn close(&mut self) {
        self.token = 0;
        self.file = None;
        self.last_used = None;
    }
}

pub struct LeapServer {
    config: ServerConfig,
    cache: Mutex<SearchCache>,
    session: Mutex<SyncSession>,
    shutdown: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LeapServer {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            cache: Mutex::new(SearchCache {
                engine: None,
                mtime: None,
                results: LruCache::new(NonZeroUsize::new(CACHE_SIZE).unwrap_or(NonZeroUsize::MIN)),
            }),
            session: Mutex::new(SyncSession::default()),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Accept connections until a Shutdown request arrives (blocking)
    pub fn run(self: &Arc<Self>, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        log::info!("leap server listening on {}", addr);
        let mut wake = addr;
        if wake.ip().is_unspecified() {
            let loopback: IpAddr = if wake.is_ipv4() {
                Ipv4Addr::LOCALHOST.into()
            } else {
                Ipv6Addr::LOCALHOST.into()
            };
            wake.set_ip(loopback);
        }

        for stream in listener.incoming() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match stream {
                Ok(stream) => {
                    let server = Arc::clone(self);
                    thread::spawn(move || {
                        if let Err(e) = server.handle_connection(stream, wake) {
                            log::warn!("connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    log::warn!("accept error: {}", e);
                }
            }
        }

        log::info!("leap server on {} shut down", addr);
        Ok(())
    }

    /// Handle a single client connection
    fn handle_connection(&self, stream: TcpStream, wake: SocketAddr) -> Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);

        loop {
            let request: Request = match read_message(&mut reader) {
                Ok(req) => req,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    // Client disconnected
                    break;
                }
                Err(e) => {
                    let resp = Response::from_error(&LeapError::Protocol(format!("Invalid request: {}", e)));
                    write_message(&mut writer, &resp)?;
                    break;
                }
            };

            let response = self.handle_request(request);
            write_message(&mut writer, &response)?;

            if matches!(response, Response::ShuttingDown) {
                // Unblock the accept loop so it sees the flag.
                let _ = TcpStream::connect(wake);
                break;
            }
        }

        Ok(())
    }

    /// Handle a single request
    pub fn handle_request(&self, request: Request) -> Response {
        let start = Instant::now();
        let name = request_name(&request);
        let result = match request {
            Request::Leap(bundle) => self.leap(bundle).map(|entries| Response::QueryResult { entries }),
            Request::RemoteContentSearchResult(args) => self
                .remote_content_search(args)
                .map(|entries| Response::ContentSearchResult { entries }),
            Request::IndexAndBuildChecksumIndex(args) => {
                self.index_and_build_checksum_index(args).map(Response::ChecksumIndex)
            }
            Request::DoRequestOnServer(args) => self.do_request(args).map(|data| Response::Bytes { data }),
            Request::FinishSync { token } => self.finish_sync(token).map(|_| Response::SyncFinished),
            Request::Shutdown => {
                log::info!("shutdown requested");
                self.shutdown.store(true, Ordering::SeqCst);
                Ok(Response::ShuttingDown)
            }
            Request::Ping { greeting } => ping(&greeting).map(|reply| Response::Pong { reply }),
        };

        match result {
            Ok(response) => {
                log::debug!("{} took {:?}", name, start.elapsed());
                response
            }
            Err(e) => {
                log::warn!("{} failed: {}", name, e);
                Response::from_error(&e)
            }
        }
    }

    /// The engine for `index_path`/`prefixes`, reopened if the index file
    /// changed on disk or different settings are asked for.
    fn engine_for(&self, index_path: &Path, prefixes: Option<Vec<String>>) -> Result<Arc<QueryEngine>> {
        let mtime = fs::metadata(index_path)
            .and_then(|m| m.modified())
            .map_err(|e| LeapError::index_unreadable(index_path, e))?;

        let mut cache = lock(&self.cache);
        if let Some(engine) = &cache.engine
            && engine.index_path() == index_path
            && engine.prefixes() == prefixes.as_deref()
            && cache.mtime == Some(mtime)
        {
            return Ok(Arc::clone(engine));
        }

        log::info!("loading index {}", index_path.display());
        let engine = Arc::new(QueryEngine::open(index_path, prefixes)?.with_jump_prefix(self.config.jump_prefix.clone()));
        cache.engine = Some(Arc::clone(&engine));
        cache.mtime = Some(mtime);
        cache.results.clear();
        Ok(engine)
    }

    fn leap(&self, bundle: QueryBundle) -> Result<Vec<ResultEntry>> {
        let query_type = QueryType::from_marker(&bundle.stype);
        let engine = self.engine_for(&self.config.index_path, self.config.prefixes.clone())?;

        // Filename results depend only on the index, so they can be reused
        // until it is reloaded.
        if !query_type.is_content()
            && let Some(hit) = lock(&self.cache).results.get(&bundle)
        {
            return Ok(hit.clone());
        }

        let entries = engine.query(
            &bundle.fnames,
            query_type,
            std::slice::from_ref(&bundle.suffix),
            engine.as_ref(),
        )?;
        if !query_type.is_content() {
            self.remember(&engine, bundle, entries.clone());
        }
        Ok(entries)
    }

    /// Cache `entries` unless the index was reloaded while they were computed
    fn remember(&self, engine: &Arc<QueryEngine>, bundle: QueryBundle, entries: Vec<ResultEntry>) {
        let mut cache = lock(&self.cache);
        match &cache.engine {
            Some(current) if Arc::ptr_eq(current, engine) => {
                cache.results.put(bundle, entries);
            }
            _ => log::debug!("index reloaded during query, not caching"),
        }
    }

    fn remote_content_search(&self, args: ContentSearchResultArgs) -> Result<Vec<ResultEntry>> {
        let engine = self.engine_for(Path::new(&args.remoteindex), args.prefixes)?;
        let re = Regex::new(&args.suffix).map_err(|e| LeapError::invalid_pattern(&args.suffix, e))?;
        engine.content_search_result(&args.fnames, &re, &args.suffix)
    }

    fn index_and_build_checksum_index(&self, args: IndexAndBuildChecksumIndexArgs) -> Result<RemoteCheckSumIndexData> {
        if args.token == 0 {
            return Err(LeapError::Protocol("sync token must be non-zero".to_string()));
        }
        let generation = {
            let mut session = lock(&self.session);
            if session.is_open() {
                // Tokens are only unique per client process, so an equal
                // token does not prove the same client.
                if !session.idle_for(self.config.session_timeout) {
                    return Err(LeapError::TokenMismatch(format!(
                        "session {} is open, refusing {}",
                        session.token, args.token
                    )));
                }
                log::warn!("token {}: taking over idle session {}", args.token, session.token);
            }
            session.close();
            session.token = args.token;
            session.last_used = Some(Instant::now());
            session.generation += 1;
            session.generation
        };
        log::info!(
            "token {}: reindexing {} for project {:?}",
            args.token,
            args.remote_path,
            args.remote_project_name
        );

        match self.build_checksum_index(Path::new(&args.remote_path)) {
            Ok((file, data)) => {
                let mut session = lock(&self.session);
                if session.generation != generation {
                    return Err(LeapError::TokenMismatch(format!(
                        "session {} ended while building checksums",
                        args.token
                    )));
                }
                session.file = Some(file);
                session.last_used = Some(Instant::now());
                log::info!(
                    "token {}: {} bytes in {} blocks",
                    args.token,
                    data.file_size,
                    data.reference_file_index.block_count()
                );
                Ok(data)
            }
            Err(e) => {
                let mut session = lock(&self.session);
                if session.generation == generation {
                    session.close();
                }
                Err(e)
            }
        }
    }

    fn build_checksum_index(&self, index_path: &Path) -> Result<(File, RemoteCheckSumIndexData)> {
        let cindex_output = self.config.indexer.re_index(index_path, &[])?;

        let file_size = fs::metadata(index_path)
            .map_err(|e| LeapError::index_unreadable(index_path, e))?
            .len();
        let file = File::open(index_path).map_err(|e| LeapError::index_unreadable(index_path, e))?;
        let reference_file_index = ChecksumIndex::build(BLOCK_SIZE, BufReader::new(&file))?;
        reference_file_index.validate()?;
        if reference_file_index.file_size != file_size {
            return Err(LeapError::index_unreadable(
                index_path,
                format!(
                    "changed while checksumming ({} bytes, expected {})",
                    reference_file_index.file_size, file_size
                ),
            ));
        }

        Ok((
            file,
            RemoteCheckSumIndexData {
                cindex_output,
                file_size,
                reference_file_index,
            },
        ))
    }

    fn do_request(&self, args: DoRequestArgs) -> Result<Vec<u8>> {
        let mut session = lock(&self.session);
        if !session.is_open() || session.token != args.token {
            return Err(LeapError::TokenMismatch(format!(
                "request for {} but the open session is {}",
                args.token, session.token
            )));
        }
        if args.end < args.start || args.end - args.start > MAX_BYTES_PER_REQUEST {
            return Err(LeapError::Protocol(format!("bad range {}..{}", args.start, args.end)));
        }
        let Some(file) = session.file.as_ref() else {
            return Err(LeapError::Protocol(format!("session {} has no index open", args.token)));
        };

        let mut data = vec![0u8; (args.end - args.start) as usize];
        let mut f: &File = file;
        f.seek(SeekFrom::Start(args.start))?;
        f.read_exact(&mut data)?;
        session.last_used = Some(Instant::now());
        Ok(data)
    }

    fn finish_sync(&self, token: u64) -> Result<()> {
        let mut session = lock(&self.session);
        if session.token != token {
            return Err(LeapError::TokenMismatch(format!(
                "finishing {} but the open session is {}",
                token, session.token
            )));
        }
        session.close();
        log::info!("token {}: sync finished", token);
        Ok(())
    }
}

fn ping(greeting: &str) -> Result<String> {
    if greeting.is_empty() {
        return Err(LeapError::Protocol("empty greeting".to_string()));
    }
    Ok(format!("{} back to you!", greeting))
}

fn request_name(request: &Request) -> &'static str {
    match request {
        Request::Leap(_) => "Leap",
        Request::RemoteContentSearchResult(_) => "RemoteContentSearchResult",
        Request::IndexAndBuildChecksumIndex(_) => "IndexAndBuildChecksumIndex",
        Request::DoRequestOnServer(_) => "DoRequestOnServer",
        Request::FinishSync { .. } => "FinishSync",
        Request::Shutdown => "Shutdown",
        Request::Ping { .. } => "Ping",
    }
}
