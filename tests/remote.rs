//! Client and server talking over a real socket.

use leap::LeapError;
use leap::index::{InProcessIndexer, IndexConfig, Indexer, build_index};
use leap::query::{QueryEngine, QueryType};
use leap::server::protocol::IndexAndBuildChecksumIndexArgs;
use leap::server::{
    LeapClient, LeapServer, RemoteContentSearcher, ServerConfig, TransferTarget, reindex_and_transfer,
};
use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

struct Running {
    addr: String,
    handle: Option<JoinHandle<()>>,
}

impl Running {
    fn client(&self) -> LeapClient {
        LeapClient::connect_with_retry(&self.addr).unwrap()
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Ok(mut client) = LeapClient::connect(self.addr.as_str()) {
                let _ = client.shutdown();
            }
            let _ = handle.join();
        }
    }
}

fn start(config: ServerConfig) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server: Arc<LeapServer> = LeapServer::new(config);
    let handle = thread::spawn(move || {
        server.run(listener).unwrap();
    });
    Running {
        addr,
        handle: Some(handle),
    }
}

/// A served tree plus a client-side directory
struct Site {
    dir: tempfile::TempDir,
    tree: PathBuf,
    server_index: PathBuf,
}

impl Site {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("server/tree");
        fs::create_dir_all(tree.join("b")).unwrap();
        fs::write(tree.join("b/aaa.txt"), "potato\ncarrot\nbeet\n").unwrap();
        fs::write(tree.join("b/ccc.txt"), "onion\nleek\n").unwrap();
        for i in 0..200 {
            fs::write(tree.join(format!("b/file{:03}.txt", i)), format!("line {}\n", i).repeat(40)).unwrap();
        }
        let tree = tree.canonicalize().unwrap();
        let server_index = dir.path().join("server/index");
        build_index(&[tree.clone()], &server_index, &IndexConfig::default(), true).unwrap();
        fs::create_dir_all(dir.path().join("client")).unwrap();
        Self {
            dir,
            tree,
            server_index,
        }
    }

    fn local_index(&self) -> PathBuf {
        self.dir.path().join("client/index")
    }

    fn serve(&self) -> Running {
        let mut config = ServerConfig::new(self.server_index.clone(), None, Box::new(InProcessIndexer::default()));
        config.jump_prefix = self.dir.path().join("server/.leaping/glenda").to_string_lossy().into_owned();
        start(config)
    }

    fn target(&self) -> TransferTarget {
        TransferTarget {
            remote_project_name: "default".to_string(),
            remote_path: self.server_index.to_string_lossy().into_owned(),
            local_path: self.local_index(),
        }
    }
}

/// Pretends to index by writing fixed bytes
struct FixedIndexer(&'static [u8]);

impl Indexer for FixedIndexer {
    fn re_index(&self, index_path: &Path, _args: &[String]) -> leap::Result<Vec<u8>> {
        fs::write(index_path, self.0)?;
        Ok(b"indexed 1 file\n".to_vec())
    }
}

#[test]
fn ping() {
    let site = Site::new();
    let server = site.serve();
    let mut client = server.client();
    assert_eq!(client.ping("hi").unwrap(), "hi back to you!");
    assert!(client.ping("").is_err());
}

#[test]
fn sync_from_nothing_then_incrementally() {
    let site = Site::new();
    let server = site.serve();
    let mut client = server.client();

    let first = reindex_and_transfer(&mut client, &site.target()).unwrap();
    assert_eq!(fs::read(site.local_index()).unwrap(), fs::read(&site.server_index).unwrap());
    assert_eq!(first.stats.reused_blocks, 0);
    assert!(!Path::new(&format!("{}-temporary", site.local_index().display())).exists());

    // No change on the server: everything is reused.
    let second = reindex_and_transfer(&mut client, &site.target()).unwrap();
    assert_eq!(second.stats.fetched_blocks, 0);
    assert_eq!(fs::read(site.local_index()).unwrap(), fs::read(&site.server_index).unwrap());

    fs::write(site.tree.join("b/zzz.txt"), "radish\n").unwrap();
    reindex_and_transfer(&mut client, &site.target()).unwrap();
    assert_eq!(fs::read(site.local_index()).unwrap(), fs::read(&site.server_index).unwrap());

    let engine = QueryEngine::open(&site.local_index(), None).unwrap();
    let got = engine
        .query(&[".*zzz.*".to_string()], QueryType::FilenameOnly, &[String::new()], &engine)
        .unwrap();
    assert_eq!(got.len(), 1);
}

#[test]
fn sync_onto_longer_local_file() {
    let site = Site::new();
    fs::write(site.local_index(), vec![b'x'; 1 << 20]).unwrap();
    let server = site.serve();
    let mut client = server.client();
    reindex_and_transfer(&mut client, &site.target()).unwrap();
    assert_eq!(fs::read(site.local_index()).unwrap(), fs::read(&site.server_index).unwrap());
}

#[test]
fn remote_content_search() {
    let site = Site::new();
    let server = site.serve();
    let mut client = server.client();
    reindex_and_transfer(&mut client, &site.target()).unwrap();

    let engine = QueryEngine::open(&site.local_index(), None).unwrap();
    let searcher = RemoteContentSearcher::new(server.client(), site.server_index.to_string_lossy(), None);
    let got = engine
        .query(&[String::new()], QueryType::ContentAfterSlash, &["carrot".to_string()], &searcher)
        .unwrap();

    assert_eq!(got.len(), 1);
    let name = site.tree.join("b/aaa.txt").to_string_lossy().into_owned();
    assert_eq!(got[0].uid, format!("{}:2", name));
    assert_eq!(got[0].title, "2 carrot\n");
    assert_eq!(got[0].subtitle, ".../aaa.txt:2 carrot\n");

    // A bad content pattern is reported, not swallowed.
    let err = engine
        .query(&[String::new()], QueryType::ContentAfterSlash, &["(".to_string()], &searcher)
        .unwrap_err();
    assert!(matches!(err, LeapError::InvalidPattern { .. }));
}

#[test]
fn whole_query_on_server() {
    let site = Site::new();
    let server = site.serve();
    let mut client = server.client();

    let got = client
        .leap(vec![".*c.*".to_string()], ":", "2")
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].title, "ccc.txt:2");
    assert_eq!(got[0].subtitle, "b/ccc.txt:2");

    // Served from the cache the second time round.
    let again = client
        .leap(vec![".*c.*".to_string()], ":", "2")
        .unwrap();
    assert_eq!(again, got);

    let content = client
        .leap(vec![String::new()], "/", "carrot")
        .unwrap();
    assert_eq!(content.len(), 1);
    assert_eq!(content[0].title, "2 carrot\n");
}

#[test]
fn do_request_and_token_guard() {
    let dir = tempfile::tempdir().unwrap();
    let index = dir.path().join("index");
    let server = start(ServerConfig::new(
        index.clone(),
        None,
        Box::new(FixedIndexer(b"hello there i am a buffer")),
    ));
    let args = |token| IndexAndBuildChecksumIndexArgs {
        token,
        remote_project_name: "default".to_string(),
        remote_path: index.to_string_lossy().into_owned(),
    };

    let mut first = server.client();
    let mut second = server.client();

    let data = first.index_and_build_checksum_index(args(1000)).unwrap();
    assert_eq!(data.file_size, 25);
    assert_eq!(data.cindex_output, b"indexed 1 file\n");

    let err = second.index_and_build_checksum_index(args(1001)).unwrap_err();
    assert!(matches!(err, LeapError::TokenMismatch(_)));
    let err = second.do_request(0, 5, 1001).unwrap_err();
    assert!(matches!(err, LeapError::TokenMismatch(_)));

    assert_eq!(first.do_request(0, 5, 1000).unwrap(), b"hello");

    first.finish_sync(1000).unwrap();
    let err = first.do_request(0, 5, 1000).unwrap_err();
    assert!(matches!(err, LeapError::TokenMismatch(_)));
    second.index_and_build_checksum_index(args(1001)).unwrap();
    second.finish_sync(1001).unwrap();
}

#[test]
fn shutdown_stops_the_server() {
    let site = Site::new();
    let mut server = site.serve();
    server.client().shutdown().unwrap();
    server.handle.take().unwrap().join().unwrap();
    assert!(LeapClient::connect(server.addr.as_str()).is_err());
}
