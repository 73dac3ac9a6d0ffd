//! Common test utilities and fixtures
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tuneshare_catalog::{Database, DatabaseId, Library, Mutate, Song, SongField, SongId};
use tuneshare_dmap::{codes, Chunk};
use tuneshare_server::{AppState, FileSongSource, Server, ServerConfig};

/// How long tests wait for something that should not happen
pub const QUIET: Duration = Duration::from_millis(300);

/// A running server on an ephemeral port with a small catalog
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub library: Library,
    pub fixtures: Fixtures,
    _dir: TempDir,
    task: JoinHandle<()>,
}

/// Ids of the catalog every test server starts with
#[derive(Debug, Clone, Copy)]
pub struct Fixtures {
    pub database: DatabaseId,
    pub short_song: SongId,
    pub long_song: SongId,
    pub other_song: SongId,
}

/// Bytes of the short fixture song
pub const SHORT_SONG: &[u8] = b"0123456789abcdefghij";

/// Length of the long fixture song, large enough to fill socket buffers
pub const LONG_SONG_LEN: usize = 32 * 1024 * 1024;

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(configure: impl FnOnce(&mut ServerConfig)) -> Self {
        let mut config = ServerConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        configure(&mut config);

        let dir = tempfile::tempdir().unwrap();
        let library = Library::new("Test Library");
        let songs = Arc::new(FileSongSource::new());
        let fixtures = populate(&library, &songs, &dir).await;

        let state = AppState::new(&config, library.clone(), songs);
        let server = Server::bind("127.0.0.1:0", state.clone()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(async move {
            server.run(std::future::pending()).await.unwrap();
        });

        Self {
            addr,
            state,
            library,
            fixtures,
            _dir: dir,
            task,
        }
    }

    pub async fn client(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }

    /// Open a CONTROL connection and log in; returns the session id
    pub async fn logged_in_client(&self) -> (TestClient, u32) {
        let mut client = self.client().await;
        let info = client.get("/server-info").await.expect("server-info response");
        assert_eq!(info.status, 200);
        let login = client.get("/login").await.expect("login response");
        let session_id = login.chunk().child_u64(codes::MLID).expect("session id") as u32;
        (client, session_id)
    }

    /// Wait until the pool reaches a state, polling briefly
    pub async fn wait_for(&self, mut check: impl FnMut(&AppState) -> bool) {
        for _ in 0..100 {
            if check(&self.state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.state.pool.shutdown();
        self.task.abort();
    }
}

async fn populate(library: &Library, songs: &FileSongSource, dir: &TempDir) -> Fixtures {
    let short_path = dir.path().join("short.mp3");
    tokio::fs::write(&short_path, SHORT_SONG).await.unwrap();
    let long_path = dir.path().join("long.mp3");
    tokio::fs::write(&long_path, vec![7u8; LONG_SONG_LEN]).await.unwrap();

    let mut tx = library.transaction();
    let database = tx.add_database(Database::new("Music")).unwrap();
    let short_song = tx
        .add_song(
            database,
            Song::new("Short")
                .with(SongField::Format, "mp3")
                .unwrap()
                .with(SongField::Artist, "Tester")
                .unwrap(),
        )
        .unwrap();
    let long_song = tx
        .add_song(database, Song::new("Long").with(SongField::Format, "mp3").unwrap())
        .unwrap();
    let other_song = tx.add_song(database, Song::new("Other")).unwrap();
    tx.commit().unwrap();

    songs.insert(short_song, short_path);
    songs.insert(long_song, long_path);

    Fixtures {
        database,
        short_song,
        long_song,
        other_song,
    }
}

/// A raw HTTP/1.1 client speaking to the server over TCP
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn chunk(&self) -> Chunk {
        tuneshare_dmap::decode(&self.body).expect("DMAP body")
    }
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    /// Send a request head without waiting for the response
    pub async fn send(&mut self, target: &str, headers: &[(&str, &str)]) {
        let mut head = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n", target);
        for (name, value) in headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("\r\n");
        self.writer.write_all(head.as_bytes()).await.unwrap();
    }

    pub async fn get(&mut self, target: &str) -> Option<TestResponse> {
        self.request(target, &[]).await
    }

    pub async fn request(&mut self, target: &str, headers: &[(&str, &str)]) -> Option<TestResponse> {
        self.send(target, headers).await;
        self.read_response().await
    }

    /// Read one response; `None` when the server closed the connection
    pub async fn read_response(&mut self) -> Option<TestResponse> {
        let head = self.read_head().await?;
        let mut lines = head.lines();
        let status_line = lines.next()?;
        let status = status_line.split_whitespace().nth(1)?.parse().ok()?;

        let headers: HashMap<String, String> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();

        let len: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mut body = vec![0u8; len];
        self.reader.read_exact(&mut body).await.ok()?;

        Some(TestResponse {
            status,
            headers,
            body,
        })
    }

    /// Read only a response head, leaving the body on the socket
    pub async fn read_head(&mut self) -> Option<String> {
        let mut head = String::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await.ok()?;
            if n == 0 {
                return None;
            }
            if line == "\r\n" {
                return Some(head);
            }
            head.push_str(&line);
        }
    }

    /// Read whatever body bytes remain until the server closes
    pub async fn read_to_end(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let _ = self.reader.read_to_end(&mut out).await;
        out
    }

    /// Whether the server closes the connection without sending anything
    pub async fn is_closed(&mut self) -> bool {
        let mut byte = [0u8; 1];
        matches!(
            tokio::time::timeout(Duration::from_secs(5), self.reader.read(&mut byte)).await,
            Ok(Ok(0)) | Ok(Err(_))
        )
    }

    /// Whether nothing arrives for a short while
    pub async fn is_quiet(&mut self) -> bool {
        let mut byte = [0u8; 1];
        tokio::time::timeout(QUIET, self.reader.read(&mut byte))
            .await
            .is_err()
    }
}

/// Item ids in a listing response
pub fn listed_ids(chunk: &Chunk) -> Vec<u32> {
    chunk
        .child(codes::MLCL)
        .map(|listing| {
            listing
                .children()
                .iter()
                .filter_map(|item| item.child_u64(codes::MIID))
                .map(|id| id as u32)
                .collect()
        })
        .unwrap_or_default()
}

/// Ids in a response's deleted-id listing
pub fn deleted_ids(chunk: &Chunk) -> Vec<u32> {
    chunk
        .child(codes::MUDL)
        .map(|listing| {
            listing
                .children()
                .iter()
                .filter_map(|c| c.value().as_u64())
                .map(|id| id as u32)
                .collect()
        })
        .unwrap_or_default()
}
