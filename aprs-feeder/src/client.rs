//! APRS-IS full-feed ingestion client.
//!
//! State machine per connection:
//!
//! ```text
//! Disconnected -> Connecting -> LoggedIn -> Streaming -> (error/close) -> Disconnected
//! ```
//!
//! with a fixed cool-down before each reconnect, forever, until the session
//! is stopped. The session owns the only writable handle on the packet store
//! and reopens it (schema included) on every connection attempt.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use aprs_core::config::{Config, DEFAULT_FEED_HOST, DEFAULT_FEED_PORT, DEFAULT_SSID};
use aprs_core::types::now;

use crate::lines::LineBuffer;
use crate::store::{PacketStore, StoreError, DEFAULT_COMMIT_EVERY};

/// Product name sent in the login line.
pub const PRODUCT_NAME: &str = "aprs-prop";
/// Pass code sent when none is configured (receive-only login).
pub const READ_ONLY_PASSCODE: i32 = -1;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
pub const READ_TIMEOUT: Duration = Duration::from_secs(300);
pub const RECONNECT_DELAY: Duration = Duration::from_secs(30);
/// Bytes requested per socket read.
pub const RECV_CHUNK: usize = 4096;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Operator identity for the login line.
#[derive(Debug, Clone, PartialEq)]
pub struct Login {
    pub callsign: String,
    pub ssid: String,
    pub passcode: Option<i32>,
}

impl Login {
    /// `None` when the callsign is blank; an empty SSID becomes `01`.
    pub fn new(callsign: &str, ssid: &str, passcode: Option<i32>) -> Option<Self> {
        let callsign = callsign.trim();
        if callsign.is_empty() {
            return None;
        }
        let ssid = match ssid.trim() {
            "" => DEFAULT_SSID,
            s => s,
        };
        Some(Login {
            callsign: callsign.to_string(),
            ssid: ssid.to_string(),
            passcode,
        })
    }

    pub fn from_config(config: &Config) -> Option<Self> {
        Login::new(
            &config.station.callsign,
            &config.station.ssid,
            config.station.passcode,
        )
    }

    pub fn call_ssid(&self) -> String {
        format!("{}-{}", self.callsign, self.ssid)
    }

    /// `user CALL-SSID pass N vers aprs-prop X.Y.Z\n`
    pub fn line(&self) -> String {
        format!(
            "user {} pass {} vers {} {}\n",
            self.call_ssid(),
            self.passcode.unwrap_or(READ_ONLY_PASSCODE),
            PRODUCT_NAME,
            env!("CARGO_PKG_VERSION")
        )
    }
}

/// Where and how to reach the feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub reconnect_delay: Duration,
    pub commit_every: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            host: DEFAULT_FEED_HOST.into(),
            port: DEFAULT_FEED_PORT,
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            reconnect_delay: RECONNECT_DELAY,
            commit_every: DEFAULT_COMMIT_EVERY,
        }
    }
}

impl FeedConfig {
    pub fn from_config(config: &Config) -> Self {
        FeedConfig {
            host: config.feed.host.clone(),
            port: config.feed.port,
            ..FeedConfig::default()
        }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// Observable state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    LoggedIn = 2,
    Streaming = 3,
    Stopped = 4,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionState::Connecting,
            2 => SessionState::LoggedIn,
            3 => SessionState::Streaming,
            4 => SessionState::Stopped,
            _ => SessionState::Disconnected,
        }
    }
}

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub connect_attempts: u64,
    pub lines_received: u64,
    pub frames_stored: u64,
    pub inserts_dropped: u64,
}

#[derive(Debug, Default)]
struct Shared {
    state: AtomicU8,
    connect_attempts: AtomicU64,
    lines_received: AtomicU64,
    frames_stored: AtomicU64,
    inserts_dropped: AtomicU64,
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why one connection ended. All variants are recoverable.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("connect to {0} timed out")]
    ConnectTimeout(String),
    #[error("connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error("no data for {0:?}")]
    ReadTimeout(Duration),
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("socket: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet store: {0}")]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A running ingestion session on its own thread.
pub struct IngestSession {
    cancel: CancellationToken,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl IngestSession {
    /// Start ingesting into `db_path`.
    ///
    /// Returns `None` (nothing started) without a login or a store path.
    pub fn start(login: Option<Login>, db_path: Option<PathBuf>, feed: FeedConfig) -> Option<Self> {
        let (Some(login), Some(db_path)) = (login, db_path) else {
            debug!("no callsign or store path, ingestion not started");
            return None;
        };

        let cancel = CancellationToken::new();
        let shared = Arc::new(Shared::default());

        let worker = Worker {
            login,
            db_path,
            feed,
            shared: Arc::clone(&shared),
            cancel: cancel.clone(),
        };
        let spawned = std::thread::Builder::new()
            .name("aprs-ingest".into())
            .spawn(move || worker.run_blocking());

        match spawned {
            Ok(handle) => Some(IngestSession {
                cancel,
                shared,
                handle: Some(handle),
            }),
            Err(e) => {
                error!("failed to spawn ingestion thread: {e}");
                None
            }
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.shared.state.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> IngestStats {
        let s = &self.shared;
        IngestStats {
            connect_attempts: s.connect_attempts.load(Ordering::Relaxed),
            lines_received: s.lines_received.load(Ordering::Relaxed),
            frames_stored: s.frames_stored.load(Ordering::Relaxed),
            inserts_dropped: s.inserts_dropped.load(Ordering::Relaxed),
        }
    }

    /// Cancel the reconnect loop and wait for the thread to exit.
    /// Pending inserts are committed on the way out.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("ingestion thread panicked");
            }
            self.shared.set_state(SessionState::Stopped);
            info!("ingestion stopped");
        }
    }
}

impl Drop for IngestSession {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    login: Login,
    db_path: PathBuf,
    feed: FeedConfig,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl Worker {
    fn run_blocking(self) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        match rt {
            Ok(rt) => rt.block_on(self.run()),
            Err(e) => error!("failed to build ingestion runtime: {e}"),
        }
    }

    async fn run(self) {
        info!(
            login = %self.login.call_ssid(),
            feed = %self.feed.addr(),
            db = %self.db_path.display(),
            "ingestion started"
        );

        while !self.cancel.is_cancelled() {
            self.shared.set_state(SessionState::Connecting);
            Shared::bump(&self.shared.connect_attempts);

            match self.connection().await {
                Ok(()) => break,
                Err(e) => debug!("feed connection ended: {e}"),
            }
            self.shared.set_state(SessionState::Disconnected);

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.feed.reconnect_delay) => {}
            }
        }

        self.shared.set_state(SessionState::Stopped);
    }

    /// One connection, from store open to disconnect. `Ok` only when
    /// cancelled.
    async fn connection(&self) -> Result<(), IngestError> {
        let mut store =
            PacketStore::open(&self.db_path)?.with_commit_every(self.feed.commit_every);

        let addr = self.feed.addr();
        let connect = tokio::time::timeout(self.feed.connect_timeout, TcpStream::connect(&addr));
        let mut stream = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            r = connect => match r {
                Err(_) => return Err(IngestError::ConnectTimeout(addr.clone())),
                Ok(Err(source)) => {
                    return Err(IngestError::Connect {
                        addr: addr.clone(),
                        source,
                    })
                }
                Ok(Ok(s)) => s,
            },
        };
        stream.set_nodelay(true)?;

        stream.write_all(self.login.line().as_bytes()).await?;
        self.shared.set_state(SessionState::LoggedIn);
        info!(login = %self.login.call_ssid(), "connected to {addr}");

        self.shared.set_state(SessionState::Streaming);
        let mut lines = LineBuffer::new();
        let mut chunk = vec![0u8; RECV_CHUNK];
        loop {
            let read = tokio::time::timeout(self.feed.read_timeout, stream.read(&mut chunk));
            let n = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                r = read => match r {
                    Err(_) => return Err(IngestError::ReadTimeout(self.feed.read_timeout)),
                    Ok(r) => r?,
                },
            };
            if n == 0 {
                return Err(IngestError::PeerClosed);
            }

            for line in lines.push(&chunk[..n]) {
                Shared::bump(&self.shared.lines_received);
                match store.insert(now(), &line) {
                    Ok(()) => Shared::bump(&self.shared.frames_stored),
                    Err(e) => {
                        Shared::bump(&self.shared.inserts_dropped);
                        trace!("dropped insert: {e}");
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn test_feed(port: u16) -> FeedConfig {
        FeedConfig {
            host: "127.0.0.1".into(),
            port,
            connect_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_millis(50),
            commit_every: 1,
            ..FeedConfig::default()
        }
    }

    async fn read_login(stream: TcpStream) -> (String, tokio::net::tcp::OwnedWriteHalf) {
        let (rd, wr) = stream.into_split();
        let mut rd = BufReader::new(rd);
        let mut line = String::new();
        rd.read_line(&mut line).await.unwrap();
        (line, wr)
    }

    #[test]
    fn test_login_line() {
        let login = Login::new("N0CALL", "", None).unwrap();
        assert_eq!(
            login.line(),
            format!("user N0CALL-01 pass -1 vers aprs-prop {}\n", env!("CARGO_PKG_VERSION"))
        );
        let login = Login::new(" K4ABC ", "7", Some(12345)).unwrap();
        assert!(login.line().starts_with("user K4ABC-7 pass 12345 vers aprs-prop "));
    }

    #[test]
    fn test_inert_without_identity_or_store() {
        assert!(Login::new("   ", "01", Some(1)).is_none());
        assert!(IngestSession::start(None, Some("x.db".into()), FeedConfig::default()).is_none());
        let login = Login::new("N0CALL", "01", None);
        assert!(IngestSession::start(login, None, FeedConfig::default()).is_none());
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        assert!(Login::from_config(&config).is_none());
        config.station.callsign = "N0CALL".into();
        config.feed.port = 14580;
        assert_eq!(Login::from_config(&config).unwrap().call_ssid(), "N0CALL-01");
        let feed = FeedConfig::from_config(&config);
        assert_eq!(feed.port, 14580);
        assert_eq!(feed.reconnect_delay, RECONNECT_DELAY);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_streams_lines_into_store() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cache").join("aprs.db");

        let mut session =
            IngestSession::start(Login::new("N0CALL", "", None), Some(db.clone()), test_feed(port))
                .unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let (login, mut wr) = read_login(stream).await;
        assert!(login.starts_with("user N0CALL-01 pass -1 vers aprs-prop "));

        wr.write_all(b"# aprsc 2.1.14\r\nA>APRS:>hello\r\n\r\nB>APRS:>wor")
            .await
            .unwrap();
        wr.write_all(b"ld\n").await.unwrap();

        wait_until(|| session.stats().frames_stored == 2).await;
        assert_eq!(session.state(), SessionState::Streaming);

        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        let stats = session.stats();
        assert_eq!(stats.lines_received, 2);
        assert_eq!(stats.inserts_dropped, 0);

        let store = PacketStore::open_existing(&db).unwrap().unwrap();
        let texts: Vec<String> = store
            .frames_since(0.0)
            .unwrap()
            .into_iter()
            .map(|f| f.text)
            .collect();
        assert_eq!(texts, vec!["A>APRS:>hello", "B>APRS:>world"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_insert_counted_and_streaming_continues() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("aprs.db");

        drop(PacketStore::open(&db).unwrap());
        rusqlite::Connection::open(&db)
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON packets WHEN NEW.raw = 'BAD>APRS:>x'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let mut session =
            IngestSession::start(Login::new("N0CALL", "", None), Some(db.clone()), test_feed(port))
                .unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let (_, mut wr) = read_login(stream).await;

        wr.write_all(b"A>APRS:>one\r\nBAD>APRS:>x\r\nB>APRS:>two\r\n")
            .await
            .unwrap();

        wait_until(|| session.stats().lines_received == 3 && session.stats().frames_stored == 2)
            .await;
        session.stop();
        let stats = session.stats();
        assert_eq!(stats.inserts_dropped, 1);
        assert_eq!(stats.frames_stored, 2);

        let store = PacketStore::open_existing(&db).unwrap().unwrap();
        let texts: Vec<String> = store
            .frames_since(0.0)
            .unwrap()
            .into_iter()
            .map(|f| f.text)
            .collect();
        assert_eq!(texts, vec!["A>APRS:>one", "B>APRS:>two"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reconnects_after_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let dir = tempfile::tempdir().unwrap();

        let mut session = IngestSession::start(
            Login::new("N0CALL", "01", None),
            Some(dir.path().join("aprs.db")),
            test_feed(port),
        )
        .unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let (_, wr) = read_login(stream).await;
        drop(wr);

        let (stream, _) = tokio::time::timeout(Duration::from_secs(10), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let (login, _wr) = read_login(stream).await;
        assert!(login.starts_with("user N0CALL-01 "));
        assert!(session.stats().connect_attempts >= 2);

        session.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_idle_read_timeout_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let dir = tempfile::tempdir().unwrap();
        let feed = FeedConfig {
            read_timeout: Duration::from_millis(100),
            ..test_feed(port)
        };

        let mut session = IngestSession::start(
            Login::new("N0CALL", "01", None),
            Some(dir.path().join("aprs.db")),
            feed,
        )
        .unwrap();

        // Keep the first connection open but silent
        let (first, _) = listener.accept().await.unwrap();
        let (_, _silent) = read_login(first).await;

        let second = tokio::time::timeout(Duration::from_secs(10), listener.accept()).await;
        assert!(second.is_ok(), "client should reconnect after the read timeout");

        session.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_interrupts_cooldown() {
        // Grab a free port, then close it so connects are refused
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let dir = tempfile::tempdir().unwrap();
        let feed = FeedConfig {
            reconnect_delay: Duration::from_secs(60),
            ..test_feed(port)
        };

        let mut session = IngestSession::start(
            Login::new("N0CALL", "01", None),
            Some(dir.path().join("aprs.db")),
            feed,
        )
        .unwrap();

        wait_until(|| {
            session.stats().connect_attempts >= 1 && session.state() == SessionState::Disconnected
        })
        .await;

        let started = Instant::now();
        session.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.stats().connect_attempts, 1);
    }
}
