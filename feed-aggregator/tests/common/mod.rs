#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use feed_aggregator::{
    AggregatorError, ConditionalHints, FeedMeta, FetchOutcome, FreshFeed, RawItem, Result, Source,
    SourceFetcher,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// A state file path inside a fresh directory. The directory, and anything
/// SQLite puts next to the file, goes away when the `TempDir` is dropped.
pub fn temp_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    (dir, path)
}

pub fn item(guid: Option<&str>, title: &str, published: Option<DateTime<Utc>>) -> RawItem {
    RawItem {
        guid: guid.map(str::to_string),
        title: Some(title.to_string()),
        link: Some(format!("http://example.com/{}", title.replace(' ', "-"))),
        summary: Some(format!("Summary of {}", title)),
        published_time: published,
        ..Default::default()
    }
}

pub fn feed(title: &str, etag: &str, items: Vec<RawItem>) -> FreshFeed {
    FreshFeed {
        meta: FeedMeta {
            title: Some(title.to_string()),
            link: Some("http://example.com/".to_string()),
            updated: None,
            etag: Some(etag.to_string()),
            last_modified: Some("Wed, 01 May 2024 10:00:00 GMT".to_string()),
        },
        items,
    }
}

#[derive(Clone)]
pub enum Script {
    Fresh(FreshFeed),
    NotModified,
    Fail(String),
    /// Fails with an error the engine must not swallow.
    Fatal,
    Hang,
}

/// Hint pair a fetch was called with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub uri: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, uri: &str, script: Script) -> Self {
        self.scripts.insert(uri.to_string(), script);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SourceFetcher for ScriptedFetcher {
    async fn fetch(&self, source: &Source, hints: ConditionalHints<'_>) -> Result<FetchOutcome> {
        self.calls.lock().unwrap().push(Call {
            uri: source.to_string(),
            etag: hints.etag.map(str::to_string),
            last_modified: hints.last_modified.map(str::to_string),
        });

        match self.scripts.get(source.as_str()).cloned() {
            Some(Script::Fresh(feed)) => Ok(FetchOutcome::Fresh(feed)),
            Some(Script::NotModified) => Ok(FetchOutcome::NotModified),
            Some(Script::Fail(message)) => Err(AggregatorError::General(message)),
            Some(Script::Fatal) => Err(AggregatorError::StateCorrupt {
                path: PathBuf::from("fetch-cache.db"),
                reason: "disk image is malformed".to_string(),
            }),
            Some(Script::Hang) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(AggregatorError::General("hang finished".to_string()))
            }
            None => Err(AggregatorError::General(format!("no script for {}", source))),
        }
    }
}

/// What the local HTTP server saw for one request.
#[derive(Debug, Clone)]
pub struct Request {
    pub path: String,
    headers: HashMap<String, String>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

type Handler = dyn Fn(&Request, usize) -> Reply + Send + Sync;

/// Minimal HTTP/1.1 server on a loopback port. The handler gets each request
/// with its zero-based arrival number and every connection is closed after
/// one reply.
pub struct TestServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl TestServer {
    pub async fn start<H>(handler: H) -> Self
    where
        H: Fn(&Request, usize) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let log = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = handler.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, handler.as_ref(), &log).await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn serve(mut stream: TcpStream, handler: &Handler, log: &Mutex<Vec<Request>>) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let text = String::from_utf8_lossy(&buf).into_owned();
    let mut lines = text.split("\r\n");
    let path = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    let request = Request { path, headers };

    let index = {
        let mut log = log.lock().unwrap();
        log.push(request.clone());
        log.len() - 1
    };
    let reply = handler(&request, index);

    let mut head = format!(
        "HTTP/1.1 {} Test\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        reply.body.len()
    );
    for (name, value) in &reply.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");

    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&reply.body).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Fetch settings for loopback tests: no proxy, no waiting between retries.
pub fn local_fetch_config() -> feed_aggregator::FetchConfig {
    feed_aggregator::FetchConfig {
        retry_delay_seconds: 0,
        use_system_proxy: false,
        ..Default::default()
    }
}
