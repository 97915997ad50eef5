use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration as StdDuration;

pub use interfaces::{EntrySink, NewEntry, RawItem, Source};

/// Per-source polling notes, persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceState {
    pub last_poll_time: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub display_title: Option<String>,
}

/// Marker that an entry identity has been emitted once. Never updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenEntryRecord {
    pub first_seen: DateTime<Utc>,
}

/// What a feed said about itself on a fresh fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedMeta {
    pub title: Option<String>,
    pub link: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FreshFeed {
    pub meta: FeedMeta,
    pub items: Vec<RawItem>,
}

/// Successful fetch results. Failures travel as `Err(AggregatorError)`.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fresh(FreshFeed),
    NotModified,
}

/// Cache validators handed to the fetcher for a conditional request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionalHints<'a> {
    pub etag: Option<&'a str>,
    pub last_modified: Option<&'a str>,
}

impl<'a> ConditionalHints<'a> {
    pub fn from_state(state: Option<&'a SourceState>) -> Self {
        match state {
            Some(state) => Self {
                etag: state.etag.as_deref(),
                last_modified: state.last_modified.as_deref(),
            },
            None => Self::default(),
        }
    }
}

/// How one poll attempt ended, as far as the stored source state cares.
#[derive(Debug, Clone, Copy)]
pub enum PollResult<'a> {
    Fresh(&'a FeedMeta),
    NotModified,
    Failed,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
    /// Honour `HTTP_PROXY`/`HTTPS_PROXY` from the environment.
    pub use_system_proxy: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "feed-aggregator/0.1".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_seconds: 2,
            max_feed_size_mb: 10,
            max_redirects: 5,
            use_system_proxy: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Minimum time between two polls of the same source.
    pub min_interval: Duration,
    /// 1 keeps fetching strictly sequential.
    pub max_concurrent_fetches: usize,
    /// Upper bound on a single fetch, on top of whatever the fetcher enforces.
    pub fetch_timeout: Option<StdDuration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::seconds(3600),
            max_concurrent_fetches: 1,
            fetch_timeout: None,
        }
    }
}

/// Per-source result of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    Fresh { fetched: usize, new: usize },
    NotModified,
    RateLimited { next_due: DateTime<Utc> },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: Source,
    pub status: SourceStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub sources: Vec<SourceReport>,
}

impl PollReport {
    pub fn status_of(&self, source: &Source) -> Option<&SourceStatus> {
        self.sources
            .iter()
            .find(|report| &report.source == source)
            .map(|report| &report.status)
    }

    pub fn fresh_count(&self) -> usize {
        self.count(|status| matches!(status, SourceStatus::Fresh { .. }))
    }

    pub fn not_modified_count(&self) -> usize {
        self.count(|status| matches!(status, SourceStatus::NotModified))
    }

    pub fn rate_limited_count(&self) -> usize {
        self.count(|status| matches!(status, SourceStatus::RateLimited { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|status| matches!(status, SourceStatus::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&SourceStatus) -> bool) -> usize {
        self.sources.iter().filter(|report| pred(&report.status)).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PollOutcome {
    /// Sorted by display date, most recent first.
    pub entries: Vec<NewEntry>,
    pub report: PollReport,
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("Fetch timed out after {seconds} seconds")]
    FetchTimeout { seconds: u64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("State store at {path} is unreadable: {reason}")]
    StateCorrupt { path: PathBuf, reason: String },

    #[error("Stored record {namespace}/{key} is unreadable: {source}")]
    CorruptRecord {
        namespace: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Already subscribed to {uri}")]
    AlreadySubscribed { uri: String },

    #[error("Not subscribed to {uri}")]
    NotSubscribed { uri: String },

    #[error("No feeds found at {uri}")]
    NoFeedsFound { uri: String },

    #[error("Multiple feeds found at {uri}: {}", .candidates.join(", "))]
    MultipleFeedsFound { uri: String, candidates: Vec<String> },

    #[error("Invalid HTML selector: {0}")]
    Selector(String),

    #[error("General error: {0}")]
    General(String),
}

impl AggregatorError {
    /// Store-level failures end the poll cycle; anything else is scoped to
    /// the source that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AggregatorError::Database(_)
                | AggregatorError::StateCorrupt { .. }
                | AggregatorError::CorruptRecord { .. }
                | AggregatorError::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
