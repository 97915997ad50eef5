use crate::types::{ConditionalHints, FetchOutcome, Result, Source};
use async_trait::async_trait;
use std::fmt;

/// Retrieves one source, honouring the conditional-request hints.
///
/// Implementations report "unchanged" as `FetchOutcome::NotModified` and any
/// network or parse problem as an error; the engine treats both as ordinary
/// per-source outcomes.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &Source, hints: ConditionalHints<'_>) -> Result<FetchOutcome>;
}

/// The two independent keyspaces of aggregation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// `SourceState` keyed by source URI.
    Sources,
    /// `SeenEntryRecord` keyed by entry identity.
    Entries,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Sources => "sources",
            Namespace::Entries => "entries",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable string key-value storage split into namespaces.
///
/// A missing key is `Ok(None)`, never an error. Writes made through `set` are
/// visible to `get` immediately but are only guaranteed durable after `flush`
/// or `close` returns. `discard` drops every write made since the last flush.
#[async_trait]
pub trait StateStore: Send {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>>;

    async fn set(&mut self, namespace: Namespace, key: &str, value: String) -> Result<()>;

    async fn flush(&mut self) -> Result<()>;

    fn discard(&mut self);

    async fn close(mut self) -> Result<()>
    where
        Self: Sized,
    {
        self.flush().await
    }
}
