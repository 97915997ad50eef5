use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A feed endpoint, identified by its URI.
///
/// The URI is the key under which all per-source polling state is kept, so it
/// is compared verbatim: no normalisation happens here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Source(String);

impl Source {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Source {
    fn from(uri: &str) -> Self {
        Self(uri.to_owned())
    }
}

impl From<String> for Source {
    fn from(uri: String) -> Self {
        Self(uri)
    }
}

/// One entry as it came back from a fetch, before dedup.
///
/// Every field is optional because feeds in the wild omit almost anything.
/// The `source_*` fields carry what the feed said about itself at fetch time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub guid: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published_time: Option<DateTime<Utc>>,
    pub modified_time: Option<DateTime<Utc>>,
    pub source_title: Option<String>,
    pub source_link: Option<String>,
    pub source_time: Option<DateTime<Utc>>,
}

/// An item confirmed as not seen before, ready for downstream delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    source: Source,
    identity: String,
    display_date: DateTime<Utc>,
    item: RawItem,
}

impl NewEntry {
    pub fn new(source: Source, identity: String, display_date: DateTime<Utc>, item: RawItem) -> Self {
        Self {
            source,
            identity,
            display_date,
            item,
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn display_date(&self) -> DateTime<Utc> {
        self.display_date
    }

    pub fn item(&self) -> &RawItem {
        &self.item
    }

    // Missing text fields read as empty strings so templates never have to
    // special-case them.

    pub fn title(&self) -> &str {
        self.item.title.as_deref().unwrap_or("")
    }

    pub fn link(&self) -> &str {
        self.item.link.as_deref().unwrap_or("")
    }

    pub fn summary(&self) -> &str {
        self.item.summary.as_deref().unwrap_or("")
    }

    pub fn content(&self) -> &str {
        self.item.content.as_deref().unwrap_or("")
    }

    pub fn source_title(&self) -> &str {
        self.item.source_title.as_deref().unwrap_or("")
    }

    pub fn source_link(&self) -> &str {
        self.item.source_link.as_deref().unwrap_or("")
    }
}

// Object style note:
// Sinks are the render/delivery side (page writers, mailers, IM bots, file
// exporters). They receive one poll cycle's entries, already sorted most
// recent first, and own whatever formatting they need. Nothing here feeds
// back into polling state.

pub trait EntrySink {
    fn deliver(&mut self, entries: &[NewEntry]) -> std::io::Result<()>;
}
