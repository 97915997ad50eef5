use crate::types::{AggregatorError, FeedMeta, FreshFeed, RawItem, Result};
use feed_rs::model::{Entry, Link};
use feed_rs::parser;
use tracing::debug;

/// Parses an RSS/Atom/JSON feed document into raw items.
///
/// Cache validators are not part of the document; the fetcher fills them in
/// from the response headers.
pub fn parse_feed(content: &[u8]) -> Result<FreshFeed> {
    debug!("Parsing feed content ({} bytes)", content.len());

    // Without a generator feed-rs invents ids for entries that lack one, and
    // those ids do not cover every identity field (or are random). Leave them
    // empty so identity falls back to the content hash.
    let feed = parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(content)
        .map_err(|e| AggregatorError::Parse(format!("Failed to parse feed: {}", e)))?;

    let meta = FeedMeta {
        title: feed.title.map(|t| t.content),
        link: primary_link(&feed.links),
        updated: feed.updated.or(feed.published),
        etag: None,
        last_modified: None,
    };

    let items = feed
        .entries
        .into_iter()
        .map(|entry| convert_entry(entry, &meta))
        .collect::<Vec<_>>();

    debug!("Parsed feed with {} entries", items.len());
    Ok(FreshFeed { meta, items })
}

fn convert_entry(entry: Entry, meta: &FeedMeta) -> RawItem {
    let guid = if entry.id.trim().is_empty() {
        None
    } else {
        Some(entry.id)
    };

    RawItem {
        guid,
        title: entry.title.map(|t| t.content),
        link: primary_link(&entry.links),
        summary: entry.summary.map(|s| s.content),
        content: entry.content.and_then(|c| c.body),
        published_time: entry.published,
        modified_time: entry.updated,
        source_title: meta.title.clone(),
        source_link: meta.link.clone(),
        source_time: meta.updated,
    }
}

// Atom feeds usually carry a rel="self" link next to the page link.
fn primary_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|link| matches!(link.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|link| link.href.clone())
}
