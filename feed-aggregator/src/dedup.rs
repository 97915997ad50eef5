use crate::state;
use crate::traits::StateStore;
use crate::types::{NewEntry, RawItem, Result, Source};
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use tracing::debug;

/// Stable dedup key for an item.
///
/// A non-blank guid is used as-is. Otherwise the key is the hex SHA-256 of
/// title, link, published time, modified time and summary, each followed by a
/// NUL byte, with missing fields hashed as empty strings. Content and the
/// `source_*` fields never take part.
pub fn entry_identity(item: &RawItem) -> String {
    if let Some(guid) = item.guid.as_deref() {
        if !guid.trim().is_empty() {
            return guid.to_string();
        }
    }

    let published = item.published_time.map(format_time).unwrap_or_default();
    let modified = item.modified_time.map(format_time).unwrap_or_default();

    let mut hasher = Sha256::new();
    for field in [
        item.title.as_deref().unwrap_or(""),
        item.link.as_deref().unwrap_or(""),
        published.as_str(),
        modified.as_str(),
        item.summary.as_deref().unwrap_or(""),
    ] {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }

    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// The date an entry is filed under: its own modified or published time,
/// then the feed's date, then `now`.
pub fn display_date(item: &RawItem, now: DateTime<Utc>) -> DateTime<Utc> {
    item.modified_time
        .or(item.published_time)
        .or(item.source_time)
        .unwrap_or(now)
}

/// Drops items whose identity is already in `store`, records the rest as seen
/// at `now`, and returns them as `NewEntry`s in input order.
///
/// Identities recorded earlier in the same call count as seen, so an item
/// repeated within one batch is emitted once.
pub async fn filter_new<S>(
    source: &Source,
    items: Vec<RawItem>,
    store: &mut S,
    now: DateTime<Utc>,
) -> Result<Vec<NewEntry>>
where
    S: StateStore + ?Sized,
{
    let mut fresh = Vec::new();

    for item in items {
        let identity = entry_identity(&item);
        if state::is_seen(&*store, &identity).await? {
            debug!(source = %source, identity = %identity, "Skipping seen entry");
            continue;
        }

        state::mark_seen(store, &identity, now).await?;
        let date = display_date(&item, now);
        fresh.push(NewEntry::new(source.clone(), identity, date, item));
    }

    Ok(fresh)
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
