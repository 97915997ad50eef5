mod common;

use chrono::Duration;
use common::*;
use feed_aggregator::dedup::{display_date, entry_identity, filter_new};
use feed_aggregator::state::first_seen;
use feed_aggregator::{MemoryStateStore, Namespace, RawItem, Result, Source};

fn full_item() -> RawItem {
    let now = t0();
    RawItem {
        guid: None,
        title: Some("Release notes".to_string()),
        link: Some("http://example.com/release".to_string()),
        summary: Some("What changed".to_string()),
        content: Some("<p>Long body</p>".to_string()),
        published_time: Some(now - Duration::days(1)),
        modified_time: Some(now),
        source_title: Some("Example".to_string()),
        source_link: Some("http://example.com/".to_string()),
        source_time: Some(now - Duration::days(2)),
    }
}

#[test]
fn test_guid_is_the_identity() {
    let mut item = full_item();
    item.guid = Some("tag:example.com,2024:entry-1".to_string());

    assert_eq!(entry_identity(&item), "tag:example.com,2024:entry-1");
}

#[test]
fn test_blank_guid_falls_back_to_hash() {
    let without = full_item();
    let mut blank = full_item();
    blank.guid = Some("   ".to_string());

    assert_eq!(entry_identity(&blank), entry_identity(&without));
    assert_eq!(entry_identity(&without).len(), 64);
}

#[test]
fn test_hash_ignores_content_and_feed_fields() {
    let base = entry_identity(&full_item());

    let mut other = full_item();
    other.content = Some("completely different body".to_string());
    other.source_title = Some("Renamed feed".to_string());
    other.source_link = None;
    other.source_time = None;

    assert_eq!(entry_identity(&other), base);
}

#[test]
fn test_hash_depends_on_each_identity_field() {
    let base = entry_identity(&full_item());
    let mutations: [fn(&mut RawItem); 5] = [
        |i| i.title = Some("Other title".to_string()),
        |i| i.link = None,
        |i| i.published_time = i.published_time.map(|t| t + Duration::seconds(1)),
        |i| i.modified_time = None,
        |i| i.summary = Some(String::new()),
    ];

    for mutate in mutations {
        let mut item = full_item();
        mutate(&mut item);
        assert_ne!(entry_identity(&item), base);
    }
}

#[test]
fn test_hash_keeps_sub_second_precision() {
    let base = full_item();
    let mut nudged = full_item();
    nudged.published_time = nudged.published_time.map(|t| t + Duration::milliseconds(250));

    assert_ne!(entry_identity(&nudged), entry_identity(&base));
}

#[test]
fn test_identity_of_empty_item_is_stable() {
    let empty = RawItem::default();
    let identity = entry_identity(&empty);

    assert_eq!(identity, entry_identity(&RawItem::default()));
    assert!(identity.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_display_date_fallback_chain() {
    let now = t0();
    let mut item = full_item();
    assert_eq!(display_date(&item, now), now);

    item.modified_time = None;
    assert_eq!(display_date(&item, now), now - Duration::days(1));

    item.published_time = None;
    assert_eq!(display_date(&item, now), now - Duration::days(2));

    item.source_time = None;
    let later = now + Duration::hours(5);
    assert_eq!(display_date(&item, later), later);
}

#[tokio::test]
async fn test_filter_new_is_idempotent() -> Result<()> {
    init_tracing();

    let now = t0();
    let source = Source::from("http://a.example/feed");
    let items = vec![
        item(Some("id1"), "first", None),
        item(None, "second", None),
        item(None, "third", Some(now)),
    ];
    let mut store = MemoryStateStore::new();

    let first = filter_new(&source, items.clone(), &mut store, now).await?;
    let second = filter_new(&source, items, &mut store, now + Duration::hours(1)).await?;

    assert_eq!(first.len(), 3);
    assert!(second.is_empty());
    assert_eq!(store.len(Namespace::Entries), 3);

    let titles: Vec<&str> = first.iter().map(|e| e.title()).collect();
    assert_eq!(titles, vec!["first", "second", "third"]);

    Ok(())
}

#[tokio::test]
async fn test_repeat_within_batch_is_emitted_once() -> Result<()> {
    init_tracing();

    let source = Source::from("http://a.example/feed");
    let items = vec![
        item(Some("same"), "original", None),
        item(Some("same"), "reposted", None),
    ];
    let mut store = MemoryStateStore::new();

    let fresh = filter_new(&source, items, &mut store, t0()).await?;

    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].title(), "original");

    Ok(())
}

#[tokio::test]
async fn test_first_seen_time_never_moves() -> Result<()> {
    init_tracing();

    let now = t0();
    let source = Source::from("http://a.example/feed");
    let mut store = MemoryStateStore::new();

    filter_new(&source, vec![item(Some("id1"), "first", None)], &mut store, now).await?;
    filter_new(
        &source,
        vec![item(Some("id1"), "first", None)],
        &mut store,
        now + Duration::days(3),
    )
    .await?;

    let record = first_seen(&store, "id1").await?.unwrap();
    assert_eq!(record.first_seen, now);

    Ok(())
}

#[tokio::test]
async fn test_new_entry_carries_source_and_fields() -> Result<()> {
    init_tracing();

    let now = t0();
    let source = Source::from("http://a.example/feed");
    let mut store = MemoryStateStore::new();

    let fresh = filter_new(&source, vec![full_item()], &mut store, now).await?;
    let entry = &fresh[0];

    assert_eq!(entry.source(), &source);
    assert_eq!(entry.identity(), entry_identity(&full_item()));
    assert_eq!(entry.display_date(), now);
    assert_eq!(entry.link(), "http://example.com/release");
    assert_eq!(entry.summary(), "What changed");
    assert_eq!(entry.content(), "<p>Long body</p>");
    assert_eq!(entry.source_title(), "Example");
    assert_eq!(entry.source_link(), "http://example.com/");

    Ok(())
}
