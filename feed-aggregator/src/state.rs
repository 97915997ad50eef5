use crate::traits::{Namespace, StateStore};
use crate::types::{AggregatorError, Result, SeenEntryRecord, Source, SourceState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::debug;

pub async fn load_source_state<S>(store: &S, source: &Source) -> Result<Option<SourceState>>
where
    S: StateStore + ?Sized,
{
    load(store, Namespace::Sources, source.as_str()).await
}

pub async fn save_source_state<S>(store: &mut S, source: &Source, state: &SourceState) -> Result<()>
where
    S: StateStore + ?Sized,
{
    let value = serde_json::to_string(state)?;
    store.set(Namespace::Sources, source.as_str(), value).await
}

pub async fn first_seen<S>(store: &S, identity: &str) -> Result<Option<SeenEntryRecord>>
where
    S: StateStore + ?Sized,
{
    load(store, Namespace::Entries, identity).await
}

pub async fn is_seen<S>(store: &S, identity: &str) -> Result<bool>
where
    S: StateStore + ?Sized,
{
    Ok(store.get(Namespace::Entries, identity).await?.is_some())
}

/// Records `identity` as seen at `at`. An existing record is left alone so the
/// first-seen time never moves.
pub async fn mark_seen<S>(store: &mut S, identity: &str, at: DateTime<Utc>) -> Result<()>
where
    S: StateStore + ?Sized,
{
    if is_seen(&*store, identity).await? {
        return Ok(());
    }
    let value = serde_json::to_string(&SeenEntryRecord { first_seen: at })?;
    store.set(Namespace::Entries, identity, value).await
}

async fn load<S, T>(store: &S, namespace: Namespace, key: &str) -> Result<Option<T>>
where
    S: StateStore + ?Sized,
    T: DeserializeOwned,
{
    match store.get(namespace, key).await? {
        Some(raw) => decode(namespace, key, &raw).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(namespace: Namespace, key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|source| AggregatorError::CorruptRecord {
        namespace: namespace.as_str(),
        key: key.to_string(),
        source,
    })
}

/// Process-local store. Nothing survives the value being dropped.
///
/// Writes are staged like the SQLite store's, so `discard` behaves the same.
#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    values: HashMap<(Namespace, String), String>,
    pending: HashMap<(Namespace, String), String>,
    flushes: usize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records in `namespace`, staged or flushed.
    pub fn len(&self, namespace: Namespace) -> usize {
        self.pending
            .keys()
            .filter(|key| !self.values.contains_key(*key))
            .chain(self.values.keys())
            .filter(|(ns, _)| *ns == namespace)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.pending.is_empty()
    }

    /// Number of completed `flush` calls.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>> {
        let key = (namespace, key.to_string());
        Ok(self.pending.get(&key).or_else(|| self.values.get(&key)).cloned())
    }

    async fn set(&mut self, namespace: Namespace, key: &str, value: String) -> Result<()> {
        self.pending.insert((namespace, key.to_string()), value);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.values.extend(self.pending.drain());
        self.flushes += 1;
        debug!(records = self.values.len(), "Flushed in-memory state");
        Ok(())
    }

    fn discard(&mut self) {
        if !self.pending.is_empty() {
            debug!(discarded = self.pending.len(), "Discarded staged in-memory state");
            self.pending.clear();
        }
    }
}
