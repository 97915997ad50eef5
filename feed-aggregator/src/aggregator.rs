use crate::dedup;
use crate::schedule::PollScheduler;
use crate::state;
use crate::store::SqliteStateStore;
use crate::traits::{SourceFetcher, StateStore};
use crate::types::{
    AggregatorError, ConditionalHints, FetchOutcome, FreshFeed, NewEntry, PollConfig, PollOutcome,
    PollReport, PollResult, Result, Source, SourceReport, SourceState, SourceStatus,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Runs poll cycles: schedule, fetch, dedup, persist.
pub struct Aggregator {
    scheduler: PollScheduler,
    config: PollConfig,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(PollConfig::default())
    }
}

impl Aggregator {
    pub fn new(config: PollConfig) -> Self {
        Self {
            scheduler: PollScheduler::new(config.min_interval),
            config,
        }
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// One poll cycle against a store that is opened at `path` for the
    /// duration of the cycle and closed afterwards.
    ///
    /// If the cycle fails its staged writes are discarded, so nothing from the
    /// failed cycle is persisted.
    pub async fn poll_with_store_at<F>(
        &self,
        sources: &[Source],
        fetcher: &F,
        path: impl AsRef<Path>,
        now: DateTime<Utc>,
    ) -> Result<PollOutcome>
    where
        F: SourceFetcher + ?Sized,
    {
        let mut store = SqliteStateStore::open(path).await?;
        let outcome = self.poll_all(sources, fetcher, &mut store, now).await?;
        store.close().await?;
        Ok(outcome)
    }

    /// Polls every due source and returns the entries not seen before, most
    /// recent first.
    ///
    /// Per-source fetch failures are logged and reported but never abort the
    /// cycle. Store errors, and fatal errors surfaced by a fetcher, abort it
    /// and are returned as-is after the cycle's staged writes are discarded.
    /// Each due source gets exactly one recorded poll attempt, and all writes
    /// are flushed before returning.
    pub async fn poll_all<F, S>(
        &self,
        sources: &[Source],
        fetcher: &F,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> Result<PollOutcome>
    where
        F: SourceFetcher + ?Sized,
        S: StateStore + ?Sized,
    {
        match self.run_cycle(sources, fetcher, &mut *store, now).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(error = %e, "Poll cycle aborted");
                store.discard();
                Err(e)
            }
        }
    }

    async fn run_cycle<F, S>(
        &self,
        sources: &[Source],
        fetcher: &F,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> Result<PollOutcome>
    where
        F: SourceFetcher + ?Sized,
        S: StateStore + ?Sized,
    {
        let mut reports: Vec<Option<SourceStatus>> = vec![None; sources.len()];
        let mut due: Vec<(usize, &Source, Option<SourceState>)> = Vec::new();
        let mut claimed: HashSet<&Source> = HashSet::new();

        for (index, source) in sources.iter().enumerate() {
            let previous = state::load_source_state(&*store, source).await?;

            // A source listed twice is polled once per cycle.
            if !claimed.contains(source) && self.scheduler.should_poll(source, previous.as_ref(), now) {
                claimed.insert(source);
                due.push((index, source, previous));
            } else {
                let next_due = self.scheduler.next_due(previous.as_ref()).unwrap_or(now);
                info!(source = %source, next_due = %next_due, "Skipping, polled recently");
                reports[index] = Some(SourceStatus::RateLimited { next_due });
            }
        }

        let concurrency = self.config.max_concurrent_fetches.max(1);
        let mut fetches = stream::iter(due)
            .map(move |(index, source, previous)| async move {
                let hints = ConditionalHints::from_state(previous.as_ref());
                let result = self.fetch_guarded(fetcher, source, hints).await;
                (index, source, previous, result)
            })
            .buffered(concurrency);

        let mut entries: Vec<NewEntry> = Vec::new();

        while let Some((index, source, previous, result)) = fetches.next().await {
            let (status, updated) = match result {
                Ok(FetchOutcome::Fresh(FreshFeed { meta, items })) => {
                    let fetched = items.len();
                    let fresh = dedup::filter_new(source, items, &mut *store, now).await?;
                    info!(source = %source, fetched, new = fresh.len(), "Polled feed");
                    let status = SourceStatus::Fresh {
                        fetched,
                        new: fresh.len(),
                    };
                    entries.extend(fresh);
                    let updated = self.scheduler.record_poll_outcome(
                        source,
                        previous,
                        now,
                        PollResult::Fresh(&meta),
                    );
                    (status, updated)
                }
                Ok(FetchOutcome::NotModified) => {
                    info!(source = %source, "Feed unchanged");
                    let updated = self.scheduler.record_poll_outcome(
                        source,
                        previous,
                        now,
                        PollResult::NotModified,
                    );
                    (SourceStatus::NotModified, updated)
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(source = %source, error = %e, "Problem polling feed");
                    let updated =
                        self.scheduler
                            .record_poll_outcome(source, previous, now, PollResult::Failed);
                    (SourceStatus::Failed { error: e.to_string() }, updated)
                }
            };

            state::save_source_state(&mut *store, source, &updated).await?;
            reports[index] = Some(status);
        }

        store.flush().await?;

        sort_entries(&mut entries);

        let report = PollReport {
            sources: sources
                .iter()
                .zip(reports)
                .map(|(source, status)| SourceReport {
                    source: source.clone(),
                    status: status.unwrap_or(SourceStatus::Failed {
                        error: "not processed".to_string(),
                    }),
                })
                .collect(),
        };

        info!(
            new_entries = entries.len(),
            fresh = report.fresh_count(),
            not_modified = report.not_modified_count(),
            rate_limited = report.rate_limited_count(),
            failed = report.failed_count(),
            "Poll cycle finished"
        );

        Ok(PollOutcome { entries, report })
    }

    async fn fetch_guarded<F>(
        &self,
        fetcher: &F,
        source: &Source,
        hints: ConditionalHints<'_>,
    ) -> Result<FetchOutcome>
    where
        F: SourceFetcher + ?Sized,
    {
        match self.config.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fetcher.fetch(source, hints))
                .await
                .unwrap_or_else(|_| {
                    Err(AggregatorError::FetchTimeout {
                        seconds: limit.as_secs(),
                    })
                }),
            None => fetcher.fetch(source, hints).await,
        }
    }
}

/// Most recent first. The sort is stable, so entries with equal dates keep
/// the order in which they were discovered.
pub fn sort_entries(entries: &mut [NewEntry]) {
    entries.sort_by(|a, b| b.display_date().cmp(&a.display_date()));
}
