use crate::types::{PollResult, Source, SourceState};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// Decides when a source is due and how its stored notes change after a poll.
#[derive(Debug, Clone, Copy)]
pub struct PollScheduler {
    min_interval: Duration,
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new(Duration::seconds(3600))
    }
}

impl PollScheduler {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// False only when the source was polled less than `min_interval` ago.
    pub fn should_poll(&self, source: &Source, state: Option<&SourceState>, now: DateTime<Utc>) -> bool {
        match state.and_then(|s| s.last_poll_time) {
            None => true,
            Some(last) => {
                let due = now.signed_duration_since(last) >= self.min_interval;
                if !due {
                    debug!(source = %source, last_poll = %last, "Polled too recently");
                }
                due
            }
        }
    }

    /// Earliest time the source becomes due again, if it has ever been polled.
    pub fn next_due(&self, state: Option<&SourceState>) -> Option<DateTime<Utc>> {
        state
            .and_then(|s| s.last_poll_time)
            .map(|last| last + self.min_interval)
    }

    /// Stamps a poll attempt onto the source's notes.
    ///
    /// Every outcome moves `last_poll_time` forward, failures included. Only a
    /// fresh fetch replaces the cache validators; a missing title keeps the
    /// one already cached.
    pub fn record_poll_outcome(
        &self,
        source: &Source,
        previous: Option<SourceState>,
        now: DateTime<Utc>,
        result: PollResult<'_>,
    ) -> SourceState {
        let mut state = previous.unwrap_or_default();

        // A clock that stepped backwards must not move the poll time back.
        state.last_poll_time = Some(match state.last_poll_time {
            Some(last) if last > now => last,
            _ => now,
        });

        if let PollResult::Fresh(meta) = result {
            state.etag = meta.etag.clone();
            state.last_modified = meta.last_modified.clone();
            if let Some(title) = &meta.title {
                state.display_title = Some(title.clone());
            }
        }

        debug!(source = %source, outcome = ?result, "Recorded poll attempt");
        state
    }
}
