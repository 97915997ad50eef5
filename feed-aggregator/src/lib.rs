pub mod aggregator;
pub mod dedup;
pub mod discovery;
pub mod fetcher;
pub mod output;
pub mod parser;
pub mod schedule;
pub mod state;
pub mod store;
pub mod subscriptions;
pub mod traits;
pub mod types;

pub use aggregator::Aggregator;
pub use fetcher::HttpFetcher;
pub use output::JsonLinesSink;
pub use schedule::PollScheduler;
pub use state::MemoryStateStore;
pub use store::SqliteStateStore;
pub use traits::{Namespace, SourceFetcher, StateStore};
pub use types::*;
