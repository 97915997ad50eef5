use crate::types::{AggregatorError, Result, Source};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Reads a subscription list: one URI per line, surrounding whitespace
/// trimmed, blank lines ignored.
pub fn load_subscriptions(path: impl AsRef<Path>) -> Result<Vec<Source>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let sources = parse_subscriptions(&text);
    debug!("Loaded {} subscriptions from {}", sources.len(), path.display());
    Ok(sources)
}

pub fn parse_subscriptions(text: &str) -> Vec<Source> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Source::from)
        .collect()
}

pub fn save_subscriptions(path: impl AsRef<Path>, sources: &[Source]) -> Result<()> {
    let text = sources
        .iter()
        .map(Source::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(path, text)?;
    Ok(())
}

/// Picks the one feed discovery found at `uri`. Zero or several candidates
/// are errors; the caller has to pick a feed URI explicitly then.
pub fn single_feed(uri: &str, found: Vec<Source>) -> Result<Source> {
    let mut found = found;
    match found.len() {
        0 => Err(AggregatorError::NoFeedsFound { uri: uri.to_string() }),
        1 => Ok(found.remove(0)),
        _ => Err(AggregatorError::MultipleFeedsFound {
            uri: uri.to_string(),
            candidates: found.iter().map(Source::to_string).collect(),
        }),
    }
}

pub fn subscribe(sources: &mut Vec<Source>, source: Source) -> Result<()> {
    if sources.contains(&source) {
        return Err(AggregatorError::AlreadySubscribed {
            uri: source.to_string(),
        });
    }
    info!("Subscribed to {}", source);
    sources.push(source);
    Ok(())
}

pub fn unsubscribe(sources: &mut Vec<Source>, source: &Source) -> Result<()> {
    let Some(position) = sources.iter().position(|s| s == source) else {
        return Err(AggregatorError::NotSubscribed {
            uri: source.to_string(),
        });
    };
    sources.remove(position);
    info!("Unsubscribed from {}", source);
    Ok(())
}
