use crate::parser::parse_feed;
use crate::traits::SourceFetcher;
use crate::types::{AggregatorError, ConditionalHints, FetchConfig, FetchOutcome, Result, Source};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff, SystemClock};
use reqwest::header::{HeaderName, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const MB: usize = 1024 * 1024;

/// Conditional HTTP GET plus feed parsing.
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }

        let client = builder
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Plain GET of a page, for feed discovery. Returns the URL the body was
    /// served from after redirects.
    pub async fn fetch_page(&self, url: &Url) -> Result<(Url, Vec<u8>)> {
        let response = self.client.get(url.clone()).send().await?;
        check_status(&response, url)?;

        let final_url = response.url().clone();
        let body = self.read_body(response).await?;
        debug!("Fetched page: {} ({} bytes)", final_url, body.len());
        Ok((final_url, body))
    }

    async fn fetch_once(&self, url: &Url, hints: ConditionalHints<'_>) -> Result<FetchOutcome> {
        let mut request = self.client.get(url.clone());

        if let Some(etag) = hints.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        if let Some(last_modified) = hints.last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("Feed not modified: {}", url);
            return Ok(FetchOutcome::NotModified);
        }
        check_status(&response, url)?;

        let etag = header_string(&response, ETAG);
        let last_modified = header_string(&response, LAST_MODIFIED);
        let body = self.read_body(response).await?;

        let mut feed = parse_feed(&body)?;
        feed.meta.etag = etag;
        feed.meta.last_modified = last_modified;

        info!("Fetched feed: {} ({} bytes, {} entries)", url, body.len(), feed.items.len());
        Ok(FetchOutcome::Fresh(feed))
    }

    async fn read_body(&self, response: Response) -> Result<Vec<u8>> {
        let limit = self.config.max_feed_size_mb * MB;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > limit {
                return Err(AggregatorError::FeedTooLarge {
                    size_mb: content_length as usize / MB,
                });
            }
        }

        let body = response.bytes().await?;
        if body.len() > limit {
            return Err(AggregatorError::FeedTooLarge {
                size_mb: body.len() / MB,
            });
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source: &Source, hints: ConditionalHints<'_>) -> Result<FetchOutcome> {
        let url = Url::parse(source.as_str())?;

        let mut backoff: ExponentialBackoff<SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            // max_retries bounds the attempts.
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            match self.fetch_once(&url, hints).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt < self.config.max_retries && is_retryable(&e) => {
                    let Some(delay) = backoff.next_backoff() else {
                        return Err(e);
                    };
                    attempt += 1;
                    warn!("Attempt {} failed for {}: {}; retrying in {:?}", attempt, url, e, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Transport hiccups and server-side failures are worth another try; client
/// errors and unparseable bodies are not.
fn is_retryable(error: &AggregatorError) -> bool {
    match error {
        AggregatorError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        AggregatorError::HttpStatus { status, .. } => {
            *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
        }
        _ => false,
    }
}

fn check_status(response: &Response, url: &Url) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    Err(AggregatorError::HttpStatus {
        status: status.as_u16(),
        url: url.to_string(),
    })
}

fn header_string(response: &Response, name: HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
