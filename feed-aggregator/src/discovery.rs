use crate::fetcher::HttpFetcher;
use crate::parser::parse_feed;
use crate::types::{AggregatorError, Result, Source};
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

/// MIME types a `<link rel="alternate">` may carry to count as a feed.
const FEED_TYPES: [&str; 5] = [
    "application/rss+xml",
    "text/xml",
    "application/atom+xml",
    "application/x.atom+xml",
    "application/x-atom+xml",
];

/// Resolves `uri` to the feeds it stands for.
///
/// A URI that already serves a feed resolves to itself. Anything else is
/// read as HTML and its autodiscovery links are returned, in document order.
pub async fn discover_feeds(fetcher: &HttpFetcher, uri: &str) -> Result<Vec<Source>> {
    let url = Url::parse(uri.trim())?;
    let (page_url, body) = fetcher.fetch_page(&url).await?;

    if parse_feed(&body).is_ok() {
        debug!("{} is a feed itself", url);
        return Ok(vec![Source::from(url.as_str())]);
    }

    let html = String::from_utf8_lossy(&body);
    let found = feed_links(&html, &page_url)?;
    info!("Found {} feed links at {}", found.len(), page_url);
    Ok(found)
}

/// Feed links advertised in an HTML page, resolved against the page URL or
/// its `<base href>`. Duplicates are dropped.
pub fn feed_links(html: &str, page_url: &Url) -> Result<Vec<Source>> {
    let document = Html::parse_document(html);
    let base_selector = selector("base[href]")?;
    let link_selector = selector("link[href]")?;

    let base = document
        .select(&base_selector)
        .next()
        .and_then(|element| element.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone());

    let mut found: Vec<Source> = Vec::new();
    for element in document.select(&link_selector) {
        let link = element.value();

        let alternate = link
            .attr("rel")
            .map(|rel| {
                rel.split_ascii_whitespace()
                    .any(|token| token.eq_ignore_ascii_case("alternate"))
            })
            .unwrap_or(false);
        let feed_type = link
            .attr("type")
            .map(|kind| FEED_TYPES.contains(&kind.trim().to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !alternate || !feed_type {
            continue;
        }

        let Some(href) = link.attr("href") else {
            continue;
        };
        match base.join(href.trim()) {
            Ok(url) => {
                let source = Source::from(url.as_str());
                if !found.contains(&source) {
                    found.push(source);
                }
            }
            Err(e) => debug!("Skipping feed link {:?}: {}", href, e),
        }
    }

    Ok(found)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AggregatorError::Selector(e.to_string()))
}
