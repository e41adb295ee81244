//! Cursor pagination for Atlas list endpoints
//!
//! List endpoints answer with an envelope `{"results": [...], "next": <url|null>}`.
//! [`pages`] turns that into a lazy stream that requests a page only when the
//! previous one has been consumed, so very large catalogs never need to be
//! held in memory as raw pages. [`fetch_all`] drains the stream through a
//! filter and a transform.
//!
//! Safety mechanisms:
//! - Maximum page count to prevent runaway loops
//! - Repeated cursor detection
//! - Errors end the stream and propagate unchanged

use crate::fetcher::http::AtlasHttpClient;
use crate::fetcher::{FetcherError, FetcherResult};
use futures_util::stream::{self, Stream, TryStreamExt};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::pin::Pin;
use tracing::debug;

/// Maximum number of pages followed before giving up
const MAX_PAGES: usize = 100_000;

/// Follow-up requests send no extra parameters
const NO_PARAMS: &[(&str, String)] = &[];

/// Stream of raw result pages
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = FetcherResult<Vec<Value>>> + Send + 'a>>;

/// Paginated response envelope
#[derive(Debug, Deserialize)]
pub struct Page {
    /// Items on this page
    #[serde(default)]
    pub results: Vec<Value>,
    /// Absolute or relative URL of the next page
    #[serde(default)]
    pub next: Option<String>,
}

/// Where the next request goes
enum Cursor {
    /// First request, sent with the caller's parameters
    Start(String),
    /// Follow-up request; the cursor URL carries its own query string
    Next(String),
    /// No more pages
    Done,
}

struct PagerState<'a> {
    client: &'a AtlasHttpClient,
    params: &'a [(&'a str, String)],
    cursor: Cursor,
    visited: HashSet<String>,
    pages: usize,
}

/// Lazily page through a cursor-paginated endpoint
///
/// # Arguments
/// * `client` - HTTP client used for every page
/// * `url` - Absolute URL of the first page
/// * `params` - Query parameters for the first request only
///
/// # Returns
/// Stream yielding the `results` array of each page in order. The stream ends
/// after the page without a `next` link, or after the first error.
pub fn pages<'a>(
    client: &'a AtlasHttpClient,
    url: &str,
    params: &'a [(&'a str, String)],
) -> PageStream<'a> {
    let state = PagerState {
        client,
        params,
        cursor: Cursor::Start(url.to_string()),
        visited: HashSet::new(),
        pages: 0,
    };

    let stream = stream::try_unfold(state, |mut state| async move {
        let (url, params): (String, &[(&str, String)]) =
            match std::mem::replace(&mut state.cursor, Cursor::Done) {
                Cursor::Start(url) => (url, state.params),
                Cursor::Next(url) => (url, NO_PARAMS),
                Cursor::Done => return Ok(None),
            };

        if state.pages >= MAX_PAGES {
            return Err(FetcherError::InvalidResponse(format!(
                "Max pages ({MAX_PAGES}) exceeded - possible pagination loop at {url}"
            )));
        }
        state.visited.insert(url.clone());

        debug!("Fetching page {} from {}", state.pages + 1, url);
        let page: Page = state.client.get_url(&url, params).await?;
        state.pages += 1;

        debug!(
            "Received {} items in page {} (next: {})",
            page.results.len(),
            state.pages,
            page.next.is_some()
        );

        if let Some(next) = page.next.as_deref().filter(|n| !n.is_empty()) {
            let next = resolve_next(&url, next)?;
            if state.visited.contains(&next) {
                return Err(FetcherError::InvalidResponse(format!(
                    "Pagination cursor repeats an already visited page: {next}"
                )));
            }
            state.cursor = Cursor::Next(next);
        }

        Ok::<_, FetcherError>(Some((page.results, state)))
    });

    Box::pin(stream)
}

/// Fetch every item of a paginated endpoint
///
/// `filter` is applied before `transform`; items rejected by the filter are
/// never transformed. Order is preserved.
///
/// # Errors
/// Any HTTP, JSON or transform error is returned unchanged; partially
/// collected items are discarded.
pub async fn fetch_all<T, F, M>(
    client: &AtlasHttpClient,
    url: &str,
    params: &[(&str, String)],
    mut filter: F,
    mut transform: M,
) -> FetcherResult<Vec<T>>
where
    F: FnMut(&Value) -> bool,
    M: FnMut(Value) -> FetcherResult<T>,
{
    let mut stream = pages(client, url, params);
    let mut items = Vec::new();
    let mut seen = 0usize;

    while let Some(page) = stream.try_next().await? {
        seen += page.len();
        for item in page {
            if filter(&item) {
                items.push(transform(item)?);
            }
        }
    }

    debug!(
        "Pagination completed: {} of {} items kept from {}",
        items.len(),
        seen,
        url
    );

    Ok(items)
}

/// Resolve a `next` link against the URL it was returned from
fn resolve_next(current: &str, next: &str) -> FetcherResult<String> {
    let base = Url::parse(current)
        .map_err(|e| FetcherError::InvalidResponse(format!("Invalid page URL {current}: {e}")))?;
    base.join(next)
        .map(String::from)
        .map_err(|e| FetcherError::InvalidResponse(format!("Invalid next link {next}: {e}")))
}
