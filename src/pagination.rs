//! Pagination drivers: numbered pages, server cursors, and a single page.
//!
//! Every driver fetches strictly in order and hands each page to an
//! accumulator as a whole, so a page is either appended completely or not at all.

use crate::apis::ApiError;
use crate::config::PagingPolicy;
use crate::error::{EtlError, Result};
use metrics::counter;
use std::future::Future;
use tracing::{debug, info, warn};

/// Counters describing how a paginated fetch went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PagingSummary {
    /// Calls made to the source, failed ones included.
    pub fetches: u32,
    /// Non-empty pages handed to the accumulator.
    pub pages: u32,
    pub items: usize,
}

/// A page returned by a cursor-paginated source.
#[derive(Debug, Clone)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// Fetch pages 1, 2, 3, ... until a page comes back empty.
///
/// A failing page is retried on the same page number with exponential backoff;
/// once `policy.max_attempts` attempts have failed the run stops with
/// [`EtlError::PageFetch`] and nothing past the failing page is fetched.
pub async fn drive_numbered_pages<T, F, Fut, A>(
    policy: &PagingPolicy,
    mut fetch: F,
    mut accumulate: A,
) -> Result<PagingSummary>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<Vec<T>, ApiError>>,
    A: FnMut(Vec<T>) -> Result<()>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut summary = PagingSummary::default();
    let mut page_number: u32 = 1;
    let mut attempts: u32 = 0;

    loop {
        summary.fetches += 1;
        match fetch(page_number).await {
            Ok(items) if items.is_empty() => {
                info!("Page {} is empty, pagination exhausted", page_number);
                return Ok(summary);
            }
            Ok(items) => {
                debug!("Page {} returned {} items", page_number, items.len());
                summary.pages += 1;
                summary.items += items.len();
                counter!("etl_pages_fetched_total").increment(1);
                accumulate(items)?;
                page_number += 1;
                attempts = 0;
            }
            Err(e) => {
                attempts += 1;
                counter!("etl_page_fetch_errors_total").increment(1);
                if attempts >= max_attempts {
                    warn!("Giving up on page {} after {} attempts: {}", page_number, attempts, e);
                    return Err(EtlError::PageFetch { page: page_number, attempts, source: e });
                }
                let delay = policy.backoff(attempts);
                warn!(
                    "Fetching page {} failed (attempt {}/{}), retrying in {:?}: {}",
                    page_number, attempts, max_attempts, delay, e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Follow server-issued cursors from `initial_cursor` until a page is empty or
/// no next cursor is returned.
///
/// A failed fetch counts as an empty page: the run ends with what was
/// accumulated so far and is not reported as a failure.
pub async fn drive_cursor_pages<T, F, Fut, A>(
    initial_cursor: Option<String>,
    mut fetch: F,
    mut accumulate: A,
) -> Result<PagingSummary>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = std::result::Result<CursorPage<T>, ApiError>>,
    A: FnMut(Vec<T>) -> Result<()>,
{
    let mut summary = PagingSummary::default();
    let mut cursor = initial_cursor.filter(|c| !c.is_empty());

    loop {
        summary.fetches += 1;
        let page = match fetch(cursor.clone()).await {
            Ok(page) => page,
            Err(e) => {
                counter!("etl_page_fetch_errors_total").increment(1);
                info!("Cursor fetch failed, treating as end of data: {}", e);
                CursorPage { items: Vec::new(), next_cursor: None }
            }
        };

        if page.items.is_empty() {
            debug!("Empty page after {} fetches", summary.fetches);
            return Ok(summary);
        }

        summary.pages += 1;
        summary.items += page.items.len();
        counter!("etl_pages_fetched_total").increment(1);
        accumulate(page.items)?;

        cursor = page.next_cursor.filter(|c| !c.is_empty());
        if cursor.is_none() {
            debug!("No next cursor after {} fetches", summary.fetches);
            return Ok(summary);
        }
    }
}

/// One fetch, no iteration. Errors propagate to the caller.
pub async fn fetch_single_page<T, Fut>(fetch: Fut) -> Result<(Vec<T>, PagingSummary)>
where
    Fut: Future<Output = std::result::Result<Vec<T>, ApiError>>,
{
    let items = fetch.await?;
    counter!("etl_pages_fetched_total").increment(1);
    let summary = PagingSummary {
        fetches: 1,
        pages: u32::from(!items.is_empty()),
        items: items.len(),
    };
    Ok((items, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn no_backoff(max_attempts: u32) -> PagingPolicy {
        PagingPolicy { max_attempts, initial_backoff_ms: 0, max_backoff_ms: 0 }
    }

    fn failure() -> ApiError {
        ApiError::Status { status: 503, body: "unavailable".to_string() }
    }

    #[tokio::test]
    async fn test_numbered_accumulates_until_empty_page() {
        let pages = vec![vec![1, 2], vec![3], vec![]];
        let requested = Arc::new(Mutex::new(Vec::new()));
        let mut collected = Vec::new();

        let summary = drive_numbered_pages(
            &no_backoff(3),
            |page| {
                requested.lock().unwrap().push(page);
                let items = pages[(page - 1) as usize].clone();
                async move { Ok::<_, ApiError>(items) }
            },
            |items| {
                collected.extend(items);
                Ok(())
            },
        )
        .await
        .unwrap();

        assert_eq!(collected, vec![1, 2, 3]);
        assert_eq!(*requested.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(summary, PagingSummary { fetches: 3, pages: 2, items: 3 });
    }

    #[tokio::test]
    async fn test_numbered_retries_same_page_after_transient_error() {
        let responses = Arc::new(Mutex::new(VecDeque::from(vec![
            Ok(vec!["a"]),
            Err(failure()),
            Err(failure()),
            Ok(vec!["b"]),
            Ok(vec![]),
        ])));
        let requested = Arc::new(Mutex::new(Vec::new()));
        let mut collected = Vec::new();

        let summary = drive_numbered_pages(
            &no_backoff(3),
            |page| {
                requested.lock().unwrap().push(page);
                let next = responses.lock().unwrap().pop_front().unwrap();
                async move { next }
            },
            |items| {
                collected.extend(items);
                Ok(())
            },
        )
        .await
        .unwrap();

        assert_eq!(collected, vec!["a", "b"]);
        assert_eq!(*requested.lock().unwrap(), vec![1, 2, 2, 2, 3]);
        assert_eq!(summary.fetches, 5);
    }

    #[tokio::test]
    async fn test_numbered_gives_up_after_max_attempts() {
        let calls = Arc::new(Mutex::new(0u32));
        let result = drive_numbered_pages(
            &no_backoff(4),
            |page| {
                *calls.lock().unwrap() += 1;
                async move {
                    if page == 1 {
                        Ok(vec![1])
                    } else {
                        Err(failure())
                    }
                }
            },
            |_| Ok(()),
        )
        .await;

        match result {
            Err(EtlError::PageFetch { page, attempts, .. }) => {
                assert_eq!(page, 2);
                assert_eq!(attempts, 4);
            }
            other => panic!("expected PageFetch error, got {other:?}"),
        }
        assert_eq!(*calls.lock().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_cursor_chain_of_three_takes_three_fetches() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut collected = Vec::new();

        let summary = drive_cursor_pages(
            None,
            |cursor: Option<String>| {
                seen.lock().unwrap().push(cursor.clone());
                let next = match cursor.as_deref() {
                    None => Some("c1".to_string()),
                    Some("c1") => Some("c2".to_string()),
                    _ => None,
                };
                async move { Ok::<_, ApiError>(CursorPage { items: vec![1, 2], next_cursor: next }) }
            },
            |items| {
                collected.extend(items);
                Ok(())
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.fetches, 3);
        assert_eq!(collected.len(), 6);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("c1".to_string()), Some("c2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_cursor_stops_on_empty_page() {
        let summary = drive_cursor_pages(
            Some(String::new()),
            |cursor: Option<String>| async move {
                let items = if cursor.is_none() { vec![1] } else { vec![] };
                Ok::<_, ApiError>(CursorPage { items, next_cursor: Some("more".to_string()) })
            },
            |_| Ok(()),
        )
        .await
        .unwrap();

        assert_eq!(summary, PagingSummary { fetches: 2, pages: 1, items: 1 });
    }

    #[tokio::test]
    async fn test_cursor_error_ends_run_with_accumulated_rows() {
        let mut collected = Vec::new();
        let summary = drive_cursor_pages(
            Some("start".to_string()),
            |cursor: Option<String>| async move {
                match cursor.as_deref() {
                    Some("start") => Ok(CursorPage { items: vec![7], next_cursor: Some("next".to_string()) }),
                    _ => Err(failure()),
                }
            },
            |items| {
                collected.extend(items);
                Ok(())
            },
        )
        .await
        .unwrap();

        assert_eq!(collected, vec![7]);
        assert_eq!(summary.fetches, 2);
    }

    #[tokio::test]
    async fn test_single_page_propagates_error() {
        let (items, summary) = fetch_single_page(async { Ok::<_, ApiError>(vec![1, 2, 3]) }).await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(summary.fetches, 1);

        let failed = fetch_single_page::<i32, _>(async { Err(failure()) }).await;
        assert!(matches!(failed, Err(EtlError::Api(_))));
    }
}
