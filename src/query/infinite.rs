//! Paginated ("infinite") queries.
//!
//! An [`InfiniteQuery`] observes one cache key holding [`InfiniteData`]: the
//! pages fetched so far plus the cursor each page was fetched with. New pages
//! are appended with `fetch_next_page()`, the whole set is replaced by
//! `refetch()`, and invalidations through the [`QueryClient`] trigger a refetch
//! on the next `poll()`.
//!
//! Like the rest of the query module it is driven from the UI event loop: fetches
//! run as spawned tasks and report back over a channel drained by `poll()`.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::client::{FetchId, QueryClient};
use super::key::QueryKey;

/// Cached value of an infinite query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfiniteData<P, C> {
  pub pages: Vec<P>,
  /// Cursor each page was fetched with, parallel to `pages`
  pub page_params: Vec<C>,
}

impl<P, C> Default for InfiniteData<P, C> {
  fn default() -> Self {
    Self {
      pages: Vec::new(),
      page_params: Vec::new(),
    }
  }
}

/// Coarse status of an infinite query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// No data yet
  Pending,
  Success,
  /// Last fetch failed
  Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
  Initial,
  NextPage,
  Refetch,
}

enum FetchOutcome<P, C> {
  Replace(InfiniteData<P, C>),
  Append { param: C, page: P },
}

type FetchResult<P, C> = Result<FetchOutcome<P, C>, String>;

type PageFn<P, C> = Arc<dyn Fn(C) -> BoxFuture<'static, Result<P, String>> + Send + Sync>;

type NextParamFn<P, C> = Arc<dyn Fn(&P, &[P]) -> Option<C> + Send + Sync>;

struct ActiveFetch<P, C> {
  id: FetchId,
  kind: FetchKind,
  receiver: mpsc::UnboundedReceiver<FetchResult<P, C>>,
}

/// Observer of a paginated cache entry.
pub struct InfiniteQuery<P, C> {
  key: QueryKey,
  client: QueryClient,
  page_fn: PageFn<P, C>,
  next_param: NextParamFn<P, C>,
  initial_param: C,
  active: Option<ActiveFetch<P, C>>,
  error: Option<String>,
  seen_invalidation: u64,
}

impl<P, C> InfiniteQuery<P, C>
where
  P: Clone + Send + Sync + 'static,
  C: Clone + Send + Sync + 'static,
{
  /// Create an observer for `key`.
  ///
  /// `page_fn` fetches one page for a cursor; `next_param` derives the cursor
  /// of the page after `last_page` (or `None` when there are no more pages).
  /// Nothing is fetched until `fetch()` or `fetch_next_page()` is called.
  pub fn new<F, Fut, N>(
    client: QueryClient,
    key: QueryKey,
    initial_param: C,
    page_fn: F,
    next_param: N,
  ) -> Self
  where
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P, String>> + Send + 'static,
    N: Fn(&P, &[P]) -> Option<C> + Send + Sync + 'static,
  {
    let seen_invalidation = client.invalidation_seq(&key);
    Self {
      key,
      client,
      page_fn: Arc::new(move |param: C| page_fn(param).boxed()),
      next_param: Arc::new(next_param),
      initial_param,
      active: None,
      error: None,
      seen_invalidation,
    }
  }

  /// Snapshot of the cached pages.
  pub fn data(&self) -> Option<InfiniteData<P, C>> {
    self.client.get_query_data(&self.key)
  }

  /// Cached pages, empty before the first successful fetch.
  pub fn pages(&self) -> Vec<P> {
    self.data().map(|data| data.pages).unwrap_or_default()
  }

  pub fn status(&self) -> QueryStatus {
    if self.error.is_some() {
      QueryStatus::Error
    } else if self.data().is_some() {
      QueryStatus::Success
    } else {
      QueryStatus::Pending
    }
  }

  /// Error message of the last failed fetch.
  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  /// Check whether a fetch started by this observer is still outstanding.
  ///
  /// A fetch cancelled through the client stops counting immediately.
  pub fn is_fetching(&self) -> bool {
    self
      .active
      .as_ref()
      .is_some_and(|active| self.client.is_fetch_current(&self.key, active.id))
  }

  pub fn is_fetching_next_page(&self) -> bool {
    self.is_fetching()
      && self
        .active
        .as_ref()
        .is_some_and(|active| active.kind == FetchKind::NextPage)
  }

  /// Check whether the cursor function yields another page.
  pub fn has_next_page(&self) -> bool {
    match self.data() {
      Some(data) => self.next_param_for(&data.pages).is_some(),
      None => false,
    }
  }

  /// Check whether the cached pages have been invalidated and not yet replaced.
  pub fn is_stale(&self) -> bool {
    self.client.is_stale(&self.key)
  }

  /// Fetch the first page if nothing is cached or in flight.
  pub fn fetch(&mut self) -> bool {
    if self.data().is_some() || self.client.is_fetching(&self.key) > 0 {
      return false;
    }
    self.start_initial();
    true
  }

  /// Fetch the page after the last cached one.
  ///
  /// This is a no-op while any fetch for the key is in flight, and when the
  /// cursor function reports there are no more pages. Returns whether a fetch
  /// was started.
  pub fn fetch_next_page(&mut self) -> bool {
    if self.client.is_fetching(&self.key) > 0 {
      debug!(key = %self.key, "fetch already in flight, ignoring next page request");
      return false;
    }

    let Some(data) = self.data() else {
      return self.fetch();
    };

    match self.next_param_for(&data.pages) {
      Some(param) => {
        self.start_with(FetchKind::NextPage, next_page(self.page_fn.clone(), param));
        true
      }
      None => {
        debug!(key = %self.key, "no more pages");
        false
      }
    }
  }

  /// Refetch every loaded page from the initial cursor, replacing the cache.
  ///
  /// Any fetch in flight for the key is aborted first.
  pub fn refetch(&mut self) {
    self.start_refetch();
  }

  /// Drain completed work. Returns `true` if visible state changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;

    let latest = self.client.invalidation_seq(&self.key);
    if latest > self.seen_invalidation {
      self.seen_invalidation = latest;
      debug!(key = %self.key, "invalidated, refetching");
      self.refetch();
      changed = true;
    }

    let Some(active) = self.active.as_mut() else {
      return changed;
    };
    let id = active.id;

    match active.receiver.try_recv() {
      Ok(result) => {
        self.active = None;
        if !self.client.complete_fetch(&self.key, id) {
          debug!(key = %self.key, fetch = id, "discarding result of cancelled fetch");
          return true;
        }
        self.apply(result);
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => {
        if self.client.is_fetch_current(&self.key, id) {
          changed
        } else {
          // Cancelled through the client; the task has been aborted
          self.active = None;
          true
        }
      }
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.active = None;
        self.client.complete_fetch(&self.key, id);
        true
      }
    }
  }

  fn apply(&mut self, result: FetchResult<P, C>) {
    match result {
      Ok(FetchOutcome::Replace(data)) => {
        debug!(key = %self.key, pages = data.pages.len(), "replaced pages");
        self.client.set_query_data(&self.key, |_| Some(data));
        self.error = None;
      }
      Ok(FetchOutcome::Append { param, page }) => {
        self
          .client
          .set_query_data::<InfiniteData<P, C>, _>(&self.key, |old| {
            let mut data = old.unwrap_or_default();
            data.pages.push(page);
            data.page_params.push(param);
            Some(data)
          });
        self.error = None;
      }
      Err(e) => {
        warn!(key = %self.key, error = %e, "fetch failed");
        self.error = Some(e);
      }
    }
  }

  fn next_param_for(&self, pages: &[P]) -> Option<C> {
    pages.last().and_then(|last| (self.next_param)(last, pages))
  }

  fn start_initial(&mut self) {
    let fetch = initial_page(self.page_fn.clone(), self.initial_param.clone());
    self.start_with(FetchKind::Initial, fetch);
  }

  fn start_refetch(&mut self) {
    let count = self.data().map(|data| data.pages.len()).unwrap_or(0).max(1);
    let fetch = refetch_pages(
      self.page_fn.clone(),
      self.next_param.clone(),
      self.initial_param.clone(),
      count,
    );
    self.start_with(FetchKind::Refetch, fetch);
  }

  fn start_with<Fut>(&mut self, kind: FetchKind, fetch: Fut)
  where
    Fut: Future<Output = FetchResult<P, C>> + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
      // Ignore send errors - the observer may have moved on
      let _ = tx.send(fetch.await);
    });

    let id = self.client.register_fetch(&self.key, task.abort_handle());
    debug!(key = %self.key, fetch = id, kind = ?kind, "started fetch");
    self.active = Some(ActiveFetch {
      id,
      kind,
      receiver: rx,
    });
  }
}

async fn initial_page<P, C>(page_fn: PageFn<P, C>, initial: C) -> FetchResult<P, C>
where
  C: Clone,
{
  let page = page_fn(initial.clone()).await?;
  Ok(FetchOutcome::Replace(InfiniteData {
    pages: vec![page],
    page_params: vec![initial],
  }))
}

async fn next_page<P, C>(page_fn: PageFn<P, C>, param: C) -> FetchResult<P, C>
where
  C: Clone,
{
  let page = page_fn(param.clone()).await?;
  Ok(FetchOutcome::Append { param, page })
}

/// Fetch `count` pages one after another, deriving each cursor from the fresh
/// previous page. Stops early if the cursor function runs out of pages.
async fn refetch_pages<P, C>(
  page_fn: PageFn<P, C>,
  next_param: NextParamFn<P, C>,
  initial: C,
  count: usize,
) -> FetchResult<P, C>
where
  C: Clone,
{
  let mut data = InfiniteData::default();
  let mut param = initial;

  loop {
    let page = page_fn(param.clone()).await?;
    data.pages.push(page);
    data.page_params.push(param);

    if data.pages.len() >= count {
      break;
    }
    match data.pages.last().and_then(|last| next_param(last, &data.pages)) {
      Some(next) => param = next,
      None => break,
    }
  }

  Ok(FetchOutcome::Replace(data))
}

impl<P, C: std::fmt::Debug> std::fmt::Debug for InfiniteQuery<P, C> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("InfiniteQuery")
      .field("key", &self.key)
      .field("initial_param", &self.initial_param)
      .field("fetching", &self.active.as_ref().map(|active| active.kind))
      .field("error", &self.error)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query_key;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  const LATENCY: Duration = Duration::from_millis(100);

  /// Pages of three numbers starting at the cursor, stopping after `limit`.
  fn numbers_query(
    client: &QueryClient,
    calls: Arc<AtomicUsize>,
    limit: u32,
  ) -> InfiniteQuery<Vec<u32>, u32> {
    InfiniteQuery::new(
      client.clone(),
      query_key!["numbers"],
      1,
      move |cursor: u32| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
          tokio::time::sleep(LATENCY).await;
          Ok((cursor..cursor + 3).collect())
        }
      },
      move |last: &Vec<u32>, _all: &[Vec<u32>]| {
        let next = last.last()? + 1;
        (next <= limit).then_some(next)
      },
    )
  }

  async fn settle(query: &mut InfiniteQuery<Vec<u32>, u32>) {
    for _ in 0..100 {
      tokio::time::sleep(Duration::from_millis(10)).await;
      query.poll();
      if !query.is_fetching() {
        return;
      }
    }
    panic!("query did not settle");
  }

  #[tokio::test(start_paused = true)]
  async fn test_first_and_next_page() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut query = numbers_query(&client, calls.clone(), 100);

    assert_eq!(query.status(), QueryStatus::Pending);
    assert!(query.fetch());
    assert!(query.is_fetching());
    assert!(!query.is_fetching_next_page());
    settle(&mut query).await;

    assert_eq!(query.status(), QueryStatus::Success);
    assert_eq!(query.pages(), vec![vec![1, 2, 3]]);

    assert!(query.fetch_next_page());
    assert!(query.is_fetching_next_page());
    settle(&mut query).await;

    let data = query.data().unwrap();
    assert_eq!(data.pages, vec![vec![1, 2, 3], vec![4, 5, 6]]);
    assert_eq!(data.page_params, vec![1, 4]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_fetch_next_page_is_deduplicated() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut query = numbers_query(&client, calls.clone(), 100);

    query.fetch();
    settle(&mut query).await;

    assert!(query.fetch_next_page());
    assert!(!query.fetch_next_page());
    assert!(!query.fetch());
    settle(&mut query).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(query.pages().len(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_next_page_stops_when_cursor_runs_out() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut query = numbers_query(&client, calls.clone(), 3);

    query.fetch();
    settle(&mut query).await;

    assert!(!query.has_next_page());
    assert!(!query.fetch_next_page());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_next_page_uses_current_cache_contents() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut query = numbers_query(&client, calls, 100);

    query.fetch();
    settle(&mut query).await;

    // An external edit to the last page moves the cursor
    client.set_query_data::<InfiniteData<Vec<u32>, u32>, _>(&query.key, |old| {
      old.map(|mut data| {
        data.pages[0].push(10);
        data
      })
    });

    query.fetch_next_page();
    settle(&mut query).await;
    assert_eq!(query.pages()[1], vec![11, 12, 13]);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidation_refetches_all_pages() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut query = numbers_query(&client, calls.clone(), 100);

    query.fetch();
    settle(&mut query).await;
    query.fetch_next_page();
    settle(&mut query).await;

    client.set_query_data::<InfiniteData<Vec<u32>, u32>, _>(&query.key, |old| {
      old.map(|mut data| {
        data.pages[0].insert(0, 99);
        data
      })
    });
    client.invalidate_queries(&query_key!["numbers"]);
    assert!(query.is_stale());

    assert!(query.poll());
    assert!(query.is_fetching());
    settle(&mut query).await;

    assert!(!query.is_stale());
    assert_eq!(query.pages(), vec![vec![1, 2, 3], vec![4, 5, 6]]);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancelled_fetch_never_writes() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut query = numbers_query(&client, calls, 100);

    query.fetch();
    settle(&mut query).await;
    query.fetch_next_page();

    client.cancel_queries(&query_key!["numbers"]);
    assert!(!query.is_fetching());

    tokio::time::sleep(LATENCY * 2).await;
    assert!(query.poll());
    assert_eq!(query.pages(), vec![vec![1, 2, 3]]);
    assert_eq!(query.status(), QueryStatus::Success);
    assert_eq!(query.error(), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failed_fetch_keeps_cached_pages() {
    let client = QueryClient::new();
    let fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let fail_in_fn = fail.clone();

    let mut query: InfiniteQuery<Vec<u32>, u32> = InfiniteQuery::new(
      client.clone(),
      query_key!["flaky"],
      1,
      move |cursor: u32| {
        let fail = fail_in_fn.load(Ordering::SeqCst);
        async move {
          if fail {
            Err("backend unavailable".to_string())
          } else {
            Ok(vec![cursor])
          }
        }
      },
      |last: &Vec<u32>, _: &[Vec<u32>]| last.last().map(|id| id + 1),
    );

    query.fetch();
    tokio::time::sleep(Duration::from_millis(1)).await;
    query.poll();
    assert_eq!(query.pages(), vec![vec![1]]);

    fail.store(true, Ordering::SeqCst);
    query.fetch_next_page();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(query.poll());

    assert_eq!(query.status(), QueryStatus::Error);
    assert_eq!(query.error(), Some("backend unavailable"));
    assert_eq!(query.pages(), vec![vec![1]]);
  }
}
