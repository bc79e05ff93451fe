//! Shared query cache.
//!
//! The client owns every cached value, the registry of in-flight fetches and
//! the invalidation log. Observers ([`InfiniteQuery`](super::InfiniteQuery))
//! and mutations talk to the cache only through this type.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;
use tracing::debug;

use super::key::QueryKey;

/// Identifies one registered fetch so late results can be told apart from
/// current ones.
pub type FetchId = u64;

struct CacheEntry {
  data: Box<dyn Any + Send>,
  stale: bool,
}

struct InFlight {
  id: FetchId,
  abort: AbortHandle,
}

#[derive(Default)]
struct ClientState {
  entries: HashMap<QueryKey, CacheEntry>,
  fetches: HashMap<QueryKey, InFlight>,
  /// Latest invalidation sequence per filter key
  invalidations: HashMap<QueryKey, u64>,
  invalidation_seq: u64,
  next_fetch_id: FetchId,
}

/// Handle to the shared query cache. Clones share the same cache.
#[derive(Clone, Default)]
pub struct QueryClient {
  state: Arc<Mutex<ClientState>>,
}

impl QueryClient {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, ClientState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Get a snapshot of the cached value for `key`.
  ///
  /// Returns `None` if nothing is cached or the cached value is of another type.
  pub fn get_query_data<T>(&self, key: &QueryKey) -> Option<T>
  where
    T: Clone + 'static,
  {
    self
      .lock()
      .entries
      .get(key)
      .and_then(|entry| entry.data.downcast_ref::<T>())
      .cloned()
  }

  /// Replace the cached value for `key` with the updater's result.
  ///
  /// The updater runs without the cache lock held. Returning `None` removes the entry.
  pub fn set_query_data<T, F>(&self, key: &QueryKey, updater: F)
  where
    T: Clone + Send + 'static,
    F: FnOnce(Option<T>) -> Option<T>,
  {
    let next = updater(self.get_query_data::<T>(key));

    let mut state = self.lock();
    match next {
      Some(data) => {
        state.entries.insert(
          key.clone(),
          CacheEntry {
            data: Box::new(data),
            stale: false,
          },
        );
      }
      None => {
        state.entries.remove(key);
      }
    }
  }

  /// Check whether the cached value for `key` has been invalidated since it was written.
  pub fn is_stale(&self, key: &QueryKey) -> bool {
    self.lock().entries.get(key).is_some_and(|entry| entry.stale)
  }

  /// Abort every in-flight fetch matching `filter`.
  ///
  /// Once this returns, results of the cancelled fetches are never written to
  /// the cache, even if they already completed. Cached data is left as is.
  pub fn cancel_queries(&self, filter: &QueryKey) {
    let mut state = self.lock();
    let cancelled: Vec<QueryKey> = state
      .fetches
      .keys()
      .filter(|key| filter.matches(key))
      .cloned()
      .collect();

    for key in cancelled {
      if let Some(fetch) = state.fetches.remove(&key) {
        fetch.abort.abort();
        debug!(key = %key, fetch = fetch.id, "cancelled fetch");
      }
    }
  }

  /// Mark every entry matching `filter` stale and tell its observers to refetch.
  pub fn invalidate_queries(&self, filter: &QueryKey) {
    let mut state = self.lock();
    state.invalidation_seq += 1;
    let seq = state.invalidation_seq;
    state.invalidations.insert(filter.clone(), seq);

    for (key, entry) in state.entries.iter_mut() {
      if filter.matches(key) {
        entry.stale = true;
      }
    }
    debug!(filter = %filter, seq, "invalidated queries");
  }

  /// Number of in-flight fetches matching `filter`.
  pub fn is_fetching(&self, filter: &QueryKey) -> usize {
    self
      .lock()
      .fetches
      .keys()
      .filter(|key| filter.matches(key))
      .count()
  }

  /// Latest invalidation sequence number affecting `key` (0 if never invalidated).
  pub(crate) fn invalidation_seq(&self, key: &QueryKey) -> u64 {
    self
      .lock()
      .invalidations
      .iter()
      .filter(|(filter, _)| filter.matches(key))
      .map(|(_, seq)| *seq)
      .max()
      .unwrap_or(0)
  }

  /// Register a fetch for `key`, superseding (and aborting) any fetch already
  /// registered for the same key.
  pub(crate) fn register_fetch(&self, key: &QueryKey, abort: AbortHandle) -> FetchId {
    let mut state = self.lock();
    state.next_fetch_id += 1;
    let id = state.next_fetch_id;

    if let Some(previous) = state.fetches.insert(key.clone(), InFlight { id, abort }) {
      previous.abort.abort();
      debug!(key = %key, fetch = previous.id, "superseded fetch");
    }
    id
  }

  /// Check whether `id` is still the registered fetch for `key`.
  pub(crate) fn is_fetch_current(&self, key: &QueryKey, id: FetchId) -> bool {
    self
      .lock()
      .fetches
      .get(key)
      .is_some_and(|fetch| fetch.id == id)
  }

  /// Unregister a finished fetch.
  ///
  /// Returns `true` only if the fetch was still current, meaning its result
  /// may be written to the cache.
  pub(crate) fn complete_fetch(&self, key: &QueryKey, id: FetchId) -> bool {
    let mut state = self.lock();
    match state.fetches.get(key) {
      Some(fetch) if fetch.id == id => {
        state.fetches.remove(key);
        true
      }
      _ => false,
    }
  }
}

impl std::fmt::Debug for QueryClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.lock();
    f.debug_struct("QueryClient")
      .field("entries", &state.entries.len())
      .field("fetches", &state.fetches.len())
      .field("invalidation_seq", &state.invalidation_seq)
      .finish()
  }
}
