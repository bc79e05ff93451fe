//! Mutations with optimistic-update hooks.
//!
//! A [`Mutation`] runs a write once per `mutate()` call and drives the
//! lifecycle callbacks around it:
//!
//! ```text
//! Idle -> Pending (on_mutate) -> Success (on_success) | Error (on_error) -> on_settled
//! ```
//!
//! `on_mutate` runs synchronously before the write is spawned, so anything it
//! does to the cache (cancelling fetches, snapshotting, applying an optimistic
//! edit) is complete before the write starts. Its return value is the context
//! handed to the later callbacks, typically a snapshot to roll back to.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::client::QueryClient;

/// The state of a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationState<D> {
  /// Never run, or reset
  Idle,
  /// Write in flight
  Pending,
  /// Last write succeeded
  Success(D),
  /// Last write failed
  Error(String),
}

type MutationFn<V, D> = Box<dyn Fn(V) -> BoxFuture<'static, Result<D, String>> + Send + Sync>;
type OnMutate<V, X> = Box<dyn FnMut(&QueryClient, &V) -> X + Send>;
type OnSuccess<V, D, X> = Box<dyn FnMut(&QueryClient, &D, &V, Option<&X>) + Send>;
type OnError<V, X> = Box<dyn FnMut(&QueryClient, &str, &V, Option<&X>) + Send>;
type OnSettled<V, D, X> = Box<dyn FnMut(&QueryClient, Result<&D, &str>, &V, Option<&X>) + Send>;

struct PendingWrite<V, D, X> {
  variables: V,
  context: Option<X>,
  receiver: mpsc::UnboundedReceiver<Result<D, String>>,
}

/// A write operation with lifecycle callbacks.
///
/// Only one write runs at a time: `mutate()` is refused while one is pending.
/// Writes cannot be cancelled once started and are never retried.
pub struct Mutation<V, D, X = ()> {
  client: QueryClient,
  mutation_fn: MutationFn<V, D>,
  on_mutate: Option<OnMutate<V, X>>,
  on_success: Option<OnSuccess<V, D, X>>,
  on_error: Option<OnError<V, X>>,
  on_settled: Option<OnSettled<V, D, X>>,
  state: MutationState<D>,
  pending: Option<PendingWrite<V, D, X>>,
}

impl<V, D, X> Mutation<V, D, X>
where
  V: Clone + Send + 'static,
  D: Clone + Send + 'static,
{
  pub fn new<F, Fut>(client: QueryClient, mutation_fn: F) -> Self
  where
    F: Fn(V) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<D, String>> + Send + 'static,
  {
    Self {
      client,
      mutation_fn: Box::new(move |variables: V| mutation_fn(variables).boxed()),
      on_mutate: None,
      on_success: None,
      on_error: None,
      on_settled: None,
      state: MutationState::Idle,
      pending: None,
    }
  }

  /// Runs before the write starts; its result becomes the rollback context.
  pub fn on_mutate<F>(mut self, f: F) -> Self
  where
    F: FnMut(&QueryClient, &V) -> X + Send + 'static,
  {
    self.on_mutate = Some(Box::new(f));
    self
  }

  pub fn on_success<F>(mut self, f: F) -> Self
  where
    F: FnMut(&QueryClient, &D, &V, Option<&X>) + Send + 'static,
  {
    self.on_success = Some(Box::new(f));
    self
  }

  pub fn on_error<F>(mut self, f: F) -> Self
  where
    F: FnMut(&QueryClient, &str, &V, Option<&X>) + Send + 'static,
  {
    self.on_error = Some(Box::new(f));
    self
  }

  /// Runs after success or failure.
  pub fn on_settled<F>(mut self, f: F) -> Self
  where
    F: FnMut(&QueryClient, Result<&D, &str>, &V, Option<&X>) + Send + 'static,
  {
    self.on_settled = Some(Box::new(f));
    self
  }

  pub fn state(&self) -> &MutationState<D> {
    &self.state
  }

  pub fn is_pending(&self) -> bool {
    matches!(self.state, MutationState::Pending)
  }

  #[allow(dead_code)]
  pub fn data(&self) -> Option<&D> {
    match &self.state {
      MutationState::Success(data) => Some(data),
      _ => None,
    }
  }

  #[allow(dead_code)]
  pub fn error(&self) -> Option<&str> {
    match &self.state {
      MutationState::Error(e) => Some(e),
      _ => None,
    }
  }

  /// Start a write. Returns `false` (and does nothing) if one is already pending.
  pub fn mutate(&mut self, variables: V) -> bool {
    if self.is_pending() {
      debug!("mutation already pending, ignoring");
      return false;
    }

    self.state = MutationState::Pending;
    let context = self
      .on_mutate
      .as_mut()
      .map(|on_mutate| on_mutate(&self.client, &variables));

    let (tx, rx) = mpsc::unbounded_channel();
    let write = (self.mutation_fn)(variables.clone());
    tokio::spawn(async move {
      // Ignore send errors - the mutation may have been dropped
      let _ = tx.send(write.await);
    });

    self.pending = Some(PendingWrite {
      variables,
      context,
      receiver: rx,
    });
    true
  }

  /// Drain a completed write and run its callbacks.
  ///
  /// Returns `true` if the mutation settled.
  pub fn poll(&mut self) -> bool {
    let Some(pending) = self.pending.as_mut() else {
      return false;
    };

    let result = match pending.receiver.try_recv() {
      Ok(result) => result,
      Err(mpsc::error::TryRecvError::Empty) => return false,
      Err(mpsc::error::TryRecvError::Disconnected) => Err("Mutation was cancelled".to_string()),
    };

    let Some(PendingWrite {
      variables, context, ..
    }) = self.pending.take()
    else {
      return false;
    };
    let context = context.as_ref();

    match &result {
      Ok(data) => {
        debug!("mutation succeeded");
        if let Some(on_success) = self.on_success.as_mut() {
          on_success(&self.client, data, &variables, context);
        }
      }
      Err(e) => {
        warn!(error = %e, "mutation failed");
        if let Some(on_error) = self.on_error.as_mut() {
          on_error(&self.client, e.as_str(), &variables, context);
        }
      }
    }

    if let Some(on_settled) = self.on_settled.as_mut() {
      on_settled(&self.client, result.as_ref().map_err(String::as_str), &variables, context);
    }

    self.state = match result {
      Ok(data) => MutationState::Success(data),
      Err(e) => MutationState::Error(e),
    };
    true
  }

  /// Forget the last result. A pending write keeps running but its result is dropped.
  #[allow(dead_code)]
  pub fn reset(&mut self) {
    self.pending = None;
    self.state = MutationState::Idle;
  }
}

impl<V, D: std::fmt::Debug, X> std::fmt::Debug for Mutation<V, D, X> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Mutation")
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}
