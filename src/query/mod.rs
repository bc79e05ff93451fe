//! Async query abstraction for data fetching with caching support.
//!
//! Inspired by TanStack Query. A [`QueryClient`] owns a key-based cache shared
//! by every observer; [`InfiniteQuery`] fetches paginated data into it and
//! [`Mutation`] runs writes with hooks for optimistic updates and rollback.
//!
//! # Example
//!
//! ```ignore
//! let client = QueryClient::new();
//! let mut todos = InfiniteQuery::new(
//!     client.clone(),
//!     query_key!["todos"],
//!     1,
//!     move |cursor| api.fetch_page(cursor),
//!     |last: &Vec<Todo>, _| last.last().map(|todo| todo.id + 1),
//! );
//! todos.fetch();
//!
//! // In event loop tick
//! if todos.poll() {
//!     // State changed, trigger re-render
//! }
//! ```
//!
//! Everything here is driven from a single event loop: fetches and writes run
//! as spawned tasks whose results are only applied from `poll()`.

mod client;
mod infinite;
mod key;
mod mutation;

pub use client::QueryClient;
pub use infinite::{InfiniteData, InfiniteQuery, QueryStatus};
pub use key::QueryKey;
pub use mutation::{Mutation, MutationState};
