use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tracing::info;

use super::types::{NewTodo, Todo};
use crate::config::ApiConfig;

/// In-process stand-in for the todo service.
#[derive(Debug, Clone)]
pub struct MockTodoApi {
  latency: Duration,
  page_size: usize,
}

impl MockTodoApi {
  pub fn new(config: &ApiConfig) -> Self {
    Self {
      latency: config.latency(),
      page_size: config.page_size,
    }
  }

  /// Fetch one page of todos with sequential ids starting at `cursor`.
  ///
  /// Pagination never ends: every cursor yields a full page.
  pub async fn fetch_page(&self, cursor: i64) -> Result<Vec<Todo>> {
    tokio::time::sleep(self.latency).await;
    info!(cursor, page_size = self.page_size, "fetch_page");

    Ok(
      (cursor..)
        .take(self.page_size)
        .map(|id| Todo {
          id,
          title: format!("Todo {}", id),
        })
        .collect(),
    )
  }

  /// Submit a todo. Fails if the todo asks to be rejected, otherwise echoes it back.
  pub async fn submit_todo(&self, todo: NewTodo) -> Result<NewTodo> {
    tokio::time::sleep(self.latency).await;
    info!(id = todo.id, title = %todo.title, error = todo.error, "submit_todo");

    if todo.error {
      Err(eyre!("An error occurred"))
    } else {
      Ok(todo)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn api() -> MockTodoApi {
    MockTodoApi::new(&ApiConfig::default())
  }

  #[tokio::test(start_paused = true)]
  async fn test_pages_are_sequential() {
    let api = api();

    let first = api.fetch_page(1).await.unwrap();
    let ids: Vec<i64> = first.iter().map(|todo| todo.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(first[0].title, "Todo 1");

    let second = api.fetch_page(first.last().unwrap().id + 1).await.unwrap();
    let ids: Vec<i64> = second.iter().map(|todo| todo.id).collect();
    assert_eq!(ids, vec![6, 7, 8, 9, 10]);
  }

  #[tokio::test(start_paused = true)]
  async fn test_fetch_waits_for_latency() {
    let api = api();
    let started = tokio::time::Instant::now();

    api.fetch_page(1).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(3));
  }

  #[tokio::test(start_paused = true)]
  async fn test_submit_success_echoes_todo() {
    let todo = NewTodo::new("Do Laundry");
    assert_eq!(api().submit_todo(todo.clone()).await.unwrap(), todo);
  }

  #[tokio::test(start_paused = true)]
  async fn test_submit_failure() {
    let err = api()
      .submit_todo(NewTodo::failing("Do Laundry(failure)"))
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "An error occurred");
  }
}
