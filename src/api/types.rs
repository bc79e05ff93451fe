use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A todo as returned by the list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
  pub id: i64,
  pub title: String,
}

/// A todo submitted to the create endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTodo {
  pub id: i64,
  pub title: String,
  /// Ask the backend to reject this todo
  #[serde(default)]
  pub error: bool,
}

impl NewTodo {
  /// Create a todo stamped with the current Unix time in milliseconds.
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      id: Utc::now().timestamp_millis(),
      title: title.into(),
      error: false,
    }
  }

  /// Create a todo the backend will reject.
  pub fn failing(title: impl Into<String>) -> Self {
    Self {
      error: true,
      ..Self::new(title)
    }
  }
}

impl From<&NewTodo> for Todo {
  fn from(todo: &NewTodo) -> Self {
    Self {
      id: todo.id,
      title: todo.title.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_new_todo_uses_timestamp_id() {
    let before = Utc::now().timestamp_millis();
    let todo = NewTodo::new("Do Laundry");
    let after = Utc::now().timestamp_millis();

    assert!((before..=after).contains(&todo.id));
    assert_eq!(todo.title, "Do Laundry");
    assert!(!todo.error);
  }

  #[test]
  fn test_failing_todo() {
    let todo = NewTodo::failing("Do Laundry(failure)");
    assert!(todo.error);
    assert_eq!(
      Todo::from(&todo),
      Todo {
        id: todo.id,
        title: "Do Laundry(failure)".to_string()
      }
    );
  }
}
