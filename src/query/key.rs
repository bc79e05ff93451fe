use std::fmt;

/// Hierarchical cache key, e.g. `["todos"]` or `["todos", "done"]`.
///
/// When used as a filter a key matches itself and every key it is a prefix of,
/// so invalidating `["todos"]` also reaches `["todos", "done"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
  pub fn new<I, S>(segments: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self(segments.into_iter().map(Into::into).collect())
  }

  /// Check whether this key, used as a filter, selects `other`.
  pub fn matches(&self, other: &QueryKey) -> bool {
    other.0.starts_with(&self.0)
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}]", self.0.join(", "))
  }
}

/// Build a [`QueryKey`] from string-like segments.
#[macro_export]
macro_rules! query_key {
  ($($segment:expr),* $(,)?) => {
    $crate::query::QueryKey::new([$(::std::string::String::from($segment)),*])
  };
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_prefix_matching() {
    let todos = query_key!["todos"];
    let done = query_key!["todos", "done"];

    assert!(todos.matches(&todos));
    assert!(todos.matches(&done));
    assert!(!done.matches(&todos));
    assert!(!query_key!["users"].matches(&done));
  }

  #[test]
  fn test_display() {
    assert_eq!(query_key!["todos", "done"].to_string(), "[todos, done]");
  }
}
