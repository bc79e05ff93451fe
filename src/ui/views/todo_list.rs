use crate::api::{MockTodoApi, NewTodo, Todo};
use crate::query::{
  InfiniteData, InfiniteQuery, Mutation, MutationState, QueryClient, QueryKey, QueryStatus,
};
use crate::query_key;
use crate::ui::components::{KeyResult, TitlePrompt, TitleSubmission};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::truncate;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Cached shape of the todo list: pages of todos keyed by their start cursor
pub type TodoPages = InfiniteData<Vec<Todo>, i64>;

const FIRST_CURSOR: i64 = 1;

pub fn todos_key() -> QueryKey {
  query_key!["todos"]
}

/// Snapshot taken before an optimistic insert, restored if the write fails
#[derive(Debug, Clone)]
pub struct TodoContext {
  previous: Option<TodoPages>,
}

/// Insert `todo` at the head of the first page. Later pages are left alone.
fn prepend_to_first_page(mut data: TodoPages, todo: Todo) -> TodoPages {
  if let Some(first) = data.pages.first_mut() {
    first.insert(0, todo);
  }
  data
}

fn todos_query(
  client: &QueryClient,
  api: &MockTodoApi,
  fetch_count: Arc<AtomicUsize>,
) -> InfiniteQuery<Vec<Todo>, i64> {
  let api = api.clone();
  InfiniteQuery::new(
    client.clone(),
    todos_key(),
    FIRST_CURSOR,
    move |cursor: i64| {
      fetch_count.fetch_add(1, Ordering::SeqCst);
      let api = api.clone();
      async move { api.fetch_page(cursor).await.map_err(|e| e.to_string()) }
    },
    |last_page: &Vec<Todo>, _pages: &[Vec<Todo>]| last_page.last().map(|todo| todo.id + 1),
  )
}

fn add_todo_mutation(
  client: &QueryClient,
  api: &MockTodoApi,
) -> Mutation<NewTodo, NewTodo, TodoContext> {
  let api = api.clone();
  Mutation::new(client.clone(), move |todo: NewTodo| {
    let api = api.clone();
    async move { api.submit_todo(todo).await.map_err(|e| e.to_string()) }
  })
  .on_mutate(|client, todo| {
    let key = todos_key();
    // Stop in-flight fetches first so they can't overwrite the optimistic insert
    client.cancel_queries(&key);

    let previous = client.get_query_data::<TodoPages>(&key);
    client.set_query_data::<TodoPages, _>(&key, |old| {
      old.map(|data| prepend_to_first_page(data, Todo::from(todo)))
    });

    TodoContext { previous }
  })
  .on_success(|_client, saved, _todo, _context| {
    info!(id = saved.id, title = %saved.title, "todo saved");
  })
  .on_error(|client, _error, todo, context| {
    if let Some(previous) = context.and_then(|ctx| ctx.previous.clone()) {
      info!(id = todo.id, "rolling back optimistic todo");
      client.set_query_data::<TodoPages, _>(&todos_key(), |_| Some(previous));
    }
  })
  .on_settled(|client, _result, _todo, _context| {
    client.invalidate_queries(&todos_key());
  })
}

/// Paginated todo list with optimistic adds
pub struct TodoListView {
  query: InfiniteQuery<Vec<Todo>, i64>,
  add_todo: Mutation<NewTodo, NewTodo, TodoContext>,
  /// Number of page fetches actually issued to the API
  fetch_count: Arc<AtomicUsize>,
  list_state: ListState,
  prompt: TitlePrompt,
}

impl TodoListView {
  pub fn new(api: MockTodoApi, client: QueryClient) -> Self {
    let fetch_count = Arc::new(AtomicUsize::new(0));
    let mut query = todos_query(&client, &api, fetch_count.clone());

    // Start fetching immediately
    query.fetch();

    Self {
      query,
      add_todo: add_todo_mutation(&client, &api),
      fetch_count,
      list_state: ListState::default(),
      prompt: TitlePrompt::new(),
    }
  }

  pub fn fetch_count(&self) -> usize {
    self.fetch_count.load(Ordering::SeqCst)
  }

  /// All cached todos, pages flattened in fetch order
  pub fn todos(&self) -> Vec<Todo> {
    self.query.pages().into_iter().flatten().collect()
  }

  pub fn is_fetching(&self) -> bool {
    self.query.is_fetching()
  }

  pub fn is_submitting(&self) -> bool {
    self.add_todo.is_pending()
  }

  /// Request the next page. Ignored while a fetch is outstanding.
  pub fn fetch_next_page(&mut self) -> bool {
    if self.is_fetching() {
      return false;
    }
    self.query.fetch_next_page()
  }

  /// Submit a todo with an optimistic insert. Ignored while a submit is outstanding.
  pub fn submit(&mut self, todo: NewTodo) -> bool {
    if self.is_submitting() {
      return false;
    }
    info!(id = todo.id, title = %todo.title, fail = todo.error, "submitting todo");
    self.add_todo.mutate(todo)
  }

  fn list_title(&self, len: usize) -> String {
    match self.query.status() {
      QueryStatus::Error => format!(" Todos (error: {}) ", self.query.error().unwrap_or_default()),
      _ if self.query.is_fetching() && self.query.is_stale() => {
        format!(" Todos ({}, refreshing...) ", len)
      }
      _ if self.query.is_fetching() => format!(" Todos ({}, loading...) ", len),
      _ => format!(" Todos ({}) ", len),
    }
  }

  fn render_status(&self, frame: &mut Frame, area: Rect) {
    let mut spans = vec![
      Span::raw(" Fetch call count: "),
      Span::styled(self.fetch_count().to_string(), Style::default().fg(Color::Cyan).bold()),
    ];
    if self.query.is_fetching_next_page() {
      spans.push(Span::styled("  fetching next page...", Style::default().fg(Color::Yellow)));
    } else if self.is_fetching() {
      spans.push(Span::styled("  fetching...", Style::default().fg(Color::Yellow)));
    }
    if matches!(self.add_todo.state(), MutationState::Pending) {
      spans.push(Span::styled("  saving...", Style::default().fg(Color::Yellow)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let todos = self.todos();
    ensure_valid_selection(&mut self.list_state, todos.len());

    let block = Block::default()
      .title(self.list_title(todos.len()))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if todos.is_empty() {
      let content = if self.query.is_fetching() {
        "Loading..."
      } else if self.query.status() == QueryStatus::Error {
        "Failed to load todos. Press 'r' to retry."
      } else {
        "No todos."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let width = area.width.saturating_sub(4) as usize;
    let items: Vec<ListItem> = todos
      .iter()
      .map(|todo| ListItem::new(truncate(&todo.title, width)))
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for TodoListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    // The prompt can't be opened while a write is pending
    if self.prompt.is_active() || !self.is_submitting() {
      match self.prompt.handle_key(key) {
        KeyResult::Handled => return ViewAction::None,
        KeyResult::Event(TitleSubmission { title, fail }) => {
          let todo = if fail {
            NewTodo::failing(title)
          } else {
            NewTodo::new(title)
          };
          self.submit(todo);
          return ViewAction::None;
        }
        KeyResult::NotHandled => {}
      }
    }

    match key.code {
      KeyCode::Char('n') => {
        self.fetch_next_page();
      }
      KeyCode::Char('s') => {
        self.submit(NewTodo::new("Do Laundry"));
      }
      KeyCode::Char('f') => {
        self.submit(NewTodo::failing("Do Laundry(failure)"));
      }
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::vertical([Constraint::Length(1), Constraint::Min(1)]).split(area);
    self.render_status(frame, chunks[0]);
    self.render_list(frame, chunks[1]);
    self.prompt.render_overlay(frame, area);
  }

  fn title(&self) -> String {
    "Todos".to_string()
  }

  fn tick(&mut self) -> bool {
    // Mutation first: settling invalidates the list, which the query picks up right away
    let settled = self.add_todo.poll();
    let changed = self.query.poll();
    settled || changed
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let fetching = self.is_fetching();
    let submitting = self.is_submitting();
    // With nothing cached, `n` starts the first page
    let can_page = self.query.data().is_none() || self.query.has_next_page();
    vec![
      ShortcutInfo::new("n", "next").enabled(!fetching && can_page),
      ShortcutInfo::new("s", "add").enabled(!submitting),
      ShortcutInfo::new("f", "add failing").enabled(!submitting),
      ShortcutInfo::new("a", "new").enabled(!submitting),
      ShortcutInfo::new("r", "refresh"),
      ShortcutInfo::new("q", "quit"),
    ]
  }
}
