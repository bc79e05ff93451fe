use crate::api::MockTodoApi;
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::query::QueryClient;
use crate::ui;
use crate::ui::view::{View, ViewAction};
use crate::ui::views::TodoListView;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use tracing::info;

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// Application configuration
  config: Config,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: Config) -> Self {
    let api = MockTodoApi::new(&config.api);
    let client = QueryClient::new();

    Self {
      view_stack: vec![Box::new(TodoListView::new(api, client))],
      config,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let result = self.event_loop().await;

    // Cleanup terminal, even if the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(&mut self) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let mut events = EventHandler::new(self.config.tick_rate());
    info!(tick_rate_ms = self.config.tick_rate_ms, "event loop started");

    while !self.should_quit {
      if let Some(view) = self.view_stack.last_mut() {
        terminal.draw(|frame| ui::draw(frame, view.as_mut()))?;
      }

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }

    info!("event loop finished");
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {}
    }

    // Poll async work on every turn so results land even while keys stream in
    if let Some(view) = self.view_stack.last_mut() {
      view.tick();
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let Some(view) = self.view_stack.last_mut() else {
      self.should_quit = true;
      return;
    };

    match view.handle_key(key) {
      ViewAction::None => {}
      ViewAction::Pop => {
        self.view_stack.pop();
        if self.view_stack.is_empty() {
          self.should_quit = true;
        }
      }
    }
  }
}
