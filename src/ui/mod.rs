pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use ratatui::prelude::*;
use ratatui::widgets::ListState;

use renderfns::draw_header;
use view::View;

/// Main draw function: header with the view's shortcuts, then the view itself
pub fn draw(frame: &mut Frame, view: &mut dyn View) {
  let chunks = Layout::vertical([
    Constraint::Length(1), // Header
    Constraint::Min(1),    // Main content
  ])
  .split(frame.area());

  draw_header(frame, chunks[0], &view.title(), &view.shortcuts());
  view.render(frame, chunks[1]);
}

/// Keep a list selection inside `len` items, selecting the first item when
/// nothing is selected yet.
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  if len == 0 {
    state.select(None);
    return;
  }
  match state.selected() {
    None => state.select(Some(0)),
    Some(i) if i >= len => state.select(Some(len - 1)),
    Some(_) => {}
  }
}
