use super::KeyResult;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

/// Emitted when the user confirms the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleSubmission {
  pub title: String,
  /// Ask the backend to reject the todo
  pub fail: bool,
}

/// Overlay prompt for the title of a new todo.
///
/// Opened with `a`. Typing edits the title, Tab toggles whether the backend
/// should reject the todo, Enter submits and Esc cancels.
#[derive(Debug, Clone, Default)]
pub struct TitlePrompt {
  buffer: String,
  /// Cursor position in chars
  cursor: usize,
  fail: bool,
  active: bool,
}

impl TitlePrompt {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn value(&self) -> &str {
    &self.buffer
  }

  pub fn will_fail(&self) -> bool {
    self.fail
  }

  pub fn open(&mut self) {
    self.active = true;
    self.buffer.clear();
    self.cursor = 0;
    self.fail = false;
  }

  fn close(&mut self) {
    self.active = false;
  }

  fn byte_index(&self, char_pos: usize) -> usize {
    self
      .buffer
      .char_indices()
      .nth(char_pos)
      .map(|(i, _)| i)
      .unwrap_or(self.buffer.len())
  }

  fn char_len(&self) -> usize {
    self.buffer.chars().count()
  }

  /// Handle a key event.
  /// Call this regardless of active state - it handles activation too
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<TitleSubmission> {
    if !self.active {
      if key.code == KeyCode::Char('a') && key.modifiers.is_empty() {
        self.open();
        return KeyResult::Handled;
      }
      return KeyResult::NotHandled;
    }

    match key.code {
      KeyCode::Esc => self.close(),
      KeyCode::Enter => {
        let title = self.buffer.trim();
        if title.is_empty() {
          return KeyResult::Handled;
        }
        let submission = TitleSubmission {
          title: title.to_string(),
          fail: self.fail,
        };
        self.close();
        return KeyResult::Event(submission);
      }
      KeyCode::Tab => self.fail = !self.fail,
      KeyCode::Backspace => {
        if self.cursor > 0 {
          self.cursor -= 1;
          let at = self.byte_index(self.cursor);
          self.buffer.remove(at);
        }
      }
      KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
      KeyCode::Right => self.cursor = (self.cursor + 1).min(self.char_len()),
      KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.buffer.clear();
        self.cursor = 0;
      }
      KeyCode::Char(c) => {
        let at = self.byte_index(self.cursor);
        self.buffer.insert(at, c);
        self.cursor += 1;
      }
      _ => {}
    }
    KeyResult::Handled
  }

  /// Render the prompt overlay if active
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }

    // 60% of the screen, widened in u32 so huge terminals can't overflow
    let width = (u32::from(area.width) * 60 / 100).min(u32::from(u16::MAX)) as u16;
    let width = width.clamp(30.min(area.width), 60.min(area.width));
    let height = 4.min(area.height);
    let overlay_area = Rect::new(area.x + 1, area.y + 1, width, height).intersection(area);

    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(" New todo ");
    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    if inner.height == 0 {
      return;
    }

    let (outcome, outcome_style) = if self.will_fail() {
      ("will fail", Style::default().fg(Color::Red))
    } else {
      ("will succeed", Style::default().fg(Color::Green))
    };

    let lines = vec![
      Line::from(vec![
        Span::styled("> ", Style::default().fg(Color::Yellow)),
        Span::raw(self.value()),
        Span::styled("_", Style::default().fg(Color::Yellow)),
      ]),
      Line::from(vec![
        Span::styled(outcome, outcome_style),
        Span::styled(
          "  <tab> toggle  <enter> add  <esc> cancel",
          Style::default().fg(Color::DarkGray),
        ),
      ]),
    ];
    frame.render_widget(Paragraph::new(lines), inner);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ratatui::backend::TestBackend;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_str(prompt: &mut TitlePrompt, s: &str) {
    for c in s.chars() {
      prompt.handle_key(key(KeyCode::Char(c)));
    }
  }

  #[test]
  fn test_inactive_ignores_keys() {
    let mut prompt = TitlePrompt::new();
    assert_eq!(prompt.handle_key(key(KeyCode::Char('x'))), KeyResult::NotHandled);
    assert!(!prompt.is_active());
  }

  #[test]
  fn test_submit_title() {
    let mut prompt = TitlePrompt::new();
    assert_eq!(prompt.handle_key(key(KeyCode::Char('a'))), KeyResult::Handled);
    type_str(&mut prompt, "Buy milk ");

    let result = prompt.handle_key(key(KeyCode::Enter));
    assert_eq!(
      result,
      KeyResult::Event(TitleSubmission {
        title: "Buy milk".to_string(),
        fail: false,
      })
    );
    assert!(!prompt.is_active());
  }

  #[test]
  fn test_tab_toggles_failure() {
    let mut prompt = TitlePrompt::new();
    prompt.open();
    type_str(&mut prompt, "Broken");
    prompt.handle_key(key(KeyCode::Tab));
    assert!(prompt.will_fail());

    match prompt.handle_key(key(KeyCode::Enter)) {
      KeyResult::Event(submission) => assert!(submission.fail),
      other => panic!("unexpected {:?}", other),
    }

    // Reopening resets the flag
    prompt.open();
    assert!(!prompt.will_fail());
  }

  #[test]
  fn test_empty_title_not_submitted() {
    let mut prompt = TitlePrompt::new();
    prompt.open();
    type_str(&mut prompt, "  ");
    assert_eq!(prompt.handle_key(key(KeyCode::Enter)), KeyResult::Handled);
    assert!(prompt.is_active());
  }

  #[test]
  fn test_escape_cancels() {
    let mut prompt = TitlePrompt::new();
    prompt.open();
    type_str(&mut prompt, "abc");
    assert_eq!(prompt.handle_key(key(KeyCode::Esc)), KeyResult::Handled);
    assert!(!prompt.is_active());
  }

  #[test]
  fn test_editing_multibyte() {
    let mut prompt = TitlePrompt::new();
    prompt.open();
    type_str(&mut prompt, "café");
    prompt.handle_key(key(KeyCode::Left));
    prompt.handle_key(key(KeyCode::Backspace));
    assert_eq!(prompt.value(), "caé");

    prompt.handle_key(key(KeyCode::Right));
    type_str(&mut prompt, "!");
    assert_eq!(prompt.value(), "caé!");

    prompt.handle_key(KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL));
    assert_eq!(prompt.value(), "");
  }

  #[test]
  fn test_overlay_on_very_wide_terminal() {
    let mut prompt = TitlePrompt::new();
    prompt.open();
    type_str(&mut prompt, "Wide");

    let mut terminal = Terminal::new(TestBackend::new(1100, 10)).unwrap();
    terminal
      .draw(|frame| prompt.render_overlay(frame, frame.area()))
      .unwrap();

    let buffer = terminal.backend().buffer();
    let row: String = (0..buffer.area.width)
      .map(|x| buffer[(x, 2)].symbol())
      .collect();
    assert!(row.contains("> Wide_"), "{}", row.trim_end());
    // Overlay is capped at 60 columns
    assert_eq!(buffer[(60, 1)].symbol(), "┐");
  }
}
