use crate::ui::view::ShortcutInfo;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with app name, view title, and shortcuts.
///
/// Disabled shortcuts stay visible but dimmed, with "..." after the label.
pub fn draw_header(frame: &mut Frame, area: Rect, title: &str, shortcuts: &[ShortcutInfo]) {
  frame.render_widget(
    Paragraph::new(header_line(title, shortcuts)).style(Style::default().bg(Color::Black)),
    area,
  );
}

fn header_line<'a>(title: &'a str, shortcuts: &'a [ShortcutInfo]) -> Line<'a> {
  let mut spans = vec![
    Span::styled(" todoq ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", title), Style::default().fg(Color::Yellow).bold()),
  ];

  for shortcut in shortcuts {
    let (key_style, label_style) = if shortcut.enabled {
      (Style::default().fg(Color::Cyan), Style::default().fg(Color::Gray))
    } else {
      (
        Style::default().fg(Color::DarkGray),
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM),
      )
    };
    let label = if shortcut.enabled {
      format!(" {}", shortcut.label)
    } else {
      format!(" {}...", shortcut.label)
    };

    spans.push(Span::raw("  "));
    spans.push(Span::styled(format!("<{}>", shortcut.key), key_style));
    spans.push(Span::styled(label, label_style));
  }

  Line::from(spans)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn text(line: &Line) -> String {
    line.spans.iter().map(|span| span.content.as_ref()).collect()
  }

  #[test]
  fn test_header_lists_shortcuts() {
    let shortcuts = [
      ShortcutInfo::new("n", "next"),
      ShortcutInfo::new("s", "add").enabled(false),
    ];
    let line = header_line("Todos", &shortcuts);

    assert_eq!(text(&line), " todoq │ Todos   <n> next  <s> add...");
  }
}
