use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, AppMode};

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

/// Single-line text field with a char-indexed cursor.
#[derive(Debug, Default, Clone)]
pub struct TextInput {
  pub text: String,
  pub cursor: usize,
  /// Horizontal scroll offset in display columns, maintained by the renderer.
  pub scroll: usize,
}

impl TextInput {
  pub fn as_str(&self) -> &str {
    &self.text
  }

  pub fn clear(&mut self) {
    self.text.clear();
    self.cursor = 0;
    self.scroll = 0;
  }

  /// Apply an editing key. Returns whether the text changed.
  pub fn handle_key(&mut self, code: KeyCode) -> bool {
    match code {
      KeyCode::Char(c) => {
        let byte_idx = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_idx, c);
        self.cursor += 1;
        true
      }
      KeyCode::Backspace => {
        if self.cursor == 0 {
          return false;
        }
        self.cursor -= 1;
        let byte_idx = char_to_byte_index(&self.text, self.cursor);
        self.text.remove(byte_idx);
        true
      }
      KeyCode::Delete => {
        if self.cursor >= self.text.chars().count() {
          return false;
        }
        let byte_idx = char_to_byte_index(&self.text, self.cursor);
        self.text.remove(byte_idx);
        true
      }
      KeyCode::Left => {
        self.cursor = self.cursor.saturating_sub(1);
        false
      }
      KeyCode::Right => {
        if self.cursor < self.text.chars().count() {
          self.cursor += 1;
        }
        false
      }
      KeyCode::Home => {
        self.cursor = 0;
        false
      }
      KeyCode::End => {
        self.cursor = self.text.chars().count();
        false
      }
      _ => false,
    }
  }
}

// --- Event Handling ---

pub fn handle_key_event(app: &mut App, key: KeyEvent) {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return;
  }

  match app.mode {
    AppMode::Browse => handle_browse_key(app, key),
    AppMode::Detail => handle_detail_key(app, key),
    AppMode::TagSearch => handle_tag_search_key(app, key),
    AppMode::TagEdit => handle_tag_edit_key(app, key),
  }
}

fn handle_browse_key(app: &mut App, key: KeyEvent) {
  match key.code {
    KeyCode::Down | KeyCode::Char('j') => app.select_next(),
    KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
    KeyCode::PageDown => app.select_page_down(),
    KeyCode::PageUp => app.select_page_up(),
    KeyCode::Home | KeyCode::Char('g') => app.select_first(),
    KeyCode::End | KeyCode::Char('G') => app.select_last(),
    KeyCode::Enter => app.open_detail(),
    KeyCode::Char('/') => app.open_tag_search(),
    KeyCode::Char('t') => app.open_tag_editor(),
    KeyCode::Char('s') => app.toggle_sort(),
    KeyCode::Char('x') | KeyCode::Backspace => app.pop_filter(),
    KeyCode::Char('c') => app.clear_filters(),
    KeyCode::Char('r') => app.retry(),
    KeyCode::Char('R') => app.trigger_rescan(),
    KeyCode::Char('q') => app.should_quit = true,
    KeyCode::Esc => {
      if !app.clear_filters_quietly() {
        app.should_quit = true;
      }
    }
    _ => {}
  }
}

fn handle_detail_key(app: &mut App, key: KeyEvent) {
  match key.code {
    KeyCode::Down | KeyCode::Char('j') => app.select_detail_tag(1),
    KeyCode::Up | KeyCode::Char('k') => app.select_detail_tag(-1),
    KeyCode::Enter => app.filter_by_detail_tag(),
    KeyCode::Char('d') | KeyCode::Delete => app.remove_detail_tag(),
    KeyCode::Char('t') => app.open_tag_editor(),
    KeyCode::Esc | KeyCode::Char('q') => app.close_detail(),
    _ => {}
  }
}

fn handle_tag_search_key(app: &mut App, key: KeyEvent) {
  match key.code {
    KeyCode::Down => app.select_suggestion(1),
    KeyCode::Up => app.select_suggestion(-1),
    KeyCode::Enter => app.apply_tag_search(),
    KeyCode::Esc => app.close_tag_search(),
    code => {
      if app.tag_search_input.handle_key(code) {
        app.tag_search_input_changed();
      }
    }
  }
}

fn handle_tag_edit_key(app: &mut App, key: KeyEvent) {
  match key.code {
    KeyCode::Down => app.select_suggestion(1),
    KeyCode::Up => app.select_suggestion(-1),
    KeyCode::Enter => app.submit_tag_edit(),
    KeyCode::Esc => app.close_tag_editor(),
    code => {
      if app.tag_edit_input.handle_key(code) {
        app.tag_edit_input_changed();
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // --- char_to_byte_index ---

  #[test]
  fn char_to_byte_ascii() {
    assert_eq!(char_to_byte_index("hello", 0), 0);
    assert_eq!(char_to_byte_index("hello", 3), 3);
    assert_eq!(char_to_byte_index("hello", 5), 5);
  }

  #[test]
  fn char_to_byte_multibyte() {
    let s = "aé日";
    assert_eq!(char_to_byte_index(s, 1), 1);
    assert_eq!(char_to_byte_index(s, 2), 3);
    assert_eq!(char_to_byte_index(s, 3), 6);
  }

  // --- TextInput ---

  fn typed(text: &str) -> TextInput {
    let mut input = TextInput::default();
    for c in text.chars() {
      input.handle_key(KeyCode::Char(c));
    }
    input
  }

  #[test]
  fn typing_inserts_at_cursor() {
    let mut input = typed("ct");
    input.handle_key(KeyCode::Left);
    assert!(input.handle_key(KeyCode::Char('a')));
    assert_eq!(input.as_str(), "cat");
    assert_eq!(input.cursor, 2);
  }

  #[test]
  fn cursor_moves_do_not_report_changes() {
    let mut input = typed("dog");
    for code in [KeyCode::Left, KeyCode::Home, KeyCode::Right, KeyCode::End, KeyCode::Delete] {
      assert!(!input.handle_key(code));
    }
    assert_eq!(input.as_str(), "dog");
  }

  #[test]
  fn backspace_and_delete_handle_multibyte() {
    let mut input = typed("日本語");
    assert!(input.handle_key(KeyCode::Backspace));
    assert_eq!(input.as_str(), "日本");
    input.handle_key(KeyCode::Home);
    assert!(!input.handle_key(KeyCode::Backspace));
    assert!(input.handle_key(KeyCode::Delete));
    assert_eq!(input.as_str(), "本");
    assert_eq!(input.cursor, 0);
  }

  #[test]
  fn clear_resets_cursor_and_scroll() {
    let mut input = typed("sunset");
    input.scroll = 3;
    input.clear();
    assert_eq!(input.as_str(), "");
    assert_eq!((input.cursor, input.scroll), (0, 0));
  }
}
