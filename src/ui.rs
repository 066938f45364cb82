use chrono::DateTime;
use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Color, Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, List, ListItem, Padding, Paragraph, Wrap},
};

use vidshelf::models::VideoSummary;

use crate::app::{App, AppMode};
use crate::input::TextInput;

// --- Palette ---

struct Palette {
  bg: Color,
  fg: Color,
  muted: Color,
  accent: Color,
  border: Color,
  highlight_fg: Color,
  highlight_bg: Color,
  stripe_bg: Color,
  key_fg: Color,
  key_bg: Color,
  chip_fg: Color,
  chip_bg: Color,
  status: Color,
  info: Color,
  error: Color,
}

const PALETTE: Palette = Palette {
  bg: Color::Rgb(30, 30, 46),
  fg: Color::Rgb(205, 214, 244),
  muted: Color::Rgb(127, 132, 156),
  accent: Color::Rgb(245, 194, 231),
  border: Color::Rgb(69, 71, 90),
  highlight_fg: Color::Rgb(30, 30, 46),
  highlight_bg: Color::Rgb(180, 190, 254),
  stripe_bg: Color::Rgb(36, 36, 54),
  key_fg: Color::Rgb(30, 30, 46),
  key_bg: Color::Rgb(148, 226, 213),
  chip_fg: Color::Rgb(30, 30, 46),
  chip_bg: Color::Rgb(250, 179, 135),
  status: Color::Rgb(249, 226, 175),
  info: Color::Rgb(166, 227, 161),
  error: Color::Rgb(243, 139, 168),
};

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// `YYYY-MM-DD` for a unix timestamp.
fn format_epoch(epoch: Option<i64>) -> String {
  epoch.and_then(|e| DateTime::from_timestamp(e, 0)).map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

/// `m:ss`, or `h:mm:ss` past an hour.
fn format_duration(seconds: Option<f64>) -> String {
  let Some(total) = seconds.filter(|s| s.is_finite() && *s >= 0.0).map(|s| s.round() as u64) else {
    return String::new();
  };
  let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
  if h > 0 { format!("{}:{:02}:{:02}", h, m, s) } else { format!("{}:{:02}", m, s) }
}

fn rounded_block<'a>(title: impl Into<Line<'a>>, focused: bool) -> Block<'a> {
  let color = if focused { PALETTE.accent } else { PALETTE.border };
  Block::bordered()
    .title(title)
    .title_style(Style::default().fg(PALETTE.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(color))
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  frame.render_widget(Block::default().style(Style::default().bg(PALETTE.bg)), frame.area());

  let [header_area, chips_area, main_area, status_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Length(1),
    Constraint::Min(3),
    Constraint::Length(1),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, app, header_area);
  render_chips(frame, app, chips_area);

  let [list_area, side_area] =
    Layout::horizontal([Constraint::Percentage(62), Constraint::Percentage(38)]).areas(main_area);
  render_list(frame, app, list_area);
  match app.mode {
    AppMode::Browse => render_preview(frame, app, side_area),
    AppMode::Detail => render_detail(frame, app, side_area),
    AppMode::TagSearch | AppMode::TagEdit => render_tag_input(frame, app, side_area),
  }

  render_status(frame, app, status_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let mut spans = vec![Span::styled(" ▤ vidshelf ", Style::default().fg(PALETTE.accent).add_modifier(Modifier::BOLD))];
  if let Some(status) = &app.admin_status {
    spans.push(Span::styled(
      format!(
        " {}/{} videos available · {} tags · {}",
        status.available_videos, status.total_videos, status.total_tags, status.video_dir
      ),
      Style::default().fg(PALETTE.muted),
    ));
  } else {
    spans.push(Span::styled(format!(" {}", app.api_url), Style::default().fg(PALETTE.muted)));
  }
  frame.render_widget(Line::from(spans), area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(PALETTE.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_chips(frame: &mut Frame, app: &App, area: Rect) {
  let filters = app.filters.snapshot();
  let mut spans = vec![Span::styled(" Tags ", Style::default().fg(PALETTE.muted))];
  if filters.tags.is_empty() {
    spans.push(Span::styled("all videos", Style::default().fg(PALETTE.muted).add_modifier(Modifier::ITALIC)));
  }
  for tag in &filters.tags {
    spans.push(Span::styled(format!(" {} ", tag), Style::default().fg(PALETTE.chip_fg).bg(PALETTE.chip_bg)));
    spans.push(Span::raw(" "));
  }
  spans.push(Span::styled(format!("  · {}", filters.sort.label()), Style::default().fg(PALETTE.muted)));
  if !app.available_only {
    spans.push(Span::styled(" · including unavailable", Style::default().fg(PALETTE.muted)));
  }
  frame.render_widget(Line::from(spans), area);
}

fn list_line(app: &App, video: &VideoSummary, inner_w: usize, fg: Color) -> Line<'static> {
  let tags = app.tags_of(video).join(", ");
  let date = format_epoch(video.epoch);
  let duration = format_duration(video.duration);
  let right = [tags.as_str(), duration.as_str(), date.as_str()]
    .into_iter()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join("  ");

  let right_w = right.chars().count();
  let title_max = if right.is_empty() { inner_w } else { inner_w.saturating_sub(right_w + 2) };
  let title = truncate_str(video.display_title(), title_max);
  let title_style = if video.is_available { Style::default().fg(fg) } else { Style::default().fg(PALETTE.muted) };
  let gap = inner_w.saturating_sub(title.chars().count() + right_w);
  Line::from(vec![
    Span::styled(title, title_style),
    Span::raw(" ".repeat(gap)),
    Span::styled(right, Style::default().fg(PALETTE.muted)),
  ])
}

fn render_list(frame: &mut Frame, app: &mut App, area: Rect) {
  // Inner width: area minus 2 borders minus 2 chars for highlight symbol ("▶ ")
  let inner_w = area.width.saturating_sub(4) as usize;
  app.list_rows = area.height.saturating_sub(2) as usize;

  let view: &App = app;
  let items: Vec<ListItem> = view
    .catalog
    .items()
    .iter()
    .enumerate()
    .map(|(i, video)| {
      let is_selected = Some(i) == view.list_state.selected();
      let fg = if is_selected { PALETTE.highlight_fg } else { PALETTE.fg };
      let bg = if is_selected {
        PALETTE.highlight_bg
      } else if i % 2 == 1 {
        PALETTE.stripe_bg
      } else {
        PALETTE.bg
      };
      ListItem::new(list_line(view, video, inner_w, fg)).bg(bg)
    })
    .collect();

  let loaded = app.catalog.items().len();
  let suffix = if app.catalog.is_fetching_next_page() {
    " (loading more…)"
  } else if app.catalog.is_refreshing() {
    " (refreshing…)"
  } else {
    ""
  };
  let title = format!(" Videos — {} of {}{} ", loaded, app.catalog.total(), suffix);

  if items.is_empty() {
    let message = if app.catalog.is_initial_loading() {
      "Loading…"
    } else if app.catalog.is_error() {
      "Could not load videos. Press r to retry."
    } else {
      "No videos match these tags."
    };
    let paragraph = Paragraph::new(vec![Line::from(""), Line::from(message)])
      .alignment(Alignment::Center)
      .style(Style::default().fg(PALETTE.muted))
      .block(rounded_block(title, app.mode == AppMode::Browse));
    frame.render_widget(paragraph, area);
    return;
  }

  let list = List::new(items)
    .block(rounded_block(title, app.mode == AppMode::Browse))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(PALETTE.highlight_fg).bg(PALETTE.highlight_bg).add_modifier(Modifier::BOLD));

  frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn field<'a>(label: &'a str, value: String) -> Line<'a> {
  Line::from(vec![
    Span::styled(format!("{:<10}", label), Style::default().fg(PALETTE.muted)),
    Span::styled(value, Style::default().fg(PALETTE.fg)),
  ])
}

fn summary_lines(app: &App, video: &VideoSummary, inner_w: usize) -> Vec<Line<'static>> {
  let mut lines = vec![
    Line::from(Span::styled(
      truncate_str(video.display_title(), inner_w),
      Style::default().fg(PALETTE.fg).add_modifier(Modifier::BOLD),
    )),
    Line::from(""),
  ];
  if let Some(uploader) = &video.uploader {
    lines.push(field("Uploader", truncate_str(uploader, inner_w.saturating_sub(10))));
  }
  let date = format_epoch(video.epoch);
  if !date.is_empty() {
    lines.push(field("Date", date));
  }
  let duration = format_duration(video.duration);
  if !duration.is_empty() {
    lines.push(field("Duration", duration));
  }
  if let (Some(w), Some(h)) = (video.width, video.height) {
    lines.push(field("Size", format!("{}×{}", w, h)));
  }
  if let Some(likes) = video.like_count {
    lines.push(field("Likes", likes.to_string()));
  }
  if !video.is_available {
    lines.push(Line::from(Span::styled("File missing on disk", Style::default().fg(PALETTE.error))));
  }
  let tags = app.tags_of(video);
  if !tags.is_empty() {
    lines.push(Line::from(""));
    lines.push(field("Tags", tags.join(", ")));
  }
  lines
}

fn render_preview(frame: &mut Frame, app: &App, area: Rect) {
  let block = rounded_block(" Preview ", false).padding(Padding::horizontal(1));
  let inner_w = area.width.saturating_sub(4) as usize;
  let lines = app.selected_video().map(|v| summary_lines(app, v, inner_w)).unwrap_or_default();
  frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }).block(block), area);
}

fn render_detail(frame: &mut Frame, app: &mut App, area: Rect) {
  let Some(detail) = app.detail.clone() else { return };
  let inner_w = area.width.saturating_sub(4) as usize;
  let tags = app.detail_tags();

  let [info_area, tags_area] =
    Layout::vertical([Constraint::Min(5), Constraint::Length(tags.len().clamp(1, 8) as u16 + 2)]).areas(area);

  let mut lines = summary_lines(app, &detail.summary, inner_w);
  // tags get their own selectable list below
  if !tags.is_empty() {
    lines.truncate(lines.len().saturating_sub(2));
  }
  if let Some(description) = detail.description.as_deref().filter(|d| !d.trim().is_empty()) {
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(description.to_string(), Style::default().fg(PALETTE.fg))));
  }
  if let Some(url) = &detail.summary.webpage_url {
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
      truncate_str(url, inner_w),
      Style::default().fg(PALETTE.accent).add_modifier(Modifier::UNDERLINED),
    )));
  }
  let info = Paragraph::new(lines)
    .wrap(Wrap { trim: false })
    .block(rounded_block(" Video ", true).padding(Padding::horizontal(1)));
  frame.render_widget(info, info_area);

  let items: Vec<ListItem> = tags.iter().map(|t| ListItem::new(t.as_str()).fg(PALETTE.fg)).collect();
  let list = List::new(items)
    .block(rounded_block(" Tags ", true))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(PALETTE.highlight_fg).bg(PALETTE.highlight_bg));
  frame.render_stateful_widget(list, tags_area, &mut app.detail_tag_state);
}

fn render_text_input(frame: &mut Frame, input: &mut TextInput, title: &str, area: Rect) {
  let block = rounded_block(title.to_string(), true).padding(Padding::horizontal(1));
  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&input.text, input.cursor);

  if cursor_col < input.scroll {
    input.scroll = cursor_col;
  } else if cursor_col >= input.scroll + inner_w {
    input.scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let visible: String = input
    .text
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= input.scroll)
    .take_while(|(start, _, _)| *start < input.scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  frame.render_widget(Paragraph::new(visible).style(Style::default().fg(PALETTE.fg)).block(block), area);
  let cursor_x = area.x + 2 + (cursor_col - input.scroll) as u16;
  frame.set_cursor_position((cursor_x, area.y + 1));
}

fn render_tag_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let [input_area, list_area] = Layout::vertical([Constraint::Length(3), Constraint::Min(1)]).areas(area);
  let searching = app.mode == AppMode::TagSearch;

  let title = if searching { " Filter by tag " } else { " Add tag " };
  if searching {
    render_text_input(frame, &mut app.tag_search_input, title, input_area);
  } else {
    render_text_input(frame, &mut app.tag_edit_input, title, input_area);
  }

  let query = if searching { &app.tag_search } else { &app.tag_edit };
  let active = app.filters.active_tags();
  let mut items: Vec<ListItem> = query
    .suggestions()
    .iter()
    .map(|tag| {
      let marked = searching && active.contains(&tag.name);
      let mark = if marked { "✓ " } else { "  " };
      ListItem::new(Line::from(vec![
        Span::styled(mark, Style::default().fg(PALETTE.info)),
        Span::styled(tag.name.clone(), Style::default().fg(if marked { PALETTE.muted } else { PALETTE.fg })),
        Span::styled(format!("  {}", tag.video_count), Style::default().fg(PALETTE.muted)),
      ]))
    })
    .collect();

  if !searching && let Some(candidate) = query.create_candidate() {
    items.push(ListItem::new(Line::from(Span::styled(
      format!("  + create \"{}\"", candidate),
      Style::default().fg(PALETTE.accent).add_modifier(Modifier::ITALIC),
    ))));
  }

  let suffix = if query.is_pending() { " …" } else { "" };
  let list_title = format!(" Suggestions{} ", suffix);
  let list = List::new(items)
    .block(rounded_block(list_title, false))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(PALETTE.highlight_fg).bg(PALETTE.highlight_bg));
  frame.render_stateful_widget(list, list_area, &mut app.suggestion_state);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let (text, style) = if let Some(msg) = &app.status_message {
    (format!(" ⏳ {}", msg), Style::default().fg(PALETTE.status))
  } else if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(PALETTE.error))
  } else if let Some(err) = app.catalog.error() {
    (
      format!(" ⚠  Page {} failed: {} (r to retry)", app.catalog.last_requested_page(), err),
      Style::default().fg(PALETTE.error),
    )
  } else if app.catalog.is_initial_loading() || app.catalog.is_refreshing() {
    (" ⏳ Loading videos…".to_string(), Style::default().fg(PALETTE.status))
  } else if let Some(info) = &app.info_message {
    (format!(" ✓ {}", info), Style::default().fg(PALETTE.info))
  } else {
    (" Ready".to_string(), Style::default().fg(PALETTE.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let keys: Vec<(&str, &str)> = match app.mode {
    AppMode::Browse => {
      let mut k = vec![("Enter", "Open"), ("/", "Filter"), ("t", "Tag"), ("s", "Sort")];
      if !app.filters.active_tags().is_empty() {
        k.push(("x", "Drop filter"));
        k.push(("c", "Clear"));
      }
      if app.catalog.is_error() {
        k.push(("r", "Retry"));
      }
      k.push(("R", "Rescan"));
      k.push(("q", "Quit"));
      k
    }
    AppMode::Detail => {
      vec![("j/k", "Select tag"), ("Enter", "Filter by tag"), ("d", "Remove"), ("t", "Add"), ("Esc", "Back")]
    }
    AppMode::TagSearch => vec![("↑/↓", "Choose"), ("Enter", "Add filter"), ("Esc", "Cancel")],
    AppMode::TagEdit => vec![("↑/↓", "Choose"), ("Enter", "Add tag"), ("Esc", "Cancel")],
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(PALETTE.key_fg).bg(PALETTE.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(PALETTE.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);
}
