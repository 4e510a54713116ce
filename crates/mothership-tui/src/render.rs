//! Frame model for the terminal notebook.
//!
//! Rendering produces plain data (`Frame`) so layout can be tested without a
//! terminal; `runtime` turns it into crossterm commands.

use mothership_notebook::{LinkAnnotation, TabView};

use crate::app::{App, ViewState, WINDOW_TITLE};

/// Rows taken by the title, tab strip, rule and status line.
const CHROME_ROWS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRole {
    Title,
    Tab,
    ActiveTab,
    Rule,
    Body,
    Link,
    SelectedLink,
    Status,
    Alert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub role: TextRole,
}

impl Span {
    fn new(text: impl Into<String>, role: TextRole) -> Self {
        Self {
            text: text.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameLine {
    pub spans: Vec<Span>,
}

impl FrameLine {
    fn single(text: impl Into<String>, role: TextRole) -> Self {
        Self {
            spans: vec![Span::new(text, role)],
        }
    }

    #[must_use]
    pub fn plain_text(&self) -> String {
        self.spans.iter().map(|span| span.text.as_str()).collect()
    }

    #[must_use]
    pub fn has_role(&self, role: TextRole) -> bool {
        self.spans.iter().any(|span| span.role == role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub lines: Vec<FrameLine>,
}

/// Rows available for tab content on a terminal `height` rows tall.
#[must_use]
pub fn body_rows(height: usize) -> usize {
    height.saturating_sub(CHROME_ROWS).max(1)
}

#[must_use]
pub fn render_app(app: &App, width: usize, height: usize) -> Frame {
    let mut lines = Vec::with_capacity(height);
    lines.push(FrameLine::single(WINDOW_TITLE, TextRole::Title));
    lines.push(tab_strip(&app.strip().titles(), app.strip().active()));
    lines.push(FrameLine::single("-".repeat(width), TextRole::Rule));

    let rows = body_rows(height);
    let selected = app.selected_link();
    match app.active_view() {
        Some((view, state)) => lines.extend(body(&view, state, selected.as_ref(), rows)),
        None => lines.push(FrameLine::default()),
    }
    while lines.len() < CHROME_ROWS - 1 + rows {
        lines.push(FrameLine::default());
    }

    let status = app.status_line();
    let role = if status.contains("store error") {
        TextRole::Alert
    } else {
        TextRole::Status
    };
    lines.push(FrameLine::single(status, role));

    let lines = lines
        .into_iter()
        .take(height.max(1))
        .map(|line| clip(line, width))
        .collect();
    Frame {
        width,
        height,
        lines,
    }
}

fn tab_strip(titles: &[String], active: Option<usize>) -> FrameLine {
    let mut spans = Vec::with_capacity(titles.len() * 2);
    for (position, title) in titles.iter().enumerate() {
        if position > 0 {
            spans.push(Span::new("|", TextRole::Tab));
        }
        let role = if active == Some(position) {
            TextRole::ActiveTab
        } else {
            TextRole::Tab
        };
        spans.push(Span::new(format!(" {title} "), role));
    }
    FrameLine { spans }
}

fn body(
    view: &TabView,
    state: ViewState,
    selected: Option<&LinkAnnotation>,
    rows: usize,
) -> Vec<FrameLine> {
    view.lines
        .iter()
        .enumerate()
        .skip(state.scroll)
        .take(rows)
        .map(|(index, text)| content_line(index, text, &view.annotations, selected))
        .collect()
}

/// Split one content line into plain and link spans.
fn content_line(
    index: usize,
    text: &str,
    annotations: &[LinkAnnotation],
    selected: Option<&LinkAnnotation>,
) -> FrameLine {
    let mut links: Vec<&LinkAnnotation> = annotations
        .iter()
        .filter(|annotation| annotation.line == index)
        .collect();
    links.sort_by_key(|annotation| annotation.span.start);

    let mut spans = Vec::with_capacity(links.len() * 2 + 1);
    let mut cursor = 0;
    for link in links {
        let (Some(before), Some(label)) = (
            text.get(cursor..link.span.start),
            link.text(text),
        ) else {
            continue;
        };
        if !before.is_empty() {
            spans.push(Span::new(before, TextRole::Body));
        }
        let role = if selected == Some(link) {
            TextRole::SelectedLink
        } else {
            TextRole::Link
        };
        spans.push(Span::new(label, role));
        cursor = link.span.end;
    }
    if let Some(rest) = text.get(cursor..) {
        if !rest.is_empty() {
            spans.push(Span::new(rest, TextRole::Body));
        }
    }
    FrameLine { spans }
}

fn clip(line: FrameLine, width: usize) -> FrameLine {
    let mut remaining = width;
    let mut spans = Vec::with_capacity(line.spans.len());
    for span in line.spans {
        if remaining == 0 {
            break;
        }
        let count = span.text.chars().count();
        if count <= remaining {
            remaining -= count;
            spans.push(span);
        } else {
            let text: String = span.text.chars().take(remaining).collect();
            remaining = 0;
            spans.push(Span::new(text, span.role));
        }
    }
    FrameLine { spans }
}

/// Plain-text rendering of one tab, for non-interactive output.
#[must_use]
pub fn render_snapshot(view: &TabView, visible_count: u64) -> String {
    let mut out = String::new();
    out.push_str(WINDOW_TITLE);
    out.push('\n');
    out.push_str(&format!("[{}]\n", view.title));
    for line in &view.lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&format!("Displaying {visible_count} errors\n"));
    if let Some(err) = &view.last_error {
        out.push_str(&format!("store error: {err}\n"));
    }
    out
}
