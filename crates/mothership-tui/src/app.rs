//! Interaction state of the terminal notebook.
//!
//! `App` is owned by the rendering thread. It is the only caller of the
//! notebook's mutating operations in the monitor, and it drains the refresh
//! queue that background threads push into.

use std::collections::HashMap;
use std::sync::Arc;

use mothership_notebook::{
    CloseOutcome, LinkAnnotation, Notebook, NotebookError, RefreshQueue, RefreshReason, TabKey,
    TabView,
};

use crate::keymap::Command;
use crate::page_strip::PageStrip;

pub const WINDOW_TITLE: &str = "EDSAC Status Monitor";

/// Scroll offset and link cursor of one tab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewState {
    pub scroll: usize,
    /// Index into the tab's annotations.
    pub cursor: Option<usize>,
}

impl ViewState {
    fn clamp(&mut self, lines: usize, links: usize, rows: usize) {
        self.scroll = self.scroll.min(max_scroll(lines, rows));
        self.cursor = match self.cursor {
            Some(_) if links == 0 => None,
            Some(cursor) => Some(cursor.min(links - 1)),
            None => None,
        };
    }

    fn reveal(&mut self, line: usize, rows: usize) {
        let rows = rows.max(1);
        if line < self.scroll {
            self.scroll = line;
        } else if line >= self.scroll + rows {
            self.scroll = line + 1 - rows;
        }
    }
}

fn max_scroll(lines: usize, rows: usize) -> usize {
    lines.saturating_sub(rows.max(1))
}

pub struct App {
    notebook: Arc<Notebook>,
    strip: Arc<PageStrip>,
    refresh: Arc<RefreshQueue>,
    views: HashMap<TabKey, ViewState>,
    viewport_rows: usize,
    visible_count: u64,
    count_error: Option<String>,
    quitting: bool,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("notebook", &self.notebook)
            .field("viewport_rows", &self.viewport_rows)
            .field("visible_count", &self.visible_count)
            .field("quitting", &self.quitting)
            .finish_non_exhaustive()
    }
}

impl App {
    pub fn new(notebook: Arc<Notebook>, strip: Arc<PageStrip>, refresh: Arc<RefreshQueue>) -> Self {
        Self {
            notebook,
            strip,
            refresh,
            views: HashMap::new(),
            viewport_rows: 20,
            visible_count: 0,
            count_error: None,
            quitting: false,
        }
    }

    /// Open the `All` tab and compute the first status line.
    pub fn start(&mut self) -> Result<(), NotebookError> {
        self.notebook.open_initial()?;
        self.update_count();
        Ok(())
    }

    pub fn set_viewport_rows(&mut self, rows: usize) {
        self.viewport_rows = rows.max(1);
        self.clamp_views();
    }

    #[must_use]
    pub fn viewport_rows(&self) -> usize {
        self.viewport_rows
    }

    /// Apply one command. Returns whether the screen needs a redraw.
    pub fn apply(&mut self, command: Command) -> Result<bool, NotebookError> {
        match command {
            Command::Quit => {
                self.quitting = true;
                Ok(true)
            }
            Command::NextPage => self.step_page(1),
            Command::PrevPage => self.step_page(-1),
            Command::LinkDown => Ok(self.move_cursor(1)),
            Command::LinkUp => Ok(self.move_cursor(-1)),
            Command::ScrollDown => Ok(self.scroll(1)),
            Command::ScrollUp => Ok(self.scroll(-1)),
            Command::ActivateLink => self.activate_selected(),
            Command::CloseTab => self.close_active(),
            Command::Refresh => {
                self.refresh.push(RefreshReason::Manual);
                Ok(false)
            }
        }
    }

    /// Run at most one refresh for everything queued since the last call.
    pub fn process_refresh(&mut self) -> bool {
        let Some(batch) = self.refresh.drain_latest() else {
            return false;
        };
        let summary = self.notebook.refresh_all();
        tracing::debug!(
            reason = batch.reason.as_str(),
            requests = batch.requests,
            tabs = summary.tabs,
            degraded = summary.degraded,
            "refresh applied"
        );
        self.clamp_views();
        self.update_count();
        true
    }

    #[must_use]
    pub fn quitting(&self) -> bool {
        self.quitting || self.notebook.is_window_closed()
    }

    #[must_use]
    pub fn notebook(&self) -> &Arc<Notebook> {
        &self.notebook
    }

    #[must_use]
    pub fn strip(&self) -> &Arc<PageStrip> {
        &self.strip
    }

    #[must_use]
    pub fn visible_count(&self) -> u64 {
        self.visible_count
    }

    #[must_use]
    pub fn view_state(&self, key: TabKey) -> ViewState {
        self.views.get(&key).copied().unwrap_or_default()
    }

    /// Content and view state of the active page.
    #[must_use]
    pub fn active_view(&self) -> Option<(TabView, ViewState)> {
        let tab = self.notebook.active_tab()?;
        let view = tab.snapshot();
        let state = self.view_state(view.key);
        Some((view, state))
    }

    #[must_use]
    pub fn selected_link(&self) -> Option<LinkAnnotation> {
        let (view, state) = self.active_view()?;
        state
            .cursor
            .and_then(|cursor| view.annotations.get(cursor).cloned())
    }

    #[must_use]
    pub fn status_line(&self) -> String {
        let mut line = format!("Displaying {} errors", self.visible_count);
        let tab_error = self
            .notebook
            .active_tab()
            .and_then(|tab| tab.last_error())
            .map(|err| err.to_string());
        if let Some(err) = tab_error.or_else(|| self.count_error.clone()) {
            line.push_str(" | store error: ");
            line.push_str(&err);
        }
        line
    }

    fn step_page(&mut self, delta: isize) -> Result<bool, NotebookError> {
        let len = self.notebook.len();
        if len == 0 {
            return Ok(false);
        }
        let current = self.strip.active().unwrap_or(0);
        let next = if delta < 0 {
            (current + len - 1) % len
        } else {
            (current + 1) % len
        };
        if next == current {
            return Ok(false);
        }
        self.notebook.focus(next)?;
        self.update_count();
        Ok(true)
    }

    fn move_cursor(&mut self, delta: isize) -> bool {
        let Some((view, mut state)) = self.active_view() else {
            return false;
        };
        let links = view.annotations.len();
        if links == 0 {
            return false;
        }
        let next = match (state.cursor, delta < 0) {
            (None, _) => 0,
            (Some(cursor), true) => cursor.saturating_sub(1),
            (Some(cursor), false) => (cursor + 1).min(links - 1),
        };
        if state.cursor == Some(next) {
            return false;
        }
        state.cursor = Some(next);
        if let Some(annotation) = view.annotations.get(next) {
            state.reveal(annotation.line, self.viewport_rows);
        }
        self.views.insert(view.key, state);
        true
    }

    fn scroll(&mut self, direction: isize) -> bool {
        let Some((view, mut state)) = self.active_view() else {
            return false;
        };
        let rows = self.viewport_rows;
        let next = if direction < 0 {
            state.scroll.saturating_sub(rows)
        } else {
            (state.scroll + rows).min(max_scroll(view.lines.len(), rows))
        };
        if next == state.scroll {
            return false;
        }
        state.scroll = next;
        self.views.insert(view.key, state);
        true
    }

    fn activate_selected(&mut self) -> Result<bool, NotebookError> {
        let Some(annotation) = self.selected_link() else {
            return Ok(false);
        };
        let outcome = self.notebook.activate_link(&annotation)?;
        tracing::debug!(
            filter = %annotation.target,
            position = outcome.position(),
            tab_key = %outcome.key(),
            "link activated"
        );
        self.update_count();
        Ok(true)
    }

    fn close_active(&mut self) -> Result<bool, NotebookError> {
        let Some(position) = self.strip.active() else {
            return Ok(false);
        };
        match self.notebook.close_tab(position)? {
            CloseOutcome::Closed { key, .. } => {
                self.views.remove(&key);
                self.update_count();
            }
            CloseOutcome::WindowClosed { key } => {
                self.views.remove(&key);
                self.quitting = true;
            }
        }
        Ok(true)
    }

    fn clamp_views(&mut self) {
        let rows = self.viewport_rows;
        let tabs = self.notebook.tabs();
        self.views
            .retain(|key, _| tabs.iter().any(|tab| tab.key() == *key));
        for tab in tabs {
            if let Some(state) = self.views.get_mut(&tab.key()) {
                state.clamp(tab.line_count(), tab.annotations().len(), rows);
            }
        }
    }

    fn update_count(&mut self) {
        match self.notebook.total_visible_error_count() {
            Ok(count) => {
                self.visible_count = count;
                self.count_error = None;
            }
            Err(err) => {
                tracing::warn!(error = %err, "visible error count failed");
                self.visible_count = 0;
                self.count_error = Some(err.to_string());
            }
        }
    }
}
