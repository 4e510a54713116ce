//! Tab strip backing the terminal notebook.

use std::sync::{Mutex, MutexGuard};

use mothership_notebook::page_host::active_after_removal;
use mothership_notebook::PageHost;

#[derive(Debug, Default)]
struct StripState {
    titles: Vec<String>,
    active: Option<usize>,
    window_closed: bool,
    revision: u64,
}

/// Page host drawn as a row of tab labels.
///
/// The notebook drives it; the renderer reads it. `revision` moves on every
/// change so the UI loop can tell when the strip needs a redraw.
#[derive(Debug, Default)]
pub struct PageStrip {
    state: Mutex<StripState>,
}

impl PageStrip {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn titles(&self) -> Vec<String> {
        self.lock().titles.clone()
    }

    #[must_use]
    pub fn active(&self) -> Option<usize> {
        self.lock().active
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().titles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().titles.is_empty()
    }

    #[must_use]
    pub fn is_window_closed(&self) -> bool {
        self.lock().window_closed
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    fn lock(&self) -> MutexGuard<'_, StripState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("page strip lock poisoned"),
        }
    }
}

impl PageHost for PageStrip {
    fn insert_page(&self, position: usize, title: &str) {
        let mut state = self.lock();
        let position = position.min(state.titles.len());
        state.titles.insert(position, title.to_string());
        if let Some(active) = state.active {
            if active >= position {
                state.active = Some(active + 1);
            }
        }
        state.revision += 1;
    }

    fn remove_page(&self, position: usize) {
        let mut state = self.lock();
        if position >= state.titles.len() {
            return;
        }
        state.titles.remove(position);
        state.active = active_after_removal(state.active, position, state.titles.len());
        state.revision += 1;
    }

    fn set_active_page(&self, position: usize) {
        let mut state = self.lock();
        if position < state.titles.len() && state.active != Some(position) {
            state.active = Some(position);
            state.revision += 1;
        }
    }

    fn active_page(&self) -> Option<usize> {
        self.lock().active
    }

    fn close_window(&self) {
        let mut state = self.lock();
        state.window_closed = true;
        state.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_before_active_shifts_it() {
        let strip = PageStrip::new();
        strip.insert_page(0, "All");
        strip.set_active_page(0);
        strip.insert_page(0, "Rack 1");
        assert_eq!(strip.titles(), vec!["Rack 1".to_string(), "All".to_string()]);
        assert_eq!(strip.active(), Some(1));
    }

    #[test]
    fn removal_keeps_active_in_range() {
        let strip = PageStrip::new();
        for (position, title) in ["All", "Rack 1", "Rack 2"].iter().enumerate() {
            strip.insert_page(position, title);
        }
        strip.set_active_page(2);
        strip.remove_page(2);
        assert_eq!(strip.active(), Some(1));
        strip.remove_page(0);
        assert_eq!(strip.active(), Some(0));
        assert_eq!(strip.titles(), vec!["Rack 1".to_string()]);
        strip.remove_page(0);
        assert_eq!(strip.active(), None);
        assert!(strip.is_empty());
    }

    #[test]
    fn revision_tracks_visible_changes_only() {
        let strip = PageStrip::new();
        let start = strip.revision();
        strip.insert_page(0, "All");
        strip.set_active_page(0);
        let after = strip.revision();
        assert_eq!(after, start + 2);
        strip.set_active_page(0);
        strip.set_active_page(5);
        strip.remove_page(3);
        assert_eq!(strip.revision(), after);
        strip.close_window();
        assert!(strip.is_window_closed());
    }
}
