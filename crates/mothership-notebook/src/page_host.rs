//! The physical notebook widget the registry mirrors.

use std::sync::{Mutex, MutexGuard};

/// Page container driven by the notebook.
///
/// Calls arrive with the registry lock held, so page order always matches
/// registry order. Implementations must not call back into the notebook.
pub trait PageHost: Send + Sync {
    fn insert_page(&self, position: usize, title: &str);

    fn remove_page(&self, position: usize);

    fn set_active_page(&self, position: usize);

    fn active_page(&self) -> Option<usize>;

    /// The last page closed; the enclosing window should go away.
    fn close_window(&self);
}

/// Where the active page lands after `removed` goes away from `len + 1` pages.
#[must_use]
pub fn active_after_removal(active: Option<usize>, removed: usize, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    match active {
        Some(current) if current > removed => Some(current - 1),
        Some(current) if current == removed => Some(current.min(len - 1)),
        Some(current) => Some(current),
        None => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Inserted { position: usize, title: String },
    Removed { position: usize },
    Activated { position: usize },
    WindowClosed,
}

#[derive(Debug, Default)]
struct HeadlessState {
    pages: Vec<String>,
    active: Option<usize>,
    events: Vec<HostEvent>,
}

/// Page host with no display. Records what the notebook asked for.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    state: Mutex<HeadlessState>,
}

impl HeadlessHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn titles(&self) -> Vec<String> {
        self.lock().pages.clone()
    }

    #[must_use]
    pub fn events(&self) -> Vec<HostEvent> {
        self.lock().events.clone()
    }

    #[must_use]
    pub fn window_close_count(&self) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|event| matches!(event, HostEvent::WindowClosed))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PageHost for HeadlessHost {
    fn insert_page(&self, position: usize, title: &str) {
        let mut state = self.lock();
        let position = position.min(state.pages.len());
        state.pages.insert(position, title.to_string());
        state.events.push(HostEvent::Inserted {
            position,
            title: title.to_string(),
        });
    }

    fn remove_page(&self, position: usize) {
        let mut state = self.lock();
        if position >= state.pages.len() {
            return;
        }
        state.pages.remove(position);
        state.active = active_after_removal(state.active, position, state.pages.len());
        state.events.push(HostEvent::Removed { position });
    }

    fn set_active_page(&self, position: usize) {
        let mut state = self.lock();
        if position < state.pages.len() {
            state.active = Some(position);
            state.events.push(HostEvent::Activated { position });
        }
    }

    fn active_page(&self) -> Option<usize> {
        self.lock().active
    }

    fn close_window(&self) {
        self.lock().events.push(HostEvent::WindowClosed);
    }
}
