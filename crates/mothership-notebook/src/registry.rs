//! Tab Registry: the open filter-tabs in page order.
//!
//! A tab's page position is its index in the backing vector, so positions
//! stay contiguous from zero after any removal without renumbering.

use std::sync::Arc;

use mothership_core::FilterDescriptor;
use thiserror::Error;

use crate::tab::{FilterTab, TabKey};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a tab for filter {filter} is already open at position {position}")]
    DuplicateFilter {
        filter: FilterDescriptor,
        position: usize,
    },
}

#[derive(Debug, Default)]
pub struct TabRegistry {
    tabs: Vec<Arc<FilterTab>>,
}

impl TabRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The tab at page position `position`.
    #[must_use]
    pub fn find_by_id(&self, position: usize) -> Option<&Arc<FilterTab>> {
        self.tabs.get(position)
    }

    #[must_use]
    pub fn find_by_filter(&self, filter: &FilterDescriptor) -> Option<&Arc<FilterTab>> {
        self.tabs.iter().find(|tab| tab.filter() == filter)
    }

    /// Position and tab for `filter`, if open.
    #[must_use]
    pub fn locate_filter(&self, filter: &FilterDescriptor) -> Option<(usize, &Arc<FilterTab>)> {
        self.tabs
            .iter()
            .enumerate()
            .find(|(_, tab)| tab.filter() == filter)
    }

    #[must_use]
    pub fn find_by_key(&self, key: TabKey) -> Option<&Arc<FilterTab>> {
        self.tabs.iter().find(|tab| tab.key() == key)
    }

    #[must_use]
    pub fn position_of(&self, key: TabKey) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.key() == key)
    }

    /// Append `tab` as the last page and return its position.
    ///
    /// Callers check `find_by_filter` first; an equal filter already present
    /// is a caller bug and is reported, never silently merged.
    pub fn insert(&mut self, tab: Arc<FilterTab>) -> Result<usize, RegistryError> {
        if let Some((position, _)) = self.locate_filter(tab.filter()) {
            return Err(RegistryError::DuplicateFilter {
                filter: *tab.filter(),
                position,
            });
        }
        self.tabs.push(tab);
        Ok(self.tabs.len() - 1)
    }

    /// Remove the tab at `position`; every later tab moves down one place.
    pub fn remove(&mut self, position: usize) -> Option<Arc<FilterTab>> {
        if position >= self.tabs.len() {
            return None;
        }
        Some(self.tabs.remove(position))
    }

    /// Clone of the current page order, for work done outside the lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<FilterTab>> {
        self.tabs.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FilterTab>> {
        self.tabs.iter()
    }
}
