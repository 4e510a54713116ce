//! The error notebook: registry, dispatch, refresh and close wired to a
//! page host and a query store.
//!
//! Lock order is registry, then tab, then page host. Nothing in here takes
//! the registry lock while holding a tab lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use mothership_core::{FilterDescriptor, QueryStore, StoreError};
use thiserror::Error;

use crate::buffer::LinkAnnotation;
use crate::page_host::PageHost;
use crate::refresh::{refresh_tabs, RefreshConfig, RefreshSummary};
use crate::registry::{RegistryError, TabRegistry};
use crate::tab::{FilterTab, TabKey};

#[derive(Debug, Error)]
pub enum NotebookError {
    #[error("no page at position {position}")]
    NoSuchPage { position: usize },
    #[error("tab {0} is not open")]
    UnknownTab(TabKey),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A tab for the filter was already open and is now the active page.
    Focused { position: usize, key: TabKey },
    /// A new tab was built, inserted and activated.
    Created { position: usize, key: TabKey },
}

impl DispatchOutcome {
    #[must_use]
    pub fn position(&self) -> usize {
        match *self {
            Self::Focused { position, .. } | Self::Created { position, .. } => position,
        }
    }

    #[must_use]
    pub fn key(&self) -> TabKey {
        match *self {
            Self::Focused { key, .. } | Self::Created { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed { key: TabKey, remaining: usize },
    /// The last tab closed and the window was told to close.
    WindowClosed { key: TabKey },
}

pub struct Notebook {
    store: Arc<dyn QueryStore>,
    host: Arc<dyn PageHost>,
    registry: Mutex<TabRegistry>,
    next_key: AtomicU64,
    refresh: RefreshConfig,
    window_closed: AtomicBool,
}

impl std::fmt::Debug for Notebook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notebook")
            .field("tabs", &self.len())
            .field("refresh", &self.refresh)
            .field("window_closed", &self.is_window_closed())
            .finish_non_exhaustive()
    }
}

impl Notebook {
    #[must_use]
    pub fn new(store: Arc<dyn QueryStore>, host: Arc<dyn PageHost>) -> Self {
        Self::with_refresh_config(store, host, RefreshConfig::default())
    }

    #[must_use]
    pub fn with_refresh_config(
        store: Arc<dyn QueryStore>,
        host: Arc<dyn PageHost>,
        refresh: RefreshConfig,
    ) -> Self {
        Self {
            store,
            host,
            registry: Mutex::new(TabRegistry::new()),
            next_key: AtomicU64::new(0),
            refresh,
            window_closed: AtomicBool::new(false),
        }
    }

    /// Open the `All` tab.
    pub fn open_initial(&self) -> Result<DispatchOutcome, NotebookError> {
        self.create_or_focus(FilterDescriptor::All)
    }

    /// Focus the tab showing `filter`, creating it first if none is open.
    ///
    /// The new tab is built and populated outside the registry lock. The
    /// lookup is repeated under the lock before inserting; if another caller
    /// opened the same filter meanwhile, the freshly built tab is dropped and
    /// the winner is focused.
    pub fn create_or_focus(
        &self,
        filter: FilterDescriptor,
    ) -> Result<DispatchOutcome, NotebookError> {
        if let Some(outcome) = self.focus_existing(&filter) {
            return Ok(outcome);
        }

        let key = TabKey::new(self.next_key.fetch_add(1, Ordering::SeqCst));
        let tab = Arc::new(FilterTab::new(key, filter));
        let _ = tab.rebuild(self.store.as_ref());

        let mut registry = self.registry();
        if let Some((position, winner)) = registry.locate_filter(&filter) {
            let winner_key = winner.key();
            tab.close();
            self.host.set_active_page(position);
            tracing::debug!(
                filter = %filter,
                position,
                tab_key = %winner_key,
                "lost tab creation race; focusing existing tab"
            );
            return Ok(DispatchOutcome::Focused {
                position,
                key: winner_key,
            });
        }

        match registry.insert(Arc::clone(&tab)) {
            Ok(position) => {
                self.host.insert_page(position, tab.title());
                self.host.set_active_page(position);
                tracing::info!(filter = %filter, position, tab_key = %key, "tab created");
                Ok(DispatchOutcome::Created { position, key })
            }
            Err(RegistryError::DuplicateFilter { filter, position }) => {
                if cfg!(debug_assertions) {
                    panic!("duplicate tab for {filter} at position {position} after re-check");
                }
                tracing::error!(filter = %filter, position, "duplicate tab insert; focusing existing");
                tab.close();
                let existing = registry
                    .find_by_id(position)
                    .map(|tab| tab.key())
                    .ok_or(NotebookError::NoSuchPage { position })?;
                self.host.set_active_page(position);
                Ok(DispatchOutcome::Focused {
                    position,
                    key: existing,
                })
            }
        }
    }

    /// Follow a link annotation.
    pub fn activate_link(
        &self,
        annotation: &LinkAnnotation,
    ) -> Result<DispatchOutcome, NotebookError> {
        self.create_or_focus(annotation.target)
    }

    /// A click at `(line, column)` in the tab with `key`.
    ///
    /// Returns `Ok(None)` when the click hit plain text.
    pub fn click(
        &self,
        key: TabKey,
        line: usize,
        column: usize,
    ) -> Result<Option<DispatchOutcome>, NotebookError> {
        let tab = self
            .registry()
            .find_by_key(key)
            .cloned()
            .ok_or(NotebookError::UnknownTab(key))?;
        match tab.annotation_at(line, column) {
            Some(annotation) => self.activate_link(&annotation).map(Some),
            None => Ok(None),
        }
    }

    /// Make the page at `position` active.
    pub fn focus(&self, position: usize) -> Result<TabKey, NotebookError> {
        let registry = self.registry();
        let key = registry
            .find_by_id(position)
            .map(|tab| tab.key())
            .ok_or(NotebookError::NoSuchPage { position })?;
        self.host.set_active_page(position);
        Ok(key)
    }

    /// Re-query and re-render every open tab.
    ///
    /// Works on a snapshot taken under the registry lock; the lock is not held
    /// while tabs query the store. Registry membership and positions are
    /// untouched.
    pub fn refresh_all(&self) -> RefreshSummary {
        let snapshot = self.registry().snapshot();
        let summary = refresh_tabs(&snapshot, self.store.as_ref(), self.refresh);
        tracing::debug!(
            tabs = summary.tabs,
            records = summary.records,
            degraded = summary.degraded,
            "notebook refreshed"
        );
        summary
    }

    /// Number of errors matching the active page's filter.
    pub fn total_visible_error_count(&self) -> Result<u64, NotebookError> {
        let filter = {
            let registry = self.registry();
            let active = match self.host.active_page() {
                Some(position) => registry.find_by_id(position),
                None => None,
            };
            match active {
                Some(tab) => *tab.filter(),
                None => return Ok(0),
            }
        };
        Ok(self.store.count(&filter)?)
    }

    /// Close the page at `position`.
    ///
    /// Later pages move down one position. Closing the last page tells the
    /// host to close the window, once.
    pub fn close_tab(&self, position: usize) -> Result<CloseOutcome, NotebookError> {
        let mut registry = self.registry();
        let tab = registry
            .remove(position)
            .ok_or(NotebookError::NoSuchPage { position })?;
        tab.close();
        self.host.remove_page(position);
        let key = tab.key();
        let remaining = registry.len();
        tracing::info!(
            filter = %tab.filter(),
            position,
            tab_key = %key,
            remaining,
            "tab closed"
        );

        if remaining > 0 {
            return Ok(CloseOutcome::Closed { key, remaining });
        }
        if !self.window_closed.swap(true, Ordering::SeqCst) {
            self.host.close_window();
        }
        Ok(CloseOutcome::WindowClosed { key })
    }

    #[must_use]
    pub fn tab_at(&self, position: usize) -> Option<Arc<FilterTab>> {
        self.registry().find_by_id(position).cloned()
    }

    #[must_use]
    pub fn tab_by_key(&self, key: TabKey) -> Option<Arc<FilterTab>> {
        self.registry().find_by_key(key).cloned()
    }

    #[must_use]
    pub fn position_of(&self, key: TabKey) -> Option<usize> {
        self.registry().position_of(key)
    }

    #[must_use]
    pub fn active_tab(&self) -> Option<Arc<FilterTab>> {
        let registry = self.registry();
        self.host
            .active_page()
            .and_then(|position| registry.find_by_id(position).cloned())
    }

    /// Tabs in page order.
    #[must_use]
    pub fn tabs(&self) -> Vec<Arc<FilterTab>> {
        self.registry().snapshot()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry().is_empty()
    }

    #[must_use]
    pub fn is_window_closed(&self) -> bool {
        self.window_closed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn QueryStore> {
        &self.store
    }

    fn focus_existing(&self, filter: &FilterDescriptor) -> Option<DispatchOutcome> {
        let registry = self.registry();
        let (position, tab) = registry.locate_filter(filter)?;
        let key = tab.key();
        self.host.set_active_page(position);
        tracing::debug!(filter = %filter, position, tab_key = %key, "tab focused");
        Some(DispatchOutcome::Focused { position, key })
    }

    fn registry(&self) -> MutexGuard<'_, TabRegistry> {
        match self.registry.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("tab registry lock poisoned"),
        }
    }
}
