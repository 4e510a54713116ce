//! Refresh Engine: rebuild every tab of a registry snapshot.

use std::sync::Arc;
use std::thread;

use mothership_core::QueryStore;

use crate::tab::{FilterTab, RebuildOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Rebuild the tabs of one snapshot on scoped threads instead of in turn.
    pub parallel: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub tabs: usize,
    pub rendered: usize,
    pub degraded: usize,
    pub skipped: usize,
    pub records: usize,
}

impl RefreshSummary {
    fn record(&mut self, outcome: &RebuildOutcome) {
        self.tabs += 1;
        match outcome {
            RebuildOutcome::Rendered { records } => {
                self.rendered += 1;
                self.records += records;
            }
            RebuildOutcome::Degraded(_) => self.degraded += 1,
            RebuildOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Rebuild each tab in `tabs`. No registry lock is held here; each tab
/// serializes only with itself.
pub fn refresh_tabs(
    tabs: &[Arc<FilterTab>],
    store: &dyn QueryStore,
    config: RefreshConfig,
) -> RefreshSummary {
    let mut summary = RefreshSummary::default();
    if config.parallel && tabs.len() > 1 {
        let outcomes: Vec<RebuildOutcome> = thread::scope(|scope| {
            let handles: Vec<_> = tabs
                .iter()
                .map(|tab| scope.spawn(move || tab.rebuild(store)))
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(outcome) => outcome,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });
        for outcome in &outcomes {
            summary.record(outcome);
        }
    } else {
        for tab in tabs {
            summary.record(&tab.rebuild(store));
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tab::TabKey;
    use mothership_core::models::timestamp_from_unix;
    use mothership_core::{ErrorKind, ErrorReport, FilterDescriptor, MemoryStore};

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        for (rack, chassis, at) in [(1, 1, 3), (1, 2, 1), (2, 1, 2)] {
            let report = ErrorReport::new(rack, chassis, None, ErrorKind::Hardware, "fault");
            if let Err(err) = store.add_error(&report, timestamp_from_unix(at)) {
                panic!("seed: {err}");
            }
        }
        store
    }

    fn tabs() -> Vec<Arc<FilterTab>> {
        vec![
            Arc::new(FilterTab::new(TabKey::new(0), FilterDescriptor::All)),
            Arc::new(FilterTab::new(TabKey::new(1), FilterDescriptor::Rack { rack: 1 })),
            Arc::new(FilterTab::new(TabKey::new(2), FilterDescriptor::Rack { rack: 9 })),
        ]
    }

    #[test]
    fn sequential_and_parallel_refresh_agree() {
        let store = seeded_store();
        let sequential = tabs();
        let parallel = tabs();

        let left = refresh_tabs(&sequential, &store, RefreshConfig { parallel: false });
        let right = refresh_tabs(&parallel, &store, RefreshConfig { parallel: true });
        assert_eq!(left, right);
        assert_eq!(left.tabs, 3);
        assert_eq!(left.records, 5);

        for (a, b) in sequential.iter().zip(parallel.iter()) {
            assert_eq!(a.text(), b.text());
        }
    }

    #[test]
    fn failing_store_degrades_every_tab() {
        let store = seeded_store();
        store.fail_queries(true);
        let summary = refresh_tabs(&tabs(), &store, RefreshConfig::default());
        assert_eq!(summary.degraded, 3);
        assert_eq!(summary.records, 0);
    }
}
