//! Filter-tabs: one live, filtered view of the error store.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use mothership_core::{ErrorRecord, FilterDescriptor, QueryStore, StoreError};

use crate::buffer::{LinkAnnotation, TextBuffer};

/// Generation key assigned once at tab creation and never reused.
///
/// Page positions shift when earlier tabs close; keys do not, so UI state
/// (scroll offset, link cursor) is keyed by `TabKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabKey(u64);

impl TabKey {
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TabKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// Result of one content rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    Rendered { records: usize },
    /// The query failed; content was cleared.
    Degraded(StoreError),
    /// The tab was closed, or a newer rebuild already landed.
    Skipped,
}

/// Read-only copy of a tab's rendered state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabView {
    pub key: TabKey,
    pub filter: FilterDescriptor,
    pub title: String,
    pub lines: Vec<String>,
    pub annotations: Vec<LinkAnnotation>,
    pub last_error: Option<StoreError>,
}

#[derive(Debug, Default)]
struct TabContent {
    buffer: TextBuffer,
    annotations: Vec<LinkAnnotation>,
    last_error: Option<StoreError>,
    applied_ticket: u64,
    closed: bool,
}

#[derive(Debug)]
pub struct FilterTab {
    key: TabKey,
    filter: FilterDescriptor,
    title: String,
    tickets: AtomicU64,
    content: Mutex<TabContent>,
}

impl FilterTab {
    /// An empty tab; call `rebuild` to populate it.
    #[must_use]
    pub fn new(key: TabKey, filter: FilterDescriptor) -> Self {
        Self {
            key,
            filter,
            title: filter.title(),
            tickets: AtomicU64::new(0),
            content: Mutex::new(TabContent::default()),
        }
    }

    #[must_use]
    pub fn key(&self) -> TabKey {
        self.key
    }

    #[must_use]
    pub fn filter(&self) -> &FilterDescriptor {
        &self.filter
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Re-query the store and replace the rendered content.
    ///
    /// The query runs without the tab lock held. Results are applied under
    /// the lock, and only if no later rebuild of this tab has landed first.
    /// A failed query leaves the content empty and records `last_error`.
    ///
    /// Tickets order rebuilds by when they started, not by when their query
    /// read the store. Callers rebuild a tab from one thread at a time (the
    /// refresh pass, or dispatch before the tab is registered), so two
    /// rebuilds of the same tab never overlap and the last call always
    /// shows the newest store state. Overlapping callers could have a
    /// fresher result skipped in favour of an older ticket.
    pub fn rebuild(&self, store: &dyn QueryStore) -> RebuildOutcome {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let result = store.search(&self.filter);

        let mut content = self.lock_content();
        if content.closed || ticket <= content.applied_ticket {
            return RebuildOutcome::Skipped;
        }
        content.applied_ticket = ticket;
        content.buffer.clear();
        content.annotations.clear();

        match result {
            Ok(records) => {
                for record in &records {
                    let (line, spans) = render_record(record);
                    let index = content.buffer.push_line(line);
                    content
                        .annotations
                        .extend(spans.into_iter().map(|(span, target)| LinkAnnotation {
                            line: index,
                            span,
                            target,
                        }));
                }
                content.last_error = None;
                RebuildOutcome::Rendered {
                    records: records.len(),
                }
            }
            Err(err) => {
                tracing::warn!(
                    tab_key = %self.key,
                    filter = %self.filter,
                    error = %err,
                    "tab query failed; showing empty content"
                );
                content.last_error = Some(err.clone());
                RebuildOutcome::Degraded(err)
            }
        }
    }

    /// Release the buffer and annotations. Later rebuilds are no-ops.
    pub(crate) fn close(&self) {
        let mut content = self.lock_content();
        content.closed = true;
        content.buffer.clear();
        content.annotations.clear();
        content.last_error = None;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock_content().closed
    }

    #[must_use]
    pub fn snapshot(&self) -> TabView {
        let content = self.lock_content();
        TabView {
            key: self.key,
            filter: self.filter,
            title: self.title.clone(),
            lines: content.buffer.lines().to_vec(),
            annotations: content.annotations.clone(),
            last_error: content.last_error.clone(),
        }
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.lock_content().buffer.text()
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lock_content().buffer.len()
    }

    #[must_use]
    pub fn annotations(&self) -> Vec<LinkAnnotation> {
        self.lock_content().annotations.clone()
    }

    #[must_use]
    pub fn annotation_at(&self, line: usize, column: usize) -> Option<LinkAnnotation> {
        self.lock_content()
            .annotations
            .iter()
            .find(|annotation| annotation.contains(line, column))
            .cloned()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<StoreError> {
        self.lock_content().last_error.clone()
    }

    fn lock_content(&self) -> MutexGuard<'_, TabContent> {
        match self.content.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("filter tab {} lock poisoned", self.key),
        }
    }
}

/// Render one record as `Rack: {n}, Chassis: {m}[, Valve: {v}]: {message}`.
///
/// Returned spans cover exactly the digits of each number and map to
/// `Rack(n)`, `Chassis(n, m)` and `Valve(n, m, v)`.
#[must_use]
pub fn render_record(
    record: &ErrorRecord,
) -> (String, Vec<(std::ops::Range<usize>, FilterDescriptor)>) {
    let mut line = String::with_capacity(32 + record.message.len());
    let mut spans = Vec::with_capacity(3);

    line.push_str("Rack: ");
    push_number(
        &mut line,
        &mut spans,
        record.rack,
        FilterDescriptor::Rack { rack: record.rack },
    );
    line.push_str(", Chassis: ");
    push_number(
        &mut line,
        &mut spans,
        record.chassis,
        FilterDescriptor::Chassis {
            rack: record.rack,
            chassis: record.chassis,
        },
    );
    if let Some(valve) = record.valve {
        line.push_str(", Valve: ");
        push_number(
            &mut line,
            &mut spans,
            valve,
            FilterDescriptor::Valve {
                rack: record.rack,
                chassis: record.chassis,
                valve,
            },
        );
    }
    line.push_str(": ");
    line.push_str(&record.message);
    (line, spans)
}

fn push_number(
    line: &mut String,
    spans: &mut Vec<(std::ops::Range<usize>, FilterDescriptor)>,
    value: u32,
    target: FilterDescriptor,
) {
    let start = line.len();
    line.push_str(&value.to_string());
    spans.push((start..line.len(), target));
}

#[cfg(test)]
mod tests {
    use super::*;
    use mothership_core::models::timestamp_from_unix;
    use mothership_core::{ErrorKind, ErrorReport, MemoryStore};

    fn record(rack: u32, chassis: u32, valve: Option<u32>, message: &str) -> ErrorRecord {
        ErrorRecord {
            id: 1,
            received_at: timestamp_from_unix(0),
            reported_at: None,
            message: message.to_string(),
            rack,
            chassis,
            valve,
            enabled: true,
        }
    }

    #[test]
    fn render_without_valve_has_two_spans() {
        let (line, spans) = render_record(&record(0, 22, None, "Hardware Error: hi"));
        assert_eq!(line, "Rack: 0, Chassis: 22: Hardware Error: hi");
        assert_eq!(spans.len(), 2);
        assert_eq!(&line[spans[0].0.clone()], "0");
        assert_eq!(&line[spans[1].0.clone()], "22");
        assert_eq!(spans[0].1, FilterDescriptor::Rack { rack: 0 });
        assert_eq!(
            spans[1].1,
            FilterDescriptor::Chassis {
                rack: 0,
                chassis: 22
            }
        );
    }

    #[test]
    fn render_with_valve_adds_valve_span() {
        let (line, spans) = render_record(&record(10, 3, Some(117), "boom"));
        assert_eq!(line, "Rack: 10, Chassis: 3, Valve: 117: boom");
        assert_eq!(spans.len(), 3);
        assert_eq!(&line[spans[2].0.clone()], "117");
        assert_eq!(
            spans[2].1,
            FilterDescriptor::Valve {
                rack: 10,
                chassis: 3,
                valve: 117
            }
        );
    }

    #[test]
    fn title_follows_filter() {
        let tab = FilterTab::new(
            TabKey::new(4),
            FilterDescriptor::Chassis {
                rack: 1,
                chassis: 2,
            },
        );
        assert_eq!(tab.title(), "Rack 1, Chassis 2");
        assert_eq!(tab.key().to_string(), "tab-4");
    }

    #[test]
    fn failed_rebuild_clears_content_and_keeps_error() {
        let store = MemoryStore::new();
        let report = ErrorReport::new(1, 1, None, ErrorKind::Hardware, "x");
        if let Err(err) = store.add_error(&report, timestamp_from_unix(1)) {
            panic!("seed: {err}");
        }
        let tab = FilterTab::new(TabKey::new(0), FilterDescriptor::All);
        assert_eq!(tab.rebuild(&store), RebuildOutcome::Rendered { records: 1 });
        assert_eq!(tab.line_count(), 1);

        store.fail_queries(true);
        assert!(matches!(tab.rebuild(&store), RebuildOutcome::Degraded(_)));
        assert_eq!(tab.line_count(), 0);
        assert!(tab.annotations().is_empty());
        assert!(matches!(tab.last_error(), Some(StoreError::Unavailable(_))));

        store.fail_queries(false);
        assert_eq!(tab.rebuild(&store), RebuildOutcome::Rendered { records: 1 });
        assert_eq!(tab.last_error(), None);
    }

    #[test]
    fn back_to_back_rebuilds_show_newest_rows() {
        let store = MemoryStore::new();
        let tab = FilterTab::new(TabKey::new(0), FilterDescriptor::All);
        for n in 1..=3 {
            let report = ErrorReport::new(1, 1, None, ErrorKind::Hardware, "x");
            if let Err(err) = store.add_error(&report, timestamp_from_unix(n)) {
                panic!("seed: {err}");
            }
            assert_eq!(
                tab.rebuild(&store),
                RebuildOutcome::Rendered { records: n as usize }
            );
            assert_eq!(tab.line_count(), n as usize);
        }
    }

    #[test]
    fn closed_tab_ignores_rebuilds() {
        let store = MemoryStore::new();
        let report = ErrorReport::new(1, 1, Some(2), ErrorKind::Software, "x");
        if let Err(err) = store.add_error(&report, timestamp_from_unix(1)) {
            panic!("seed: {err}");
        }
        let tab = FilterTab::new(TabKey::new(0), FilterDescriptor::All);
        let _ = tab.rebuild(&store);
        assert_eq!(tab.annotations().len(), 3);

        tab.close();
        assert!(tab.is_closed());
        assert!(tab.annotations().is_empty());
        assert_eq!(tab.rebuild(&store), RebuildOutcome::Skipped);
        assert_eq!(tab.line_count(), 0);
    }

    #[test]
    fn annotation_at_resolves_click_position() {
        let store = MemoryStore::new();
        let report = ErrorReport::new(1, 2, Some(3), ErrorKind::Hardware, "x");
        if let Err(err) = store.add_error(&report, timestamp_from_unix(1)) {
            panic!("seed: {err}");
        }
        let tab = FilterTab::new(TabKey::new(0), FilterDescriptor::All);
        let _ = tab.rebuild(&store);
        // "Rack: 1, Chassis: 2, Valve: 3: Hardware Error: x"
        let hit = tab.annotation_at(0, 18).map(|annotation| annotation.target);
        assert_eq!(
            hit,
            Some(FilterDescriptor::Chassis {
                rack: 1,
                chassis: 2
            })
        );
        assert_eq!(tab.annotation_at(0, 0), None);
        assert_eq!(tab.annotation_at(1, 6), None);
    }
}
