//! Query Store contract consumed by the notebook and the ingestion pump.
//!
//! The notebook only ever needs filtered reads (`QueryStore`); ingestion only
//! ever needs to persist (`ErrorSink`). `MemoryStore` implements both and is
//! the backend for tests and dry runs.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::filter::FilterDescriptor;
use crate::models::{ErrorRecord, ErrorReport, Node};
use crate::validation::validate_node_fields;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("{0}")]
    Validation(String),
    #[error("node already exists")]
    NodeExists,
    #[error("node not found")]
    NodeNotFound,
}

/// Filtered read access to persisted errors.
pub trait QueryStore: Send + Sync {
    /// Matching records ordered by receipt time (ties by insertion order).
    fn search(&self, filter: &FilterDescriptor) -> Result<Vec<ErrorRecord>, StoreError>;

    fn count(&self, filter: &FilterDescriptor) -> Result<u64, StoreError>;

    fn list_racks(&self) -> Result<BTreeSet<u32>, StoreError>;

    fn list_chassis(&self, rack: u32) -> Result<BTreeSet<u32>, StoreError>;
}

/// Persistence of incoming reports.
pub trait ErrorSink: Send + Sync {
    fn persist(
        &self,
        report: &ErrorReport,
        received_at: DateTime<Utc>,
    ) -> Result<ErrorRecord, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    errors: Vec<ErrorRecord>,
    nodes: Vec<Node>,
    failing: bool,
}

/// In-memory store with the same ordering rules as the SQLite store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent query fail with `StoreError::Unavailable` until reset.
    pub fn fail_queries(&self, failing: bool) {
        self.lock().failing = failing;
    }

    pub fn add_error(
        &self,
        report: &ErrorReport,
        received_at: DateTime<Utc>,
    ) -> Result<ErrorRecord, StoreError> {
        report.validate().map_err(StoreError::Validation)?;
        let mut state = self.lock();
        state.next_id += 1;
        let record = ErrorRecord {
            id: state.next_id,
            received_at,
            reported_at: report.reported_time(),
            message: report.rendered_message(),
            rack: report.rack,
            chassis: report.chassis,
            valve: report.valve(),
            enabled: node_enabled(&state.nodes, report.rack, report.chassis),
        };
        state.errors.push(record.clone());
        Ok(record)
    }

    pub fn remove_all_errors(&self) -> usize {
        let mut state = self.lock();
        let removed = state.errors.len();
        state.errors.clear();
        removed
    }

    pub fn add_node(&self, node: &Node) -> Result<(), StoreError> {
        validate_node_fields(&node.mac_address, &node.config_path)
            .map_err(StoreError::Validation)?;
        let mut state = self.lock();
        if state
            .nodes
            .iter()
            .any(|entry| entry.rack == node.rack && entry.chassis == node.chassis)
        {
            return Err(StoreError::NodeExists);
        }
        state.nodes.push(node.clone());
        Ok(())
    }

    pub fn remove_node(&self, rack: u32, chassis: u32) -> Result<(), StoreError> {
        let mut state = self.lock();
        let Some(index) = state
            .nodes
            .iter()
            .position(|entry| entry.rack == rack && entry.chassis == chassis)
        else {
            return Err(StoreError::NodeNotFound);
        };
        state.nodes.remove(index);
        Ok(())
    }

    pub fn list_nodes(&self) -> Vec<Node> {
        let mut nodes = self.lock().nodes.clone();
        nodes.sort_by_key(|node| (node.rack, node.chassis));
        nodes
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn readable(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let state = self.lock();
        if state.failing {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(state)
    }
}

fn node_enabled(nodes: &[Node], rack: u32, chassis: u32) -> bool {
    nodes
        .iter()
        .find(|node| node.rack == rack && node.chassis == chassis)
        .map_or(true, |node| node.enabled)
}

impl QueryStore for MemoryStore {
    fn search(&self, filter: &FilterDescriptor) -> Result<Vec<ErrorRecord>, StoreError> {
        let state = self.readable()?;
        let mut matched: Vec<ErrorRecord> = state
            .errors
            .iter()
            .filter(|record| filter.matches(record))
            .map(|record| ErrorRecord {
                enabled: node_enabled(&state.nodes, record.rack, record.chassis),
                ..record.clone()
            })
            .collect();
        matched.sort_by_key(|record| (record.received_at, record.id));
        Ok(matched)
    }

    fn count(&self, filter: &FilterDescriptor) -> Result<u64, StoreError> {
        let state = self.readable()?;
        Ok(state
            .errors
            .iter()
            .filter(|record| filter.matches(record))
            .count() as u64)
    }

    fn list_racks(&self) -> Result<BTreeSet<u32>, StoreError> {
        let state = self.readable()?;
        let mut racks: BTreeSet<u32> = state.nodes.iter().map(|node| node.rack).collect();
        racks.extend(state.errors.iter().map(|record| record.rack));
        Ok(racks)
    }

    fn list_chassis(&self, rack: u32) -> Result<BTreeSet<u32>, StoreError> {
        let state = self.readable()?;
        let mut chassis: BTreeSet<u32> = state
            .nodes
            .iter()
            .filter(|node| node.rack == rack)
            .map(|node| node.chassis)
            .collect();
        chassis.extend(
            state
                .errors
                .iter()
                .filter(|record| record.rack == rack)
                .map(|record| record.chassis),
        );
        Ok(chassis)
    }
}

impl ErrorSink for MemoryStore {
    fn persist(
        &self,
        report: &ErrorReport,
        received_at: DateTime<Utc>,
    ) -> Result<ErrorRecord, StoreError> {
        self.add_error(report, received_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{timestamp_from_unix, ErrorKind};

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let reports = [
            (0, 22, None, 10, "hi"),
            (0, 22, Some(2), 11, "Valve 2 exploded"),
            (2, 1, None, 9, "another rack"),
        ];
        for (rack, chassis, valve, at, message) in reports {
            let report = ErrorReport::new(rack, chassis, valve, ErrorKind::Software, message);
            if let Err(err) = store.add_error(&report, timestamp_from_unix(at)) {
                panic!("seed error: {err}");
            }
        }
        store
    }

    #[test]
    fn search_orders_by_receipt_time() {
        let store = seeded();
        let records = match store.search(&FilterDescriptor::All) {
            Ok(records) => records,
            Err(err) => panic!("search: {err}"),
        };
        let messages: Vec<&str> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Software Error: another rack",
                "Software Error: hi",
                "Software Error: Valve 2 exploded",
            ]
        );
    }

    #[test]
    fn node_stamps_do_not_reorder_receipt_order() {
        let store = MemoryStore::new();
        let first = ErrorReport::new(1, 1, None, ErrorKind::Hardware, "received first");
        let mut second = ErrorReport::new(1, 1, None, ErrorKind::Hardware, "received second");
        second.timestamp = Some(5);
        for (report, at) in [(&first, 100), (&second, 200)] {
            if let Err(err) = store.add_error(report, timestamp_from_unix(at)) {
                panic!("add error: {err}");
            }
        }
        let records = match store.search(&FilterDescriptor::All) {
            Ok(records) => records,
            Err(err) => panic!("search: {err}"),
        };
        let order: Vec<(&str, i64, Option<i64>)> = records
            .iter()
            .map(|r| {
                (
                    r.message.as_str(),
                    r.received_at.timestamp(),
                    r.reported_at.map(|at| at.timestamp()),
                )
            })
            .collect();
        assert_eq!(
            order,
            vec![
                ("Hardware Error: received first", 100, None),
                ("Hardware Error: received second", 200, Some(5)),
            ]
        );
    }

    #[test]
    fn count_and_listing_follow_filter() {
        let store = seeded();
        assert_eq!(store.count(&FilterDescriptor::Rack { rack: 0 }), Ok(2));
        assert_eq!(
            store.count(&FilterDescriptor::Valve {
                rack: 0,
                chassis: 22,
                valve: 2
            }),
            Ok(1)
        );
        assert_eq!(store.list_racks(), Ok(BTreeSet::from([0, 2])));
        assert_eq!(store.list_chassis(0), Ok(BTreeSet::from([22])));
    }

    #[test]
    fn failing_store_reports_unavailable() {
        let store = seeded();
        store.fail_queries(true);
        assert!(matches!(
            store.search(&FilterDescriptor::All),
            Err(StoreError::Unavailable(_))
        ));
        store.fail_queries(false);
        assert_eq!(store.count(&FilterDescriptor::All), Ok(3));
    }

    #[test]
    fn nodes_are_unique_per_location_and_drive_enabled_flag() {
        let store = seeded();
        let node = Node {
            rack: 0,
            chassis: 22,
            mac_address: "ff:ff:ff:ff:ff:ff".to_string(),
            enabled: false,
            config_path: "myconfig".to_string(),
        };
        assert_eq!(store.add_node(&node), Ok(()));
        assert_eq!(store.add_node(&node), Err(StoreError::NodeExists));

        let records = match store.search(&FilterDescriptor::Rack { rack: 0 }) {
            Ok(records) => records,
            Err(err) => panic!("search: {err}"),
        };
        assert!(records.iter().all(|record| !record.enabled));

        assert_eq!(store.remove_node(0, 22), Ok(()));
        assert_eq!(store.remove_node(0, 22), Err(StoreError::NodeNotFound));
    }

    #[test]
    fn add_node_rejects_bad_mac() {
        let store = MemoryStore::new();
        let node = Node {
            rack: 1,
            chassis: 1,
            mac_address: "not a mac address".to_string(),
            enabled: true,
            config_path: "myconfig".to_string(),
        };
        assert!(matches!(
            store.add_node(&node),
            Err(StoreError::Validation(_))
        ));
    }
}
