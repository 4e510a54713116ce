//! Error repository: persisted error reports in the `errors` table.
//!
//! Reads join `nodes` so each record carries its node's enabled flag; errors
//! from unregistered locations read as enabled.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use mothership_core::models::{
    render_message, reported_time_from_unix, timestamp_from_unix, valve_from_sentinel,
    valve_to_sentinel,
};
use mothership_core::{ErrorKind, ErrorRecord, ErrorReport, FilterDescriptor};
use rusqlite::{params, params_from_iter, OptionalExtension};

use crate::{Db, DbError};

const SELECT_ERRORS: &str = "SELECT e.id, e.received_at, e.kind, e.message, e.rack_no, e.chassis_no, e.valve_no,
        COALESCE(n.enabled, 1), e.reported_at
    FROM errors e
    LEFT JOIN nodes n ON n.rack_no = e.rack_no AND n.chassis_no = e.chassis_no";

pub struct ErrorRepository<'a> {
    db: &'a Db,
}

impl<'a> ErrorRepository<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    /// Persist a report received at `received_at`. A node stamp is kept
    /// alongside and never affects ordering.
    pub fn add(
        &self,
        report: &ErrorReport,
        received_at: DateTime<Utc>,
    ) -> Result<ErrorRecord, DbError> {
        report.validate().map_err(DbError::Validation)?;

        self.db.conn().execute(
            "INSERT INTO errors (rack_no, chassis_no, valve_no, received_at, reported_at, kind, message)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                report.rack,
                report.chassis,
                valve_to_sentinel(report.valve()),
                received_at.timestamp(),
                report.reported_time().map(|at| at.timestamp()),
                report.kind.as_str(),
                report.message.trim(),
            ],
        )?;
        let id = self.db.conn().last_insert_rowid();
        tracing::debug!(
            id,
            rack = report.rack,
            chassis = report.chassis,
            valve = ?report.valve(),
            "error persisted"
        );
        self.get(id)
    }

    pub fn get(&self, id: i64) -> Result<ErrorRecord, DbError> {
        let sql = format!("{SELECT_ERRORS} WHERE e.id = ?1");
        let result = self
            .db
            .conn()
            .query_row(&sql, params![id], scan_error)
            .optional()?;
        result.ok_or_else(|| DbError::Validation(format!("error {id} not found")))
    }

    /// Records matching `filter`, ordered by receipt time then insertion order.
    pub fn search(&self, filter: &FilterDescriptor) -> Result<Vec<ErrorRecord>, DbError> {
        let (clause, args) = filter_clause(filter);
        let sql = format!("{SELECT_ERRORS}{clause} ORDER BY e.received_at, e.id");
        let mut stmt = self.db.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), scan_error)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn count(&self, filter: &FilterDescriptor) -> Result<u64, DbError> {
        let (clause, args) = filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM errors e{clause}");
        let count: i64 = self
            .db
            .conn()
            .query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Delete every stored error. Returns the number removed.
    pub fn remove_all(&self) -> Result<usize, DbError> {
        let removed = self.db.conn().execute("DELETE FROM errors", [])?;
        tracing::info!(removed, "errors cleared");
        Ok(removed)
    }

    /// Racks known from either node registrations or stored errors.
    pub fn list_racks(&self) -> Result<BTreeSet<u32>, DbError> {
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT rack_no FROM nodes UNION SELECT rack_no FROM errors")?;
        let rows = stmt.query_map([], |row| row.get::<_, u32>(0))?;
        let mut racks = BTreeSet::new();
        for row in rows {
            racks.insert(row?);
        }
        Ok(racks)
    }

    pub fn list_chassis(&self, rack: u32) -> Result<BTreeSet<u32>, DbError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT chassis_no FROM nodes WHERE rack_no = ?1
            UNION SELECT chassis_no FROM errors WHERE rack_no = ?1",
        )?;
        let rows = stmt.query_map(params![rack], |row| row.get::<_, u32>(0))?;
        let mut chassis = BTreeSet::new();
        for row in rows {
            chassis.insert(row?);
        }
        Ok(chassis)
    }
}

fn filter_clause(filter: &FilterDescriptor) -> (String, Vec<i64>) {
    match *filter {
        FilterDescriptor::All => (String::new(), Vec::new()),
        FilterDescriptor::Rack { rack } => {
            (" WHERE e.rack_no = ?1".to_string(), vec![i64::from(rack)])
        }
        FilterDescriptor::Chassis { rack, chassis } => (
            " WHERE e.rack_no = ?1 AND e.chassis_no = ?2".to_string(),
            vec![i64::from(rack), i64::from(chassis)],
        ),
        FilterDescriptor::Valve {
            rack,
            chassis,
            valve,
        } => (
            " WHERE e.rack_no = ?1 AND e.chassis_no = ?2 AND e.valve_no = ?3".to_string(),
            vec![i64::from(rack), i64::from(chassis), i64::from(valve)],
        ),
    }
}

fn scan_error(row: &rusqlite::Row<'_>) -> rusqlite::Result<ErrorRecord> {
    let kind: String = row.get(2)?;
    let text: String = row.get(3)?;
    let valve: i64 = row.get(6)?;
    Ok(ErrorRecord {
        id: row.get(0)?,
        received_at: timestamp_from_unix(row.get(1)?),
        reported_at: row
            .get::<_, Option<i64>>(8)?
            .and_then(reported_time_from_unix),
        message: render_message(ErrorKind::parse(&kind).unwrap_or_default(), &text),
        rack: row.get(4)?,
        chassis: row.get(5)?,
        valve: valve_from_sentinel(valve),
        enabled: row.get(7)?,
    })
}
