//! Node repository: registration of rig nodes in the `nodes` table.

use mothership_core::validation::validate_node_fields;
use mothership_core::Node;
use rusqlite::{params, OptionalExtension};

use crate::{is_unique_constraint_error, Db, DbError};

pub struct NodeRepository<'a> {
    db: &'a Db,
}

impl<'a> NodeRepository<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    /// Register a node. Fails with `NodeAlreadyExists` if the location is taken.
    pub fn add(&self, node: &Node) -> Result<(), DbError> {
        validate_node_fields(&node.mac_address, &node.config_path).map_err(DbError::Validation)?;

        let result = self.db.conn().execute(
            "INSERT INTO nodes (rack_no, chassis_no, mac_address, enabled, config)
            VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                node.rack,
                node.chassis,
                node.mac_address.trim().to_ascii_lowercase(),
                node.enabled,
                node.config_path.trim(),
            ],
        );

        match result {
            Ok(_) => {
                tracing::info!(rack = node.rack, chassis = node.chassis, "node added");
                Ok(())
            }
            Err(err) if is_unique_constraint_error(&err) => Err(DbError::NodeAlreadyExists),
            Err(err) => Err(DbError::Open(err)),
        }
    }

    pub fn remove(&self, rack: u32, chassis: u32) -> Result<(), DbError> {
        let removed = self.db.conn().execute(
            "DELETE FROM nodes WHERE rack_no = ?1 AND chassis_no = ?2",
            params![rack, chassis],
        )?;
        if removed == 0 {
            return Err(DbError::NodeNotFound);
        }
        tracing::info!(rack, chassis, "node removed");
        Ok(())
    }

    pub fn get(&self, rack: u32, chassis: u32) -> Result<Node, DbError> {
        let result = self
            .db
            .conn()
            .query_row(
                "SELECT rack_no, chassis_no, mac_address, enabled, config
                FROM nodes WHERE rack_no = ?1 AND chassis_no = ?2",
                params![rack, chassis],
                scan_node,
            )
            .optional()?;

        result.ok_or(DbError::NodeNotFound)
    }

    pub fn set_enabled(&self, rack: u32, chassis: u32, enabled: bool) -> Result<(), DbError> {
        let updated = self.db.conn().execute(
            "UPDATE nodes SET enabled = ?3 WHERE rack_no = ?1 AND chassis_no = ?2",
            params![rack, chassis, enabled],
        )?;
        if updated == 0 {
            return Err(DbError::NodeNotFound);
        }
        Ok(())
    }

    /// All nodes ordered by location.
    pub fn list(&self) -> Result<Vec<Node>, DbError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT rack_no, chassis_no, mac_address, enabled, config
            FROM nodes
            ORDER BY rack_no, chassis_no",
        )?;

        let rows = stmt.query_map([], scan_node)?;

        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }
}

fn scan_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        rack: row.get(0)?,
        chassis: row.get(1)?,
        mac_address: row.get(2)?,
        enabled: row.get(3)?,
        config_path: row.get(4)?,
    })
}
