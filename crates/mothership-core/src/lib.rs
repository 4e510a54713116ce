//! mothership-core: domain types, store contract, configuration and logging
//! for the EDSAC status monitor.
//!
//! Everything the notebook, the SQLite store and the ingestion server agree on
//! lives here: the rack/chassis/valve filter descriptor, error records and
//! reports, the narrow Query Store interface, and the ambient config/logging
//! plumbing shared by the binaries.

pub mod config;
pub mod filter;
pub mod logging;
pub mod models;
pub mod store;
pub mod validation;

pub use filter::FilterDescriptor;
pub use models::{ErrorKind, ErrorRecord, ErrorReport, Node};
pub use store::{ErrorSink, MemoryStore, QueryStore, StoreError};

/// Crate identity label used by bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "mothership-core"
}
