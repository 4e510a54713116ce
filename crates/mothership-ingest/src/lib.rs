//! mothership-ingest: receives error reports from rig nodes.
//!
//! Nodes connect over TCP and write one JSON `ErrorReport` per line. The
//! server decodes them off the rendering thread; the pump persists each one
//! and asks the notebook for a refresh.

pub mod client;
pub mod pump;
pub mod server;

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use mothership_core::ErrorReport;
use thiserror::Error;

pub use client::{send_report, send_report_blocking};
pub use pump::{IngestPump, PumpStats};
pub use server::{IngestServer, IngestStats};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connect {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("resolve {0}: no usable address")]
    Resolve(String),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("encode report: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid report: {0}")]
    InvalidReport(String),
    #[error("{0} timed out")]
    Timeout(String),
    #[error("ingest server thread exited before reporting its address")]
    StartupFailed,
}

/// Blocking-with-timeout source of incoming reports.
pub trait MessageSource: Send + Sync {
    /// Next report, or `None` if none arrived within `timeout`.
    fn read_next_message(&self, timeout: Duration) -> Option<ErrorReport>;
}

/// Crate identity label used by bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "mothership-ingest"
}
