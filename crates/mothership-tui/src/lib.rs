//! mothership-tui: the EDSAC status monitor frontend and admin CLI.
//!
//! The monitor runs the error notebook in a terminal: a tab strip standing in
//! for the notebook widget, link highlighting with a keyboard cursor, and a
//! status line with the active tab's error count.

pub mod app;
pub mod cli;
pub mod keymap;
pub mod monitor;
pub mod page_strip;
pub mod render;
pub mod runtime;

use std::io;

use mothership_core::config::ConfigError;
use mothership_core::logging::LogError;
use mothership_db::DbError;
use mothership_ingest::IngestError;
use mothership_notebook::NotebookError;
use thiserror::Error;

pub use app::{App, ViewState, WINDOW_TITLE};
pub use keymap::{command_for_key, Command};
pub use page_strip::PageStrip;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("logging: {0}")]
    Logging(#[from] LogError),
    #[error("database: {0}")]
    Database(#[from] DbError),
    #[error("ingest: {0}")]
    Ingest(#[from] IngestError),
    #[error("notebook: {0}")]
    Notebook(#[from] NotebookError),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

/// Crate identity label used by bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "mothership-tui"
}
