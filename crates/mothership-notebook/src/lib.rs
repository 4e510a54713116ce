//! mothership-notebook: the tabbed error notebook.
//!
//! Each tab is a live view of the error store under one filter (all errors,
//! one rack, one chassis or one valve). Rendered lines carry link annotations
//! over their rack/chassis/valve numbers; following one focuses the tab for
//! that narrower filter, creating it on first use. Background threads request
//! refreshes through a coalescing queue and the rendering thread applies them.

pub mod buffer;
pub mod notebook;
pub mod page_host;
pub mod refresh;
pub mod refresh_queue;
pub mod registry;
pub mod tab;
pub mod timer;

pub use buffer::{LinkAnnotation, TextBuffer};
pub use notebook::{CloseOutcome, DispatchOutcome, Notebook, NotebookError};
pub use page_host::{HeadlessHost, HostEvent, PageHost};
pub use refresh::{RefreshConfig, RefreshSummary};
pub use refresh_queue::{RefreshBatch, RefreshQueue, RefreshReason};
pub use registry::{RegistryError, TabRegistry};
pub use tab::{FilterTab, RebuildOutcome, TabKey, TabView};
pub use timer::{RefreshSchedule, RefreshTimer};

/// Crate identity label used by bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "mothership-notebook"
}
