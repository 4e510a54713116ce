//! Ingestion pump: read, persist, request a refresh.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use mothership_core::ErrorSink;
use mothership_notebook::{RefreshQueue, RefreshReason};

use crate::MessageSource;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub persisted: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct PumpCounters {
    persisted: AtomicU64,
    failed: AtomicU64,
}

impl PumpCounters {
    fn snapshot(&self) -> PumpStats {
        PumpStats {
            persisted: self.persisted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Background thread moving reports from a source into the store.
///
/// Never touches notebook tabs; it only pushes `RefreshReason::Ingest`.
#[derive(Debug)]
pub struct IngestPump {
    stop: Arc<AtomicBool>,
    counters: Arc<PumpCounters>,
    handle: Option<JoinHandle<()>>,
}

impl IngestPump {
    /// Start pumping. `poll` bounds how long one read blocks, and so how
    /// quickly `stop` takes effect.
    pub fn spawn(
        source: Arc<dyn MessageSource>,
        sink: Arc<dyn ErrorSink>,
        refresh: Arc<RefreshQueue>,
        poll: Duration,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(PumpCounters::default());
        let thread_stop = Arc::clone(&stop);
        let thread_counters = Arc::clone(&counters);

        let handle = thread::Builder::new()
            .name("ingest-pump".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::SeqCst) {
                    let Some(report) = source.read_next_message(poll) else {
                        continue;
                    };
                    match sink.persist(&report, Utc::now()) {
                        Ok(record) => {
                            thread_counters.persisted.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(
                                id = record.id,
                                rack = record.rack,
                                chassis = record.chassis,
                                valve = ?record.valve,
                                "report persisted"
                            );
                            refresh.push(RefreshReason::Ingest);
                        }
                        Err(err) => {
                            thread_counters.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                rack = report.rack,
                                chassis = report.chassis,
                                error = %err,
                                "failed to persist report"
                            );
                        }
                    }
                }
            })?;

        Ok(Self {
            stop,
            counters,
            handle: Some(handle),
        })
    }

    #[must_use]
    pub fn stats(&self) -> PumpStats {
        self.counters.snapshot()
    }

    /// Stop the pump and wait for the in-flight report, if any.
    pub fn stop(mut self) -> PumpStats {
        self.shutdown();
        self.counters.snapshot()
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("ingest pump thread panicked");
            }
        }
    }
}

impl Drop for IngestPump {
    fn drop(&mut self) {
        self.shutdown();
    }
}
