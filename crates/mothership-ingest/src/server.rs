//! TCP listener decoding newline-delimited JSON error reports.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mothership_core::ErrorReport;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::{IngestError, MessageSource};

/// Longest accepted line; longer lines close the connection.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Default)]
struct Counters {
    connections: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub connections: u64,
    pub accepted: u64,
    pub rejected: u64,
}

/// Listener running on its own thread with its own tokio runtime.
pub struct IngestServer {
    local_addr: SocketAddr,
    reports: Mutex<Receiver<ErrorReport>>,
    counters: Arc<Counters>,
    shutdown: Option<watch::Sender<bool>>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for IngestServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestServer")
            .field("local_addr", &self.local_addr)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl IngestServer {
    /// Bind `bind_addr` and start accepting connections.
    pub fn start(bind_addr: &str) -> Result<Self, IngestError> {
        let (report_tx, report_rx) = mpsc::channel::<ErrorReport>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<SocketAddr, IngestError>>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let bind = bind_addr.to_string();
        let thread_counters = Arc::clone(&counters);
        let thread = thread::Builder::new()
            .name("ingest-server".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .thread_name("ingest-worker")
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = ready_tx.send(Err(IngestError::Io(err)));
                        return;
                    }
                };
                runtime.block_on(async move {
                    let listener = match TcpListener::bind(&bind).await {
                        Ok(listener) => listener,
                        Err(source) => {
                            let _ = ready_tx.send(Err(IngestError::Bind { addr: bind, source }));
                            return;
                        }
                    };
                    let local = match listener.local_addr() {
                        Ok(local) => local,
                        Err(err) => {
                            let _ = ready_tx.send(Err(IngestError::Io(err)));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(local));
                    tracing::info!(addr = %local, "ingest server listening");
                    accept_loop(listener, report_tx, shutdown_rx, thread_counters).await;
                });
                tracing::info!("ingest server stopped");
            })?;

        let local_addr = match ready_rx.recv() {
            Ok(Ok(addr)) => addr,
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(IngestError::StartupFailed);
            }
        };

        Ok(Self {
            local_addr,
            reports: Mutex::new(report_rx),
            counters,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn stats(&self) -> IngestStats {
        IngestStats {
            connections: self.counters.connections.load(Ordering::Relaxed),
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting, close open connections and join the server thread.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("ingest server thread panicked");
            }
        }
    }
}

impl Drop for IngestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl MessageSource for IngestServer {
    fn read_next_message(&self, timeout: Duration) -> Option<ErrorReport> {
        let reports = match self.reports.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match reports.recv_timeout(timeout) {
            Ok(report) => Some(report),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                drop(reports);
                // Keep the caller's polling cadence once the server is gone.
                thread::sleep(timeout);
                None
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    reports: Sender<ErrorReport>,
    mut shutdown: watch::Receiver<bool>,
    counters: Arc<Counters>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    counters.connections.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(peer = %peer, "node connected");
                    tokio::spawn(handle_connection(
                        stream,
                        peer,
                        reports.clone(),
                        shutdown.clone(),
                        Arc::clone(&counters),
                    ));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    reports: Sender<ErrorReport>,
    mut shutdown: watch::Receiver<bool>,
    counters: Arc<Counters>,
) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        // One byte past the limit, so an unterminated line is never buffered whole.
        let mut bounded = (&mut reader).take(MAX_LINE_BYTES as u64 + 1);
        let read = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            read = bounded.read_until(b'\n', &mut line) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) if line.len() > MAX_LINE_BYTES && line.last() != Some(&b'\n') => {
                tracing::warn!(peer = %peer, limit = MAX_LINE_BYTES, "line too long; closing connection");
                counters.rejected.fetch_add(1, Ordering::Relaxed);
                break;
            }
            Ok(_) => match decode_bytes(&line) {
                Ok(Some(report)) => {
                    tracing::debug!(
                        peer = %peer,
                        rack = report.rack,
                        chassis = report.chassis,
                        valve = ?report.valve(),
                        "report received"
                    );
                    counters.accepted.fetch_add(1, Ordering::Relaxed);
                    if reports.send(report).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(reason) => {
                    counters.rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(peer = %peer, reason = %reason, "skipping malformed report");
                }
            },
            Err(err) => {
                tracing::warn!(peer = %peer, error = %err, "read failed; closing connection");
                break;
            }
        }
    }
    tracing::debug!(peer = %peer, "node disconnected");
}

fn decode_bytes(line: &[u8]) -> Result<Option<ErrorReport>, String> {
    let text = std::str::from_utf8(line).map_err(|err| format!("decode: {err}"))?;
    decode_line(text)
}

/// Decode one wire line. Blank lines yield `Ok(None)`.
pub fn decode_line(line: &str) -> Result<Option<ErrorReport>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let report: ErrorReport =
        serde_json::from_str(trimmed).map_err(|err| format!("decode: {err}"))?;
    report.validate()?;
    Ok(Some(report))
}
