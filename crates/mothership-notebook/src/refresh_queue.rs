//! Coalescing refresh requests handed from background threads to the
//! rendering thread.
//!
//! Background work never touches tab buffers. It pushes a request here and
//! the rendering thread drains the queue; any backlog collapses into a single
//! refresh.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshReason {
    Timer,
    Ingest,
    Manual,
}

impl RefreshReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Ingest => "ingest",
            Self::Manual => "manual",
        }
    }
}

/// One refresh to perform, standing in for `requests` queued requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshBatch {
    pub reason: RefreshReason,
    pub requests: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshQueueStats {
    pub pushed: u64,
    pub batches: u64,
    pub coalesced: u64,
}

/// The newest undrained reason and how many requests it stands for.
#[derive(Debug, Default)]
struct QueueState {
    latest: Option<RefreshReason>,
    requests: usize,
    pushed: u64,
    batches: u64,
    coalesced: u64,
}

/// Thread-safe coalescing refresh queue.
#[derive(Debug)]
pub struct RefreshQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl Default for RefreshQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
        }
    }

    pub fn push(&self, reason: RefreshReason) {
        {
            let mut state = self.lock();
            state.pushed = state.pushed.saturating_add(1);
            state.latest = Some(reason);
            state.requests = state.requests.saturating_add(1);
        }
        self.ready.notify_all();
        tracing::trace!(reason = reason.as_str(), "refresh requested");
    }

    /// Collapse everything queued so far into one batch.
    pub fn drain_latest(&self) -> Option<RefreshBatch> {
        let mut state = self.lock();
        Self::take_batch(&mut state)
    }

    /// Block until a request arrives or `timeout` passes, then drain.
    pub fn wait(&self, timeout: Duration) -> Option<RefreshBatch> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.latest.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = match self.ready.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        Self::take_batch(&mut state)
    }

    /// Requests waiting for the next drain.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().requests
    }

    #[must_use]
    pub fn stats(&self) -> RefreshQueueStats {
        let state = self.lock();
        RefreshQueueStats {
            pushed: state.pushed,
            batches: state.batches,
            coalesced: state.coalesced,
        }
    }

    fn take_batch(state: &mut QueueState) -> Option<RefreshBatch> {
        let reason = state.latest.take()?;
        let requests = std::mem::take(&mut state.requests);
        state.batches = state.batches.saturating_add(1);
        state.coalesced = state
            .coalesced
            .saturating_add(requests.saturating_sub(1) as u64);
        Some(RefreshBatch { reason, requests })
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn backlog_collapses_into_one_batch() {
        let queue = RefreshQueue::new();
        queue.push(RefreshReason::Timer);
        queue.push(RefreshReason::Ingest);
        queue.push(RefreshReason::Ingest);

        assert_eq!(
            queue.drain_latest(),
            Some(RefreshBatch {
                reason: RefreshReason::Ingest,
                requests: 3
            })
        );
        assert_eq!(queue.drain_latest(), None);

        let stats = queue.stats();
        assert_eq!(stats.pushed, 3);
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.coalesced, 2);
    }

    #[test]
    fn any_backlog_size_is_one_refresh() {
        let queue = RefreshQueue::new();
        for _ in 0..1_000 {
            queue.push(RefreshReason::Ingest);
        }
        queue.push(RefreshReason::Manual);
        assert_eq!(queue.pending(), 1_001);
        assert_eq!(
            queue.drain_latest(),
            Some(RefreshBatch {
                reason: RefreshReason::Manual,
                requests: 1_001
            })
        );
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.stats().coalesced, 1_000);
    }

    #[test]
    fn wait_times_out_when_idle() {
        let queue = RefreshQueue::new();
        assert_eq!(queue.wait(Duration::from_millis(10)), None);
    }

    #[test]
    fn wait_wakes_on_push_from_another_thread() {
        let queue = Arc::new(RefreshQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.push(RefreshReason::Manual);
            })
        };
        let batch = queue.wait(Duration::from_secs(5));
        if producer.join().is_err() {
            panic!("producer panicked");
        }
        assert_eq!(batch.map(|batch| batch.reason), Some(RefreshReason::Manual));
    }
}
