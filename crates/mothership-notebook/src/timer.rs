//! Periodic refresh timer.
//!
//! Ticks are spread by a small random jitter. While the rendering thread has
//! not drained earlier requests the timer stops adding more and backs off.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mothership_core::config::RefreshConfig as RefreshSection;

use crate::refresh_queue::{RefreshQueue, RefreshReason};

const DEFAULT_INTERVAL_MS: u64 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSchedule {
    pub interval_ms: u64,
    pub max_jitter_ms: u64,
    /// Added per consecutive tick that finds the queue undrained.
    pub backoff_step_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            max_jitter_ms: 250,
            backoff_step_ms: 500,
            max_backoff_ms: 2_000,
        }
    }
}

impl RefreshSchedule {
    #[must_use]
    pub fn from_config(section: &RefreshSection) -> Self {
        Self {
            interval_ms: section.interval_ms,
            max_jitter_ms: section.max_jitter_ms,
            max_backoff_ms: section.max_backoff_ms,
            ..Self::default()
        }
        .normalized()
    }

    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut schedule = self.clone();
        if schedule.interval_ms == 0 {
            schedule.interval_ms = DEFAULT_INTERVAL_MS;
        }
        schedule.backoff_step_ms = schedule.backoff_step_ms.min(schedule.max_backoff_ms);
        schedule
    }
}

/// Delay between ticks for one timer thread.
#[derive(Debug)]
struct Cadence {
    schedule: RefreshSchedule,
    rng: u64,
    backoff_ms: u64,
}

impl Cadence {
    fn new(schedule: RefreshSchedule, seed: u64) -> Self {
        Self {
            schedule: schedule.normalized(),
            // xorshift never leaves zero
            rng: seed | 1,
            backoff_ms: 0,
        }
    }

    /// `behind` is whether the previous requests are still undrained.
    fn next_delay(&mut self, behind: bool) -> Duration {
        self.backoff_ms = if behind {
            self.backoff_ms
                .saturating_add(self.schedule.backoff_step_ms)
                .min(self.schedule.max_backoff_ms)
        } else {
            0
        };
        let jitter_ms = self.jitter_ms();
        Duration::from_millis(
            self.schedule
                .interval_ms
                .saturating_add(jitter_ms)
                .saturating_add(self.backoff_ms),
        )
    }

    fn jitter_ms(&mut self) -> u64 {
        if self.schedule.max_jitter_ms == 0 {
            return 0;
        }
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 7;
        self.rng ^= self.rng << 17;
        match self.schedule.max_jitter_ms.checked_add(1) {
            Some(bound) => self.rng % bound,
            None => self.rng,
        }
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos() as u64)
}

/// Background thread pushing `RefreshReason::Timer` into a refresh queue.
#[derive(Debug)]
pub struct RefreshTimer {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<u64>>,
}

impl RefreshTimer {
    pub fn spawn(schedule: RefreshSchedule, queue: Arc<RefreshQueue>) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("refresh-timer".to_string())
            .spawn(move || {
                let mut cadence = Cadence::new(schedule, clock_seed());
                let mut ticks = 0u64;
                let mut skipped = 0u64;
                loop {
                    let delay = cadence.next_delay(queue.pending() > 0);
                    match stop_rx.recv_timeout(delay) {
                        Err(RecvTimeoutError::Timeout) if queue.pending() > 0 => {
                            skipped += 1;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            queue.push(RefreshReason::Timer);
                            ticks += 1;
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!(ticks, skipped, "refresh timer stopped");
                ticks
            })?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the timer and return how many refreshes it requested.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(interval_ms: u64, step: u64, cap: u64) -> RefreshSchedule {
        RefreshSchedule {
            interval_ms,
            max_jitter_ms: 0,
            backoff_step_ms: step,
            max_backoff_ms: cap,
        }
    }

    #[test]
    fn backoff_grows_while_behind_and_resets_after_drain() {
        let mut cadence = Cadence::new(fixed(2_000, 500, 1_200), 7);
        assert_eq!(cadence.next_delay(false).as_millis(), 2_000);
        assert_eq!(cadence.next_delay(true).as_millis(), 2_500);
        assert_eq!(cadence.next_delay(true).as_millis(), 3_000);
        assert_eq!(cadence.next_delay(true).as_millis(), 3_200);
        assert_eq!(cadence.next_delay(false).as_millis(), 2_000);
    }

    #[test]
    fn jitter_stays_within_bound() {
        let schedule = RefreshSchedule {
            max_jitter_ms: 300,
            ..fixed(1_000, 0, 0)
        };
        let mut cadence = Cadence::new(schedule, 42);
        for _ in 0..256 {
            let delay = cadence.next_delay(false).as_millis();
            assert!((1_000..=1_300).contains(&delay), "delay {delay}");
        }
    }

    #[test]
    fn unbounded_jitter_does_not_overflow() {
        let schedule = RefreshSchedule {
            max_jitter_ms: u64::MAX,
            ..fixed(1, 0, 0)
        };
        let mut cadence = Cadence::new(schedule, 0);
        let _ = cadence.next_delay(false);
    }

    #[test]
    fn schedule_from_config_normalizes_zero_interval() {
        let section = RefreshSection {
            interval_ms: 0,
            max_jitter_ms: 10,
            max_backoff_ms: 300,
            parallel: false,
        };
        let schedule = RefreshSchedule::from_config(&section);
        assert_eq!(schedule.interval_ms, 2_000);
        assert_eq!(schedule.max_jitter_ms, 10);
        assert_eq!(schedule.max_backoff_ms, 300);
        assert_eq!(schedule.backoff_step_ms, 300);
    }

    #[test]
    fn timer_pushes_ticks_until_stopped() {
        let queue = Arc::new(RefreshQueue::new());
        let timer = match RefreshTimer::spawn(fixed(5, 1, 1), Arc::clone(&queue)) {
            Ok(timer) => timer,
            Err(err) => panic!("spawn timer: {err}"),
        };
        let batch = queue.wait(Duration::from_secs(5));
        let ticks = timer.stop();
        assert_eq!(batch.map(|batch| batch.reason), Some(RefreshReason::Timer));
        assert!(ticks >= 1);
    }

    #[test]
    fn timer_does_not_pile_up_while_undrained() {
        let queue = Arc::new(RefreshQueue::new());
        let timer = match RefreshTimer::spawn(fixed(2, 1, 5), Arc::clone(&queue)) {
            Ok(timer) => timer,
            Err(err) => panic!("spawn timer: {err}"),
        };
        thread::sleep(Duration::from_millis(100));
        let _ = timer.stop();
        assert_eq!(queue.pending(), 1);
    }
}
