//! Fixed-rate background poll worker.

#![allow(missing_docs)]

use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            interval: Duration::from_millis(100),
        }
    }
}

struct PollWorker {
    // Dropping the sender disconnects the worker's receiver and ends the loop.
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns at most one running poll worker.
#[derive(Default)]
pub struct PollScheduler {
    worker: Option<PollWorker>,
}

impl PollScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Starts the worker unless one is already running. `tick` returns
    /// `false` when its owner is gone and the worker should exit.
    ///
    /// Returns `Ok(true)` if a new worker was spawned.
    pub fn start<F>(&mut self, schedule: PollSchedule, tick: F) -> io::Result<bool>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        if self.is_running() {
            return Ok(false);
        }
        let (stop_tx, stop_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("gds-poll".to_string())
            .spawn(move || run_worker(schedule, &stop_rx, tick))?;
        self.worker = Some(PollWorker { stop_tx, handle });
        debug!(
            initial_delay_ms = schedule.initial_delay.as_millis() as u64,
            interval_ms = schedule.interval.as_millis() as u64,
            "poll worker started"
        );
        Ok(true)
    }

    /// Cancels the worker without waiting for it. A tick that is already
    /// running completes; no further tick starts.
    ///
    /// Returns `true` if a worker was cancelled.
    pub fn stop(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return false;
        };
        let _ = worker.stop_tx.try_send(());
        drop(worker.stop_tx);
        debug!("poll worker stopped");
        true
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<F>(schedule: PollSchedule, stop_rx: &Receiver<()>, mut tick: F)
where
    F: FnMut() -> bool,
{
    let mut deadline = Instant::now() + schedule.initial_delay;
    loop {
        let wait = deadline.saturating_duration_since(Instant::now());
        match stop_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if !tick() {
            break;
        }
        deadline += schedule.interval;
        let now = Instant::now();
        if deadline < now {
            // Missed periods are skipped rather than replayed in a burst.
            deadline = now;
        }
    }
}
