//! Poll tick statistics.

#![allow(missing_docs)]

use std::time::{Duration, Instant};

use serde::Serialize;

/// Counters for the poll worker. Durations are in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PollMetrics {
    pub ticks: u64,
    pub failures: u64,
    pub inconsistencies: u64,
    pub updates: u64,
    pub last_tick_ms: f64,
    pub fastest_tick_ms: f64,
    pub slowest_tick_ms: f64,
    total_tick_ms: f64,
}

impl PollMetrics {
    pub fn record_tick(&mut self, started: Instant) {
        self.record_tick_duration(started.elapsed());
    }

    pub fn record_tick_duration(&mut self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.fastest_tick_ms = match self.ticks {
            0 => ms,
            _ => self.fastest_tick_ms.min(ms),
        };
        self.slowest_tick_ms = self.slowest_tick_ms.max(ms);
        self.last_tick_ms = ms;
        self.total_tick_ms += ms;
        self.ticks = self.ticks.saturating_add(1);
    }

    /// Mean tick duration, `0.0` before the first tick.
    pub fn average_tick_ms(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        self.total_tick_ms / self.ticks as f64
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn record_inconsistency(&mut self) {
        self.inconsistencies = self.inconsistencies.saturating_add(1);
    }

    pub fn record_updates(&mut self, count: usize) {
        self.updates = self.updates.saturating_add(count as u64);
    }
}
