//! Consumer-facing callbacks.
//!
//! The manager never assumes its consumer is safe to call from the poll
//! worker. [`ChannelSink`] moves every notification onto a queue so that a
//! single consumer context (a UI loop, a CLI printer) can drain it.

#![allow(missing_docs)]

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use smol_str::SmolStr;
use tracing::{info, warn};

use crate::value::Value;

/// Receives value changes of monitored variables.
pub trait UpdateSink: Send + Sync {
    fn on_variable_updated(&self, uri: &str, value: &Value);
}

/// Receives one-line human readable status and error messages.
pub trait Reporter: Send + Sync {
    fn message(&self, text: &str);
    fn error(&self, text: &str);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitorEvent {
    Updated { uri: SmolStr, value: Value },
    Message { text: SmolStr },
    Error { text: SmolStr },
}

/// Queue-backed sink and reporter.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<MonitorEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<MonitorEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: MonitorEvent) {
        // The consumer may already be gone during shutdown.
        let _ = self.tx.send(event);
    }
}

/// Creates a sink together with the receiving end its consumer drains.
pub fn monitor_channel() -> (ChannelSink, Receiver<MonitorEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ChannelSink::new(tx), rx)
}

impl UpdateSink for ChannelSink {
    fn on_variable_updated(&self, uri: &str, value: &Value) {
        self.send(MonitorEvent::Updated {
            uri: SmolStr::new(uri),
            value: value.clone(),
        });
    }
}

impl Reporter for ChannelSink {
    fn message(&self, text: &str) {
        self.send(MonitorEvent::Message {
            text: SmolStr::new(text),
        });
    }

    fn error(&self, text: &str) {
        self.send(MonitorEvent::Error {
            text: SmolStr::new(text),
        });
    }
}

/// Reporter that only writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn message(&self, text: &str) {
        info!("{text}");
    }

    fn error(&self, text: &str) {
        warn!("{text}");
    }
}
