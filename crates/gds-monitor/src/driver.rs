//! Subscription handle driver.
//!
//! The controller allows exactly one variable set per subscription handle and
//! refuses to change that set while the handle is subscribed. Every
//! membership change is therefore wrapped in unsubscribe, mutate, resubscribe,
//! except the first variable of an empty registry which goes straight from
//! add to subscribe. A resubscribe may be dropped silently by the device, so
//! its status is never treated as proof of liveness; the next poll is.
//!
//! All state transitions and poll ticks serialize on one lock. Sink and
//! reporter callbacks run after that lock is released so they may call back
//! into the manager.

#![allow(missing_docs)]

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::merge::merge_results;
use crate::metrics::PollMetrics;
use crate::parsing::{IecValueParser, ValueParser};
use crate::poll::PollScheduler;
use crate::registry::{MonitoredVariable, Refresh, Registry};
use crate::remote::{ReadItem, RemoteResult, RemoteService, RemoteStatus, SubscriptionId};
use crate::sink::{LogReporter, Reporter, UpdateSink};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Unallocated,
    Allocated(SubscriptionId),
    Active(SubscriptionId),
}

/// Controller run state changes forwarded by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerEvent {
    Started,
    Stopped,
}

struct DriverState {
    handle: Option<SubscriptionId>,
    registry: Registry,
    poller: PollScheduler,
    metrics: PollMetrics,
}

struct Shared {
    remote: Arc<dyn RemoteService>,
    sink: Arc<dyn UpdateSink>,
    reporter: Arc<dyn Reporter>,
    parser: Box<dyn ValueParser>,
    config: MonitorConfig,
    state: Mutex<DriverState>,
}

/// Manages the single subscription handle of one controller session.
pub struct SubscriptionManager {
    shared: Arc<Shared>,
}

pub struct ManagerBuilder {
    remote: Arc<dyn RemoteService>,
    sink: Arc<dyn UpdateSink>,
    reporter: Arc<dyn Reporter>,
    parser: Box<dyn ValueParser>,
    config: MonitorConfig,
}

impl ManagerBuilder {
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn parser(mut self, parser: Box<dyn ValueParser>) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the manager and allocates its subscription handle.
    pub fn build(self) -> SubscriptionManager {
        let manager = SubscriptionManager {
            shared: Arc::new(Shared {
                remote: self.remote,
                sink: self.sink,
                reporter: self.reporter,
                parser: self.parser,
                config: self.config,
                state: Mutex::new(DriverState {
                    handle: None,
                    registry: Registry::new(),
                    poller: PollScheduler::new(),
                    metrics: PollMetrics::default(),
                }),
            }),
        };
        manager.initialize();
        manager
    }
}

impl SubscriptionManager {
    pub fn builder(remote: Arc<dyn RemoteService>, sink: Arc<dyn UpdateSink>) -> ManagerBuilder {
        ManagerBuilder {
            remote,
            sink,
            reporter: Arc::new(LogReporter),
            parser: Box::new(IecValueParser),
            config: MonitorConfig::default(),
        }
    }

    /// Replaces any existing handle with a fresh one. A stale handle is
    /// deleted best-effort since the device may already have dropped it.
    pub fn initialize(&self) {
        let outcome = {
            let mut state = self.shared.state.lock();
            self.shared.initialize_locked(&mut state)
        };
        if let Err(err) = outcome {
            warn!(error = %err, "subscription handle allocation failed");
            self.shared.reporter.error(&err.to_string());
        }
    }

    pub fn subscribe_to(&self, uri: &str) -> Result<(), MonitorError> {
        let outcome = {
            let mut state = self.shared.state.lock();
            self.shared.add_variable(&mut state, uri)
        };
        let outcome = outcome.map(|polling| {
            if let Err(err) = polling {
                warn!(error = %err, "poll worker not running");
                self.shared.reporter.error(&err.to_string());
            }
        });
        self.shared
            .finish(outcome, || format!("subscribed to '{uri}'"))
    }

    pub fn unsubscribe_from(&self, uri: &str) -> Result<(), MonitorError> {
        let outcome = {
            let mut state = self.shared.state.lock();
            self.shared.remove_variable(&mut state, uri)
        };
        self.shared
            .finish(outcome, || format!("unsubscribed from '{uri}'"))
    }

    pub fn write(&self, uri: &str, text: &str) -> Result<(), MonitorError> {
        let outcome = {
            let state = self.shared.state.lock();
            self.shared.write_variable(&state, uri, text)
        };
        self.shared
            .finish(outcome, || format!("wrote '{text}' to '{uri}'"))
    }

    /// Stops polling, releases the handle best-effort and forgets every
    /// variable. Safe to call repeatedly.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        self.shared.teardown_locked(&mut state);
    }

    pub fn handle_controller_event(&self, event: ControllerEvent) {
        debug!(?event, "controller event");
        match event {
            ControllerEvent::Started => self.initialize(),
            ControllerEvent::Stopped => self.shutdown(),
        }
    }

    pub fn handle_state(&self) -> HandleState {
        let state = self.shared.state.lock();
        match state.handle {
            None => HandleState::Unallocated,
            Some(id) if state.registry.is_empty() => HandleState::Allocated(id),
            Some(id) => HandleState::Active(id),
        }
    }

    /// Monitored variables in subscription order.
    pub fn variables(&self) -> Vec<MonitoredVariable> {
        self.shared.state.lock().registry.snapshot()
    }

    pub fn variable(&self, uri: &str) -> Option<MonitoredVariable> {
        self.shared.state.lock().registry.get(uri).cloned()
    }

    pub fn is_polling(&self) -> bool {
        self.shared.state.lock().poller.is_running()
    }

    pub fn poll_metrics(&self) -> PollMetrics {
        self.shared.state.lock().metrics
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    /// Runs one poll tick on the calling thread.
    pub fn poll_now(&self) {
        self.shared.poll_tick_guarded();
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn finish(
        &self,
        outcome: Result<(), MonitorError>,
        success: impl FnOnce() -> String,
    ) -> Result<(), MonitorError> {
        match &outcome {
            Ok(()) => {
                let message = success();
                info!("{message}");
                self.reporter.message(&message);
            }
            Err(err) => {
                warn!(error = %err, "request failed");
                self.reporter.error(&err.to_string());
            }
        }
        outcome
    }

    fn initialize_locked(&self, state: &mut DriverState) -> Result<(), MonitorError> {
        state.poller.stop();
        state.registry.clear();
        if let Some(stale) = state.handle.take() {
            best_effort("delete stale subscription", stale, || {
                self.remote.delete_subscription(stale)
            });
        }
        let id = self
            .remote
            .create_subscription(self.config.kind)
            .map_err(|fault| MonitorError::transport("creating subscription", fault))?;
        state.handle = Some(id);
        info!(handle = %id, kind = self.config.kind.as_str(), "subscription handle allocated");
        Ok(())
    }

    /// Adds `uri` to the handle and the registry. The inner result is the
    /// poll worker start, reported by the caller once the lock is released.
    fn add_variable(
        self: &Arc<Self>,
        state: &mut DriverState,
        uri: &str,
    ) -> Result<Result<(), MonitorError>, MonitorError> {
        if state.registry.contains(uri) {
            return Err(MonitorError::AlreadySubscribed(SmolStr::new(uri)));
        }
        let id = state.handle.ok_or(MonitorError::NoHandle)?;
        let remote = self.remote.as_ref();
        let interval = self.config.publish_interval_us;
        let context = format!("subscribing to '{uri}'");
        let unsubscribed = Cell::new(false);
        let merged = if state.registry.is_empty() {
            merge_results(&[
                &|| remote.add_variable(id, uri),
                &|| remote.subscribe(id, interval),
            ])
        } else {
            merge_results(&[
                &|| {
                    unsubscribed.set(true);
                    remote.unsubscribe(id)
                },
                &|| remote.add_variable(id, uri),
                &|| remote.resubscribe(id, interval),
            ])
        };
        // The registry is non-empty whenever the unsubscribe step ran.
        if unsubscribed.get() && !matches!(merged, Ok(RemoteStatus::Success)) {
            self.resume(id);
        }
        match merged.map_err(|fault| MonitorError::transport(context.as_str(), fault))? {
            RemoteStatus::Success => {}
            RemoteStatus::NotFound => return Err(MonitorError::RemoteNotFound(SmolStr::new(uri))),
            status => return Err(MonitorError::remote(context, status)),
        }

        let read_context = format!("initial read of '{uri}'");
        let item = remote
            .read_single(uri)
            .map_err(|fault| MonitorError::transport(read_context.as_str(), fault))?;
        let value = match item {
            ReadItem {
                status: RemoteStatus::Success,
                value: Some(value),
            } => value,
            ReadItem {
                status: RemoteStatus::Success,
                value: None,
            } => return Err(MonitorError::EmptyRead(SmolStr::new(uri))),
            ReadItem { status, .. } => return Err(MonitorError::remote(read_context, status)),
        };
        debug!(uri, handle = %id, value = %value, "variable added");
        state.registry.insert(MonitoredVariable::new(uri, value))?;
        Ok(self.ensure_polling(state))
    }

    fn ensure_polling(self: &Arc<Self>, state: &mut DriverState) -> Result<(), MonitorError> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let started = state.poller.start(self.config.poll, move || {
            let Some(shared) = weak.upgrade() else {
                return false;
            };
            shared.poll_tick_guarded();
            true
        });
        started.map(|_| ()).map_err(MonitorError::PollStart)
    }

    /// Puts the handle back into the subscribed state after a membership
    /// change stopped between its unsubscribe and resubscribe steps.
    fn resume(&self, id: SubscriptionId) {
        let interval = self.config.publish_interval_us;
        best_effort("resubscribe after interrupted change", id, || {
            self.remote.resubscribe(id, interval)
        });
    }

    fn remove_variable(&self, state: &mut DriverState, uri: &str) -> Result<(), MonitorError> {
        if !state.registry.contains(uri) {
            return Err(MonitorError::NotSubscribed(SmolStr::new(uri)));
        }
        let id = state.handle.ok_or(MonitorError::NoHandle)?;
        let remote = self.remote.as_ref();
        let interval = self.config.publish_interval_us;
        let context = format!("unsubscribing from '{uri}'");
        let unsubscribed = Cell::new(false);
        let merged = merge_results(&[
            &|| {
                unsubscribed.set(true);
                remote.unsubscribe(id)
            },
            &|| remote.remove_variable(id, uri),
            &|| remote.resubscribe(id, interval),
        ]);
        let completed = matches!(merged, Ok(RemoteStatus::Success));
        let accepted = match merged {
            // NotFound: the device already forgot the variable.
            Ok(RemoteStatus::Success | RemoteStatus::NotFound) => Ok(()),
            Ok(status) => Err(MonitorError::remote(context, status)),
            Err(fault) => Err(MonitorError::transport(context, fault)),
        };
        if accepted.is_ok() {
            state.registry.remove(uri);
            debug!(uri, handle = %id, remaining = state.registry.len(), "variable removed");
        }
        if unsubscribed.get() && !completed && !state.registry.is_empty() {
            self.resume(id);
        }
        accepted?;
        if state.registry.is_empty() {
            state.poller.stop();
        }
        Ok(())
    }

    fn write_variable(
        &self,
        state: &DriverState,
        uri: &str,
        text: &str,
    ) -> Result<(), MonitorError> {
        let Some(variable) = state.registry.get(uri) else {
            return Err(MonitorError::NotSubscribed(SmolStr::new(uri)));
        };
        let value = self
            .parser
            .parse(&variable.type_tag, text)
            .ok_or_else(|| MonitorError::ParseFailure {
                uri: SmolStr::new(uri),
                type_tag: variable.type_tag.clone(),
                text: SmolStr::new(text),
            })?;
        let context = format!("writing to '{uri}'");
        match self.remote.write_single(uri, &value) {
            Ok(RemoteStatus::Success) => Ok(()),
            Ok(status) => Err(MonitorError::remote(context, status)),
            Err(fault) => Err(MonitorError::transport(context, fault)),
        }
    }

    fn teardown_locked(&self, state: &mut DriverState) {
        state.poller.stop();
        if let Some(id) = state.handle.take() {
            best_effort("unsubscribe", id, || self.remote.unsubscribe(id));
            best_effort("delete subscription", id, || {
                self.remote.delete_subscription(id)
            });
            info!(handle = %id, "subscription handle released");
        }
        state.registry.clear();
    }

    fn poll_tick_guarded(&self) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.poll_tick()));
        if outcome.is_err() {
            warn!("poll tick panicked");
            self.state.lock().metrics.record_failure();
            self.reporter.error("poll tick aborted unexpectedly");
        }
    }

    fn poll_tick(&self) {
        let started = Instant::now();
        let mut updates: Vec<(SmolStr, Value)> = Vec::new();
        let mut problems: Vec<MonitorError> = Vec::new();
        {
            let mut state = self.state.lock();
            let Some(id) = state.handle else {
                return;
            };
            if state.registry.is_empty() {
                return;
            }
            let remote = self.remote.as_ref();
            let infos = RefCell::new(Vec::new());
            let values = RefCell::new(Vec::new());
            let merged = merge_results(&[
                &|| -> RemoteResult<RemoteStatus> {
                    let (status, list) = remote.get_variable_infos(id)?;
                    *infos.borrow_mut() = list;
                    Ok(status)
                },
                &|| -> RemoteResult<RemoteStatus> {
                    let (status, list) = remote.read_values(id)?;
                    *values.borrow_mut() = list;
                    Ok(status)
                },
            ]);
            match merged {
                Ok(RemoteStatus::Success) => {
                    let infos = infos.into_inner();
                    let values = values.into_inner();
                    for (info, value) in infos.into_iter().zip(values) {
                        match state.registry.refresh(&info.name, value.clone()) {
                            Refresh::Changed => updates.push((info.name, value)),
                            Refresh::Unchanged => {}
                            Refresh::Untracked => {
                                state.metrics.record_inconsistency();
                                problems.push(MonitorError::Inconsistency(info.name));
                            }
                        }
                    }
                }
                Ok(status) => {
                    state.metrics.record_failure();
                    problems.push(MonitorError::remote("polling subscription values", status));
                }
                Err(fault) => {
                    state.metrics.record_failure();
                    problems.push(MonitorError::transport("polling subscription values", fault));
                }
            }
            state.metrics.record_updates(updates.len());
            state.metrics.record_tick(started);
        }

        for problem in problems {
            warn!(error = %problem, "poll tick");
            self.reporter.error(&problem.to_string());
        }
        for (uri, value) in updates {
            // Skip variables removed while this tick was publishing.
            let tracked = self.state.lock().registry.contains(&uri);
            if tracked {
                self.sink.on_variable_updated(&uri, &value);
            }
        }
    }
}

/// Runs a cleanup call whose failure is not actionable and discards the result.
fn best_effort(
    operation: &str,
    id: SubscriptionId,
    call: impl FnOnce() -> RemoteResult<RemoteStatus>,
) {
    match call() {
        Ok(RemoteStatus::Success) => {}
        Ok(status) => debug!(operation, handle = %id, %status, "best-effort call ignored status"),
        Err(fault) => debug!(operation, handle = %id, error = %fault, "best-effort call ignored fault"),
    }
}
