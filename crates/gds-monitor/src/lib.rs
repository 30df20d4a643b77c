//! Client-side subscription manager for PLC global data space variables.
//!
//! A [`SubscriptionManager`] owns the single remote subscription handle of a
//! session, keeps an ordered registry of monitored variables, refreshes them
//! with a batched poll on a background worker and hands every change to an
//! [`UpdateSink`].

pub mod config;
pub mod driver;
pub mod error;
pub mod merge;
pub mod metrics;
pub mod parsing;
pub mod poll;
pub mod registry;
pub mod remote;
pub mod simulation;
pub mod sink;
pub mod value;

pub use config::MonitorConfig;
pub use driver::{ControllerEvent, HandleState, SubscriptionManager};
pub use error::MonitorError;
pub use remote::{RemoteFault, RemoteService, RemoteStatus, SubscriptionId, SubscriptionKind};
pub use sink::{Reporter, UpdateSink};
pub use value::{TypeTag, Value};
