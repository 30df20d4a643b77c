//! Remote subscription and data access service interface.
//!
//! The session that reaches the controller is owned by the embedding
//! application. The manager only needs the calls below; every call may fail
//! with a [`RemoteStatus`] reported by the device or with a [`RemoteFault`]
//! raised by the transport.

#![allow(missing_docs)]

use std::fmt;

use serde::Serialize;
use smol_str::SmolStr;
use thiserror::Error;

use crate::value::{TypeTag, Value};

/// Server-assigned identifier of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionKind {
    #[default]
    DirectRead,
    HighPerformance,
    RealTime,
    Recording,
}

impl SubscriptionKind {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "direct_read" => Some(Self::DirectRead),
            "high_performance" => Some(Self::HighPerformance),
            "real_time" => Some(Self::RealTime),
            "recording" => Some(Self::Recording),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectRead => "direct_read",
            Self::HighPerformance => "high_performance",
            Self::RealTime => "real_time",
            Self::Recording => "recording",
        }
    }
}

/// Status code returned by every remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemoteStatus {
    Success,
    NotFound,
    Other(u32),
}

impl RemoteStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::NotFound => f.write_str("not found"),
            Self::Other(code) => write!(f, "error code {code}"),
        }
    }
}

/// A failure raised by the transport rather than reported by the device.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transport fault: {0}")]
pub struct RemoteFault(pub SmolStr);

impl RemoteFault {
    pub fn new(message: impl Into<SmolStr>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub name: SmolStr,
    pub type_tag: TypeTag,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadItem {
    pub status: RemoteStatus,
    pub value: Option<Value>,
}

pub type RemoteResult<T> = Result<T, RemoteFault>;

pub trait RemoteService: Send + Sync {
    fn create_subscription(&self, kind: SubscriptionKind) -> RemoteResult<SubscriptionId>;

    fn delete_subscription(&self, id: SubscriptionId) -> RemoteResult<RemoteStatus>;

    fn add_variable(&self, id: SubscriptionId, uri: &str) -> RemoteResult<RemoteStatus>;

    fn remove_variable(&self, id: SubscriptionId, uri: &str) -> RemoteResult<RemoteStatus>;

    fn subscribe(&self, id: SubscriptionId, interval_us: u64) -> RemoteResult<RemoteStatus>;

    fn unsubscribe(&self, id: SubscriptionId) -> RemoteResult<RemoteStatus>;

    /// The device may drop a resubscribe silently, so a `Success` here is not
    /// proof that the subscription is live again.
    fn resubscribe(&self, id: SubscriptionId, interval_us: u64) -> RemoteResult<RemoteStatus>;

    fn get_variable_infos(
        &self,
        id: SubscriptionId,
    ) -> RemoteResult<(RemoteStatus, Vec<VariableInfo>)>;

    fn read_values(&self, id: SubscriptionId) -> RemoteResult<(RemoteStatus, Vec<Value>)>;

    fn read_single(&self, uri: &str) -> RemoteResult<ReadItem>;

    fn write_single(&self, uri: &str, value: &Value) -> RemoteResult<RemoteStatus>;
}
