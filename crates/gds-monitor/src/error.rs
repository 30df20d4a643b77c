//! Error types for the subscription manager.

#![allow(missing_docs)]

use smol_str::SmolStr;
use thiserror::Error;

use crate::remote::{RemoteFault, RemoteStatus};
use crate::value::TypeTag;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("already subscribed to '{0}'")]
    AlreadySubscribed(SmolStr),
    #[error("not subscribed to '{0}'")]
    NotSubscribed(SmolStr),
    #[error("variable '{0}' does not exist on the controller")]
    RemoteNotFound(SmolStr),
    #[error("{context} failed ({status})")]
    Remote {
        context: SmolStr,
        status: RemoteStatus,
    },
    #[error("{context} failed: {source}")]
    Transport {
        context: SmolStr,
        #[source]
        source: RemoteFault,
    },
    #[error("cannot convert '{text}' to {type_tag} for '{uri}'")]
    ParseFailure {
        uri: SmolStr,
        type_tag: TypeTag,
        text: SmolStr,
    },
    #[error("controller returned no value for '{0}'")]
    EmptyRead(SmolStr),
    #[error("poll returned untracked variable '{0}'")]
    Inconsistency(SmolStr),
    #[error("failed to start polling: {0}")]
    PollStart(#[source] std::io::Error),
    #[error("no subscription handle allocated")]
    NoHandle,
    #[error("invalid config: {0}")]
    InvalidConfig(SmolStr),
}

impl MonitorError {
    pub(crate) fn remote(context: impl Into<SmolStr>, status: RemoteStatus) -> Self {
        Self::Remote {
            context: context.into(),
            status,
        }
    }

    pub(crate) fn transport(context: impl Into<SmolStr>, source: RemoteFault) -> Self {
        Self::Transport {
            context: context.into(),
            source,
        }
    }
}
