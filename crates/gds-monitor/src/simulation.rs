//! In-memory controller for tests and offline runs.
//!
//! [`SimulatedDevice`] behaves like the global data space services of a
//! controller: a subscription's variable set can only change while it is
//! unsubscribed, reads of an unsubscribed handle fail, and a resubscribe can
//! be dropped without an error. Every call is recorded so protocol ordering
//! can be asserted, and responses can be scripted per call kind.

#![allow(missing_docs)]

use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smol_str::SmolStr;

use crate::remote::{
    ReadItem, RemoteFault, RemoteResult, RemoteService, RemoteStatus, SubscriptionId,
    SubscriptionKind, VariableInfo,
};
use crate::value::{TypeTag, Value};

/// Membership change attempted on a subscribed handle.
pub const STATUS_SUBSCRIBED: u32 = 0x10;
/// Unknown subscription handle.
pub const STATUS_INVALID_HANDLE: u32 = 0x11;
/// Read of a handle that is not subscribed.
pub const STATUS_NOT_SUBSCRIBED: u32 = 0x12;
/// Written value does not match the variable's type.
pub const STATUS_TYPE_MISMATCH: u32 = 0x13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    CreateSubscription,
    DeleteSubscription,
    AddVariable,
    RemoveVariable,
    Subscribe,
    Unsubscribe,
    Resubscribe,
    GetVariableInfos,
    ReadValues,
    ReadSingle,
    WriteSingle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    CreateSubscription(SubscriptionKind),
    DeleteSubscription(SubscriptionId),
    AddVariable(SubscriptionId, SmolStr),
    RemoveVariable(SubscriptionId, SmolStr),
    Subscribe(SubscriptionId, u64),
    Unsubscribe(SubscriptionId),
    Resubscribe(SubscriptionId, u64),
    GetVariableInfos(SubscriptionId),
    ReadValues(SubscriptionId),
    ReadSingle(SmolStr),
    WriteSingle(SmolStr, Value),
}

impl RemoteCall {
    pub fn kind(&self) -> CallKind {
        match self {
            RemoteCall::CreateSubscription(_) => CallKind::CreateSubscription,
            RemoteCall::DeleteSubscription(_) => CallKind::DeleteSubscription,
            RemoteCall::AddVariable(..) => CallKind::AddVariable,
            RemoteCall::RemoveVariable(..) => CallKind::RemoveVariable,
            RemoteCall::Subscribe(..) => CallKind::Subscribe,
            RemoteCall::Unsubscribe(_) => CallKind::Unsubscribe,
            RemoteCall::Resubscribe(..) => CallKind::Resubscribe,
            RemoteCall::GetVariableInfos(_) => CallKind::GetVariableInfos,
            RemoteCall::ReadValues(_) => CallKind::ReadValues,
            RemoteCall::ReadSingle(_) => CallKind::ReadSingle,
            RemoteCall::WriteSingle(..) => CallKind::WriteSingle,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scripted {
    Status(RemoteStatus),
    Fault(SmolStr),
}

#[derive(Debug, Clone)]
struct SimSubscription {
    kind: SubscriptionKind,
    variables: Vec<SmolStr>,
    subscribed: bool,
    interval_us: u64,
}

#[derive(Debug, Default)]
struct DeviceState {
    variables: IndexMap<SmolStr, Value>,
    subscriptions: IndexMap<u64, SimSubscription>,
    next_id: u64,
    calls: Vec<RemoteCall>,
    scripted: HashMap<CallKind, VecDeque<Scripted>>,
    drop_resubscribes: usize,
}

impl DeviceState {
    fn record(&mut self, call: RemoteCall) -> Option<Scripted> {
        let kind = call.kind();
        self.calls.push(call);
        self.scripted.get_mut(&kind).and_then(VecDeque::pop_front)
    }

    fn subscription(&mut self, id: SubscriptionId) -> Result<&mut SimSubscription, RemoteStatus> {
        self.subscriptions
            .get_mut(&id.0)
            .ok_or(RemoteStatus::Other(STATUS_INVALID_HANDLE))
    }
}

#[derive(Debug, Default)]
pub struct SimulatedDevice {
    state: Mutex<DeviceState>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variables<I, K>(variables: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<SmolStr>,
    {
        let device = Self::new();
        {
            let mut state = device.state.lock();
            for (uri, value) in variables {
                state.variables.insert(uri.into(), value);
            }
        }
        device
    }

    pub fn set_value(&self, uri: &str, value: Value) {
        self.state.lock().variables.insert(SmolStr::new(uri), value);
    }

    pub fn value(&self, uri: &str) -> Option<Value> {
        self.state.lock().variables.get(uri).cloned()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_kinds(&self) -> Vec<CallKind> {
        self.state.lock().calls.iter().map(RemoteCall::kind).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Queues a response for the next call of `kind`, bypassing the
    /// simulated behaviour for that call.
    pub fn script(&self, kind: CallKind, response: Scripted) {
        self.state
            .lock()
            .scripted
            .entry(kind)
            .or_default()
            .push_back(response);
    }

    pub fn fail_next(&self, kind: CallKind, status: RemoteStatus) {
        self.script(kind, Scripted::Status(status));
    }

    pub fn fault_next(&self, kind: CallKind, message: &str) {
        self.script(kind, Scripted::Fault(SmolStr::new(message)));
    }

    /// The next resubscribe reports success but leaves the handle unsubscribed.
    pub fn drop_next_resubscribe(&self) {
        self.state.lock().drop_resubscribes += 1;
    }

    /// Adds `uri` to a subscription behind the client's back.
    pub fn attach_variable(&self, id: SubscriptionId, uri: &str) {
        if let Some(subscription) = self.state.lock().subscriptions.get_mut(&id.0) {
            subscription.variables.push(SmolStr::new(uri));
        }
    }

    /// Drops `uri` from a subscription behind the client's back.
    pub fn detach_variable(&self, id: SubscriptionId, uri: &str) {
        if let Some(subscription) = self.state.lock().subscriptions.get_mut(&id.0) {
            subscription.variables.retain(|name| name != uri);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    pub fn subscription_kind(&self, id: SubscriptionId) -> Option<SubscriptionKind> {
        self.state.lock().subscriptions.get(&id.0).map(|s| s.kind)
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.state
            .lock()
            .subscriptions
            .get(&id.0)
            .is_some_and(|s| s.subscribed)
    }

    pub fn subscription_interval(&self, id: SubscriptionId) -> Option<u64> {
        self.state
            .lock()
            .subscriptions
            .get(&id.0)
            .map(|s| s.interval_us)
    }

    pub fn subscription_variables(&self, id: SubscriptionId) -> Vec<SmolStr> {
        self.state
            .lock()
            .subscriptions
            .get(&id.0)
            .map(|s| s.variables.clone())
            .unwrap_or_default()
    }

    /// Advances every variable by one step: numbers count up, booleans toggle.
    pub fn step(&self) {
        let mut state = self.state.lock();
        for value in state.variables.values_mut() {
            *value = match &*value {
                Value::Bool(v) => Value::Bool(!v),
                Value::SInt(v) => Value::SInt(v.wrapping_add(1)),
                Value::USInt(v) => Value::USInt(v.wrapping_add(1)),
                Value::Int(v) => Value::Int(v.wrapping_add(1)),
                Value::UInt(v) => Value::UInt(v.wrapping_add(1)),
                Value::DInt(v) => Value::DInt(v.wrapping_add(1)),
                Value::UDInt(v) => Value::UDInt(v.wrapping_add(1)),
                Value::LInt(v) => Value::LInt(v.wrapping_add(1)),
                Value::ULInt(v) => Value::ULInt(v.wrapping_add(1)),
                Value::Real(v) => Value::Real(*v + 0.5),
                Value::LReal(v) => Value::LReal(*v + 0.5),
                other => other.clone(),
            };
        }
    }
}

fn scripted_status(response: Scripted) -> RemoteResult<RemoteStatus> {
    match response {
        Scripted::Status(status) => Ok(status),
        Scripted::Fault(message) => Err(RemoteFault(message)),
    }
}

fn scripted_list<T>(response: Scripted) -> RemoteResult<(RemoteStatus, Vec<T>)> {
    scripted_status(response).map(|status| (status, Vec::new()))
}

impl RemoteService for SimulatedDevice {
    fn create_subscription(&self, kind: SubscriptionKind) -> RemoteResult<SubscriptionId> {
        let mut state = self.state.lock();
        if let Some(Scripted::Fault(message)) = state.record(RemoteCall::CreateSubscription(kind))
        {
            return Err(RemoteFault(message));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.subscriptions.insert(
            id,
            SimSubscription {
                kind,
                variables: Vec::new(),
                subscribed: false,
                interval_us: 0,
            },
        );
        Ok(SubscriptionId(id))
    }

    fn delete_subscription(&self, id: SubscriptionId) -> RemoteResult<RemoteStatus> {
        let mut state = self.state.lock();
        if let Some(response) = state.record(RemoteCall::DeleteSubscription(id)) {
            return scripted_status(response);
        }
        Ok(match state.subscriptions.shift_remove(&id.0) {
            Some(_) => RemoteStatus::Success,
            None => RemoteStatus::Other(STATUS_INVALID_HANDLE),
        })
    }

    fn add_variable(&self, id: SubscriptionId, uri: &str) -> RemoteResult<RemoteStatus> {
        let mut state = self.state.lock();
        if let Some(response) = state.record(RemoteCall::AddVariable(id, SmolStr::new(uri))) {
            return scripted_status(response);
        }
        let known = state.variables.contains_key(uri);
        let subscription = match state.subscription(id) {
            Ok(subscription) => subscription,
            Err(status) => return Ok(status),
        };
        if subscription.subscribed {
            return Ok(RemoteStatus::Other(STATUS_SUBSCRIBED));
        }
        if !known {
            return Ok(RemoteStatus::NotFound);
        }
        if !subscription.variables.iter().any(|name| name == uri) {
            subscription.variables.push(SmolStr::new(uri));
        }
        Ok(RemoteStatus::Success)
    }

    fn remove_variable(&self, id: SubscriptionId, uri: &str) -> RemoteResult<RemoteStatus> {
        let mut state = self.state.lock();
        if let Some(response) = state.record(RemoteCall::RemoveVariable(id, SmolStr::new(uri))) {
            return scripted_status(response);
        }
        let subscription = match state.subscription(id) {
            Ok(subscription) => subscription,
            Err(status) => return Ok(status),
        };
        if subscription.subscribed {
            return Ok(RemoteStatus::Other(STATUS_SUBSCRIBED));
        }
        let before = subscription.variables.len();
        subscription.variables.retain(|name| name != uri);
        Ok(if subscription.variables.len() == before {
            RemoteStatus::NotFound
        } else {
            RemoteStatus::Success
        })
    }

    fn subscribe(&self, id: SubscriptionId, interval_us: u64) -> RemoteResult<RemoteStatus> {
        let mut state = self.state.lock();
        if let Some(response) = state.record(RemoteCall::Subscribe(id, interval_us)) {
            return scripted_status(response);
        }
        let subscription = match state.subscription(id) {
            Ok(subscription) => subscription,
            Err(status) => return Ok(status),
        };
        if subscription.subscribed {
            return Ok(RemoteStatus::Other(STATUS_SUBSCRIBED));
        }
        subscription.subscribed = true;
        subscription.interval_us = interval_us;
        Ok(RemoteStatus::Success)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> RemoteResult<RemoteStatus> {
        let mut state = self.state.lock();
        if let Some(response) = state.record(RemoteCall::Unsubscribe(id)) {
            return scripted_status(response);
        }
        let subscription = match state.subscription(id) {
            Ok(subscription) => subscription,
            Err(status) => return Ok(status),
        };
        subscription.subscribed = false;
        Ok(RemoteStatus::Success)
    }

    fn resubscribe(&self, id: SubscriptionId, interval_us: u64) -> RemoteResult<RemoteStatus> {
        let mut state = self.state.lock();
        if let Some(response) = state.record(RemoteCall::Resubscribe(id, interval_us)) {
            return scripted_status(response);
        }
        let dropped = state.drop_resubscribes > 0;
        if dropped {
            state.drop_resubscribes -= 1;
        }
        let subscription = match state.subscription(id) {
            Ok(subscription) => subscription,
            Err(status) => return Ok(status),
        };
        // An empty subscription cannot be resubscribed; like a dropped
        // resubscribe this still reports success.
        if !dropped && !subscription.variables.is_empty() {
            subscription.subscribed = true;
            subscription.interval_us = interval_us;
        }
        Ok(RemoteStatus::Success)
    }

    fn get_variable_infos(
        &self,
        id: SubscriptionId,
    ) -> RemoteResult<(RemoteStatus, Vec<VariableInfo>)> {
        let mut state = self.state.lock();
        if let Some(response) = state.record(RemoteCall::GetVariableInfos(id)) {
            return scripted_list(response);
        }
        let Some(subscription) = state.subscriptions.get(&id.0) else {
            return Ok((RemoteStatus::Other(STATUS_INVALID_HANDLE), Vec::new()));
        };
        if !subscription.subscribed {
            return Ok((RemoteStatus::Other(STATUS_NOT_SUBSCRIBED), Vec::new()));
        }
        let infos = subscription
            .variables
            .iter()
            .map(|name| VariableInfo {
                name: name.clone(),
                type_tag: state
                    .variables
                    .get(name)
                    .map(Value::type_tag)
                    .unwrap_or_else(|| TypeTag::Other(SmolStr::new("UNKNOWN"))),
            })
            .collect();
        Ok((RemoteStatus::Success, infos))
    }

    fn read_values(&self, id: SubscriptionId) -> RemoteResult<(RemoteStatus, Vec<Value>)> {
        let mut state = self.state.lock();
        if let Some(response) = state.record(RemoteCall::ReadValues(id)) {
            return scripted_list(response);
        }
        let Some(subscription) = state.subscriptions.get(&id.0) else {
            return Ok((RemoteStatus::Other(STATUS_INVALID_HANDLE), Vec::new()));
        };
        if !subscription.subscribed {
            return Ok((RemoteStatus::Other(STATUS_NOT_SUBSCRIBED), Vec::new()));
        }
        // One value per listed name so values stay aligned with the infos.
        let values = subscription
            .variables
            .iter()
            .map(|name| {
                state.variables.get(name).cloned().unwrap_or_else(|| Value::Opaque {
                    type_name: SmolStr::new("UNKNOWN"),
                    text: SmolStr::default(),
                })
            })
            .collect();
        Ok((RemoteStatus::Success, values))
    }

    fn read_single(&self, uri: &str) -> RemoteResult<ReadItem> {
        let mut state = self.state.lock();
        if let Some(response) = state.record(RemoteCall::ReadSingle(SmolStr::new(uri))) {
            return scripted_status(response).map(|status| ReadItem {
                status,
                value: None,
            });
        }
        Ok(match state.variables.get(uri) {
            Some(value) => ReadItem {
                status: RemoteStatus::Success,
                value: Some(value.clone()),
            },
            None => ReadItem {
                status: RemoteStatus::NotFound,
                value: None,
            },
        })
    }

    fn write_single(&self, uri: &str, value: &Value) -> RemoteResult<RemoteStatus> {
        let mut state = self.state.lock();
        if let Some(response) =
            state.record(RemoteCall::WriteSingle(SmolStr::new(uri), value.clone()))
        {
            return scripted_status(response);
        }
        let Some(current) = state.variables.get_mut(uri) else {
            return Ok(RemoteStatus::NotFound);
        };
        if current.type_tag() != value.type_tag() {
            return Ok(RemoteStatus::Other(STATUS_TYPE_MISMATCH));
        }
        *current = value.clone();
        Ok(RemoteStatus::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> SimulatedDevice {
        SimulatedDevice::with_variables([("Main.a", Value::Int(1)), ("Main.b", Value::Bool(true))])
    }

    #[test]
    fn membership_changes_are_rejected_while_subscribed() {
        let device = device();
        let id = device
            .create_subscription(SubscriptionKind::DirectRead)
            .expect("create");
        assert_eq!(device.add_variable(id, "Main.a"), Ok(RemoteStatus::Success));
        assert_eq!(device.subscribe(id, 100_000), Ok(RemoteStatus::Success));
        assert_eq!(
            device.add_variable(id, "Main.b"),
            Ok(RemoteStatus::Other(STATUS_SUBSCRIBED))
        );
        assert_eq!(device.unsubscribe(id), Ok(RemoteStatus::Success));
        assert_eq!(device.add_variable(id, "Main.b"), Ok(RemoteStatus::Success));
        assert_eq!(device.resubscribe(id, 100_000), Ok(RemoteStatus::Success));
        assert!(device.is_subscribed(id));
        assert_eq!(device.subscription_variables(id), vec!["Main.a", "Main.b"]);
    }

    #[test]
    fn unknown_variables_are_not_found() {
        let device = device();
        let id = device
            .create_subscription(SubscriptionKind::DirectRead)
            .expect("create");
        assert_eq!(device.add_variable(id, "Main.zzz"), Ok(RemoteStatus::NotFound));
        assert_eq!(device.remove_variable(id, "Main.a"), Ok(RemoteStatus::NotFound));
        let item = device.read_single("Main.zzz").expect("read");
        assert_eq!(item.status, RemoteStatus::NotFound);
    }

    #[test]
    fn dropped_resubscribe_still_reports_success() {
        let device = device();
        let id = device
            .create_subscription(SubscriptionKind::DirectRead)
            .expect("create");
        device.add_variable(id, "Main.a").expect("add");
        device.drop_next_resubscribe();
        assert_eq!(device.resubscribe(id, 100_000), Ok(RemoteStatus::Success));
        assert!(!device.is_subscribed(id));
        let (status, values) = device.read_values(id).expect("read values");
        assert_eq!(status, RemoteStatus::Other(STATUS_NOT_SUBSCRIBED));
        assert!(values.is_empty());
    }

    #[test]
    fn scripted_responses_take_precedence_and_are_recorded() {
        let device = device();
        device.fault_next(CallKind::ReadSingle, "socket closed");
        device.fail_next(CallKind::WriteSingle, RemoteStatus::Other(99));
        assert_eq!(
            device.read_single("Main.a"),
            Err(RemoteFault(SmolStr::new("socket closed")))
        );
        assert_eq!(
            device.write_single("Main.a", &Value::Int(5)),
            Ok(RemoteStatus::Other(99))
        );
        assert_eq!(device.value("Main.a"), Some(Value::Int(1)));
        assert_eq!(
            device.call_kinds(),
            vec![CallKind::ReadSingle, CallKind::WriteSingle]
        );
    }

    #[test]
    fn writes_check_the_variable_type() {
        let device = device();
        assert_eq!(
            device.write_single("Main.a", &Value::Bool(false)),
            Ok(RemoteStatus::Other(STATUS_TYPE_MISMATCH))
        );
        assert_eq!(
            device.write_single("Main.a", &Value::Int(9)),
            Ok(RemoteStatus::Success)
        );
        assert_eq!(device.value("Main.a"), Some(Value::Int(9)));
    }

    #[test]
    fn values_stay_aligned_with_infos_for_unknown_names() {
        let device = device();
        let id = device
            .create_subscription(SubscriptionKind::DirectRead)
            .expect("create");
        device.attach_variable(id, "Main.ghost");
        device.add_variable(id, "Main.a").expect("add");
        device.subscribe(id, 100_000).expect("subscribe");

        let (_, infos) = device.get_variable_infos(id).expect("infos");
        let (_, values) = device.read_values(id).expect("values");
        assert_eq!(infos.len(), values.len());
        assert_eq!(infos[1].name, "Main.a");
        assert_eq!(values[1], Value::Int(1));
        assert!(matches!(&values[0], Value::Opaque { type_name, .. } if type_name == "UNKNOWN"));
    }

    #[test]
    fn step_advances_values() {
        let device = device();
        device.step();
        assert_eq!(device.value("Main.a"), Some(Value::Int(2)));
        assert_eq!(device.value("Main.b"), Some(Value::Bool(false)));
    }
}
