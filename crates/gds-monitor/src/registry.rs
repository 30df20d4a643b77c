//! Ordered registry of monitored variables.

#![allow(missing_docs)]

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;

use crate::error::MonitorError;
use crate::value::{TypeTag, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoredVariable {
    pub uri: SmolStr,
    pub type_tag: TypeTag,
    pub value: Value,
    /// False until the first poll confirmed the variable on the subscription.
    pub present: bool,
}

impl MonitoredVariable {
    pub fn new(uri: impl Into<SmolStr>, value: Value) -> Self {
        Self {
            uri: uri.into(),
            type_tag: value.type_tag(),
            value,
            present: false,
        }
    }
}

impl fmt::Display for MonitoredVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.uri, self.type_tag, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// New value, or the first poll that confirmed the variable.
    Changed,
    Unchanged,
    Untracked,
}

/// Monitored variables keyed by URI, in subscription order.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    entries: IndexMap<SmolStr, MonitoredVariable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.entries.contains_key(uri)
    }

    pub fn get(&self, uri: &str) -> Option<&MonitoredVariable> {
        self.entries.get(uri)
    }

    pub fn insert(&mut self, variable: MonitoredVariable) -> Result<(), MonitorError> {
        if self.entries.contains_key(variable.uri.as_str()) {
            return Err(MonitorError::AlreadySubscribed(variable.uri));
        }
        self.entries.insert(variable.uri.clone(), variable);
        Ok(())
    }

    /// Removes `uri` and keeps the subscription order of the remaining entries.
    pub fn remove(&mut self, uri: &str) -> Option<MonitoredVariable> {
        self.entries.shift_remove(uri)
    }

    /// Stores a polled value and reports what changed.
    pub fn refresh(&mut self, uri: &str, value: Value) -> Refresh {
        let Some(entry) = self.entries.get_mut(uri) else {
            return Refresh::Untracked;
        };
        let first_sighting = !entry.present;
        entry.present = true;
        if !first_sighting && entry.value == value {
            return Refresh::Unchanged;
        }
        entry.type_tag = value.type_tag();
        entry.value = value;
        Refresh::Changed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &MonitoredVariable> {
        self.entries.values()
    }

    pub fn snapshot(&self) -> Vec<MonitoredVariable> {
        self.entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;

    #[test]
    fn insert_rejects_duplicate_uri() {
        let mut registry = Registry::new();
        registry
            .insert(MonitoredVariable::new("Main.speed", Value::Int(1)))
            .expect("first insert");
        let err = registry
            .insert(MonitoredVariable::new("Main.speed", Value::Int(2)))
            .expect_err("duplicate insert");
        assert!(matches!(err, MonitorError::AlreadySubscribed(uri) if uri == "Main.speed"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("Main.speed").map(|v| &v.value), Some(&Value::Int(1)));
    }

    #[test]
    fn remove_keeps_subscription_order() {
        let mut registry = Registry::new();
        for uri in ["A", "B", "C"] {
            registry
                .insert(MonitoredVariable::new(uri, Value::Bool(false)))
                .expect("insert");
        }
        assert!(registry.remove("B").is_some());
        assert!(registry.remove("B").is_none());
        let order = registry.iter().map(|v| v.uri.as_str()).collect::<Vec<_>>();
        assert_eq!(order, vec!["A", "C"]);
    }

    #[test]
    fn refresh_reports_first_sighting_and_changes_only() {
        let mut registry = Registry::new();
        registry
            .insert(MonitoredVariable::new("Main.count", Value::DInt(1)))
            .expect("insert");
        assert!(!registry.get("Main.count").is_some_and(|v| v.present));
        assert_eq!(registry.refresh("Main.count", Value::DInt(1)), Refresh::Changed);
        assert_eq!(registry.refresh("Main.count", Value::DInt(1)), Refresh::Unchanged);
        assert_eq!(registry.refresh("Main.count", Value::DInt(2)), Refresh::Changed);
        assert_eq!(registry.refresh("Main.other", Value::DInt(2)), Refresh::Untracked);
        let entry = registry.get("Main.count").expect("entry");
        assert!(entry.present);
        assert_eq!(entry.value, Value::DInt(2));
    }

    #[test]
    fn display_lists_uri_type_and_value() {
        let variable = MonitoredVariable::new(
            "Arp.Plc.Eclr/MainInstance.TempValue",
            Value::LReal(21.5),
        );
        expect!["Arp.Plc.Eclr/MainInstance.TempValue, LREAL, 21.5"]
            .assert_eq(&variable.to_string());
    }
}
