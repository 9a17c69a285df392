// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide parameter store.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

/// A named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: ParameterValue,
}

pub(crate) struct ParameterStore {
    params: RwLock<BTreeMap<String, ParameterValue>>,
}

impl ParameterStore {
    pub(crate) fn new() -> Self {
        Self {
            params: RwLock::new(BTreeMap::new()),
        }
    }

    pub(crate) fn set(&self, name: &str, value: ParameterValue) {
        self.params.write().insert(name.to_string(), value);
    }

    pub(crate) fn get(&self, name: &str) -> Option<Parameter> {
        self.params.read().get(name).map(|value| Parameter {
            name: name.to_string(),
            value: value.clone(),
        })
    }

    pub(crate) fn list(&self) -> Vec<Parameter> {
        self.params
            .read()
            .iter()
            .map(|(name, value)| Parameter {
                name: name.clone(),
                value: value.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bus;

    #[test]
    fn set_get_list() {
        let bus = Bus::builder("test").build();
        bus.set_parameter("rate", ParameterValue::Int(10));
        bus.set_parameter("label", ParameterValue::String("front".into()));

        let rate = bus.get_parameter("rate").expect("rate");
        assert_eq!(rate.value, ParameterValue::Int(10));
        assert!(bus.get_parameter("missing").is_none());

        let all = bus.list_parameters();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "label"); // sorted
    }

    #[test]
    fn overwrite_replaces_value() {
        let bus = Bus::builder("test").build();
        bus.set_parameter("mode", ParameterValue::Bool(false));
        bus.set_parameter("mode", ParameterValue::Bool(true));

        assert_eq!(
            bus.get_parameter("mode").expect("mode").value,
            ParameterValue::Bool(true)
        );
    }

    #[test]
    fn value_serializes_untagged() {
        let value = ParameterValue::Double(2.5);
        assert_eq!(serde_json::to_string(&value).expect("json"), "2.5");
    }
}
