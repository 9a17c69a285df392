// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service allow-list.
//!
//! The bus's service primitive exposes no request/response type metadata,
//! so the binding from service name to type pair must come from
//! configuration. The table ships with the binary; extending it requires a
//! rebuild.

use std::collections::HashMap;

/// Maps service names to their (request, response) type names.
#[derive(Debug, Clone, Default)]
pub struct ServiceTable {
    bindings: HashMap<String, (String, String)>,
}

impl ServiceTable {
    /// An empty table: every service is ignored.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The compiled-in table.
    pub fn builtin() -> Self {
        Self::empty()
            .with_binding("imu_service", "sensors.imu.ImuData", "sensors.imu.ImuData")
            .with_binding(
                "/parking/state_machine",
                "parking.StateRequest",
                "parking.StateResponse",
            )
    }

    /// Add a binding.
    pub fn with_binding(mut self, service: &str, request_type: &str, response_type: &str) -> Self {
        self.bindings.insert(
            service.to_string(),
            (request_type.to_string(), response_type.to_string()),
        );
        self
    }

    /// Look up the type pair for a service name.
    pub fn lookup(&self, service: &str) -> Option<(&str, &str)> {
        self.bindings
            .get(service)
            .map(|(req, resp)| (req.as_str(), resp.as_str()))
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
