// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/response services.
//!
//! The service primitive carries no request/response type metadata; both
//! sides exchange opaque serialized payloads. Calls block the caller up to
//! a timeout.

use crate::bus::Bus;
use crate::error::BusError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Provider callback: request payload in, response payload out.
pub type ServiceHandler = dyn Fn(&[u8]) -> Result<Vec<u8>, String> + Send + Sync;

struct ServiceEntry {
    handler: Box<ServiceHandler>,
}

/// Name -> provider map shared by all handles of one bus.
pub(crate) struct ServiceDirectory {
    services: RwLock<HashMap<String, Arc<ServiceEntry>>>,
}

impl ServiceDirectory {
    pub(crate) fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn register(&self, name: &str, handler: Box<ServiceHandler>) {
        self.services
            .write()
            .insert(name.to_string(), Arc::new(ServiceEntry { handler }));
    }

    pub(crate) fn unregister(&self, name: &str) {
        self.services.write().remove(name);
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Arc<ServiceEntry>> {
        self.services.read().get(name).cloned()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.services.read().keys().cloned().collect()
    }
}

/// Provider handle. Unregisters the service on drop.
pub struct Service {
    bus: Arc<Bus>,
    name: String,
}

impl Service {
    pub(crate) fn new(bus: Arc<Bus>, name: &str) -> Self {
        Self {
            bus,
            name: name.to_string(),
        }
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.bus.services.unregister(&self.name);
        tracing::debug!("service {} unregistered", self.name);
    }
}

/// Client handle for one service.
pub struct Client {
    bus: Arc<Bus>,
    service: String,
}

impl Client {
    pub(crate) fn new(bus: Arc<Bus>, service: &str) -> Self {
        Self {
            bus,
            service: service.to_string(),
        }
    }

    /// Service name this client targets.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Issue a blocking call. Fails with [`BusError::NoProvider`] when the
    /// service is not registered, [`BusError::Timeout`] when the provider
    /// does not answer in time, and [`BusError::CallFailed`] when the
    /// provider rejects the request.
    pub fn call(&self, request: &[u8], timeout: Duration) -> Result<Vec<u8>, BusError> {
        let entry = self
            .bus
            .services
            .lookup(&self.service)
            .ok_or_else(|| BusError::NoProvider(self.service.clone()))?;

        let (tx, rx) = mpsc::channel();
        let request = request.to_vec();
        thread::spawn(move || {
            let _ = tx.send((entry.handler)(&request));
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(reason)) => Err(BusError::CallFailed(reason)),
            Err(_) => Err(BusError::Timeout),
        }
    }
}
