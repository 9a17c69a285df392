// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Two-tier type resolution.
//!
//! Tier 1 is a registry-owned descriptor pool fed by runtime sources
//! (descriptors observed on the bus, schema records read from log files).
//! Tier 2 is the process-wide pool populated at build time. Entries are
//! built once per type name and immutable afterwards.

use crate::descriptor::descriptor_set_for;
use crate::json_schema::json_schema_for;
use parking_lot::{Mutex, RwLock};
use prost::Message as _;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor};
use prost_types::FileDescriptorSet;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors produced by the schema registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No descriptor for the type name in either tier.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// The type name is already registered with a non-identical
    /// descriptor closure.
    #[error("type {0} already registered with an incompatible descriptor")]
    DuplicateIncompatible(String),

    /// The supplied descriptor-set bytes did not parse.
    #[error("malformed descriptor set: {0}")]
    MalformedDescriptor(String),
}

/// Everything the message plane needs to know about one type.
///
/// Immutable after creation; shared read-only between the hub, the
/// recorder, and the player.
pub struct SchemaEntry {
    type_name: String,
    message: MessageDescriptor,
    descriptor_set: Vec<u8>,
    json_schema: String,
}

impl SchemaEntry {
    fn build(type_name: &str, message: MessageDescriptor) -> Self {
        let descriptor_set = descriptor_set_for(&message);
        let json_schema = json_schema_for(&message).to_string();
        Self {
            type_name: type_name.to_string(),
            message,
            descriptor_set,
            json_schema,
        }
    }

    /// Fully-qualified type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The reflective descriptor for the message type.
    pub fn message_descriptor(&self) -> &MessageDescriptor {
        &self.message
    }

    /// A fresh, empty prototype instance.
    pub fn new_message(&self) -> DynamicMessage {
        DynamicMessage::new(self.message.clone())
    }

    /// Serialized `FileDescriptorSet`, transitively closed over file
    /// dependencies. Suitable for schema records in log files and for
    /// channel advertisements to the sink.
    pub fn descriptor_set(&self) -> &[u8] {
        &self.descriptor_set
    }

    /// JSON-schema projection of the message shape.
    pub fn json_schema(&self) -> &str {
        &self.json_schema
    }
}

impl std::fmt::Debug for SchemaEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaEntry")
            .field("type_name", &self.type_name)
            .field("descriptor_set_len", &self.descriptor_set.len())
            .finish()
    }
}

/// Resolves type names to [`SchemaEntry`] values.
pub struct SchemaRegistry {
    pool: RwLock<DescriptorPool>,
    entries: RwLock<HashMap<String, Arc<SchemaEntry>>>,
    unknown_logged: Mutex<HashSet<String>>,
}

impl SchemaRegistry {
    /// Create an empty registry. Tier 2 (the process-wide pool) is always
    /// consulted as a fallback.
    pub fn new() -> Self {
        Self {
            pool: RwLock::new(DescriptorPool::new()),
            entries: RwLock::new(HashMap::new()),
            unknown_logged: Mutex::new(HashSet::new()),
        }
    }

    /// Resolve a type name to its schema entry.
    ///
    /// Misses are logged once per type name per process and are not
    /// permanent: a later [`register`](Self::register) makes the same name
    /// resolvable.
    pub fn resolve(&self, type_name: &str) -> Result<Arc<SchemaEntry>, RegistryError> {
        if let Some(entry) = self.entries.read().get(type_name) {
            return Ok(Arc::clone(entry));
        }

        let message = self
            .lookup_descriptor(type_name)
            .ok_or_else(|| self.unknown(type_name))?;

        let entry = Arc::new(SchemaEntry::build(type_name, message));
        let mut entries = self.entries.write();
        // A concurrent resolve may have won the race; entries are
        // immutable, so either copy is fine.
        let entry = entries
            .entry(type_name.to_string())
            .or_insert(entry);
        Ok(Arc::clone(entry))
    }

    /// True when `resolve` would succeed without logging a miss.
    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.read().contains_key(type_name) || self.lookup_descriptor(type_name).is_some()
    }

    /// Register a serialized `FileDescriptorSet` learned at runtime, making
    /// `type_name` resolvable through tier 1.
    ///
    /// Re-registering an identical descriptor closure is a no-op. A
    /// conflicting closure fails with
    /// [`RegistryError::DuplicateIncompatible`].
    pub fn register(&self, type_name: &str, descriptor_set: &[u8]) -> Result<(), RegistryError> {
        let fd_set = FileDescriptorSet::decode(descriptor_set)
            .map_err(|e| RegistryError::MalformedDescriptor(e.to_string()))?;

        // Stage the incoming set in a scratch pool so we can normalize it
        // to a closure before comparing against what we already hold.
        let mut staged = DescriptorPool::new();
        staged
            .add_file_descriptor_set(fd_set.clone())
            .map_err(|e| RegistryError::MalformedDescriptor(e.to_string()))?;
        let staged_message = staged
            .get_message_by_name(type_name)
            .ok_or_else(|| RegistryError::UnknownType(type_name.to_string()))?;

        if let Some(existing) = self.lookup_descriptor(type_name) {
            if descriptor_set_for(&existing) == descriptor_set_for(&staged_message) {
                return Ok(());
            }
            return Err(RegistryError::DuplicateIncompatible(type_name.to_string()));
        }

        let mut pool = self.pool.write();
        pool.add_file_descriptor_set(fd_set)
            .map_err(|_| RegistryError::DuplicateIncompatible(type_name.to_string()))?;

        tracing::debug!("registered descriptor set for {}", type_name);
        Ok(())
    }

    fn lookup_descriptor(&self, type_name: &str) -> Option<MessageDescriptor> {
        if let Some(message) = self.pool.read().get_message_by_name(type_name) {
            return Some(message);
        }
        DescriptorPool::global().get_message_by_name(type_name)
    }

    fn unknown(&self, type_name: &str) -> RegistryError {
        if self.unknown_logged.lock().insert(type_name.to_string()) {
            tracing::warn!("unknown type: {}", type_name);
        }
        RegistryError::UnknownType(type_name.to_string())
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata;

    #[test]
    fn resolve_registered_type() {
        let registry = testdata::registry_with_sensors();

        let entry = registry.resolve("demo.sensors.Imu").expect("resolve");
        assert_eq!(entry.type_name(), "demo.sensors.Imu");
        assert_eq!(entry.message_descriptor().full_name(), "demo.sensors.Imu");
        assert!(!entry.descriptor_set().is_empty());
    }

    #[test]
    fn resolve_unknown_type_fails() {
        let registry = SchemaRegistry::new();
        let err = registry.resolve("nope.Missing").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownType(_)));
    }

    #[test]
    fn resolution_is_cached() {
        let registry = testdata::registry_with_sensors();

        let a = registry.resolve("demo.sensors.Imu").expect("first");
        let b = registry.resolve("demo.sensors.Imu").expect("second");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn descriptor_closure_contains_all_dependencies() {
        let registry = testdata::registry_with_sensors();
        let entry = registry.resolve("demo.sensors.Imu").expect("resolve");

        // The closure must parse back into a pool in which the root type
        // and all its transitive dependencies resolve.
        let pool = DescriptorPool::decode(entry.descriptor_set()).expect("decode closure");
        let message = pool
            .get_message_by_name("demo.sensors.Imu")
            .expect("root type");
        let file = message.parent_file();
        for dep in &file.file_descriptor_proto().dependency {
            assert!(pool.get_file_by_name(dep).is_some(), "missing dep {dep}");
        }
        assert!(pool.get_message_by_name("demo.geometry.Vec3").is_some());
    }

    #[test]
    fn reregistering_identical_set_is_noop() {
        let registry = testdata::registry_with_sensors();
        let bytes = testdata::sensor_descriptor_set_bytes();

        registry
            .register("demo.sensors.Imu", &bytes)
            .expect("idempotent register");
    }

    #[test]
    fn conflicting_registration_is_rejected() {
        let registry = testdata::registry_with_sensors();
        let conflicting = testdata::conflicting_imu_descriptor_set_bytes();

        let err = registry
            .register("demo.sensors.Imu", &conflicting)
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateIncompatible(_)));
    }

    #[test]
    fn register_garbage_fails() {
        let registry = SchemaRegistry::new();
        let err = registry.register("x.Y", &[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, RegistryError::MalformedDescriptor(_)));
    }

    #[test]
    fn json_schema_projection_shape() {
        let registry = testdata::registry_with_sensors();
        let entry = registry.resolve("demo.sensors.Imu").expect("resolve");

        let schema: serde_json::Value =
            serde_json::from_str(entry.json_schema()).expect("valid json");
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["frame_id"]["type"], "string");
        assert_eq!(schema["properties"]["stamp_ns"]["type"], "integer");
        assert_eq!(schema["properties"]["accel"]["type"], "object");
        assert_eq!(schema["properties"]["accel"]["properties"]["x"]["type"], "number");
        assert_eq!(schema["properties"]["mode"]["type"], "string");
        assert_eq!(schema["properties"]["mode"]["enum"][0], "MODE_UNKNOWN");
        assert_eq!(schema["properties"]["cov"]["type"], "array");
        assert_eq!(schema["properties"]["cov"]["items"]["type"], "number");
    }
}
