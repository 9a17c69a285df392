// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! User-supplied type converters.
//!
//! A converter maps a source type onto a different target type, e.g. a
//! vendor-specific pose message onto a well-known visualization schema. A
//! topic whose type has a converter is exposed to the sink as two channels:
//! the original and a converted sibling carrying the translated bytes under
//! the target schema.
//!
//! The registry is built once at startup and immutable afterwards, so the
//! hot path reads it without locking.

use crate::registry::SchemaEntry;
use crate::translate::TranslateError;
use std::collections::HashMap;

type ConvertFn = dyn Fn(&[u8]) -> Result<Vec<u8>, String> + Send + Sync;

/// How a source payload becomes a target payload.
pub enum Conversion {
    /// Pass the bytes through unchanged; only the advertised schema
    /// differs (type aliasing).
    Identity,
    /// User-supplied translation function.
    User(Box<ConvertFn>),
}

struct ConverterEntry {
    target_type: String,
    target_descriptor_set: Vec<u8>,
    conversion: Conversion,
}

/// Write-once map from source type name to converter.
pub struct ConverterRegistry {
    converters: HashMap<String, ConverterEntry>,
}

/// Builder for [`ConverterRegistry`]. Converters are registered at process
/// startup, before any topic is announced.
#[derive(Default)]
pub struct ConverterRegistryBuilder {
    converters: HashMap<String, ConverterEntry>,
}

impl ConverterRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter from `source_type` to the target schema.
    pub fn register<F>(mut self, source_type: &str, target: &SchemaEntry, convert: F) -> Self
    where
        F: Fn(&[u8]) -> Result<Vec<u8>, String> + Send + Sync + 'static,
    {
        self.converters.insert(
            source_type.to_string(),
            ConverterEntry {
                target_type: target.type_name().to_string(),
                target_descriptor_set: target.descriptor_set().to_vec(),
                conversion: Conversion::User(Box::new(convert)),
            },
        );
        self
    }

    /// Register an identity converter: same bytes, different advertised
    /// schema.
    pub fn register_identity(mut self, source_type: &str, target: &SchemaEntry) -> Self {
        self.converters.insert(
            source_type.to_string(),
            ConverterEntry {
                target_type: target.type_name().to_string(),
                target_descriptor_set: target.descriptor_set().to_vec(),
                conversion: Conversion::Identity,
            },
        );
        self
    }

    pub fn build(self) -> ConverterRegistry {
        ConverterRegistry {
            converters: self.converters,
        }
    }
}

impl ConverterRegistry {
    /// A registry with no converters.
    pub fn empty() -> Self {
        ConverterRegistryBuilder::new().build()
    }

    /// Whether a converter exists for the source type.
    pub fn has_converter(&self, source_type: &str) -> bool {
        self.converters.contains_key(source_type)
    }

    /// Target type name and descriptor set for a source type.
    pub fn target(&self, source_type: &str) -> Option<(&str, &[u8])> {
        self.converters.get(source_type).map(|entry| {
            (
                entry.target_type.as_str(),
                entry.target_descriptor_set.as_slice(),
            )
        })
    }

    /// Run the conversion for a source payload.
    pub fn convert(&self, bytes: &[u8], source_type: &str) -> Result<Vec<u8>, TranslateError> {
        let entry = self
            .converters
            .get(source_type)
            .ok_or_else(|| TranslateError::NoConverter(source_type.to_string()))?;

        match &entry.conversion {
            Conversion::Identity => Ok(bytes.to_vec()),
            Conversion::User(f) => f(bytes).map_err(|reason| TranslateError::MalformedBytes {
                type_name: source_type.to_string(),
                reason,
            }),
        }
    }
}
