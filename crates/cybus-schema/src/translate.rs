// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload translation between wire bytes, canonical bytes, and text.
//!
//! Wire bytes are what the bus delivers. Canonical bytes are the same
//! encoding family re-serialized through the prototype, which normalizes
//! field order and strips unknown fields - external consumers get a stable
//! byte stream. The text form is JSON: enums stay numeric, field names stay
//! as declared in the schema, primitive defaults are omitted.

use crate::registry::{RegistryError, SchemaRegistry};
use prost::Message as _;
use prost_reflect::{DeserializeOptions, DynamicMessage, SerializeOptions};
use std::sync::Arc;
use thiserror::Error;

/// Translation errors.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Binary payload failed to parse against the prototype.
    #[error("malformed payload for {type_name}: {reason}")]
    MalformedBytes { type_name: String, reason: String },

    /// Text payload failed to parse against the prototype.
    #[error("malformed text for {type_name}: {reason}")]
    MalformedText { type_name: String, reason: String },

    /// No converter is registered for the source type.
    #[error("no converter registered for {0}")]
    NoConverter(String),
}

/// Stateless translation facade over a shared registry.
#[derive(Clone)]
pub struct Translator {
    registry: Arc<SchemaRegistry>,
}

impl Translator {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this translator resolves through.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Parse wire bytes into the prototype and re-serialize.
    pub fn to_canonical(&self, bytes: &[u8], type_name: &str) -> Result<Vec<u8>, TranslateError> {
        Ok(self.decode(bytes, type_name)?.encode_to_vec())
    }

    /// Structured text form of a payload.
    pub fn to_text(&self, bytes: &[u8], type_name: &str) -> Result<String, TranslateError> {
        let message = self.decode(bytes, type_name)?;

        let options = SerializeOptions::new()
            .use_enum_numbers(true)
            .use_proto_field_name(true)
            .skip_default_fields(true);

        let mut buf = Vec::new();
        let mut serializer = serde_json::Serializer::new(&mut buf);
        message
            .serialize_with_options(&mut serializer, &options)
            .map_err(|e| TranslateError::MalformedBytes {
                type_name: type_name.to_string(),
                reason: e.to_string(),
            })?;

        // serde_json writes valid UTF-8.
        Ok(String::from_utf8(buf).expect("json output is utf-8"))
    }

    /// Inverse of [`to_text`](Self::to_text): parse text against the
    /// prototype and serialize to wire bytes.
    pub fn from_text(&self, text: &str, type_name: &str) -> Result<Vec<u8>, TranslateError> {
        let entry = self.registry.resolve(type_name)?;

        let mut deserializer = serde_json::Deserializer::from_str(text);
        let message = DynamicMessage::deserialize_with_options(
            entry.message_descriptor().clone(),
            &mut deserializer,
            &DeserializeOptions::new(),
        )
        .map_err(|e| TranslateError::MalformedText {
            type_name: type_name.to_string(),
            reason: e.to_string(),
        })?;
        deserializer
            .end()
            .map_err(|e| TranslateError::MalformedText {
                type_name: type_name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(message.encode_to_vec())
    }

    fn decode(&self, bytes: &[u8], type_name: &str) -> Result<DynamicMessage, TranslateError> {
        let entry = self.registry.resolve(type_name)?;
        DynamicMessage::decode(entry.message_descriptor().clone(), bytes).map_err(|e| {
            TranslateError::MalformedBytes {
                type_name: type_name.to_string(),
                reason: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata;
    use prost_reflect::Value;

    fn translator() -> Translator {
        Translator::new(Arc::new(testdata::registry_with_sensors()))
    }

    #[test]
    fn canonical_is_stable() {
        let translator = translator();
        let bytes = testdata::imu_wire_bytes(translator.registry());

        let canonical = translator
            .to_canonical(&bytes, "demo.sensors.Imu")
            .expect("canonical");
        let again = translator
            .to_canonical(&canonical, "demo.sensors.Imu")
            .expect("idempotent");
        assert_eq!(canonical, again);
    }

    #[test]
    fn text_uses_declared_names_and_numeric_enums() {
        let translator = translator();
        let bytes = testdata::imu_wire_bytes(translator.registry());

        let text = translator.to_text(&bytes, "demo.sensors.Imu").expect("text");
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");

        assert_eq!(value["frame_id"], "base_link");
        assert_eq!(value["mode"], 1);
        assert_eq!(value["accel"]["x"], 0.25);
    }

    #[test]
    fn text_omits_primitive_defaults() {
        let translator = translator();
        let registry = translator.registry().clone();
        let entry = registry.resolve("demo.sensors.Imu").expect("resolve");

        let mut message = entry.new_message();
        message.set_field_by_name("frame_id", Value::String("only".into()));
        let bytes = message.encode_to_vec();

        let text = translator.to_text(&bytes, "demo.sensors.Imu").expect("text");
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["frame_id"], "only");
        assert!(value.get("mode").is_none());
        assert!(value.get("cov").is_none());
    }

    #[test]
    fn text_roundtrip_reproduces_wire_bytes() {
        let translator = translator();
        let bytes = testdata::imu_wire_bytes(translator.registry());

        let text = translator.to_text(&bytes, "demo.sensors.Imu").expect("text");
        let back = translator
            .from_text(&text, "demo.sensors.Imu")
            .expect("from_text");
        assert_eq!(back, bytes);
    }

    #[test]
    fn malformed_text_is_rejected() {
        let translator = translator();
        let err = translator
            .from_text("{not json", "demo.sensors.Imu")
            .unwrap_err();
        assert!(matches!(err, TranslateError::MalformedText { .. }));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let translator = translator();
        let err = translator
            .from_text("{} extra", "demo.sensors.Imu")
            .unwrap_err();
        assert!(matches!(err, TranslateError::MalformedText { .. }));
    }

    #[test]
    fn unknown_type_propagates() {
        let translator = translator();
        let err = translator.to_text(&[], "nope.Missing").unwrap_err();
        assert!(matches!(
            err,
            TranslateError::Registry(RegistryError::UnknownType(_))
        ));
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        let translator = translator();
        // A truncated varint field cannot parse.
        let err = translator
            .to_text(&[0x0a, 0xff], "demo.sensors.Imu")
            .unwrap_err();
        assert!(matches!(err, TranslateError::MalformedBytes { .. }));
    }
}
