// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared test fixtures: a single-file telemetry type and bus helpers.

use cybus::{Bus, Writer};
use cybus_schema::SchemaRegistry;
use prost::Message as _;
use prost_reflect::Value;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet};
use std::sync::Arc;

pub(crate) const TELEMETRY_TYPE: &str = "demo.Telemetry";

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

pub(crate) fn telemetry_descriptor_set_bytes() -> Vec<u8> {
    FileDescriptorSet {
        file: vec![FileDescriptorProto {
            name: Some("demo/telemetry.proto".to_string()),
            package: Some("demo".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Telemetry".to_string()),
                field: vec![
                    field("name", 1, Type::String),
                    field("value", 2, Type::Double),
                ],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
    .encode_to_vec()
}

/// Advertise a telemetry writer that carries its descriptor set.
pub(crate) fn telemetry_writer(bus: &Arc<Bus>, topic: &str) -> Writer {
    bus.create_writer(topic, TELEMETRY_TYPE, Some(telemetry_descriptor_set_bytes()))
        .expect("telemetry writer")
}

/// Wire bytes for one telemetry sample. Registers the type on first use.
pub(crate) fn telemetry_bytes(registry: &SchemaRegistry, name: &str, value: f64) -> Vec<u8> {
    if !registry.contains(TELEMETRY_TYPE) {
        registry
            .register(TELEMETRY_TYPE, &telemetry_descriptor_set_bytes())
            .expect("register telemetry descriptor");
    }
    let entry = registry.resolve(TELEMETRY_TYPE).expect("telemetry entry");
    let mut message = entry.new_message();
    message.set_field_by_name("name", Value::String(name.to_string()));
    message.set_field_by_name("value", Value::F64(value));
    message.encode_to_vec()
}
