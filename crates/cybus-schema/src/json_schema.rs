// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON-schema projection of message shapes.
//!
//! Used for service request/response advertisement: the visualization
//! client builds its call forms from these.

use prost_reflect::{Kind, MessageDescriptor};
use serde_json::{json, Map, Value};

/// Project a message descriptor onto a JSON schema object.
pub fn json_schema_for(message: &MessageDescriptor) -> Value {
    build(message, &mut Vec::new())
}

fn build(message: &MessageDescriptor, stack: &mut Vec<String>) -> Value {
    // Self-referential message types terminate here instead of recursing.
    if stack.iter().any(|name| name == message.full_name()) {
        return json!({ "type": "object" });
    }
    stack.push(message.full_name().to_string());

    let mut properties = Map::new();
    for field in message.fields() {
        let base = match field.kind() {
            Kind::Int32
            | Kind::Int64
            | Kind::Uint32
            | Kind::Uint64
            | Kind::Sint32
            | Kind::Sint64
            | Kind::Fixed32
            | Kind::Fixed64
            | Kind::Sfixed32
            | Kind::Sfixed64 => json!({ "type": "integer" }),
            Kind::Float | Kind::Double => json!({ "type": "number" }),
            Kind::Bool => json!({ "type": "boolean" }),
            Kind::String | Kind::Bytes => json!({ "type": "string" }),
            Kind::Enum(enum_desc) => {
                let names: Vec<Value> = enum_desc
                    .values()
                    .map(|v| Value::String(v.name().to_string()))
                    .collect();
                json!({ "type": "string", "enum": names })
            }
            Kind::Message(nested) => build(&nested, stack),
        };

        let schema = if field.is_list() || field.is_map() {
            json!({ "type": "array", "items": base })
        } else {
            base
        };
        properties.insert(field.name().to_string(), schema);
    }

    stack.pop();
    json!({ "type": "object", "properties": properties })
}
