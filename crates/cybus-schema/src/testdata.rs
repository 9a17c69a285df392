// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hand-built descriptor sets for tests.
//!
//! Built from `prost-types` directly so the tests need no protoc step.

use crate::registry::SchemaRegistry;
use prost::Message as _;
use prost_reflect::Value;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet,
};

fn scalar_field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn typed_field(name: &str, number: i32, ty: Type, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..scalar_field(name, number, ty)
    }
}

fn repeated(mut field: FieldDescriptorProto) -> FieldDescriptorProto {
    field.label = Some(Label::Repeated as i32);
    field
}

fn geometry_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("demo/geometry.proto".to_string()),
        package: Some("demo.geometry".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![DescriptorProto {
            name: Some("Vec3".to_string()),
            field: vec![
                scalar_field("x", 1, Type::Double),
                scalar_field("y", 2, Type::Double),
                scalar_field("z", 3, Type::Double),
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn sensors_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("demo/sensors.proto".to_string()),
        package: Some("demo.sensors".to_string()),
        syntax: Some("proto3".to_string()),
        dependency: vec!["demo/geometry.proto".to_string()],
        enum_type: vec![EnumDescriptorProto {
            name: Some("Mode".to_string()),
            value: vec![
                EnumValueDescriptorProto {
                    name: Some("MODE_UNKNOWN".to_string()),
                    number: Some(0),
                    ..Default::default()
                },
                EnumValueDescriptorProto {
                    name: Some("MODE_ACTIVE".to_string()),
                    number: Some(1),
                    ..Default::default()
                },
                EnumValueDescriptorProto {
                    name: Some("MODE_STANDBY".to_string()),
                    number: Some(2),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }],
        message_type: vec![DescriptorProto {
            name: Some("Imu".to_string()),
            field: vec![
                scalar_field("frame_id", 1, Type::String),
                typed_field("accel", 2, Type::Message, ".demo.geometry.Vec3"),
                typed_field("gyro", 3, Type::Message, ".demo.geometry.Vec3"),
                typed_field("mode", 4, Type::Enum, ".demo.sensors.Mode"),
                repeated(scalar_field("cov", 5, Type::Double)),
                scalar_field("stamp_ns", 6, Type::Uint64),
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub(crate) fn geometry_descriptor_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![geometry_file()],
    }
}

/// `demo.sensors.Imu` plus its `demo.geometry.Vec3` dependency.
pub(crate) fn sensor_descriptor_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![geometry_file(), sensors_file()],
    }
}

pub(crate) fn sensor_descriptor_set_bytes() -> Vec<u8> {
    sensor_descriptor_set().encode_to_vec()
}

/// A different `demo.sensors.Imu` under the same file and type names.
pub(crate) fn conflicting_imu_descriptor_set_bytes() -> Vec<u8> {
    let set = FileDescriptorSet {
        file: vec![FileDescriptorProto {
            name: Some("demo/sensors.proto".to_string()),
            package: Some("demo.sensors".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Imu".to_string()),
                field: vec![scalar_field("frame_id", 1, Type::Int64)],
                ..Default::default()
            }],
            ..Default::default()
        }],
    };
    set.encode_to_vec()
}

/// Diamond dependency: fusion depends on sensors and geometry, sensors
/// depends on geometry.
pub(crate) fn diamond_descriptor_set() -> FileDescriptorSet {
    let fusion = FileDescriptorProto {
        name: Some("demo/fusion.proto".to_string()),
        package: Some("demo.fusion".to_string()),
        syntax: Some("proto3".to_string()),
        dependency: vec![
            "demo/sensors.proto".to_string(),
            "demo/geometry.proto".to_string(),
        ],
        message_type: vec![DescriptorProto {
            name: Some("State".to_string()),
            field: vec![
                typed_field("imu", 1, Type::Message, ".demo.sensors.Imu"),
                typed_field("position", 2, Type::Message, ".demo.geometry.Vec3"),
            ],
            ..Default::default()
        }],
        ..Default::default()
    };

    FileDescriptorSet {
        file: vec![geometry_file(), sensors_file(), fusion],
    }
}

/// Self-referential message type.
pub(crate) fn recursive_descriptor_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![FileDescriptorProto {
            name: Some("demo/tree.proto".to_string()),
            package: Some("demo.tree".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Node".to_string()),
                field: vec![
                    scalar_field("name", 1, Type::String),
                    repeated(typed_field("children", 2, Type::Message, ".demo.tree.Node")),
                ],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// A registry with the sensor descriptor set pre-registered.
pub(crate) fn registry_with_sensors() -> SchemaRegistry {
    let registry = SchemaRegistry::new();
    registry
        .register("demo.sensors.Imu", &sensor_descriptor_set_bytes())
        .expect("register sensor descriptors");
    registry
}

/// Wire bytes of a fully-populated Imu sample (no primitive defaults).
pub(crate) fn imu_wire_bytes(registry: &SchemaRegistry) -> Vec<u8> {
    let imu = registry.resolve("demo.sensors.Imu").expect("imu entry");
    let vec3 = registry.resolve("demo.geometry.Vec3").expect("vec3 entry");

    let mut accel = vec3.new_message();
    accel.set_field_by_name("x", Value::F64(0.25));
    accel.set_field_by_name("y", Value::F64(-1.5));
    accel.set_field_by_name("z", Value::F64(9.81));

    let mut message = imu.new_message();
    message.set_field_by_name("frame_id", Value::String("base_link".into()));
    message.set_field_by_name("accel", Value::Message(accel));
    message.set_field_by_name("mode", Value::EnumNumber(1));
    message.set_field_by_name("stamp_ns", Value::U64(123_456_789));

    message.encode_to_vec()
}
