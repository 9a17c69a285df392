// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Descriptor-set closure.
//!
//! File descriptors form a DAG; a naive walk can enqueue the same file
//! twice through diamond dependencies. The closure is breadth-first from
//! the root file and de-duplicates by file name.

use prost::Message as _;
use prost_reflect::MessageDescriptor;
use prost_types::FileDescriptorSet;
use std::collections::{HashSet, VecDeque};

/// Serialize the transitive file-dependency closure of a message type into
/// a flat `FileDescriptorSet`, root file first.
pub fn descriptor_set_for(message: &MessageDescriptor) -> Vec<u8> {
    let pool = message.parent_pool();
    let root = message.parent_file();

    let mut set = FileDescriptorSet::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue = VecDeque::new();

    seen.insert(root.name().to_string());
    queue.push_back(root);

    while let Some(file) = queue.pop_front() {
        let proto = file.file_descriptor_proto().clone();
        for dep_name in &proto.dependency {
            if seen.insert(dep_name.clone()) {
                if let Some(dep) = pool.get_file_by_name(dep_name) {
                    queue.push_back(dep);
                }
            }
        }
        set.file.push(proto);
    }

    set.encode_to_vec()
}
