// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The sink interface.
//!
//! Implemented by the wire layer (websocket server, test doubles). All
//! identifiers are UTF-8 strings; payloads are canonical bytes under the
//! channel's advertised schema. Callbacks may run on bus threads and must
//! not block.

/// External observer of the live message plane.
pub trait Sink: Send + Sync {
    /// A channel became available: `schema_name` is the fully-qualified
    /// type, `descriptor_set` its serialized descriptor closure.
    fn on_channel_created(&self, topic: &str, schema_name: &str, descriptor_set: &[u8]);

    /// A channel went away.
    fn on_channel_closed(&self, topic: &str);

    /// A callable service became available. Schemas are JSON-schema text
    /// for the request and response shapes.
    fn on_service_created(&self, name: &str, request_schema: &str, response_schema: &str);

    /// A payload for a subscribed channel.
    fn on_message(&self, channel: &str, payload: &[u8]);
}
