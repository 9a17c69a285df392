// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WebSocket protocol for the visualization bridge.
//!
//! Control messages are JSON text frames. Channel payloads travel as
//! binary frames: a 4-byte little-endian channel id followed by the
//! canonical bytes. Schema descriptors inside JSON are base64.

use serde::{Deserialize, Serialize};

/// Client -> Server messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to an advertised channel
    Subscribe { channel_id: u32 },

    /// Unsubscribe from a channel
    Unsubscribe { channel_id: u32 },

    /// Advertise a client-authored topic
    Advertise { topic: String, schema_name: String },

    /// Drop a client-authored topic
    Unadvertise { topic: String },

    /// Publish a message onto an advertised topic
    Publish {
        topic: String,
        message: serde_json::Value,
    },

    /// Call a bus service
    ServiceCall {
        service: String,
        request: serde_json::Value,
        #[serde(default)]
        call_id: Option<u64>,
    },

    /// Read parameters (empty names = all)
    GetParameters {
        #[serde(default)]
        names: Vec<String>,
    },

    /// Write parameters
    SetParameters { parameters: Vec<cybus::Parameter> },

    /// Ping (keepalive)
    Ping {
        #[serde(default)]
        id: Option<u64>,
    },
}

/// Server -> Client messages
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after connect
    Welcome { version: String, name: String },

    /// A channel is available for subscription
    Advertise { channel: ChannelInfo },

    /// A channel went away
    ChannelClosed { channel_id: u32, topic: String },

    /// A callable service is available
    ServiceAdvertised {
        service: String,
        request_schema: serde_json::Value,
        response_schema: serde_json::Value,
    },

    /// Subscription confirmed
    Subscribed { channel_id: u32 },

    /// Unsubscription confirmed
    Unsubscribed { channel_id: u32 },

    /// Client publish confirmed
    Published { topic: String },

    /// Advertise confirmed
    Advertised { topic: String },

    /// Unadvertise confirmed
    Unadvertised { topic: String },

    /// Service call response
    ServiceResponse {
        service: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<u64>,
        response: serde_json::Value,
    },

    /// Parameter values
    Parameters { parameters: Vec<cybus::Parameter> },

    /// Pong response
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },

    /// Request failed
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
    },
}

/// One advertised channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub id: u32,
    pub topic: String,
    pub schema_name: String,
    /// Serialized descriptor set, base64.
    pub schema: String,
    pub encoding: String,
}

impl ServerMessage {
    pub fn welcome(name: &str) -> Self {
        Self::Welcome {
            version: env!("CARGO_PKG_VERSION").to_string(),
            name: name.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            topic: None,
        }
    }

    pub fn topic_error(message: impl Into<String>, topic: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            topic: Some(topic.into()),
        }
    }
}

/// Frame a binary payload as channel-id + bytes.
pub fn binary_frame(channel_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&channel_id.to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}
