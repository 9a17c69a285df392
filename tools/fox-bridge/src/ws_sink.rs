// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The hub-facing sink: assigns channel ids and fans events out to all
//! connected sessions over a broadcast channel.
//!
//! Sink callbacks arrive on bus and discovery threads; everything here is
//! non-blocking. Sessions that lag simply miss frames (broadcast
//! semantics), which is acceptable for a live view.

use cybus_bridge::Sink;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// An advertised channel as the sink tracks it.
pub struct ChannelRecord {
    pub id: u32,
    pub topic: String,
    pub schema_name: String,
    pub descriptor: Vec<u8>,
}

/// An advertised service.
pub struct ServiceRecord {
    pub name: String,
    pub request_schema: String,
    pub response_schema: String,
}

/// Events fanned out to client sessions.
#[derive(Clone)]
pub enum BridgeEvent {
    ChannelAdvertised(Arc<ChannelRecord>),
    ChannelClosed { id: u32, topic: String },
    ServiceAdvertised(Arc<ServiceRecord>),
    Message { id: u32, payload: Arc<Vec<u8>> },
}

/// Fan-out sink shared by all sessions.
pub struct WsSink {
    events: broadcast::Sender<BridgeEvent>,
    channels: DashMap<String, Arc<ChannelRecord>>,
    names_by_id: DashMap<u32, String>,
    services: DashMap<String, Arc<ServiceRecord>>,
    next_id: AtomicU32,
}

impl WsSink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            events,
            channels: DashMap::new(),
            names_by_id: DashMap::new(),
            services: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Receiver for a new session.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Channel name for an id, while the channel is advertised.
    pub fn channel_name(&self, id: u32) -> Option<String> {
        self.names_by_id.get(&id).map(|name| name.clone())
    }

    /// Currently advertised channels, for late-joining sessions.
    pub fn snapshot_channels(&self) -> Vec<Arc<ChannelRecord>> {
        let mut channels: Vec<Arc<ChannelRecord>> =
            self.channels.iter().map(|e| Arc::clone(e.value())).collect();
        channels.sort_by_key(|c| c.id);
        channels
    }

    /// Currently advertised services.
    pub fn snapshot_services(&self) -> Vec<Arc<ServiceRecord>> {
        self.services.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

impl Default for WsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for WsSink {
    fn on_channel_created(&self, topic: &str, schema_name: &str, descriptor_set: &[u8]) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = Arc::new(ChannelRecord {
            id,
            topic: topic.to_string(),
            schema_name: schema_name.to_string(),
            descriptor: descriptor_set.to_vec(),
        });
        self.channels.insert(topic.to_string(), Arc::clone(&record));
        self.names_by_id.insert(id, topic.to_string());

        tracing::debug!("channel {} advertised as id {}", topic, id);
        let _ = self.events.send(BridgeEvent::ChannelAdvertised(record));
    }

    fn on_channel_closed(&self, topic: &str) {
        if let Some((_, record)) = self.channels.remove(topic) {
            self.names_by_id.remove(&record.id);
            tracing::debug!("channel {} closed (id {})", topic, record.id);
            let _ = self.events.send(BridgeEvent::ChannelClosed {
                id: record.id,
                topic: topic.to_string(),
            });
        }
    }

    fn on_service_created(&self, name: &str, request_schema: &str, response_schema: &str) {
        let record = Arc::new(ServiceRecord {
            name: name.to_string(),
            request_schema: request_schema.to_string(),
            response_schema: response_schema.to_string(),
        });
        self.services.insert(name.to_string(), Arc::clone(&record));

        tracing::debug!("service {} advertised", name);
        let _ = self.events.send(BridgeEvent::ServiceAdvertised(record));
    }

    fn on_message(&self, channel: &str, payload: &[u8]) {
        if let Some(record) = self.channels.get(channel) {
            let _ = self.events.send(BridgeEvent::Message {
                id: record.id,
                payload: Arc::new(payload.to_vec()),
            });
        }
    }
}
