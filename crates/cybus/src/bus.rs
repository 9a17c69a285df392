// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bus handle, topology, and the in-process transport.
//!
//! The topology is a single map from channel name to channel state. Writers
//! advertise a type name and optionally a serialized descriptor set; readers
//! attach delivery callbacks. Delivery is serialized per channel, so a
//! single reader observes samples in write order.

use crate::error::BusError;
use crate::param::{Parameter, ParameterStore, ParameterValue};
use crate::service::{Client, Service, ServiceDirectory, ServiceHandler};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A sample delivered to a reader callback.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Channel the sample was published on.
    pub topic: String,

    /// Publish time in nanoseconds since the Unix epoch, stamped by the
    /// writer at `write()`.
    pub publish_time_ns: u64,

    /// Opaque serialized payload.
    pub payload: Vec<u8>,
}

type ReaderCallback = dyn Fn(&Sample) + Send + Sync;

struct ReaderSlot {
    id: u64,
    callback: Box<ReaderCallback>,
}

#[derive(Default)]
struct ChannelState {
    /// Type carried by the channel. Set by the first writer; readers may
    /// attach before any writer exists, in which case the type is unknown.
    type_name: Option<String>,

    /// Serialized descriptor set advertised by a writer, if any.
    descriptor_set: Option<Arc<Vec<u8>>>,

    writer_count: u32,
    readers: Vec<Arc<ReaderSlot>>,

    /// Serializes callback delivery so per-channel order is well defined
    /// even with concurrent writers.
    deliver: Arc<Mutex<()>>,
}

/// Builder for [`Bus`].
pub struct BusBuilder {
    name: String,
}

impl BusBuilder {
    /// Finish construction.
    pub fn build(self) -> Arc<Bus> {
        tracing::info!("bus participant '{}' created", self.name);
        Arc::new(Bus {
            name: self.name,
            channels: RwLock::new(HashMap::new()),
            services: ServiceDirectory::new(),
            params: ParameterStore::new(),
            next_reader_id: AtomicU64::new(1),
        })
    }
}

/// A bus participant.
///
/// One long-lived instance per process, created with the process name
/// (`"mcap_recorder"`, `"mcap_player"`, `"fox_bridge"`, ...).
pub struct Bus {
    name: String,
    channels: RwLock<HashMap<String, ChannelState>>,
    pub(crate) services: ServiceDirectory,
    params: ParameterStore,
    next_reader_id: AtomicU64,
}

impl Bus {
    /// Start building a bus participant with the given process name.
    pub fn builder(name: impl Into<String>) -> BusBuilder {
        BusBuilder { name: name.into() }
    }

    /// Process name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of all channels currently known to the topology.
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.read().keys().cloned().collect()
    }

    /// Type name carried by a channel, if a writer has advertised one.
    pub fn message_type(&self, topic: &str) -> Option<String> {
        self.channels.read().get(topic)?.type_name.clone()
    }

    /// Serialized descriptor set advertised for a channel, if any.
    pub fn descriptor_set(&self, topic: &str) -> Option<Arc<Vec<u8>>> {
        self.channels.read().get(topic)?.descriptor_set.clone()
    }

    /// Number of writers currently advertising a channel.
    pub fn publisher_count(&self, topic: &str) -> usize {
        self.channels
            .read()
            .get(topic)
            .map(|c| c.writer_count as usize)
            .unwrap_or(0)
    }

    /// Number of readers currently attached to a channel.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.channels
            .read()
            .get(topic)
            .map(|c| c.readers.len())
            .unwrap_or(0)
    }

    /// Create a reader on a channel. The callback runs on the publishing
    /// thread and must not block.
    pub fn create_reader<F>(self: &Arc<Self>, topic: &str, callback: F) -> Result<Reader, BusError>
    where
        F: Fn(&Sample) + Send + Sync + 'static,
    {
        let id = self.next_reader_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(ReaderSlot {
            id,
            callback: Box::new(callback),
        });

        let mut channels = self.channels.write();
        channels.entry(topic.to_string()).or_default().readers.push(slot);
        drop(channels);

        tracing::debug!("reader {} attached to {}", id, topic);

        Ok(Reader {
            bus: Arc::clone(self),
            topic: topic.to_string(),
            id,
        })
    }

    /// Create a writer for a channel, advertising its type name and
    /// (optionally) its serialized descriptor set.
    pub fn create_writer(
        self: &Arc<Self>,
        topic: &str,
        type_name: &str,
        descriptor_set: Option<Vec<u8>>,
    ) -> Result<Writer, BusError> {
        let mut channels = self.channels.write();
        let state = channels.entry(topic.to_string()).or_default();

        match &state.type_name {
            Some(existing) if existing != type_name => {
                return Err(BusError::TopicTypeMismatch {
                    topic: topic.to_string(),
                    existing: existing.clone(),
                    requested: type_name.to_string(),
                });
            }
            Some(_) => {}
            None => state.type_name = Some(type_name.to_string()),
        }

        if state.descriptor_set.is_none() {
            if let Some(bytes) = descriptor_set {
                state.descriptor_set = Some(Arc::new(bytes));
            }
        }
        state.writer_count += 1;
        drop(channels);

        tracing::debug!("writer advertised {} [{}]", topic, type_name);

        Ok(Writer {
            bus: Arc::clone(self),
            topic: topic.to_string(),
        })
    }

    /// Register a service provider. Replaces any previous provider for the
    /// same name.
    pub fn register_service<F>(self: &Arc<Self>, name: &str, handler: F) -> Service
    where
        F: Fn(&[u8]) -> Result<Vec<u8>, String> + Send + Sync + 'static,
    {
        self.services.register(name, Box::new(handler) as Box<ServiceHandler>);
        tracing::debug!("service {} registered", name);
        Service::new(Arc::clone(self), name)
    }

    /// Create a client for a service. The service does not have to exist
    /// yet; calls fail with [`BusError::NoProvider`] until it does.
    pub fn create_client(self: &Arc<Self>, service: &str) -> Client {
        Client::new(Arc::clone(self), service)
    }

    /// Names of all registered services.
    pub fn service_names(&self) -> Vec<String> {
        self.services.names()
    }

    /// Set a process-wide parameter.
    pub fn set_parameter(&self, name: &str, value: ParameterValue) {
        self.params.set(name, value);
    }

    /// Look up a parameter by name.
    pub fn get_parameter(&self, name: &str) -> Option<Parameter> {
        self.params.get(name)
    }

    /// All parameters, sorted by name.
    pub fn list_parameters(&self) -> Vec<Parameter> {
        self.params.list()
    }

    fn detach_reader(&self, topic: &str, id: u64) {
        let mut channels = self.channels.write();
        if let Some(state) = channels.get_mut(topic) {
            state.readers.retain(|slot| slot.id != id);
            if state.writer_count == 0 && state.readers.is_empty() {
                channels.remove(topic);
            }
        }
    }

    fn detach_writer(&self, topic: &str) {
        let mut channels = self.channels.write();
        if let Some(state) = channels.get_mut(topic) {
            state.writer_count = state.writer_count.saturating_sub(1);
            if state.writer_count == 0 && state.readers.is_empty() {
                channels.remove(topic);
            }
        }
    }
}

/// Reader handle. Detaches from the channel on drop.
pub struct Reader {
    bus: Arc<Bus>,
    topic: String,
    id: u64,
}

impl Reader {
    /// Channel this reader is attached to.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.bus.detach_reader(&self.topic, self.id);
        tracing::debug!("reader {} detached from {}", self.id, self.topic);
    }
}

/// Writer handle. Unadvertises the channel on drop.
pub struct Writer {
    bus: Arc<Bus>,
    topic: String,
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer").field("topic", &self.topic).finish()
    }
}

impl Writer {
    /// Channel this writer advertises.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish a payload. The publish time is stamped here; readers run on
    /// the calling thread.
    pub fn write(&self, payload: &[u8]) -> Result<(), BusError> {
        let (readers, deliver) = {
            let channels = self.bus.channels.read();
            match channels.get(&self.topic) {
                Some(state) => (state.readers.clone(), Arc::clone(&state.deliver)),
                None => return Ok(()),
            }
        };

        if readers.is_empty() {
            return Ok(());
        }

        let sample = Sample {
            topic: self.topic.clone(),
            publish_time_ns: now_nanos(),
            payload: payload.to_vec(),
        };

        // Lock held across callbacks: this is what makes per-channel
        // delivery order well defined.
        let _guard = deliver.lock();
        for slot in &readers {
            (slot.callback)(&sample);
        }

        Ok(())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        self.bus.detach_writer(&self.topic);
        tracing::debug!("writer unadvertised {}", self.topic);
    }
}

/// Nanoseconds since the Unix epoch.
pub(crate) fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
