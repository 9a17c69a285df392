// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic and service discovery.
//!
//! A cooperative timer polls the bus's topology, diffs it against the
//! previous tick, and emits add/remove events. Flapping is debounced:
//! identical consecutive channel sets produce no duplicate events. Topics
//! whose type cannot be resolved yet, or that have no publisher yet, stay
//! pending and are retried on later ticks. Discovery failures are never
//! fatal.

use crate::services::ServiceTable;
use cybus::Bus;
use cybus_schema::{SchemaEntry, SchemaRegistry};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Default poll period for the live bridge.
pub const LIVE_PERIOD: Duration = Duration::from_millis(500);

/// Default poll period for the recorder.
pub const RECORD_PERIOD: Duration = Duration::from_millis(2000);

/// A service that passed the allow-list with both types resolved.
pub struct ServiceAdvertisement {
    pub name: String,
    pub request: Arc<SchemaEntry>,
    pub response: Arc<SchemaEntry>,
}

/// Receiver of discovery events.
pub trait DiscoveryEvents: Send {
    fn on_topic_found(&mut self, topic: &str, entry: &Arc<SchemaEntry>);
    fn on_topic_lost(&mut self, topic: &str);
    fn on_service_found(&mut self, service: &ServiceAdvertisement);
}

/// Polls the bus and diffs topology between ticks.
pub struct DiscoveryEngine {
    bus: Arc<Bus>,
    registry: Arc<SchemaRegistry>,
    services: ServiceTable,
    known: HashSet<String>,
    announced: HashSet<String>,
    announced_services: HashSet<String>,
    unlisted_logged: HashSet<String>,
}

impl DiscoveryEngine {
    pub fn new(bus: Arc<Bus>, registry: Arc<SchemaRegistry>, services: ServiceTable) -> Self {
        Self {
            bus,
            registry,
            services,
            known: HashSet::new(),
            announced: HashSet::new(),
            announced_services: HashSet::new(),
            unlisted_logged: HashSet::new(),
        }
    }

    /// One discovery tick.
    pub fn poll_once(&mut self, events: &mut dyn DiscoveryEvents) {
        self.poll_topics(events);
        self.poll_services(events);
    }

    fn poll_topics(&mut self, events: &mut dyn DiscoveryEvents) {
        let current: HashSet<String> = self.bus.channel_names().into_iter().collect();

        for topic in self.known.difference(&current) {
            if self.announced.remove(topic) {
                tracing::info!("topic lost: {}", topic);
                events.on_topic_lost(topic);
            }
        }

        for topic in &current {
            if self.announced.contains(topic) {
                continue;
            }

            // Subscriber-only topics are latent; they are announced once a
            // publisher shows up.
            if self.bus.publisher_count(topic) == 0 {
                continue;
            }

            let Some(type_name) = self.bus.message_type(topic) else {
                continue;
            };

            if !self.registry.contains(&type_name) {
                if let Some(descriptor) = self.bus.descriptor_set(topic) {
                    if let Err(e) = self.registry.register(&type_name, &descriptor) {
                        tracing::debug!("descriptor for {} rejected: {}", type_name, e);
                    }
                }
            }

            match self.registry.resolve(&type_name) {
                Ok(entry) => {
                    tracing::info!("topic found: {} [{}]", topic, type_name);
                    events.on_topic_found(topic, &entry);
                    self.announced.insert(topic.clone());
                }
                Err(_) => {
                    // Logged once by the registry; retried next tick.
                }
            }
        }

        self.known = current;
    }

    fn poll_services(&mut self, events: &mut dyn DiscoveryEvents) {
        for name in self.bus.service_names() {
            if self.announced_services.contains(&name) {
                continue;
            }

            let Some((request_type, response_type)) = self.services.lookup(&name) else {
                if self.unlisted_logged.insert(name.clone()) {
                    tracing::debug!("service {} not in allow-list, ignoring", name);
                }
                continue;
            };

            let (request, response) = match (
                self.registry.resolve(request_type),
                self.registry.resolve(response_type),
            ) {
                (Ok(req), Ok(resp)) => (req, resp),
                _ => continue, // retried next tick
            };

            tracing::info!("service found: {}", name);
            events.on_service_found(&ServiceAdvertisement {
                name: name.clone(),
                request,
                response,
            });
            self.announced_services.insert(name);
        }
    }

    /// Run ticks on a dedicated thread until `running` clears. The sleep is
    /// chunked so shutdown stays prompt.
    pub fn spawn<E>(
        mut self,
        mut events: E,
        period: Duration,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()>
    where
        E: DiscoveryEvents + 'static,
    {
        std::thread::Builder::new()
            .name("discovery".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    self.poll_once(&mut events);

                    let mut remaining = period;
                    while !remaining.is_zero() && running.load(Ordering::SeqCst) {
                        let chunk = remaining.min(Duration::from_millis(50));
                        std::thread::sleep(chunk);
                        remaining -= chunk;
                    }
                }
                tracing::debug!("discovery thread stopped");
            })
            .expect("spawn discovery thread")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[derive(Default)]
    struct CollectedEvents {
        found: Vec<String>,
        lost: Vec<String>,
        services: Vec<String>,
    }

    impl DiscoveryEvents for CollectedEvents {
        fn on_topic_found(&mut self, topic: &str, _entry: &Arc<SchemaEntry>) {
            self.found.push(topic.to_string());
        }

        fn on_topic_lost(&mut self, topic: &str) {
            self.lost.push(topic.to_string());
        }

        fn on_service_found(&mut self, service: &ServiceAdvertisement) {
            self.services.push(service.name.clone());
        }
    }

    #[test]
    fn published_topic_is_announced_once() {
        let bus = Bus::builder("test").build();
        let registry = Arc::new(SchemaRegistry::new());
        let mut engine =
            DiscoveryEngine::new(Arc::clone(&bus), registry, ServiceTable::empty());

        let _writer = testutil::telemetry_writer(&bus, "/t");

        let mut events = CollectedEvents::default();
        engine.poll_once(&mut events);
        engine.poll_once(&mut events);

        // Debounce: identical consecutive ticks, exactly one event.
        assert_eq!(events.found, vec!["/t".to_string()]);
    }

    #[test]
    fn descriptor_from_bus_feeds_registry() {
        let bus = Bus::builder("test").build();
        let registry = Arc::new(SchemaRegistry::new());
        let mut engine = DiscoveryEngine::new(
            Arc::clone(&bus),
            Arc::clone(&registry),
            ServiceTable::empty(),
        );

        let _writer = testutil::telemetry_writer(&bus, "/t");
        engine.poll_once(&mut CollectedEvents::default());

        assert!(registry.resolve(testutil::TELEMETRY_TYPE).is_ok());
    }

    #[test]
    fn subscriber_only_topic_stays_latent() {
        let bus = Bus::builder("test").build();
        let registry = Arc::new(SchemaRegistry::new());
        let mut engine =
            DiscoveryEngine::new(Arc::clone(&bus), registry, ServiceTable::empty());

        let _reader = bus.create_reader("/latent", |_| {}).expect("reader");

        let mut events = CollectedEvents::default();
        engine.poll_once(&mut events);
        assert!(events.found.is_empty());

        // A publisher appears later; the pending topic is announced.
        let _writer = testutil::telemetry_writer(&bus, "/latent");
        engine.poll_once(&mut events);
        assert_eq!(events.found, vec!["/latent".to_string()]);
    }

    #[test]
    fn unresolvable_type_is_retried() {
        let bus = Bus::builder("test").build();
        let registry = Arc::new(SchemaRegistry::new());
        let mut engine = DiscoveryEngine::new(
            Arc::clone(&bus),
            Arc::clone(&registry),
            ServiceTable::empty(),
        );

        // Writer advertises a type but no descriptor.
        let _writer = bus
            .create_writer("/opaque", testutil::TELEMETRY_TYPE, None)
            .expect("writer");

        let mut events = CollectedEvents::default();
        engine.poll_once(&mut events);
        assert!(events.found.is_empty());

        // The descriptor becomes known out of band; the next tick announces.
        registry
            .register(testutil::TELEMETRY_TYPE, &testutil::telemetry_descriptor_set_bytes())
            .expect("register");
        engine.poll_once(&mut events);
        assert_eq!(events.found, vec!["/opaque".to_string()]);
    }

    #[test]
    fn removed_topic_emits_lost() {
        let bus = Bus::builder("test").build();
        let registry = Arc::new(SchemaRegistry::new());
        let mut engine =
            DiscoveryEngine::new(Arc::clone(&bus), registry, ServiceTable::empty());

        let writer = testutil::telemetry_writer(&bus, "/t");

        let mut events = CollectedEvents::default();
        engine.poll_once(&mut events);
        drop(writer);
        engine.poll_once(&mut events);

        assert_eq!(events.lost, vec!["/t".to_string()]);
    }

    #[test]
    fn allow_listed_service_is_announced() {
        let bus = Bus::builder("test").build();
        let registry = Arc::new(testutil::registry());
        let table = ServiceTable::empty().with_binding(
            "/echo",
            testutil::TELEMETRY_TYPE,
            testutil::TELEMETRY_TYPE,
        );
        let mut engine = DiscoveryEngine::new(Arc::clone(&bus), registry, table);

        let _service = bus.register_service("/echo", |req| Ok(req.to_vec()));
        let _unlisted = bus.register_service("/secret", |req| Ok(req.to_vec()));

        let mut events = CollectedEvents::default();
        engine.poll_once(&mut events);
        engine.poll_once(&mut events);

        assert_eq!(events.services, vec!["/echo".to_string()]);
    }
}
