// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Live fan-out hub.
//!
//! Owns per-topic subscriber state. The first external subscriber attaches
//! a bus reader whose callback translates wire bytes to canonical bytes and
//! forwards them to the sink; the last unsubscribe detaches it. The reverse
//! direction (client-authored advertise/publish) creates bus writers, and
//! service calls are translated text-to-wire and back.
//!
//! The topic map sits behind a single mutex held only for map mutation,
//! never across bus or sink calls. Message-level errors are logged and the
//! message dropped; the hub itself never tears down over them.

use crate::discovery::{DiscoveryEvents, ServiceAdvertisement};
use crate::error::HubError;
use crate::sink::Sink;
use cybus::{Bus, BusError, Parameter};
use cybus_schema::{ConverterRegistry, SchemaEntry, SchemaRegistry, Translator};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Suffix of the sibling channel carrying converted payloads.
pub const CONVERTED_SUFFIX: &str = "/converted";

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

struct TopicState {
    type_name: String,
    /// Known to discovery, as opposed to created by an external advertise.
    discovered: bool,
    reader: Option<cybus::Reader>,
    writer: Option<Arc<cybus::Writer>>,
    subscribers: u32,
}

impl TopicState {
    fn latent(type_name: &str, discovered: bool) -> Self {
        Self {
            type_name: type_name.to_string(),
            discovered,
            reader: None,
            writer: None,
            subscribers: 0,
        }
    }
}

struct ServiceState {
    request: Arc<SchemaEntry>,
    response: Arc<SchemaEntry>,
    client: Option<Arc<cybus::Client>>,
}

/// Fan-out between the bus and one sink.
pub struct FanoutHub {
    bus: Arc<Bus>,
    translator: Translator,
    converters: Arc<ConverterRegistry>,
    sink: Arc<dyn Sink>,
    topics: Mutex<HashMap<String, TopicState>>,
    services: Mutex<HashMap<String, ServiceState>>,
    call_timeout: Duration,
}

impl FanoutHub {
    pub fn new(
        bus: Arc<Bus>,
        registry: Arc<SchemaRegistry>,
        converters: Arc<ConverterRegistry>,
        sink: Arc<dyn Sink>,
    ) -> Self {
        Self {
            bus,
            translator: Translator::new(registry),
            converters,
            sink,
            topics: Mutex::new(HashMap::new()),
            services: Mutex::new(HashMap::new()),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Override the service call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Adapter feeding discovery events into this hub.
    pub fn discovery_events(hub: &Arc<Self>) -> HubDiscovery {
        HubDiscovery {
            hub: Arc::clone(hub),
        }
    }

    // ---- discovery side -------------------------------------------------

    fn handle_topic_found(&self, topic: &str, entry: &Arc<SchemaEntry>) {
        {
            let mut topics = self.topics.lock();
            let state = topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicState::latent(entry.type_name(), true));
            state.discovered = true;
        }

        self.sink
            .on_channel_created(topic, entry.type_name(), entry.descriptor_set());

        if let Some((target_type, target_descriptor)) = self.converters.target(entry.type_name()) {
            self.sink.on_channel_created(
                &format!("{topic}{CONVERTED_SUFFIX}"),
                target_type,
                target_descriptor,
            );
        }
    }

    fn handle_topic_lost(&self, topic: &str) {
        let state = self.topics.lock().remove(topic);
        let Some(state) = state else { return };

        let had_converter = self.converters.has_converter(&state.type_name);
        // Dropping the state detaches any reader and writer from the bus.
        drop(state);

        self.sink.on_channel_closed(topic);
        if had_converter {
            self.sink
                .on_channel_closed(&format!("{topic}{CONVERTED_SUFFIX}"));
        }
    }

    fn handle_service_found(&self, service: &ServiceAdvertisement) {
        self.services.lock().insert(
            service.name.clone(),
            ServiceState {
                request: Arc::clone(&service.request),
                response: Arc::clone(&service.response),
                client: None,
            },
        );

        self.sink.on_service_created(
            &service.name,
            service.request.json_schema(),
            service.response.json_schema(),
        );
    }

    // ---- sink side ------------------------------------------------------

    /// External subscriber appeared on a channel. The first one attaches a
    /// bus reader.
    pub fn on_external_subscribe(&self, channel: &str) -> Result<(), HubError> {
        let (topic, type_name, needs_attach) = {
            let mut topics = self.topics.lock();
            let topic = resolve_base(&topics, channel)
                .ok_or_else(|| HubError::NotSubscribed(channel.to_string()))?;
            let state = topics.get_mut(&topic).expect("resolved topic present");
            state.subscribers += 1;
            let needs_attach = state.subscribers == 1 && state.reader.is_none();
            (topic, state.type_name.clone(), needs_attach)
        };

        if needs_attach {
            let reader = self.attach_reader(&topic, &type_name)?;
            let mut topics = self.topics.lock();
            match topics.get_mut(&topic) {
                Some(state) => state.reader = Some(reader),
                // Topic vanished while we attached; the reader detaches on
                // drop.
                None => {}
            }
        }

        Ok(())
    }

    /// External subscriber went away. Refcount zero detaches the reader and
    /// discards anything buffered.
    pub fn on_external_unsubscribe(&self, channel: &str) -> Result<(), HubError> {
        let _detached = {
            let mut topics = self.topics.lock();
            let topic = resolve_base(&topics, channel)
                .ok_or_else(|| HubError::NotSubscribed(channel.to_string()))?;
            let state = topics.get_mut(&topic).expect("resolved topic present");
            if state.subscribers == 0 {
                return Err(HubError::NotSubscribed(channel.to_string()));
            }
            state.subscribers -= 1;
            if state.subscribers == 0 {
                state.reader.take()
            } else {
                None
            }
        };
        Ok(())
    }

    /// Client-authored advertise: create (or reuse) a bus writer bound to
    /// the type.
    pub fn on_external_advertise(&self, topic: &str, type_name: &str) -> Result<(), HubError> {
        let entry = self.translator.registry().resolve(type_name)?;

        {
            let topics = self.topics.lock();
            if let Some(state) = topics.get(topic) {
                if state.writer.is_some() {
                    tracing::debug!("writer for {} already exists", topic);
                    return Ok(());
                }
            }
        }

        let writer =
            self.bus
                .create_writer(topic, type_name, Some(entry.descriptor_set().to_vec()))?;

        let mut topics = self.topics.lock();
        let state = topics
            .entry(topic.to_string())
            .or_insert_with(|| TopicState::latent(type_name, false));
        if state.writer.is_none() {
            state.writer = Some(Arc::new(writer));
        }
        Ok(())
    }

    /// Drop the writer for a client-authored topic.
    pub fn on_external_unadvertise(&self, topic: &str) -> Result<(), HubError> {
        let _writer = {
            let mut topics = self.topics.lock();
            let state = topics
                .get_mut(topic)
                .ok_or_else(|| HubError::NotAdvertised(topic.to_string()))?;
            let writer = state
                .writer
                .take()
                .ok_or_else(|| HubError::NotAdvertised(topic.to_string()))?;
            if !state.discovered && state.subscribers == 0 && state.reader.is_none() {
                topics.remove(topic);
            }
            writer
        };
        Ok(())
    }

    /// Publish a client-authored text payload onto the bus.
    pub fn on_external_publish(&self, topic: &str, text: &str) -> Result<(), HubError> {
        let (writer, type_name) = {
            let topics = self.topics.lock();
            let state = topics
                .get(topic)
                .ok_or_else(|| HubError::NotAdvertised(topic.to_string()))?;
            let writer = state
                .writer
                .clone()
                .ok_or_else(|| HubError::NotAdvertised(topic.to_string()))?;
            (writer, state.type_name.clone())
        };

        let bytes = self.translator.from_text(text, &type_name)?;
        writer.write(&bytes)?;
        Ok(())
    }

    /// Issue a blocking service call with text request/response.
    pub fn on_service_call(&self, name: &str, request_text: &str) -> Result<String, HubError> {
        let (client, request_type, response_type) = {
            let mut services = self.services.lock();
            let state = services
                .get_mut(name)
                .ok_or_else(|| HubError::CallFailed(format!("service {name} not available")))?;
            let client = Arc::clone(
                state
                    .client
                    .get_or_insert_with(|| Arc::new(self.bus.create_client(name))),
            );
            (
                client,
                state.request.type_name().to_string(),
                state.response.type_name().to_string(),
            )
        };

        let request = self.translator.from_text(request_text, &request_type)?;

        let response = client
            .call(&request, self.call_timeout)
            .map_err(|e| match e {
                BusError::Timeout => HubError::Timeout,
                other => HubError::CallFailed(other.to_string()),
            })?;

        self.translator
            .to_text(&response, &response_type)
            .map_err(|e| HubError::CallFailed(e.to_string()))
    }

    /// Parameter lookup; an empty name list returns everything.
    pub fn get_parameters(&self, names: &[String]) -> Vec<Parameter> {
        if names.is_empty() {
            return self.bus.list_parameters();
        }
        names
            .iter()
            .filter_map(|name| {
                let param = self.bus.get_parameter(name);
                if param.is_none() {
                    tracing::debug!("parameter {} not found", name);
                }
                param
            })
            .collect()
    }

    /// Apply parameter updates, echoing back the resulting values.
    pub fn set_parameters(&self, params: Vec<Parameter>) -> Vec<Parameter> {
        for param in &params {
            self.bus.set_parameter(&param.name, param.value.clone());
        }
        params
    }

    fn attach_reader(&self, topic: &str, type_name: &str) -> Result<cybus::Reader, HubError> {
        let translator = self.translator.clone();
        let converters = Arc::clone(&self.converters);
        let sink = Arc::clone(&self.sink);
        let channel = topic.to_string();
        let converted = format!("{topic}{CONVERTED_SUFFIX}");
        let type_name = type_name.to_string();

        let reader = self.bus.create_reader(topic, move |sample| {
            let canonical = match translator.to_canonical(&sample.payload, &type_name) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("dropping message on {}: {}", channel, e);
                    return;
                }
            };

            sink.on_message(&channel, &canonical);

            if converters.has_converter(&type_name) {
                match converters.convert(&canonical, &type_name) {
                    Ok(bytes) => sink.on_message(&converted, &bytes),
                    Err(e) => tracing::warn!("conversion failed on {}: {}", channel, e),
                }
            }
        })?;
        Ok(reader)
    }
}

/// Routes discovery events into a hub.
pub struct HubDiscovery {
    hub: Arc<FanoutHub>,
}

impl DiscoveryEvents for HubDiscovery {
    fn on_topic_found(&mut self, topic: &str, entry: &Arc<SchemaEntry>) {
        self.hub.handle_topic_found(topic, entry);
    }

    fn on_topic_lost(&mut self, topic: &str) {
        self.hub.handle_topic_lost(topic);
    }

    fn on_service_found(&mut self, service: &ServiceAdvertisement) {
        self.hub.handle_service_found(service);
    }
}

/// Map a sink channel name onto its base topic. A `<topic>/converted`
/// channel resolves to `<topic>`; both share the base topic's reader and
/// refcount.
fn resolve_base(topics: &HashMap<String, TopicState>, channel: &str) -> Option<String> {
    if topics.contains_key(channel) {
        return Some(channel.to_string());
    }
    channel
        .strip_suffix(CONVERTED_SUFFIX)
        .filter(|base| topics.contains_key(*base))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryEngine;
    use crate::services::ServiceTable;
    use crate::testutil;
    use cybus_schema::ConverterRegistryBuilder;

    #[derive(Debug, PartialEq)]
    enum SinkEvent {
        Created(String, String),
        Closed(String),
        Service(String),
        Message(String, Vec<u8>),
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<SinkEvent>>,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<SinkEvent> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    impl Sink for RecordingSink {
        fn on_channel_created(&self, topic: &str, schema_name: &str, _descriptor_set: &[u8]) {
            self.events
                .lock()
                .push(SinkEvent::Created(topic.into(), schema_name.into()));
        }

        fn on_channel_closed(&self, topic: &str) {
            self.events.lock().push(SinkEvent::Closed(topic.into()));
        }

        fn on_service_created(&self, name: &str, _req: &str, _resp: &str) {
            self.events.lock().push(SinkEvent::Service(name.into()));
        }

        fn on_message(&self, channel: &str, payload: &[u8]) {
            self.events
                .lock()
                .push(SinkEvent::Message(channel.into(), payload.to_vec()));
        }
    }

    struct Fixture {
        bus: Arc<Bus>,
        registry: Arc<SchemaRegistry>,
        sink: Arc<RecordingSink>,
        hub: Arc<FanoutHub>,
        engine: DiscoveryEngine,
    }

    fn fixture(converters: ConverterRegistry) -> Fixture {
        let bus = Bus::builder("test").build();
        let registry = Arc::new(testutil::registry());
        let sink = Arc::new(RecordingSink::default());
        let hub = Arc::new(FanoutHub::new(
            Arc::clone(&bus),
            Arc::clone(&registry),
            Arc::new(converters),
            Arc::clone(&sink) as Arc<dyn Sink>,
        ));
        let engine = DiscoveryEngine::new(
            Arc::clone(&bus),
            Arc::clone(&registry),
            ServiceTable::empty().with_binding(
                "/echo",
                testutil::TELEMETRY_TYPE,
                testutil::TELEMETRY_TYPE,
            ),
        );
        Fixture {
            bus,
            registry,
            sink,
            hub,
            engine,
        }
    }

    fn tick(fixture: &mut Fixture) {
        let mut events = FanoutHub::discovery_events(&fixture.hub);
        fixture.engine.poll_once(&mut events);
    }

    #[test]
    fn discovered_topic_creates_sink_channel() {
        let mut f = fixture(ConverterRegistry::empty());
        let _writer = testutil::telemetry_writer(&f.bus, "/t");

        tick(&mut f);

        assert_eq!(
            f.sink.take(),
            vec![SinkEvent::Created(
                "/t".into(),
                testutil::TELEMETRY_TYPE.into()
            )]
        );
    }

    #[test]
    fn subscribe_pumps_canonical_bytes() {
        let mut f = fixture(ConverterRegistry::empty());
        let writer = testutil::telemetry_writer(&f.bus, "/t");
        tick(&mut f);
        f.sink.take();

        f.hub.on_external_subscribe("/t").expect("subscribe");

        let wire = testutil::telemetry_bytes(&f.registry, "volt", 3.3);
        writer.write(&wire).expect("write");

        let events = f.sink.take();
        assert_eq!(events.len(), 1);
        match &events[0] {
            SinkEvent::Message(channel, payload) => {
                assert_eq!(channel, "/t");
                assert_eq!(payload, &wire); // canonical == wire for clean input
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unsubscribe_at_zero_detaches_reader() {
        let mut f = fixture(ConverterRegistry::empty());
        let writer = testutil::telemetry_writer(&f.bus, "/t");
        tick(&mut f);

        f.hub.on_external_subscribe("/t").expect("first");
        f.hub.on_external_subscribe("/t").expect("second");
        f.hub.on_external_unsubscribe("/t").expect("first off");

        // One subscriber remains; messages still flow.
        f.sink.take();
        writer
            .write(&testutil::telemetry_bytes(&f.registry, "a", 1.0))
            .expect("write");
        assert_eq!(f.sink.take().len(), 1);

        f.hub.on_external_unsubscribe("/t").expect("second off");
        writer
            .write(&testutil::telemetry_bytes(&f.registry, "b", 2.0))
            .expect("write");
        assert!(f.sink.take().is_empty());
    }

    #[test]
    fn subscribe_unknown_channel_fails() {
        let f = fixture(ConverterRegistry::empty());
        let err = f.hub.on_external_subscribe("/nope").unwrap_err();
        assert!(matches!(err, HubError::NotSubscribed(_)));

        let err = f.hub.on_external_unsubscribe("/nope").unwrap_err();
        assert!(matches!(err, HubError::NotSubscribed(_)));
    }

    #[test]
    fn converter_doubles_the_channel() {
        let registry = testutil::registry();
        let entry = registry.resolve(testutil::TELEMETRY_TYPE).expect("entry");
        let converters = ConverterRegistryBuilder::new()
            .register_identity(testutil::TELEMETRY_TYPE, &entry)
            .build();

        let mut f = fixture(converters);
        let writer = testutil::telemetry_writer(&f.bus, "/t");
        tick(&mut f);

        let created = f.sink.take();
        assert_eq!(created.len(), 2);
        assert_eq!(
            created[1],
            SinkEvent::Created("/t/converted".into(), testutil::TELEMETRY_TYPE.into())
        );

        // Subscribing through the converted name shares the base reader.
        f.hub.on_external_subscribe("/t/converted").expect("subscribe");
        writer
            .write(&testutil::telemetry_bytes(&f.registry, "x", 1.0))
            .expect("write");

        let events = f.sink.take();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SinkEvent::Message(c, _) if c == "/t"));
        assert!(matches!(&events[1], SinkEvent::Message(c, _) if c == "/t/converted"));
    }

    #[test]
    fn lost_topic_closes_channels_and_reader() {
        let mut f = fixture(ConverterRegistry::empty());
        let writer = testutil::telemetry_writer(&f.bus, "/t");
        tick(&mut f);
        f.hub.on_external_subscribe("/t").expect("subscribe");
        f.sink.take();

        drop(writer);
        tick(&mut f);

        assert_eq!(f.sink.take(), vec![SinkEvent::Closed("/t".into())]);
        let err = f.hub.on_external_subscribe("/t").unwrap_err();
        assert!(matches!(err, HubError::NotSubscribed(_)));
    }

    #[test]
    fn advertise_publish_roundtrip() {
        let f = fixture(ConverterRegistry::empty());

        f.hub
            .on_external_advertise("/cmd", testutil::TELEMETRY_TYPE)
            .expect("advertise");

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_cb = Arc::clone(&received);
        let _reader = f
            .bus
            .create_reader("/cmd", move |sample| {
                received_cb.lock().push(sample.payload.clone());
            })
            .expect("reader");

        f.hub
            .on_external_publish("/cmd", r#"{"name":"go","value":1.5}"#)
            .expect("publish");

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(
            received[0],
            testutil::telemetry_bytes(&f.registry, "go", 1.5)
        );
    }

    #[test]
    fn publish_without_advertise_fails() {
        let f = fixture(ConverterRegistry::empty());
        let err = f.hub.on_external_publish("/cmd", "{}").unwrap_err();
        assert!(matches!(err, HubError::NotAdvertised(_)));
    }

    #[test]
    fn publish_malformed_text_fails() {
        let f = fixture(ConverterRegistry::empty());
        f.hub
            .on_external_advertise("/cmd", testutil::TELEMETRY_TYPE)
            .expect("advertise");

        let err = f.hub.on_external_publish("/cmd", "{oops").unwrap_err();
        assert!(matches!(err, HubError::MalformedText(_)));
    }

    #[test]
    fn advertise_unknown_type_fails() {
        let f = fixture(ConverterRegistry::empty());
        let err = f
            .hub
            .on_external_advertise("/cmd", "nope.Missing")
            .unwrap_err();
        assert!(matches!(err, HubError::UnknownType(_)));
    }

    #[test]
    fn unadvertise_drops_writer() {
        let f = fixture(ConverterRegistry::empty());
        f.hub
            .on_external_advertise("/cmd", testutil::TELEMETRY_TYPE)
            .expect("advertise");
        assert_eq!(f.bus.publisher_count("/cmd"), 1);

        f.hub.on_external_unadvertise("/cmd").expect("unadvertise");
        assert_eq!(f.bus.publisher_count("/cmd"), 0);

        let err = f.hub.on_external_unadvertise("/cmd").unwrap_err();
        assert!(matches!(err, HubError::NotAdvertised(_)));
    }

    #[test]
    fn service_call_roundtrip() {
        let mut f = fixture(ConverterRegistry::empty());

        // Echo provider on the bus.
        let _service = f.bus.register_service("/echo", |req| Ok(req.to_vec()));
        tick(&mut f);
        assert!(f
            .sink
            .take()
            .contains(&SinkEvent::Service("/echo".into())));

        let response = f
            .hub
            .on_service_call("/echo", r#"{"name":"ping","value":7.0}"#)
            .expect("call");
        let value: serde_json::Value = serde_json::from_str(&response).expect("json");
        assert_eq!(value["name"], "ping");
        assert_eq!(value["value"], 7.0);
    }

    #[test]
    fn service_call_timeout_maps() {
        let mut f = fixture(ConverterRegistry::empty());
        let _service = f.bus.register_service("/echo", |req| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(req.to_vec())
        });
        tick(&mut f);

        let hub = FanoutHub::new(
            Arc::clone(&f.bus),
            Arc::clone(&f.registry),
            Arc::new(ConverterRegistry::empty()),
            Arc::clone(&f.sink) as Arc<dyn Sink>,
        )
        .with_call_timeout(Duration::from_millis(20));
        let hub = Arc::new(hub);

        // Re-route the service announcement into the short-timeout hub.
        let mut engine = DiscoveryEngine::new(
            Arc::clone(&f.bus),
            Arc::clone(&f.registry),
            ServiceTable::empty().with_binding(
                "/echo",
                testutil::TELEMETRY_TYPE,
                testutil::TELEMETRY_TYPE,
            ),
        );
        engine.poll_once(&mut FanoutHub::discovery_events(&hub));

        let err = hub.on_service_call("/echo", "{}").unwrap_err();
        assert!(matches!(err, HubError::Timeout));
    }

    #[test]
    fn unknown_service_call_fails() {
        let f = fixture(ConverterRegistry::empty());
        let err = f.hub.on_service_call("/ghost", "{}").unwrap_err();
        assert!(matches!(err, HubError::CallFailed(_)));
    }

    #[test]
    fn parameters_roundtrip() {
        let f = fixture(ConverterRegistry::empty());
        use cybus::ParameterValue;

        f.hub.set_parameters(vec![Parameter {
            name: "speed_limit".into(),
            value: ParameterValue::Double(2.5),
        }]);

        let all = f.hub.get_parameters(&[]);
        assert_eq!(all.len(), 1);

        let named = f.hub.get_parameters(&["speed_limit".into(), "missing".into()]);
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].value, ParameterValue::Double(2.5));
    }
}
