// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Segmented bus-to-MCAP recorder.
//!
//! One discovery thread attaches bus readers to the filtered topic set;
//! reader callbacks push into the bounded queue; one writer thread drains
//! the queue into the current segment file. Segment rotation is wall-clock
//! driven and resets the per-file schema/channel tables. Shutdown drains
//! the queue before the trailer is written.

use crate::filter::TopicFilter;
use crate::format::{FormatError, SegmentWriter};
use crate::queue::{MessageQueue, QueuedMessage};
use cybus::Bus;
use cybus_bridge::discovery::{DiscoveryEngine, DiscoveryEvents, ServiceAdvertisement, RECORD_PERIOD};
use cybus_bridge::services::ServiceTable;
use cybus_schema::{SchemaEntry, SchemaRegistry};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

/// Recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Output file stem. Empty means derive one from the wall clock.
    pub output_stem: String,

    /// Allow-list of topics (empty = all).
    pub allow: Vec<String>,

    /// Deny-list of topics; wins over the allow-list.
    pub deny: Vec<String>,

    /// Topology poll period.
    pub discovery_interval: Duration,

    /// Segment rotation interval. Zero records into a single file.
    pub segment_interval: Duration,

    /// Bounded queue capacity between readers and the writer thread.
    pub queue_capacity: usize,

    /// Chunk compression written into the file.
    pub compression: Option<mcap::Compression>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_stem: String::new(),
            allow: Vec::new(),
            deny: Vec::new(),
            discovery_interval: RECORD_PERIOD,
            segment_interval: Duration::ZERO,
            queue_capacity: 1024,
            compression: Some(mcap::Compression::Zstd),
        }
    }
}

impl RecorderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output stem.
    pub fn output_stem(mut self, stem: impl Into<String>) -> Self {
        self.output_stem = stem.into();
        self
    }

    /// Set the allow-list.
    pub fn allow(mut self, topics: Vec<String>) -> Self {
        self.allow = topics;
        self
    }

    /// Set the deny-list.
    pub fn deny(mut self, topics: Vec<String>) -> Self {
        self.deny = topics;
        self
    }

    /// Set the discovery interval.
    pub fn discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = interval;
        self
    }

    /// Set the segment interval (zero = single file).
    pub fn segment_interval(mut self, interval: Duration) -> Self {
        self.segment_interval = interval;
        self
    }

    /// Set the queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the compression codec.
    pub fn compression(mut self, compression: Option<mcap::Compression>) -> Self {
        self.compression = compression;
        self
    }
}

/// Recorder errors.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("already recording")]
    AlreadyRecording,

    #[error("not recording")]
    NotRecording,
}

/// Recording statistics.
#[derive(Debug, Clone, Default)]
pub struct RecordingStats {
    /// Messages written to disk.
    pub message_count: u64,

    /// Payload bytes written.
    pub byte_count: u64,

    /// Distinct topics written.
    pub topic_count: usize,

    /// Index of the current segment file.
    pub segment_index: u32,

    /// Per-topic queue drop counters.
    pub dropped: HashMap<String, u64>,
}

/// Clonable handle that lets a signal handler request shutdown.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
    queue: Arc<MessageQueue>,
}

impl StopHandle {
    /// Clear the running flag and wake any blocked waiter.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.queue.wake();
    }
}

/// Bus-to-MCAP recorder.
pub struct Recorder {
    bus: Arc<Bus>,
    registry: Arc<SchemaRegistry>,
    config: RecorderConfig,
    running: Arc<AtomicBool>,
    queue: Arc<MessageQueue>,
    stats: Arc<Mutex<RecordingStats>>,
    fatal: Arc<Mutex<Option<FormatError>>>,
    discovery: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Recorder {
    pub fn new(bus: Arc<Bus>, registry: Arc<SchemaRegistry>, config: RecorderConfig) -> Self {
        let queue = Arc::new(MessageQueue::new(config.queue_capacity));
        Self {
            bus,
            registry,
            config,
            running: Arc::new(AtomicBool::new(false)),
            queue,
            stats: Arc::new(Mutex::new(RecordingStats::default())),
            fatal: Arc::new(Mutex::new(None)),
            discovery: None,
            writer: None,
        }
    }

    /// Handle for signal-driven teardown.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
            queue: Arc::clone(&self.queue),
        }
    }

    /// True while the recording threads are meant to run.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the discovery and writer threads.
    pub fn start(&mut self) -> Result<(), RecorderError> {
        if self.writer.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        self.running.store(true, Ordering::SeqCst);

        let stem = resolve_stem(&self.config.output_stem);
        tracing::info!("recording to stem {}", stem);

        let writer_task = WriterTask {
            registry: Arc::clone(&self.registry),
            queue: Arc::clone(&self.queue),
            running: Arc::clone(&self.running),
            stats: Arc::clone(&self.stats),
            fatal: Arc::clone(&self.fatal),
            stem,
            segment_interval: self.config.segment_interval,
            compression: self.config.compression,
        };
        self.writer = Some(
            std::thread::Builder::new()
                .name("record-writer".into())
                .spawn(move || writer_task.run())
                .expect("spawn writer thread"),
        );

        let events = ReaderEvents {
            bus: Arc::clone(&self.bus),
            queue: Arc::clone(&self.queue),
            filter: TopicFilter::new(self.config.allow.clone(), self.config.deny.clone()),
            running: Arc::clone(&self.running),
            readers: HashMap::new(),
            filtered_logged: HashSet::new(),
        };
        let engine = DiscoveryEngine::new(
            Arc::clone(&self.bus),
            Arc::clone(&self.registry),
            ServiceTable::empty(),
        );
        self.discovery = Some(engine.spawn(
            events,
            self.config.discovery_interval,
            Arc::clone(&self.running),
        ));

        Ok(())
    }

    /// Stop, drain the queue, and close the current segment.
    pub fn stop(&mut self) -> Result<RecordingStats, RecorderError> {
        let writer = self.writer.take().ok_or(RecorderError::NotRecording)?;

        self.running.store(false, Ordering::SeqCst);
        self.queue.wake();

        if let Some(discovery) = self.discovery.take() {
            let _ = discovery.join();
        }
        let _ = writer.join();

        let stats = self.stats();
        if let Some(err) = self.fatal.lock().take() {
            return Err(err.into());
        }

        tracing::info!(
            "recording stopped: {} messages, {} topics",
            stats.message_count,
            stats.topic_count
        );
        Ok(stats)
    }

    /// Current statistics, including queue drop counters.
    pub fn stats(&self) -> RecordingStats {
        let mut stats = self.stats.lock().clone();
        stats.dropped = self.queue.drop_counts();
        stats
    }
}

fn resolve_stem(stem: &str) -> String {
    if stem.is_empty() {
        chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
    } else {
        stem.to_string()
    }
}

/// Discovery events: attach one bus reader per passing topic.
struct ReaderEvents {
    bus: Arc<Bus>,
    queue: Arc<MessageQueue>,
    filter: TopicFilter,
    running: Arc<AtomicBool>,
    readers: HashMap<String, cybus::Reader>,
    filtered_logged: HashSet<String>,
}

impl DiscoveryEvents for ReaderEvents {
    fn on_topic_found(&mut self, topic: &str, entry: &Arc<SchemaEntry>) {
        if !self.filter.matches(topic) {
            if self.filtered_logged.insert(topic.to_string()) {
                tracing::debug!("skipping filtered topic {}", topic);
            }
            return;
        }
        if self.readers.contains_key(topic) {
            return;
        }

        let queue = Arc::clone(&self.queue);
        let running = Arc::clone(&self.running);
        let type_name = entry.type_name().to_string();

        match self.bus.create_reader(topic, move |sample| {
            if !running.load(Ordering::Relaxed) {
                return;
            }
            queue.push(QueuedMessage {
                topic: sample.topic.clone(),
                type_name: type_name.clone(),
                publish_time_ns: sample.publish_time_ns,
                payload: sample.payload.clone(),
            });
        }) {
            Ok(reader) => {
                tracing::info!("recording topic {}", topic);
                self.readers.insert(topic.to_string(), reader);
            }
            Err(e) => tracing::warn!("failed to attach reader for {}: {}", topic, e),
        }
    }

    fn on_topic_lost(&mut self, topic: &str) {
        if self.readers.remove(topic).is_some() {
            tracing::info!("stopped recording topic {}", topic);
        }
    }

    fn on_service_found(&mut self, _service: &ServiceAdvertisement) {}
}

/// The single consumer of the message queue.
struct WriterTask {
    registry: Arc<SchemaRegistry>,
    queue: Arc<MessageQueue>,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<RecordingStats>>,
    fatal: Arc<Mutex<Option<FormatError>>>,
    stem: String,
    segment_interval: Duration,
    compression: Option<mcap::Compression>,
}

impl WriterTask {
    fn run(mut self) {
        if let Err(e) = self.run_inner() {
            tracing::error!("recording failed: {}", e);
            *self.fatal.lock() = Some(e);
            self.running.store(false, Ordering::SeqCst);
        }
    }

    fn run_inner(&mut self) -> Result<(), FormatError> {
        let mut segment_index: u32 = 0;
        let mut writer = Some(SegmentWriter::create(
            self.segment_path(segment_index),
            self.compression,
        )?);
        let mut topics: HashSet<String> = HashSet::new();

        loop {
            if !self.running.load(Ordering::SeqCst) && self.queue.is_empty() {
                break;
            }

            if !self.segment_interval.is_zero() {
                let due = writer
                    .as_ref()
                    .map(|w| w.age() >= self.segment_interval)
                    .unwrap_or(false);
                if due {
                    if let Some(old) = writer.take() {
                        old.finish()?;
                    }
                    segment_index += 1;
                    writer = Some(SegmentWriter::create(
                        self.segment_path(segment_index),
                        self.compression,
                    )?);
                    self.stats.lock().segment_index = segment_index;
                }
            }

            let Some(message) = self.queue.pop_timeout(Duration::from_millis(100)) else {
                continue;
            };

            // Unresolvable types are logged once by the registry and the
            // message skipped; they never tear the session down.
            let Ok(entry) = self.registry.resolve(&message.type_name) else {
                continue;
            };

            let segment = writer.as_mut().expect("segment writer open");
            segment.write_message(
                &message.topic,
                &message.type_name,
                entry.descriptor_set(),
                message.publish_time_ns,
                crate::now_nanos(),
                &message.payload,
            )?;

            let mut stats = self.stats.lock();
            stats.message_count += 1;
            stats.byte_count += message.payload.len() as u64;
            if topics.insert(message.topic.clone()) {
                stats.topic_count = topics.len();
            }
        }

        if let Some(writer) = writer.take() {
            writer.finish()?;
        }
        Ok(())
    }

    fn segment_path(&self, index: u32) -> PathBuf {
        if self.segment_interval.is_zero() {
            PathBuf::from(format!("{}.mcap", self.stem))
        } else {
            PathBuf::from(format!("{}_{}.mcap", self.stem, index))
        }
    }
}
