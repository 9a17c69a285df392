// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Time-faithful replay of MCAP files onto the bus.
//!
//! A single reader thread walks the file in log-time order and sleeps to
//! reproduce inter-message gaps, scaled by the speed factor. Pause advances
//! the wall-clock anchor while sleeping, so resumption continues on
//! schedule instead of bursting. A step request publishes exactly one
//! message and re-pauses. Speed factor 0 is step-only mode: playback starts
//! paused and every step publishes immediately.

use crate::filter::TopicFilter;
use crate::format::{message_stream, read_summary, FormatError, EXPECTED_ENCODING};
use cybus::Bus;
use cybus_schema::SchemaRegistry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Player configuration.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Input files, played in order.
    pub inputs: Vec<PathBuf>,

    /// Allow-list of topics (empty = all).
    pub allow: Vec<String>,

    /// Deny-list of topics; wins over the allow-list.
    pub deny: Vec<String>,

    /// Speed multiplier, >= 0. Zero means step-only.
    pub speed_factor: f64,

    /// Restart from the first file after the last one finishes.
    pub loop_playback: bool,

    /// Skip messages within this offset from the recording start.
    pub start_offset: Duration,
}

impl PlayerConfig {
    pub fn new(inputs: Vec<PathBuf>) -> Self {
        Self {
            inputs,
            allow: Vec::new(),
            deny: Vec::new(),
            speed_factor: 1.0,
            loop_playback: false,
            start_offset: Duration::ZERO,
        }
    }

    /// Set the speed factor.
    pub fn speed(mut self, factor: f64) -> Self {
        self.speed_factor = factor;
        self
    }

    /// Enable loop playback.
    pub fn loop_playback(mut self, enable: bool) -> Self {
        self.loop_playback = enable;
        self
    }

    /// Set the start offset.
    pub fn start_offset(mut self, offset: Duration) -> Self {
        self.start_offset = offset;
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
}

/// Player errors.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
}

/// Playback statistics.
#[derive(Debug, Clone, Default)]
pub struct PlaybackStats {
    /// Messages republished onto the bus.
    pub messages_played: u64,

    /// Messages skipped by filters or the start offset.
    pub messages_skipped: u64,

    /// Channels skipped because their schema encoding is unsupported.
    pub codec_mismatches: u64,

    /// Payload bytes republished.
    pub bytes_played: u64,

    /// Completed loops.
    pub loops_completed: u32,
}

/// Shared pause/step/termination state, set by the keyboard listener and
/// signal handlers, honored by the reader thread at every suspension point.
pub struct PlaybackControls {
    running: AtomicBool,
    paused: AtomicBool,
    step: AtomicBool,
}

impl PlaybackControls {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            step: AtomicBool::new(false),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request termination.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            tracing::debug!("playback paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            tracing::debug!("playback resumed");
        }
    }

    pub fn toggle_pause(&self) {
        if self.is_paused() {
            self.resume();
        } else {
            self.pause();
        }
    }

    /// Request a single-message step; implies pause.
    pub fn request_step(&self) {
        self.pause();
        self.step.store(true, Ordering::SeqCst);
    }

    fn take_step(&self) -> bool {
        self.step.swap(false, Ordering::SeqCst)
    }
}

/// MCAP-to-bus player.
pub struct Player {
    bus: Arc<Bus>,
    registry: Arc<SchemaRegistry>,
    config: PlayerConfig,
    controls: Arc<PlaybackControls>,
    stats: PlaybackStats,
}

impl Player {
    pub fn new(bus: Arc<Bus>, registry: Arc<SchemaRegistry>, config: PlayerConfig) -> Self {
        Self {
            bus,
            registry,
            config,
            controls: PlaybackControls::new(),
            stats: PlaybackStats::default(),
        }
    }

    /// Shared control state, for keyboard listeners and signal handlers.
    pub fn controls(&self) -> Arc<PlaybackControls> {
        Arc::clone(&self.controls)
    }

    /// Current statistics.
    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }

    /// Play all configured files, looping if requested. Returns final
    /// statistics once playback completes or is stopped.
    pub fn play(&mut self) -> Result<PlaybackStats, PlayerError> {
        for path in &self.config.inputs {
            if !path.exists() {
                return Err(PlayerError::FileNotFound(path.clone()));
            }
        }

        let inputs = self.config.inputs.clone();
        loop {
            for path in &inputs {
                if !self.controls.is_running() {
                    return Ok(self.stats.clone());
                }
                tracing::info!("playing {}", path.display());
                self.play_file(path)?;
            }

            if !(self.config.loop_playback && self.controls.is_running()) {
                break;
            }
            self.stats.loops_completed += 1;
            tracing::debug!("looping playback ({})", self.stats.loops_completed);
        }

        tracing::info!(
            "playback finished: {} messages",
            self.stats.messages_played
        );
        Ok(self.stats.clone())
    }

    fn play_file(&mut self, path: &Path) -> Result<(), PlayerError> {
        let buf = std::fs::read(path)?;
        let summary = read_summary(&buf)?;

        tracing::info!(
            "{}: {} messages, {:.1}s, {} channels",
            path.display(),
            summary.message_count,
            (summary.message_end_time.saturating_sub(summary.message_start_time)) as f64 / 1e9,
            summary.channels.len()
        );

        let filter = TopicFilter::new(self.config.allow.clone(), self.config.deny.clone());
        let writers = self.prepare_writers(&summary.channels, &filter);

        let step_only = self.config.speed_factor == 0.0;
        if step_only {
            self.controls.pause();
        }

        let start_offset_ns = self.config.start_offset.as_nanos() as u64;
        let mut first_log_time: Option<u64> = None;
        let mut wall_start = crate::now_nanos();
        let mut offset_applied = start_offset_ns == 0;

        for result in message_stream(&buf)? {
            if !self.controls.is_running() {
                break;
            }
            let message = result.map_err(FormatError::from)?;

            let Some(writer) = writers.get(message.channel.topic.as_str()) else {
                self.stats.messages_skipped += 1;
                continue;
            };

            let first = *first_log_time.get_or_insert(message.log_time);
            let relative = message.log_time.saturating_sub(first);

            if relative < start_offset_ns {
                self.stats.messages_skipped += 1;
                continue;
            }
            if !offset_applied {
                // First message past the offset re-anchors the schedule.
                wall_start = crate::now_nanos();
                offset_applied = true;
                tracing::info!(
                    "starting playback from {:.1}s",
                    self.config.start_offset.as_secs_f64()
                );
            }

            while self.controls.is_paused() && self.controls.is_running() {
                if self.controls.take_step() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(100));
                // Keep the schedule anchored so resumption does not burst.
                wall_start += 100_000_000;
            }
            if !self.controls.is_running() {
                break;
            }

            if self.config.speed_factor > 0.0 {
                let scaled =
                    ((relative - start_offset_ns) as f64 / self.config.speed_factor) as u64;
                let target = wall_start + scaled;
                let now = crate::now_nanos();
                if target > now {
                    std::thread::sleep(Duration::from_nanos(target - now));
                }
            }

            if let Err(e) = writer.write(&message.data) {
                tracing::warn!("publish failed on {}: {}", message.channel.topic, e);
                continue;
            }
            self.stats.messages_played += 1;
            self.stats.bytes_played += message.data.len() as u64;
        }

        Ok(())
    }

    /// Register schemas into the registry and create one bus writer per
    /// passing channel. Codec mismatches are counted, not fatal.
    fn prepare_writers(
        &mut self,
        channels: &[crate::format::ChannelSummary],
        filter: &TopicFilter,
    ) -> HashMap<String, cybus::Writer> {
        let mut writers = HashMap::new();

        for channel in channels {
            if !filter.matches(&channel.topic) {
                tracing::debug!("skipping filtered channel {}", channel.topic);
                continue;
            }
            if channel.schema_encoding != EXPECTED_ENCODING {
                self.stats.codec_mismatches += 1;
                tracing::warn!(
                    "skipping channel {}: unsupported encoding {}",
                    channel.topic,
                    channel.schema_encoding
                );
                continue;
            }

            if let Err(e) = self
                .registry
                .register(&channel.schema_name, &channel.descriptor_set)
            {
                tracing::warn!(
                    "skipping channel {}: descriptor rejected ({})",
                    channel.topic,
                    e
                );
                continue;
            }

            match self.bus.create_writer(
                &channel.topic,
                &channel.schema_name,
                Some(channel.descriptor_set.clone()),
            ) {
                Ok(writer) => {
                    tracing::debug!(
                        "replaying {} [{}]",
                        channel.topic,
                        channel.schema_name
                    );
                    writers.insert(channel.topic.clone(), writer);
                }
                Err(e) => tracing::warn!("cannot advertise {}: {}", channel.topic, e),
            }
        }

        writers
    }
}
