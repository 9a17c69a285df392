// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MCAP reading and writing.
//!
//! The writer keeps per-file schema and channel tables: one schema record
//! per type, one channel record per topic, reset on segment rotation. The
//! reader prefers the file's summary section and falls back to a full scan
//! when the summary is missing or unreadable.

use super::FormatError;
use mcap::records::MessageHeader;
use mcap::{Channel, Schema};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// One MCAP file being written.
pub struct SegmentWriter {
    writer: mcap::Writer<'static, BufWriter<File>>,
    schemas: HashMap<String, Arc<Schema<'static>>>,
    channels: HashMap<String, u16>,
    path: PathBuf,
    opened_at: Instant,
    message_count: u64,
    byte_count: u64,
}

impl SegmentWriter {
    /// Create the file and write the MCAP preamble.
    pub fn create<P: AsRef<Path>>(
        path: P,
        compression: Option<mcap::Compression>,
    ) -> Result<Self, FormatError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let writer = mcap::WriteOptions::new()
            .compression(compression)
            .create(BufWriter::new(file))?;

        tracing::info!("segment opened: {}", path.display());

        Ok(Self {
            writer,
            schemas: HashMap::new(),
            channels: HashMap::new(),
            path,
            opened_at: Instant::now(),
            message_count: 0,
            byte_count: 0,
        })
    }

    /// Write one message, creating the schema and channel records on first
    /// use of the type/topic within this file.
    pub fn write_message(
        &mut self,
        topic: &str,
        type_name: &str,
        descriptor_set: &[u8],
        publish_time: u64,
        log_time: u64,
        payload: &[u8],
    ) -> Result<(), FormatError> {
        let channel_id = match self.channels.get(topic) {
            Some(&id) => id,
            None => {
                let schema = self
                    .schemas
                    .entry(type_name.to_string())
                    .or_insert_with(|| {
                        Arc::new(Schema {
                            name: type_name.to_string(),
                            encoding: super::EXPECTED_ENCODING.to_string(),
                            data: Cow::Owned(descriptor_set.to_vec()),
                        })
                    })
                    .clone();

                let channel = Channel {
                    topic: topic.to_string(),
                    schema: Some(schema),
                    message_encoding: super::EXPECTED_ENCODING.to_string(),
                    metadata: Default::default(),
                };
                let id = self.writer.add_channel(&channel)?;
                self.channels.insert(topic.to_string(), id);
                id
            }
        };

        self.writer.write_to_known_channel(
            &MessageHeader {
                channel_id,
                sequence: 0,
                log_time,
                publish_time,
            },
            payload,
        )?;

        self.message_count += 1;
        self.byte_count += payload.len() as u64;
        Ok(())
    }

    /// Close the file, writing the summary section and trailing magic. A
    /// file that never saw `finish` reads back as corrupt.
    pub fn finish(mut self) -> Result<(), FormatError> {
        self.writer.finish()?;
        tracing::info!(
            "segment closed: {} ({} messages)",
            self.path.display(),
            self.message_count
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wall time this segment has been open.
    pub fn age(&self) -> std::time::Duration {
        self.opened_at.elapsed()
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }
}

/// One channel as read back from a file.
#[derive(Debug, Clone)]
pub struct ChannelSummary {
    pub topic: String,
    pub schema_name: String,
    pub schema_encoding: String,
    pub descriptor_set: Vec<u8>,
}

/// What the player needs to know before replaying a file.
#[derive(Debug, Clone, Default)]
pub struct FileSummary {
    pub channels: Vec<ChannelSummary>,
    pub message_start_time: u64,
    pub message_end_time: u64,
    pub message_count: u64,
}

/// Read the file's summary section; fall back to a scan pass when it is
/// absent or unreadable.
pub fn read_summary(buf: &[u8]) -> Result<FileSummary, FormatError> {
    match mcap::Summary::read(buf) {
        Ok(Some(summary)) => {
            if let Some(stats) = &summary.stats {
                let mut ids: Vec<&u16> = summary.channels.keys().collect();
                ids.sort();
                let channels = ids
                    .into_iter()
                    .filter_map(|id| channel_summary(&summary.channels[id]))
                    .collect();
                return Ok(FileSummary {
                    channels,
                    message_start_time: stats.message_start_time,
                    message_end_time: stats.message_end_time,
                    message_count: stats.message_count,
                });
            }
            scan_summary(buf)
        }
        Ok(None) => scan_summary(buf),
        Err(e) => {
            tracing::warn!("summary unreadable ({}), falling back to scan", e);
            scan_summary(buf)
        }
    }
}

/// Iterate all messages in file order.
pub fn message_stream(buf: &[u8]) -> Result<mcap::MessageStream<'_>, FormatError> {
    Ok(mcap::MessageStream::new(buf)?)
}

fn channel_summary(channel: &Channel) -> Option<ChannelSummary> {
    let Some(schema) = &channel.schema else {
        tracing::warn!("channel {} has no schema, skipping", channel.topic);
        return None;
    };
    Some(ChannelSummary {
        topic: channel.topic.clone(),
        schema_name: schema.name.clone(),
        schema_encoding: schema.encoding.clone(),
        descriptor_set: schema.data.to_vec(),
    })
}

fn scan_summary(buf: &[u8]) -> Result<FileSummary, FormatError> {
    let mut summary = FileSummary::default();
    let mut seen_topics = std::collections::HashSet::new();
    let mut start = u64::MAX;

    for result in mcap::MessageStream::new(buf)? {
        let message = result?;
        if seen_topics.insert(message.channel.topic.clone()) {
            if let Some(channel) = channel_summary(&message.channel) {
                summary.channels.push(channel);
            }
        }
        start = start.min(message.log_time);
        summary.message_end_time = summary.message_end_time.max(message.log_time);
        summary.message_count += 1;
    }

    if summary.message_count > 0 {
        summary.message_start_time = start;
    }
    Ok(summary)
}
