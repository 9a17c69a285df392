// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Conversion between the native `.record` container and MCAP.
//!
//! Schema payloads move verbatim: both containers carry serialized
//! descriptor sets. Only `protobuf`-encoded MCAP channels convert back to
//! `.record`; others are skipped with a warning.

use crate::format::record::{RecordReader, RecordWriter};
use crate::format::{message_stream, read_summary, FormatError, SegmentWriter, EXPECTED_ENCODING};
use std::collections::HashSet;
use std::path::Path;

/// Outcome of one conversion pass.
#[derive(Debug, Clone, Default)]
pub struct ConvertStats {
    /// Messages written to the output.
    pub message_count: u64,

    /// Channels skipped because their schema encoding is unsupported.
    pub codec_mismatches: u64,
}

/// Convert a native `.record` file to MCAP.
pub fn record_to_mcap(input: &Path, output: &Path) -> Result<ConvertStats, FormatError> {
    let mut reader = RecordReader::open(input)?;
    let mut writer = SegmentWriter::create(output, Some(mcap::Compression::Zstd))?;

    let mut stats = ConvertStats::default();
    while let Some(message) = reader.next_message()? {
        let channel = reader.channel(message.channel_id).ok_or_else(|| {
            FormatError::InvalidFormat(format!("unknown channel {}", message.channel_id))
        })?;

        // The native container stores one time per message; it becomes
        // both publish and log time.
        writer.write_message(
            &channel.topic,
            &channel.type_name,
            &channel.descriptor_set,
            message.time_ns,
            message.time_ns,
            &message.payload,
        )?;
        stats.message_count += 1;
    }

    writer.finish()?;
    tracing::info!(
        "converted {} -> {} ({} messages)",
        input.display(),
        output.display(),
        stats.message_count
    );
    Ok(stats)
}

/// Convert an MCAP file to the native `.record` container. Channels under
/// a foreign encoding are counted and skipped.
pub fn mcap_to_record(input: &Path, output: &Path) -> Result<ConvertStats, FormatError> {
    let buf = std::fs::read(input)?;
    let summary = read_summary(&buf)?;

    let mut writer = RecordWriter::create(output)?;
    let mut registered = HashSet::new();
    let mut stats = ConvertStats::default();

    for channel in &summary.channels {
        if channel.schema_encoding != EXPECTED_ENCODING {
            stats.codec_mismatches += 1;
            tracing::warn!(
                "skipping channel {}: unsupported encoding {}",
                channel.topic,
                channel.schema_encoding
            );
            continue;
        }
        writer.add_channel(&channel.topic, &channel.schema_name, &channel.descriptor_set)?;
        registered.insert(channel.topic.clone());
    }

    for result in message_stream(&buf)? {
        let message = result.map_err(FormatError::from)?;
        if !registered.contains(message.channel.topic.as_str()) {
            continue;
        }
        writer.write_message(&message.channel.topic, message.log_time, &message.data)?;
        stats.message_count += 1;
    }

    writer.finish()?;
    tracing::info!(
        "converted {} -> {} ({} messages)",
        input.display(),
        output.display(),
        stats.message_count
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_record_fixture(path: &Path) {
        let mut writer = RecordWriter::create(path).expect("create");
        writer.add_channel("/a", "demo.A", b"desc-a").expect("channel a");
        writer.add_channel("/b", "demo.B", b"desc-b").expect("channel b");
        for i in 0..10u64 {
            let topic = if i % 2 == 0 { "/a" } else { "/b" };
            writer
                .write_message(topic, i * 1_000, &[i as u8; 8])
                .expect("message");
        }
        writer.finish().expect("finish");
    }

    #[test]
    fn record_to_mcap_preserves_messages() {
        let dir = tempdir().expect("tempdir");
        let record_path = dir.path().join("in.record");
        let mcap_path = dir.path().join("out.mcap");
        write_record_fixture(&record_path);

        let stats = record_to_mcap(&record_path, &mcap_path).expect("convert");
        assert_eq!(stats.message_count, 10);
        assert_eq!(stats.codec_mismatches, 0);

        let buf = std::fs::read(&mcap_path).expect("read");
        let summary = read_summary(&buf).expect("summary");
        assert_eq!(summary.message_count, 10);
        assert_eq!(summary.channels.len(), 2);
        assert_eq!(summary.message_start_time, 0);
        assert_eq!(summary.message_end_time, 9_000);

        let channel_a = summary
            .channels
            .iter()
            .find(|c| c.topic == "/a")
            .expect("/a");
        assert_eq!(channel_a.schema_name, "demo.A");
        assert_eq!(channel_a.descriptor_set, b"desc-a");
    }

    #[test]
    fn roundtrip_through_both_containers() {
        let dir = tempdir().expect("tempdir");
        let record_path = dir.path().join("in.record");
        let mcap_path = dir.path().join("mid.mcap");
        let back_path = dir.path().join("back.record");
        write_record_fixture(&record_path);

        record_to_mcap(&record_path, &mcap_path).expect("to mcap");
        let stats = mcap_to_record(&mcap_path, &back_path).expect("back to record");
        assert_eq!(stats.message_count, 10);

        // Replay both native files and compare the streams.
        let collect = |path: &Path| {
            let mut reader = RecordReader::open(path).expect("open");
            let mut messages = Vec::new();
            while let Some(msg) = reader.next_message().expect("next") {
                let channel = reader.channel(msg.channel_id).expect("channel");
                messages.push((channel.topic.clone(), msg.time_ns, msg.payload));
            }
            messages
        };

        assert_eq!(collect(&record_path), collect(&back_path));
    }

    #[test]
    fn non_protobuf_channels_are_skipped() {
        let dir = tempdir().expect("tempdir");
        let mcap_path = dir.path().join("mixed.mcap");
        let record_path = dir.path().join("out.record");

        // Hand-build an MCAP with one protobuf and one JSON channel.
        {
            use std::borrow::Cow;
            use std::io::BufWriter;

            let file = std::fs::File::create(&mcap_path).expect("create");
            let mut writer = mcap::WriteOptions::new()
                .compression(None)
                .create(BufWriter::new(file))
                .expect("writer");

            for (topic, encoding) in [("/ok", "protobuf"), ("/json", "jsonschema")] {
                let channel = mcap::Channel {
                    topic: topic.to_string(),
                    schema: Some(std::sync::Arc::new(mcap::Schema {
                        name: "demo.T".into(),
                        encoding: encoding.into(),
                        data: Cow::Owned(b"d".to_vec()),
                    })),
                    message_encoding: encoding.to_string(),
                    metadata: Default::default(),
                };
                let id = writer.add_channel(&channel).expect("channel");
                writer
                    .write_to_known_channel(
                        &mcap::records::MessageHeader {
                            channel_id: id,
                            sequence: 0,
                            log_time: 1,
                            publish_time: 1,
                        },
                        b"payload",
                    )
                    .expect("message");
            }
            writer.finish().expect("finish");
        }

        let stats = mcap_to_record(&mcap_path, &record_path).expect("convert");
        assert_eq!(stats.message_count, 1);
        assert_eq!(stats.codec_mismatches, 1);

        let mut reader = RecordReader::open(&record_path).expect("open");
        let msg = reader.next_message().expect("next").expect("one message");
        let channel = reader.channel(msg.channel_id).expect("channel");
        assert_eq!(channel.topic, "/ok");
        assert!(reader.next_message().expect("end").is_none());
    }
}
