// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Native `.record` container.
//!
//! # Format Overview
//!
//! ```text
//! +--------------------------------------------------------+
//! |  Magic (8) | Version (4)                                |
//! +--------------------------------------------------------+
//! |  Record stream, interleaved:                            |
//! |    0x01 channel: id (2) | topic | type | descriptor     |
//! |    0x02 message: id (2) | time_ns (8) | payload         |
//! +--------------------------------------------------------+
//! |  0xFF footer: message_count (8) | CRC32 (4) | Magic (8) |
//! +--------------------------------------------------------+
//! ```
//!
//! Channel records always precede the messages that reference them. The
//! footer carries a CRC32 over every preceding record; a file without a
//! footer was not closed cleanly and is rejected.

use super::FormatError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

/// Magic bytes: "CYREC\0\0\0"
pub const MAGIC: [u8; 8] = *b"CYREC\x00\x00\x00";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

const TAG_CHANNEL: u8 = 0x01;
const TAG_MESSAGE: u8 = 0x02;
const TAG_FOOTER: u8 = 0xFF;

/// A channel table entry.
#[derive(Debug, Clone)]
pub struct RecordChannel {
    pub topic: String,
    pub type_name: String,
    pub descriptor_set: Vec<u8>,
}

/// One message record.
#[derive(Debug, Clone)]
pub struct RecordMessage {
    pub channel_id: u16,
    pub time_ns: u64,
    pub payload: Vec<u8>,
}

/// Streaming `.record` writer.
pub struct RecordWriter {
    writer: BufWriter<File>,
    channels: HashMap<String, u16>,
    hasher: crc32fast::Hasher,
    message_count: u64,
}

impl RecordWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, FormatError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(&MAGIC)?;
        writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;

        Ok(Self {
            writer,
            channels: HashMap::new(),
            hasher: crc32fast::Hasher::new(),
            message_count: 0,
        })
    }

    /// Register a channel; returns its id. Re-registering a topic returns
    /// the existing id.
    pub fn add_channel(
        &mut self,
        topic: &str,
        type_name: &str,
        descriptor_set: &[u8],
    ) -> Result<u16, FormatError> {
        if let Some(&id) = self.channels.get(topic) {
            return Ok(id);
        }

        let id = self.channels.len() as u16;

        let mut record = Vec::new();
        record.push(TAG_CHANNEL);
        record.write_u16::<LittleEndian>(id)?;
        record.write_u16::<LittleEndian>(topic.len() as u16)?;
        record.write_u16::<LittleEndian>(type_name.len() as u16)?;
        record.write_u32::<LittleEndian>(descriptor_set.len() as u32)?;
        record.extend_from_slice(topic.as_bytes());
        record.extend_from_slice(type_name.as_bytes());
        record.extend_from_slice(descriptor_set);

        self.emit(&record)?;
        self.channels.insert(topic.to_string(), id);
        Ok(id)
    }

    /// Append a message for a previously registered topic.
    pub fn write_message(
        &mut self,
        topic: &str,
        time_ns: u64,
        payload: &[u8],
    ) -> Result<(), FormatError> {
        let &id = self.channels.get(topic).ok_or_else(|| {
            FormatError::InvalidFormat(format!("message for unregistered channel {topic}"))
        })?;

        let mut record = Vec::with_capacity(15 + payload.len());
        record.push(TAG_MESSAGE);
        record.write_u16::<LittleEndian>(id)?;
        record.write_u64::<LittleEndian>(time_ns)?;
        record.write_u32::<LittleEndian>(payload.len() as u32)?;
        record.extend_from_slice(payload);

        self.emit(&record)?;
        self.message_count += 1;
        Ok(())
    }

    /// Write the footer and flush. A file missing the footer is rejected
    /// by the reader.
    pub fn finish(mut self) -> Result<(), FormatError> {
        let crc = self.hasher.clone().finalize();
        self.writer.write_u8(TAG_FOOTER)?;
        self.writer.write_u64::<LittleEndian>(self.message_count)?;
        self.writer.write_u32::<LittleEndian>(crc)?;
        self.writer.write_all(&MAGIC)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    fn emit(&mut self, record: &[u8]) -> Result<(), FormatError> {
        self.hasher.update(record);
        self.writer.write_all(record)?;
        Ok(())
    }
}

/// Streaming `.record` reader.
pub struct RecordReader {
    reader: BufReader<File>,
    channels: HashMap<u16, Arc<RecordChannel>>,
    hasher: crc32fast::Hasher,
    messages_read: u64,
    declared_count: Option<u64>,
    done: bool,
}

impl RecordReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FormatError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(FormatError::InvalidFormat("bad magic".into()));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(FormatError::VersionMismatch {
                expected: FORMAT_VERSION,
                got: version,
            });
        }

        Ok(Self {
            reader,
            channels: HashMap::new(),
            hasher: crc32fast::Hasher::new(),
            messages_read: 0,
            declared_count: None,
            done: false,
        })
    }

    /// Next message record, reading through any interleaved channel
    /// records. `Ok(None)` after a verified footer.
    pub fn next_message(&mut self) -> Result<Option<RecordMessage>, FormatError> {
        while !self.done {
            let tag = match self.reader.read_u8() {
                Ok(tag) => tag,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(FormatError::InvalidFormat(
                        "missing footer, file was not closed cleanly".into(),
                    ));
                }
                Err(e) => return Err(e.into()),
            };

            match tag {
                TAG_CHANNEL => self.read_channel()?,
                TAG_MESSAGE => return Ok(Some(self.read_message()?)),
                TAG_FOOTER => {
                    self.read_footer()?;
                    self.done = true;
                }
                other => {
                    return Err(FormatError::InvalidFormat(format!(
                        "unknown record tag 0x{other:02x}"
                    )));
                }
            }
        }
        Ok(None)
    }

    /// Channel table entry by id, once its record has been read.
    pub fn channel(&self, id: u16) -> Option<Arc<RecordChannel>> {
        self.channels.get(&id).cloned()
    }

    /// All channels read so far.
    pub fn channels(&self) -> Vec<Arc<RecordChannel>> {
        let mut ids: Vec<&u16> = self.channels.keys().collect();
        ids.sort();
        ids.into_iter().map(|id| self.channels[id].clone()).collect()
    }

    /// Message count declared by the footer, once reached.
    pub fn declared_count(&self) -> Option<u64> {
        self.declared_count
    }

    fn read_channel(&mut self) -> Result<(), FormatError> {
        let mut fixed = [0u8; 10];
        self.reader.read_exact(&mut fixed)?;
        let mut cursor = io::Cursor::new(&fixed);
        let id = cursor.read_u16::<LittleEndian>()?;
        let topic_len = cursor.read_u16::<LittleEndian>()? as usize;
        let type_len = cursor.read_u16::<LittleEndian>()? as usize;
        let desc_len = cursor.read_u32::<LittleEndian>()? as usize;

        let mut variable = vec![0u8; topic_len + type_len + desc_len];
        self.reader.read_exact(&mut variable)?;

        self.hasher.update(&[TAG_CHANNEL]);
        self.hasher.update(&fixed);
        self.hasher.update(&variable);

        let topic = String::from_utf8_lossy(&variable[..topic_len]).into_owned();
        let type_name =
            String::from_utf8_lossy(&variable[topic_len..topic_len + type_len]).into_owned();
        let descriptor_set = variable[topic_len + type_len..].to_vec();

        self.channels.insert(
            id,
            Arc::new(RecordChannel {
                topic,
                type_name,
                descriptor_set,
            }),
        );
        Ok(())
    }

    fn read_message(&mut self) -> Result<RecordMessage, FormatError> {
        let mut fixed = [0u8; 14];
        self.reader.read_exact(&mut fixed)?;
        let mut cursor = io::Cursor::new(&fixed);
        let channel_id = cursor.read_u16::<LittleEndian>()?;
        let time_ns = cursor.read_u64::<LittleEndian>()?;
        let payload_len = cursor.read_u32::<LittleEndian>()? as usize;

        let mut payload = vec![0u8; payload_len];
        self.reader.read_exact(&mut payload)?;

        self.hasher.update(&[TAG_MESSAGE]);
        self.hasher.update(&fixed);
        self.hasher.update(&payload);

        if !self.channels.contains_key(&channel_id) {
            return Err(FormatError::InvalidFormat(format!(
                "message references unknown channel {channel_id}"
            )));
        }

        self.messages_read += 1;
        Ok(RecordMessage {
            channel_id,
            time_ns,
            payload,
        })
    }

    fn read_footer(&mut self) -> Result<(), FormatError> {
        let declared = self.reader.read_u64::<LittleEndian>()?;
        let crc = self.reader.read_u32::<LittleEndian>()?;
        let mut magic = [0u8; 8];
        self.reader.read_exact(&mut magic)?;

        if magic != MAGIC {
            return Err(FormatError::InvalidFormat("bad footer magic".into()));
        }
        if declared != self.messages_read {
            return Err(FormatError::InvalidFormat(format!(
                "footer declares {declared} messages, read {}",
                self.messages_read
            )));
        }
        let computed = self.hasher.clone().finalize();
        if computed != crc {
            return Err(FormatError::InvalidFormat("CRC mismatch".into()));
        }

        self.declared_count = Some(declared);
        Ok(())
    }
}
