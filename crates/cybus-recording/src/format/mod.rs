// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Log-file formats.
//!
//! - `mcap_io`: segmented MCAP writing and summary/scan reading
//! - `record`: the bus's native `.record` container

pub mod mcap_io;
pub mod record;

pub use mcap_io::{message_stream, read_summary, ChannelSummary, FileSummary, SegmentWriter};
pub use record::{RecordChannel, RecordMessage, RecordReader, RecordWriter};

use thiserror::Error;

/// Schema encoding every channel is expected to carry.
pub const EXPECTED_ENCODING: &str = "protobuf";

/// Format-level errors.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MCAP error: {0}")]
    Mcap(#[from] mcap::McapError),

    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    #[error("version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },
}
