// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Record and replay bus traffic.
//!
//! - Segmented MCAP recording with per-file schema/channel tables and a
//!   bounded queue between bus readers and the writer thread
//! - Time-faithful replay with speed, start offset, pause, step, and loop
//!   controls
//! - Conversion between the bus's native `.record` container and `.mcap`
//!
//! # Quick Start
//!
//! ```bash
//! # Record everything, rotating segments every 60 seconds
//! mcap-recorder record -o capture -i 60
//!
//! # Replay at double speed, skipping the first 5 seconds
//! mcap-recorder play capture_0.mcap -r 2.0 -s 5.0
//!
//! # Convert a native log
//! mcap-recorder convert --input drive.record --output drive.mcap
//! ```

pub mod convert;
pub mod filter;
pub mod format;
pub mod keyboard;
pub mod player;
pub mod queue;
pub mod recorder;

#[cfg(test)]
pub(crate) mod testutil;

pub use convert::{mcap_to_record, record_to_mcap, ConvertStats};
pub use filter::TopicFilter;
pub use format::FormatError;
pub use keyboard::KeyboardListener;
pub use player::{PlaybackControls, PlaybackStats, Player, PlayerConfig, PlayerError};
pub use queue::{MessageQueue, QueuedMessage};
pub use recorder::{Recorder, RecorderConfig, RecorderError, RecordingStats};

/// Nanoseconds since the Unix epoch.
pub(crate) fn now_nanos() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
