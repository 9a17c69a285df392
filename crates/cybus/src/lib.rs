// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cybus - in-process publish/subscribe middleware facade.
//!
//! The message plane (bridge, recorder, player) treats the bus as an
//! external collaborator: topics carry opaque byte payloads described by a
//! serialized schema descriptor, services are blocking request/response
//! calls, and a topology surface answers "which channels exist, what type do
//! they carry, who publishes them". This crate pins that interface and ships
//! an in-process transport behind it, so the rest of the workspace runs and
//! tests without any network stack.
//!
//! # Quick Start
//!
//! ```
//! use cybus::Bus;
//!
//! let bus = Bus::builder("demo").build();
//! let writer = bus
//!     .create_writer("/chatter", "demo.Chatter", None)
//!     .expect("writer");
//!
//! let _reader = bus
//!     .create_reader("/chatter", |sample| {
//!         println!("{} bytes on {}", sample.payload.len(), sample.topic);
//!     })
//!     .expect("reader");
//!
//! writer.write(b"hello").expect("write");
//! ```
//!
//! Reader callbacks run on the publishing thread and must not block.

pub mod bus;
pub mod error;
pub mod param;
pub mod service;

pub use bus::{Bus, BusBuilder, Reader, Sample, Writer};
pub use error::BusError;
pub use param::{Parameter, ParameterValue};
pub use service::{Client, Service};
