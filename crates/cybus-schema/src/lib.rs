// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic schema plane: type resolution and payload translation.
//!
//! Everything on the bus is an opaque byte blob plus a fully-qualified type
//! name. This crate turns that pair into something usable:
//!
//! - [`SchemaRegistry`] resolves a type name to a [`SchemaEntry`]: an
//!   instantiable message prototype, a serialized descriptor set (the
//!   transitive closure over file dependencies, suitable for export to a
//!   visualization client or a log file), and a JSON-schema projection for
//!   service request/response shapes.
//! - [`Translator`] converts payloads between wire bytes, canonical bytes,
//!   and a structured JSON text form.
//! - [`ConverterRegistry`] holds user-supplied converters that map a source
//!   type onto a different target type (for sinks that only understand
//!   well-known visualization schemas).
//!
//! Resolution is two-tier: descriptors learned at runtime (from bus
//! discovery or log files) first, then the process-wide static pool
//! populated at build time.

pub mod convert;
pub mod descriptor;
pub mod json_schema;
pub mod registry;
pub mod translate;

pub use convert::{Conversion, ConverterRegistry, ConverterRegistryBuilder};
pub use registry::{RegistryError, SchemaEntry, SchemaRegistry};
pub use translate::{TranslateError, Translator};

#[cfg(test)]
pub(crate) mod testdata;
