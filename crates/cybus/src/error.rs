// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for bus operations.

use thiserror::Error;

/// Errors surfaced by bus handles.
#[derive(Debug, Error)]
pub enum BusError {
    /// A writer advertised a topic with a type that conflicts with the
    /// type already registered for it.
    #[error("topic {topic} already carries {existing}, refusing {requested}")]
    TopicTypeMismatch {
        topic: String,
        existing: String,
        requested: String,
    },

    /// No provider is registered for the requested service.
    #[error("no provider for service {0}")]
    NoProvider(String),

    /// The service provider did not respond within the configured interval.
    #[error("service call timed out")]
    Timeout,

    /// The service provider rejected or failed the call.
    #[error("service call failed: {0}")]
    CallFailed(String),
}
