// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for hub operations.
//!
//! Message-level failures are logged and dropped inside the hub; these
//! variants are what sink-initiated calls get back.

use cybus::BusError;
use cybus_schema::{RegistryError, TranslateError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    /// A type name could not be resolved through the registry.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// Publish or unadvertise against a topic without a writer.
    #[error("topic {0} is not advertised")]
    NotAdvertised(String),

    /// Subscribe or unsubscribe against an unknown channel.
    #[error("not subscribed to {0}")]
    NotSubscribed(String),

    /// A text payload failed to parse against the topic's prototype.
    #[error("malformed text payload: {0}")]
    MalformedText(String),

    /// The service RPC failed (no provider, provider rejected the call).
    #[error("service call failed: {0}")]
    CallFailed(String),

    /// The service RPC did not complete within the configured timeout.
    #[error("service call timed out")]
    Timeout,

    /// Bus-level rejection (e.g. conflicting topic type).
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl From<TranslateError> for HubError {
    fn from(err: TranslateError) -> Self {
        match err {
            TranslateError::Registry(e) => e.into(),
            TranslateError::MalformedText { .. } => HubError::MalformedText(err.to_string()),
            TranslateError::MalformedBytes { .. } | TranslateError::NoConverter(_) => {
                HubError::CallFailed(err.to_string())
            }
        }
    }
}

impl From<RegistryError> for HubError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownType(name) => HubError::UnknownType(name),
            other => HubError::UnknownType(other.to_string()),
        }
    }
}
