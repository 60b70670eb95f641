// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for parsing labels and validating configuration.
//!
//! Nothing on the delivery path returns these. They surface only at the edges:
//! when a host parses a label it received from elsewhere, or when settings are
//! loaded at startup.

/// Failure to turn a textual label into one of the closed enumerations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unsupported metric kind: {0}")]
    UnsupportedKind(String),

    #[error("unsupported batching mode: {0}")]
    UnsupportedMode(String),

    #[error("unsupported overflow policy: {0}")]
    UnsupportedPolicy(String),
}

/// Settings that cannot be used to drive a collector.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
