// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for injection configuration.

/// Errors raised while parsing or installing injection controls.
///
/// All of these are configuration errors: they are reported at setup time,
/// before any query runs, and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum InjectionError {
    /// The control document is not valid JSON or is missing a required field.
    #[error("malformed injection controls: {0}")]
    MalformedControls(String),

    /// The injection `type` is not one this registry can execute.
    #[error("unsupported injection type '{0}'; only 'exception' is supported")]
    UnsupportedType(String),

    /// The defect name does not resolve to a known [`DefectKind`](crate::DefectKind).
    #[error("unknown defect kind '{0}'")]
    UnknownDefect(String),

    /// A rule was configured to fire zero times.
    #[error("rule for site {site} must fire at least once")]
    InvalidFireCount { site: String },

    /// Only one of `address` and `port` was given.
    #[error("rule for site {site} names an address or a port but not both")]
    IncompleteEndpoint { site: String },

    /// The port could not be parsed as a TCP port.
    #[error("invalid port '{0}'")]
    InvalidPort(String),

    /// Two rules would match the same (site, endpoint) pair.
    #[error("conflicting rules for site {site} on endpoint {endpoint}")]
    ConflictingRules { site: String, endpoint: String },
}

impl From<serde_json::Error> for InjectionError {
    fn from(e: serde_json::Error) -> Self {
        InjectionError::MalformedControls(e.to_string())
    }
}
