// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Client-facing errors and their wire form.
//!
//! A [`UserError`] is what a query reports back to the client: a coarse
//! [`ErrorType`], a stable message, optional context lines, the endpoint it
//! happened on, and a unique error id operators can grep logs for. The
//! internal cause is kept for logging and only rendered onto the wire when
//! verbose errors are enabled.

use injection::Endpoint;
use std::fmt;
use uuid::Uuid;

/// Stable marker carried by every memory-related client error.
///
/// Clients and tests match on this string; do not change it.
pub const MEMORY_ERROR_MSG: &str = "One or more nodes ran out of memory while executing the query.";

/// Coarse category of a client-facing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    Connection,
    DataRead,
    DataWrite,
    Function,
    Parse,
    Permission,
    Plan,
    /// The query ran out of a node resource, usually memory.
    Resource,
    System,
    UnsupportedOperation,
    Validation,
}

impl ErrorType {
    /// Upper-case label used in rendered messages.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorType::Connection => "CONNECTION",
            ErrorType::DataRead => "DATA_READ",
            ErrorType::DataWrite => "DATA_WRITE",
            ErrorType::Function => "FUNCTION",
            ErrorType::Parse => "PARSE",
            ErrorType::Permission => "PERMISSION",
            ErrorType::Plan => "PLAN",
            ErrorType::Resource => "RESOURCE",
            ErrorType::System => "SYSTEM",
            ErrorType::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            ErrorType::Validation => "VALIDATION",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An error reported to the client that submitted a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserError {
    error_type: ErrorType,
    message: String,
    context: Vec<String>,
    endpoint: Option<Endpoint>,
    cause: Option<String>,
    error_id: Uuid,
}

impl UserError {
    /// A new error with a fresh error id.
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            context: Vec::new(),
            endpoint: None,
            cause: None,
            error_id: Uuid::new_v4(),
        }
    }

    /// A `RESOURCE` error carrying [`MEMORY_ERROR_MSG`].
    pub fn memory_error() -> Self {
        Self::new(ErrorType::Resource, MEMORY_ERROR_MSG)
    }

    /// Appends a context line shown beneath the message.
    pub fn with_context(mut self, line: impl Into<String>) -> Self {
        self.context.push(line.into());
        self
    }

    /// Records the endpoint the error happened on.
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Records the internal cause. Only rendered for verbose errors.
    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &[String] {
        &self.context
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    pub fn error_id(&self) -> Uuid {
        self.error_id
    }

    /// Whether this is a memory error clients can recognise.
    pub fn is_memory_error(&self) -> bool {
        self.error_type == ErrorType::Resource && self.message.contains(MEMORY_ERROR_MSG)
    }

    /// Renders the error for the wire. `verbose` controls whether the
    /// internal cause is included.
    pub fn to_wire(&self, verbose: bool) -> WireError {
        let mut message = format!("{}: {}", self.error_type, self.message);
        for line in &self.context {
            message.push('\n');
            message.push_str(line);
        }
        WireError {
            error_id: self.error_id,
            error_type: self.error_type,
            message,
            endpoint: self.endpoint.as_ref().map(ToString::to_string),
            cause: if verbose { self.cause.clone() } else { None },
        }
    }
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ERROR: {}", self.error_type, self.message)?;
        if !self.context.is_empty() {
            f.write_str("\n")?;
            for line in &self.context {
                write!(f, "\n{line}")?;
            }
        }
        write!(f, "\n\n[Error Id: {}", self.error_id)?;
        if let Some(endpoint) = &self.endpoint {
            write!(f, " on {endpoint}")?;
        }
        f.write_str("]")
    }
}

impl std::error::Error for UserError {}

/// The serialised form of a [`UserError`] sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WireError {
    pub error_id: Uuid,
    pub error_type: ErrorType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl WireError {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
