// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for query execution.

use crate::UserError;

/// Errors that can end a query or prevent the node from starting.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A client-facing error, already classified.
    #[error("{0}")]
    User(UserError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The fault-injection control document was rejected.
    #[error("injection controls rejected: {0}")]
    Injection(#[from] injection::InjectionError),

    /// A memory error that did not pass through an allocation boundary.
    #[error("memory error: {0}")]
    Memory(#[from] memory_manager::MemoryError),

    /// The workload description is unusable.
    #[error("invalid workload: {0}")]
    InvalidWorkload(String),
}

impl QueryError {
    /// The client-facing error, if this is one.
    pub fn user_error(&self) -> Option<&UserError> {
        match self {
            QueryError::User(e) => Some(e),
            _ => None,
        }
    }
}

impl From<UserError> for QueryError {
    fn from(e: UserError) -> Self {
        QueryError::User(e)
    }
}
