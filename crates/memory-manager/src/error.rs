// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for memory management.

use injection::{DefectKind, InjectionSite};

/// Errors that can occur while reserving memory or managing allocators.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// A reservation would push some allocator in the chain over its limit.
    #[error(
        "out of memory: allocator '{allocator}' cannot fit {requested_bytes} bytes, \
         only {available_bytes} available (limit: {limit_bytes})"
    )]
    OutOfMemory {
        /// The allocator whose limit would be breached (may be an ancestor).
        allocator: String,
        requested_bytes: usize,
        available_bytes: usize,
        limit_bytes: usize,
    },

    /// A fault was injected at an allocation site.
    #[error("injected {defect} at {site} in allocator '{allocator}'")]
    Injected {
        allocator: String,
        site: InjectionSite,
        defect: DefectKind,
    },

    /// A limit is negative or unparseable.
    #[error("invalid memory limit: {0}")]
    InvalidLimit(String),

    /// An allocator was closed while it still held reservations or children.
    #[error(
        "leak detected in allocator '{allocator}': {reserved_bytes} bytes still reserved \
         ({outstanding} own reservations, {open_children} open children)"
    )]
    LeakDetected {
        allocator: String,
        reserved_bytes: usize,
        outstanding: usize,
        open_children: usize,
    },
}

impl MemoryError {
    /// Whether this error surfaced from a reservation call (genuine or injected).
    pub fn is_resource_failure(&self) -> bool {
        matches!(self, MemoryError::OutOfMemory { .. } | MemoryError::Injected { .. })
    }

    /// Whether this error indicates a broken allocator invariant.
    pub fn is_programming_defect(&self) -> bool {
        matches!(self, MemoryError::LeakDetected { .. })
    }
}
