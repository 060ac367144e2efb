// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! A hierarchical, limit-enforcing allocator for query execution. Every
//! query and fragment gets its own child allocator; a reservation is charged
//! to the allocator it was made on and to every ancestor, so no subtree can
//! exceed the limit of any node above it.
//!
//! # Key Components
//!
//! - [`MemoryBudget`]: an allocator's byte limit with human-readable parsing
//!   (`"512M"`, `"1G"`, etc.).
//! - [`Allocator`]: a node in the tree. Creates children, reserves bytes and
//!   refuses to close while anything is still held.
//! - [`Reservation`]: an RAII handle to reserved bytes. Dropping it returns
//!   the bytes to every allocator in the chain.
//! - [`AllocationContext`]: the endpoint and injection point an allocator
//!   consults before each reservation.
//! - [`AllocationStats`]: cumulative per-subtree metrics (peak usage, OOM
//!   and injected failure counts).
//!
//! # Ownership Model
//!
//! ```text
//! Allocator::reserve(size)
//!       │
//!       ▼
//!   Reservation  ◄─── holds Arc<Tree>, allocator id, size
//!       │
//!       │  release() / drop()
//!       ▼
//!   Tree::release()  ──► every ancestor's tally shrinks by size
//! ```
//!
//! # Example
//! ```
//! use memory_manager::{AllocationContext, Allocator, MemoryBudget};
//!
//! let root = Allocator::root("node", MemoryBudget::from_mb(64), AllocationContext::default());
//! let query = root.new_child("query-1", MemoryBudget::from_mb(16));
//!
//! let a = query.reserve(1024 * 1024).unwrap();
//! let b = query.reserve(512 * 1024).unwrap();
//! assert_eq!(root.reserved(), 1024 * 1024 + 512 * 1024);
//!
//! drop(a);
//! b.release();
//! query.close().unwrap();
//! assert_eq!(root.reserved(), 0);
//! ```

mod allocator;
mod budget;
mod error;
mod reservation;
mod stats;

pub use allocator::{
    AllocationContext, Allocator, AllocatorId, CloseError, CHILD_BUFFER_SITE, INJECTION_SITES,
};
pub use budget::MemoryBudget;
pub use error::MemoryError;
pub use reservation::Reservation;
pub use stats::AllocationStats;
