// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII reservation handle that returns its bytes on drop.
//!
//! A [`Reservation`] is the only way to give bytes back to an allocator.
//! [`Reservation::release`] consumes the handle, so releasing the same
//! reservation twice does not compile. Dropping the handle releases it too.

use crate::allocator::{AllocatorId, Tree};
use std::fmt;
use std::sync::Arc;

/// Bytes held against an allocator and all of its ancestors.
///
/// # Example
/// ```
/// use memory_manager::{AllocationContext, Allocator, MemoryBudget};
///
/// let root = Allocator::root("root", MemoryBudget::from_bytes(4096), AllocationContext::default());
/// let r = root.reserve(1024).unwrap();
/// assert_eq!(r.size(), 1024);
///
/// r.release();               // bytes returned
/// // r.release();            // compile error: use of moved value
/// assert_eq!(root.reserved(), 0);
/// ```
#[must_use = "dropping a reservation releases it immediately"]
pub struct Reservation {
    tree: Arc<Tree>,
    allocator: AllocatorId,
    id: u64,
    size: usize,
    released: bool,
}

impl Reservation {
    pub(crate) fn new(tree: Arc<Tree>, allocator: AllocatorId, id: u64, size: usize) -> Self {
        Self {
            tree,
            allocator,
            id,
            size,
            released: false,
        }
    }

    /// Bytes held by this reservation.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The allocator this reservation was made on.
    pub fn allocator(&self) -> AllocatorId {
        self.allocator
    }

    /// Identity of this reservation within its tree.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the bytes to the allocator and its ancestors.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.tree.release(self.allocator, self.id, self.size);
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("allocator", &self.allocator)
            .field("id", &self.id)
            .field("size", &self.size)
            .finish()
    }
}
