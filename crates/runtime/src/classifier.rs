// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The allocation boundary: where allocator failures become client errors.
//!
//! Execution code never calls [`Allocator::reserve`] directly. It goes
//! through an [`AllocationBoundary`], which turns *every* failure of the
//! reservation call into a `RESOURCE` [`UserError`] carrying
//! [`MEMORY_ERROR_MSG`](crate::MEMORY_ERROR_MSG), whatever the underlying
//! defect was. Errors raised anywhere else are left alone.

use crate::UserError;
use injection::Endpoint;
use memory_manager::{Allocator, MemoryError, Reservation};

/// Maps a memory error from an allocation site to a client-facing error.
///
/// The concrete defect is recorded in the log and in the error's cause; the
/// client only ever sees the stable memory marker.
pub fn classify(error: &MemoryError, endpoint: Option<&Endpoint>) -> UserError {
    let mut user = UserError::memory_error().with_cause(error);
    if let Some(endpoint) = endpoint {
        user = user.with_endpoint(endpoint.clone());
    }
    tracing::warn!(
        error_id = %user.error_id(),
        endpoint = ?endpoint.map(ToString::to_string),
        "allocation failed: {error}"
    );
    user
}

/// The single interception point for reservations made by execution code.
#[derive(Debug, Clone, Copy)]
pub struct AllocationBoundary<'a> {
    allocator: &'a Allocator,
    label: Option<&'a str>,
}

impl<'a> AllocationBoundary<'a> {
    pub fn new(allocator: &'a Allocator) -> Self {
        Self {
            allocator,
            label: None,
        }
    }

    /// A boundary that adds `label` (e.g. the fragment name) as a context
    /// line on every error it classifies.
    pub fn labeled(allocator: &'a Allocator, label: &'a str) -> Self {
        Self {
            allocator,
            label: Some(label),
        }
    }

    pub fn allocator(&self) -> &'a Allocator {
        self.allocator
    }

    /// Reserves `size` bytes, classifying any failure.
    pub fn reserve(&self, size: usize) -> Result<Reservation, UserError> {
        self.allocator.reserve(size).map_err(|e| {
            let user = classify(&e, self.allocator.endpoint());
            match self.label {
                Some(label) => user.with_context(format!("Fragment: {label}")),
                None => user,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorType, MEMORY_ERROR_MSG};
    use injection::{DefectKind, InjectionRegistry, InjectionRule};
    use memory_manager::{AllocationContext, MemoryBudget, CHILD_BUFFER_SITE};
    use std::sync::Arc;

    fn endpoint() -> Endpoint {
        Endpoint::new("node-1", 31010)
    }

    #[test]
    fn test_genuine_exhaustion_is_resource() {
        let root = Allocator::root("root", MemoryBudget::from_bytes(100), AllocationContext::default());
        let boundary = AllocationBoundary::new(&root);

        let _held = boundary.reserve(80).unwrap();
        let err = boundary.reserve(80).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Resource);
        assert!(err.message().contains(MEMORY_ERROR_MSG));
        assert!(err.cause().unwrap().contains("out of memory"));
    }

    #[test]
    fn test_every_defect_kind_is_resource() {
        for defect in DefectKind::ALL {
            let registry = Arc::new(InjectionRegistry::new());
            registry
                .install(vec![InjectionRule::new(CHILD_BUFFER_SITE, defect)])
                .unwrap();
            let root = Allocator::root(
                "root",
                MemoryBudget::from_mb(1),
                AllocationContext::new(endpoint(), registry),
            );

            let err = AllocationBoundary::labeled(&root, "scan-0").reserve(1).unwrap_err();
            assert_eq!(err.error_type(), ErrorType::Resource, "defect {defect}");
            assert!(err.is_memory_error(), "defect {defect}");
            assert_eq!(err.endpoint(), Some(&endpoint()));
            assert_eq!(err.context(), ["Fragment: scan-0".to_string()]);
            assert!(err.cause().unwrap().contains(defect.name()));
        }
    }

    #[test]
    fn test_classify_without_endpoint() {
        let err = MemoryError::OutOfMemory {
            allocator: "q".into(),
            requested_bytes: 10,
            available_bytes: 0,
            limit_bytes: 0,
        };
        let user = classify(&err, None);
        assert!(user.endpoint().is_none());
        assert!(user.is_memory_error());
    }
}
