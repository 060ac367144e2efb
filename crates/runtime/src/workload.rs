// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Synthetic workloads for driving the allocator like a query would.
//!
//! A [`Workload`] is a set of fragments run concurrently. Each fragment
//! processes `batches` batches of `batch_bytes` bytes and keeps a sliding
//! window of the last `retained_batches` batches reserved, the way an
//! operator holding a few buffered batches would.

use crate::QueryError;

/// One fragment of a workload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FragmentSpec {
    pub name: String,
    /// Number of batches to process.
    pub batches: usize,
    /// Bytes reserved per batch.
    pub batch_bytes: usize,
    /// Batches held at once before the oldest is released.
    #[serde(default = "default_retained")]
    pub retained_batches: usize,
}

fn default_retained() -> usize {
    1
}

impl FragmentSpec {
    pub fn new(name: impl Into<String>, batches: usize, batch_bytes: usize) -> Self {
        Self {
            name: name.into(),
            batches,
            batch_bytes,
            retained_batches: default_retained(),
        }
    }

    pub fn retaining(mut self, retained_batches: usize) -> Self {
        self.retained_batches = retained_batches;
        self
    }

    /// Peak bytes this fragment will hold if nothing fails.
    pub fn peak_bytes(&self) -> usize {
        self.retained_batches.min(self.batches).saturating_mul(self.batch_bytes)
    }
}

/// A synthetic query: fragments that run concurrently under one query
/// allocator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Workload {
    pub name: String,
    pub fragments: Vec<FragmentSpec>,
}

impl Workload {
    pub fn new(name: impl Into<String>, fragments: Vec<FragmentSpec>) -> Self {
        Self {
            name: name.into(),
            fragments,
        }
    }

    /// `fragments` identical fragments named `{name}-{i}`.
    pub fn uniform(
        name: impl Into<String>,
        fragments: usize,
        batches: usize,
        batch_bytes: usize,
    ) -> Self {
        let name = name.into();
        let specs = (0..fragments)
            .map(|i| FragmentSpec::new(format!("{name}-{i}"), batches, batch_bytes))
            .collect();
        Self::new(name, specs)
    }

    /// Total reservation calls the workload makes if nothing fails.
    pub fn total_batches(&self) -> usize {
        self.fragments.iter().map(|f| f.batches).sum()
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self.fragments.is_empty() {
            return Err(QueryError::InvalidWorkload(format!(
                "workload '{}' has no fragments",
                self.name
            )));
        }
        for (i, fragment) in self.fragments.iter().enumerate() {
            if fragment.retained_batches == 0 {
                return Err(QueryError::InvalidWorkload(format!(
                    "fragment '{}' must retain at least one batch",
                    fragment.name
                )));
            }
            if self.fragments[..i].iter().any(|f| f.name == fragment.name) {
                return Err(QueryError::InvalidWorkload(format!(
                    "duplicate fragment name '{}'",
                    fragment.name
                )));
            }
        }
        Ok(())
    }
}
