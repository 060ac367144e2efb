// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Query execution metrics.

use std::time::Duration;

/// Metrics for a single fragment's execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FragmentMetrics {
    /// Fragment name.
    pub fragment_name: String,
    /// Batches processed to completion.
    pub batches: usize,
    /// Peak bytes reserved by this fragment.
    pub peak_reserved_bytes: usize,
    /// Wall-clock time for the fragment.
    pub duration: Duration,
}

/// Aggregate metrics for a complete query run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryMetrics {
    /// Total wall-clock time for the query.
    pub total_duration: Duration,
    /// Peak bytes reserved by the query as a whole.
    pub peak_reserved_bytes: usize,
    /// Per-fragment metrics, in workload order.
    pub fragment_metrics: Vec<FragmentMetrics>,
}

impl QueryMetrics {
    /// Creates an empty metrics container.
    pub fn new() -> Self {
        Self {
            total_duration: Duration::ZERO,
            peak_reserved_bytes: 0,
            fragment_metrics: Vec::new(),
        }
    }

    pub fn record_fragment(&mut self, metrics: FragmentMetrics) {
        self.fragment_metrics.push(metrics);
    }

    /// Finalises metrics with the total wall-clock time and query peak.
    pub fn finalise(&mut self, total: Duration, peak_reserved_bytes: usize) {
        self.total_duration = total;
        self.peak_reserved_bytes = peak_reserved_bytes;
    }

    /// Total batches across all fragments.
    pub fn total_batches(&self) -> usize {
        self.fragment_metrics.iter().map(|f| f.batches).sum()
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let peak_mb = self.peak_reserved_bytes as f64 / (1024.0 * 1024.0);
        format!(
            "Query: {:.2}ms total, {} fragments, {} batches, peak {:.2} MB",
            self.total_duration.as_secs_f64() * 1000.0,
            self.fragment_metrics.len(),
            self.total_batches(),
            peak_mb,
        )
    }
}

impl Default for QueryMetrics {
    fn default() -> Self {
        Self::new()
    }
}
