// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-allocator reservation statistics.
//!
//! Every reservation is recorded on the allocator it was made on *and* on
//! each ancestor, so a parent's stats describe its whole subtree.

/// Cumulative statistics about one allocator's subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct AllocationStats {
    /// Successful reservations.
    pub total_reservations: u64,
    /// Reservations returned.
    pub total_releases: u64,
    /// Reservations refused because a limit would be breached.
    pub oom_count: u64,
    /// Reservations failed by an injected fault.
    pub injected_failures: u64,
    /// High-water mark of reserved bytes.
    pub peak_reserved_bytes: usize,
    /// Total bytes ever reserved (including released ones).
    pub cumulative_reserved_bytes: u64,
}

impl AllocationStats {
    /// All reservation attempts, successful or not.
    pub fn attempts(&self) -> u64 {
        self.total_reservations + self.oom_count + self.injected_failures
    }

    /// Reservations not yet released.
    pub fn outstanding(&self) -> u64 {
        self.total_reservations.saturating_sub(self.total_releases)
    }

    /// Fraction of attempts that failed, in `[0.0, 1.0]`.
    pub fn failure_ratio(&self) -> f64 {
        let attempts = self.attempts();
        if attempts == 0 {
            return 0.0;
        }
        (self.oom_count + self.injected_failures) as f64 / attempts as f64
    }

    pub(crate) fn record_reservation(&mut self, size: usize) {
        self.total_reservations += 1;
        self.cumulative_reserved_bytes += size as u64;
    }

    pub(crate) fn record_release(&mut self) {
        self.total_releases += 1;
    }

    pub(crate) fn record_oom(&mut self) {
        self.oom_count += 1;
    }

    pub(crate) fn record_injected(&mut self) {
        self.injected_failures += 1;
    }

    pub(crate) fn update_peak(&mut self, current_bytes: usize) {
        if current_bytes > self.peak_reserved_bytes {
            self.peak_reserved_bytes = current_bytes;
        }
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let peak_mb = self.peak_reserved_bytes as f64 / (1024.0 * 1024.0);
        format!(
            "Reservations: {} ok, {} released, {} OOM, {} injected ({:.1}% failed), peak {:.2} MB",
            self.total_reservations,
            self.total_releases,
            self.oom_count,
            self.injected_failures,
            self.failure_ratio() * 100.0,
            peak_mb,
        )
    }
}
