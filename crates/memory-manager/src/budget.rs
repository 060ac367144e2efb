// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory limit configuration and parsing.
//!
//! A [`MemoryBudget`] is the byte limit of one allocator in the hierarchy.
//! Limits are validated where they enter the system, so a negative limit is
//! rejected here rather than at allocator construction.

use crate::MemoryError;
use std::fmt;

/// The byte limit of an allocator.
///
/// # Parsing
/// Supports human-readable strings with binary suffixes:
/// - `"512M"` or `"512MB"` → 512 × 1024² bytes
/// - `"1G"` or `"1GB"` → 1 × 1024³ bytes
/// - `"2048K"` or `"2048KB"` → 2048 × 1024 bytes
/// - `"1073741824"` → raw byte count
///
/// Negative values are a configuration error.
///
/// # Examples
/// ```
/// use memory_manager::MemoryBudget;
///
/// let b = MemoryBudget::from_mb(512);
/// assert_eq!(b.as_mb(), 512);
///
/// let b = MemoryBudget::parse("1G").unwrap();
/// assert_eq!(b.as_mb(), 1024);
///
/// assert!(MemoryBudget::parse("-1G").is_err());
/// assert!(MemoryBudget::from_signed(-1).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct MemoryBudget {
    /// Limit in bytes.
    bytes: usize,
}

impl MemoryBudget {
    /// Creates a budget from a byte count.
    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    /// Creates a budget from a signed byte count, rejecting negatives.
    pub fn from_signed(bytes: i64) -> Result<Self, MemoryError> {
        if bytes < 0 {
            return Err(MemoryError::InvalidLimit(format!(
                "limit must not be negative, got {bytes}"
            )));
        }
        usize::try_from(bytes)
            .map(Self::from_bytes)
            .map_err(|_| MemoryError::InvalidLimit(format!("limit {bytes} does not fit in usize")))
    }

    /// Creates a budget from megabytes.
    pub fn from_mb(mb: usize) -> Self {
        Self {
            bytes: mb * 1024 * 1024,
        }
    }

    /// Creates a budget from gigabytes.
    pub fn from_gb(gb: usize) -> Self {
        Self {
            bytes: gb * 1024 * 1024 * 1024,
        }
    }

    /// Returns the budget in bytes.
    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Returns the budget in megabytes (truncated).
    pub fn as_mb(&self) -> usize {
        self.bytes / (1024 * 1024)
    }

    /// Parses a human-readable budget string.
    ///
    /// Accepted formats: `"512M"`, `"512MB"`, `"1G"`, `"1GB"`, `"2048K"`,
    /// `"2048KB"`, or a plain byte count like `"1073741824"`.
    /// Case-insensitive. `"0"` is a valid (if useless) limit.
    pub fn parse(s: &str) -> Result<Self, MemoryError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MemoryError::InvalidLimit("empty budget string".into()));
        }
        if s.starts_with('-') {
            return Err(MemoryError::InvalidLimit(format!(
                "limit must not be negative, got '{s}'"
            )));
        }

        let s_upper = s.to_uppercase();

        let (num_str, multiplier) = if s_upper.ends_with("GB") {
            (&s[..s.len() - 2], 1024 * 1024 * 1024)
        } else if s_upper.ends_with('G') {
            (&s[..s.len() - 1], 1024 * 1024 * 1024)
        } else if s_upper.ends_with("MB") {
            (&s[..s.len() - 2], 1024 * 1024)
        } else if s_upper.ends_with('M') {
            (&s[..s.len() - 1], 1024 * 1024)
        } else if s_upper.ends_with("KB") {
            (&s[..s.len() - 2], 1024)
        } else if s_upper.ends_with('K') {
            (&s[..s.len() - 1], 1024)
        } else if s_upper.ends_with('B') {
            (&s[..s.len() - 1], 1)
        } else {
            (s, 1)
        };

        let num_str = num_str.trim();
        let value: usize = num_str.parse().map_err(|_| {
            MemoryError::InvalidLimit(format!(
                "invalid budget string: '{s}'; expected a number followed by an optional suffix (K, M, G)"
            ))
        })?;

        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| MemoryError::InvalidLimit(format!("budget overflow: '{s}'")))?;

        Ok(Self { bytes })
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bytes >= 1024 * 1024 * 1024 && self.bytes % (1024 * 1024 * 1024) == 0 {
            write!(f, "{} GB", self.bytes / (1024 * 1024 * 1024))
        } else if self.bytes >= 1024 * 1024 && self.bytes % (1024 * 1024) == 0 {
            write!(f, "{} MB", self.bytes / (1024 * 1024))
        } else if self.bytes >= 1024 && self.bytes % 1024 == 0 {
            write!(f, "{} KB", self.bytes / 1024)
        } else {
            write!(f, "{} B", self.bytes)
        }
    }
}
